// service/spreadsheet.rs
//
// Workbook encoding lives outside the service; everything here works on a
// plain table of JSON cells.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    models::{
        inventorymodel::{ImportedItem, Item, UsageRecord},
        ticketmodel::TicketReportRow,
    },
    service::{error::ServiceError, sla::normalize_label},
};

pub const DEFAULT_CATEGORY: &str = "Geral";

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sheet {
    pub title: String,
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

fn text_or_empty(value: &Option<String>) -> Value {
    json!(value.as_deref().unwrap_or(""))
}

pub fn inventory_sheet(items: &[Item]) -> Sheet {
    let headers = [
        "Nome",
        "Descrição",
        "Categoria",
        "Quantidade",
        "Quantidade Mínima",
        "Custo Unitário",
        "Valor Total",
        "Localização",
        "Fornecedor",
        "Estoque Baixo",
        "Data Criação",
        "Última Atualização",
    ];

    let rows = items
        .iter()
        .map(|item| {
            vec![
                json!(item.name),
                text_or_empty(&item.description),
                json!(item.category),
                json!(item.quantity),
                json!(item.min_quantity),
                json!(item.unit_cost),
                json!(item.total_value()),
                text_or_empty(&item.location),
                text_or_empty(&item.supplier),
                json!(if item.is_low_stock() { "Sim" } else { "Não" }),
                json!(format_date(item.created_at)),
                json!(format_date(item.updated_at)),
            ]
        })
        .collect();

    Sheet {
        title: "Inventário".to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

fn usage_subtotal(item_name: &str, quantity: i64, cost: f64) -> Vec<Value> {
    vec![
        json!("---"),
        json!(format!("TOTAL {}", item_name)),
        Value::Null,
        json!(quantity),
        Value::Null,
        json!(cost),
        Value::Null,
        Value::Null,
        Value::Null,
        json!("Subtotal por item"),
    ]
}

/// Records must already be grouped by item name; a subtotal row closes
/// every group.
pub fn usage_sheet(records: &[UsageRecord]) -> Result<Sheet, ServiceError> {
    if records.is_empty() {
        return Err(ServiceError::Validation(
            "no usage records for the period".to_string(),
        ));
    }

    let headers = [
        "Data",
        "Item",
        "Categoria",
        "Quantidade",
        "Custo Unitário (R$)",
        "Custo Total (R$)",
        "Solicitante",
        "Username",
        "Chamado",
        "Notas",
    ];

    let mut rows = Vec::with_capacity(records.len() + 1);
    let mut current: Option<&str> = None;
    let mut quantity_sum: i64 = 0;
    let mut cost_sum = 0.0;

    for record in records {
        if let Some(name) = current {
            if name != record.item_name {
                rows.push(usage_subtotal(name, quantity_sum, cost_sum));
                quantity_sum = 0;
                cost_sum = 0.0;
            }
        }
        current = Some(&record.item_name);

        let cost = record.quantity_used as f64 * record.unit_cost;
        quantity_sum += record.quantity_used as i64;
        cost_sum += cost;

        rows.push(vec![
            json!(format_date(record.used_at)),
            json!(record.item_name),
            json!(record.item_category),
            json!(record.quantity_used),
            json!(record.unit_cost),
            json!(cost),
            json!(record.author_fullname.as_deref().unwrap_or(&record.author_username)),
            json!(record.author_username),
            json!(format!("#{} - {}", record.ticket_id, record.ticket_title)),
            text_or_empty(&record.notes),
        ]);
    }

    if let Some(name) = current {
        rows.push(usage_subtotal(name, quantity_sum, cost_sum));
    }

    Ok(Sheet {
        title: "Consumo de Itens".to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    })
}

/// Rows are expected newest first. A `MÊS: mm/YYYY` separator precedes
/// each month.
pub fn ticket_report_sheet(tickets: &[TicketReportRow]) -> Sheet {
    let headers = [
        "Data",
        "ID",
        "Categoria",
        "Título",
        "Status",
        "Prioridade",
        "Autor",
        "Responsável",
        "Tempo Resolução",
    ];

    let mut rows = Vec::with_capacity(tickets.len());
    let mut current_month: Option<String> = None;

    for ticket in tickets {
        let month = ticket.created_at.format("%m/%Y").to_string();
        if current_month.as_deref() != Some(month.as_str()) {
            let mut separator = vec![Value::Null; headers.len()];
            separator[0] = json!(format!("MÊS: {}", month));
            rows.push(separator);
            current_month = Some(month);
        }

        let assignee = match (&ticket.assignee_fullname, &ticket.assignee_username) {
            (Some(fullname), _) => fullname.clone(),
            (None, Some(username)) => username.clone(),
            (None, None) => "Não atribuído".to_string(),
        };
        let duration = ticket
            .resolution_hours()
            .map(|hours| format!("{:.1}h", hours))
            .unwrap_or_else(|| "-".to_string());

        rows.push(vec![
            json!(format_date(ticket.created_at)),
            json!(format!("#{}", ticket.id)),
            json!(ticket.category),
            json!(ticket.title),
            json!(ticket.status.to_str()),
            json!(ticket.priority.to_str()),
            json!(ticket.author_fullname.as_deref().unwrap_or(&ticket.author_username)),
            json!(assignee),
            json!(duration),
        ]);
    }

    Sheet {
        title: "Relatório Detalhado".to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// First header containing any alias wins, ignoring case and accents.
pub fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = normalize_label(header);
        aliases.iter().any(|alias| header.contains(&normalize_label(alias)))
    })
}

fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Blank or non-numeric cells read as `None`. NaN and infinities are errors.
fn cell_f64(value: Option<&Value>, line: usize) -> Result<Option<f64>, ServiceError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if !n.is_finite() => Err(ServiceError::Validation(format!(
            "line {}: {} is not a valid number",
            line, n
        ))),
        other => Ok(other),
    }
}

fn cell_i32(value: Option<&Value>, line: usize) -> Result<Option<i32>, ServiceError> {
    let Some(n) = cell_f64(value, line)?.map(f64::trunc) else {
        return Ok(None);
    };
    if n < i32::MIN as f64 || n > i32::MAX as f64 {
        return Err(ServiceError::Validation(format!(
            "line {}: {} is out of range",
            line, n
        )));
    }
    Ok(Some(n as i32))
}

struct ImportColumns {
    name: usize,
    category: usize,
    quantity: usize,
    min_quantity: Option<usize>,
    unit_cost: Option<usize>,
    description: Option<usize>,
    location: Option<usize>,
    supplier: Option<usize>,
}

impl ImportColumns {
    fn detect(headers: &[String]) -> Result<Self, ServiceError> {
        let name = find_column(headers, &["nome", "item", "produto"]);
        let category = find_column(headers, &["categoria", "grupo"]);
        let quantity = find_column(headers, &["quantidade", "estoque", "qtd"]);

        let (Some(name), Some(category), Some(quantity)) = (name, category, quantity) else {
            return Err(ServiceError::Validation(
                "the sheet must have Nome, Categoria and Quantidade columns".to_string(),
            ));
        };

        Ok(ImportColumns {
            name,
            category,
            quantity,
            min_quantity: find_column(headers, &["mínima", "alerta"]),
            unit_cost: find_column(headers, &["custo", "valor", "preço"]),
            description: find_column(headers, &["descrição", "obs"]),
            location: find_column(headers, &["localização", "local", "prateleira"]),
            supplier: find_column(headers, &["fornecedor", "marca"]),
        })
    }
}

/// Turns data rows into import records. Rows without a name are skipped.
pub fn parse_inventory_rows(sheet: &Sheet) -> Result<Vec<ImportedItem>, ServiceError> {
    let columns = ImportColumns::detect(&sheet.headers)?;
    let mut items = Vec::with_capacity(sheet.rows.len());

    for (index, row) in sheet.rows.iter().enumerate() {
        let cell = |column: Option<usize>| column.and_then(|c| row.get(c));

        let Some(name) = cell_text(cell(Some(columns.name))) else {
            continue;
        };

        // Header row is line 1 in the source workbook.
        let line = index + 2;
        let item = ImportedItem {
            name,
            category: cell_text(cell(Some(columns.category)))
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            quantity: cell_i32(cell(Some(columns.quantity)), line)?.unwrap_or(0),
            min_quantity: cell_i32(cell(columns.min_quantity), line)?,
            unit_cost: cell_f64(cell(columns.unit_cost), line)?,
            description: cell_text(cell(columns.description)),
            location: cell_text(cell(columns.location)),
            supplier: cell_text(cell(columns.supplier)),
        };

        if item.quantity < 0 || item.min_quantity.is_some_and(|m| m < 0) {
            return Err(ServiceError::Validation(format!(
                "line {}: quantities cannot be negative",
                line
            )));
        }
        if item.unit_cost.is_some_and(|c| c < 0.0) {
            return Err(ServiceError::Validation(format!(
                "line {}: unit cost cannot be negative",
                line
            )));
        }

        items.push(item);
    }

    Ok(items)
}
