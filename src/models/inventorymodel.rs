use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub quantity: i32,
    pub min_quantity: i32,
    pub unit_cost: f64,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_quantity
    }

    pub fn total_value(&self) -> f64 {
        self.quantity as f64 * self.unit_cost
    }
}

/// Item as returned to API callers, with the derived stock fields.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: Item,
    pub is_low_stock: bool,
    pub total_value: f64,
}

impl From<Item> for ItemView {
    fn from(item: Item) -> Self {
        ItemView {
            is_low_stock: item.is_low_stock(),
            total_value: item.total_value(),
            item,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemData {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub quantity: i32,
    pub min_quantity: i32,
    pub unit_cost: f64,
    pub location: Option<String>,
    pub supplier: Option<String>,
}

/// One spreadsheet row. Optional fields left empty keep the stored value
/// when the item already exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedItem {
    pub name: String,
    pub category: String,
    pub quantity: i32,
    pub min_quantity: Option<i32>,
    pub unit_cost: Option<f64>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub q: Option<String>,
    pub low_stock_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct TicketItem {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub item_id: Uuid,
    pub quantity_used: i32,
    pub used_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A consumption record joined with the item it drew from. `total_cost`
/// reads the item's current unit cost; no cost history is kept.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct TicketItemWithItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub ticket_item: TicketItem,
    pub item_name: String,
    pub item_category: String,
    pub unit_cost: f64,
}

impl TicketItemWithItem {
    pub fn total_cost(&self) -> f64 {
        self.ticket_item.quantity_used as f64 * self.unit_cost
    }
}

/// Consumption record as shown on the ticket page.
#[derive(Debug, Clone, Serialize)]
pub struct TicketItemView {
    #[serde(flatten)]
    pub used: TicketItemWithItem,
    pub total_cost: f64,
}

impl From<TicketItemWithItem> for TicketItemView {
    fn from(used: TicketItemWithItem) -> Self {
        TicketItemView {
            total_cost: used.total_cost(),
            used,
        }
    }
}

/// One requested consumption line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionLine {
    pub item_id: Uuid,
    pub quantity: i32,
    pub notes: Option<String>,
}

/// Result of a single stock decrement attempted inside a store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Consumed { ticket_item: TicketItem, remaining: i32 },
    InsufficientStock { available: i32 },
    ItemNotFound,
}

/// Result of reversing a consumption record.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredStock {
    pub ticket_item: TicketItem,
    /// `None` when the item no longer exists; the record is still removed.
    pub quantity_after: Option<i32>,
}

/// One row of the usage report: a consumption record joined with its
/// ticket, the ticket's author and the item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct UsageRecord {
    pub used_at: DateTime<Utc>,
    pub quantity_used: i32,
    pub notes: Option<String>,
    pub item_name: String,
    pub item_category: String,
    pub unit_cost: f64,
    pub ticket_id: Uuid,
    pub ticket_title: String,
    pub author_username: String,
    pub author_fullname: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InventoryTotals {
    pub total_items: usize,
    pub total_value: f64,
    pub low_stock_items: usize,
}

impl InventoryTotals {
    pub fn from_items(items: &[Item]) -> Self {
        InventoryTotals {
            total_items: items.len(),
            total_value: items.iter().map(Item::total_value).sum(),
            low_stock_items: items.iter().filter(|i| i.is_low_stock()).count(),
        }
    }
}
