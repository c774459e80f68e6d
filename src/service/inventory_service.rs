// service/inventory_service.rs
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::db::HelpdeskStore,
    models::{
        inventorymodel::*,
        ticketmodel::{Ticket, TicketStatus},
        usermodel::Actor,
    },
    service::{
        error::ServiceError,
        spreadsheet::{self, Sheet},
        ticket_service::{require_admin, required},
    },
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsumedItem {
    pub ticket_item: TicketItem,
    pub remaining: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientStock { available: i32 },
    ItemNotFound,
    InvalidQuantity,
}

/// A line that was left out of a resolution, with its position in the request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineWarning {
    pub line: usize,
    pub item_id: Uuid,
    pub requested: i32,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    pub ticket: Ticket,
    pub consumed: Vec<ConsumedItem>,
    pub warnings: Vec<LineWarning>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportSummary {
    pub updated: usize,
    pub created: usize,
}

pub struct InventoryService<S> {
    store: Arc<S>,
}

impl<S> std::fmt::Debug for InventoryService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService").finish_non_exhaustive()
    }
}

impl<S: HelpdeskStore> InventoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket, ServiceError> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket", ticket_id))
    }

    /// Draws `quantity` units of an item for a ticket. Stock check,
    /// decrement and the consumption record commit together or not at all.
    pub async fn consume(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<ConsumedItem, ServiceError> {
        require_admin(actor, "consume inventory")?;
        if quantity < 1 {
            return Err(ServiceError::Validation("quantity must be at least 1".to_string()));
        }
        self.load_ticket(ticket_id).await?;

        let line = ConsumptionLine {
            item_id,
            quantity,
            notes: notes.filter(|n| !n.trim().is_empty()),
        };

        match self.store.consume_item(ticket_id, line, Utc::now()).await? {
            ConsumeOutcome::Consumed { ticket_item, remaining } => {
                tracing::info!(
                    "Consumed {} of item {} for ticket {} ({} left)",
                    quantity,
                    item_id,
                    ticket_id,
                    remaining
                );
                Ok(ConsumedItem { ticket_item, remaining })
            }
            ConsumeOutcome::InsufficientStock { available } => {
                tracing::warn!(
                    "Insufficient stock for item {}: requested {}, available {}",
                    item_id,
                    quantity,
                    available
                );
                Err(ServiceError::InsufficientStock {
                    item_id,
                    requested: quantity,
                    available,
                })
            }
            ConsumeOutcome::ItemNotFound => Err(ServiceError::not_found("Item", item_id)),
        }
    }

    /// Gives a consumption back to stock and drops the record. No upper
    /// bound applies to the restored quantity.
    pub async fn reverse(&self, actor: &Actor, ticket_item_id: Uuid) -> Result<RestoredStock, ServiceError> {
        require_admin(actor, "reverse consumption")?;

        let restored = self
            .store
            .restore_ticket_item(ticket_item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("TicketItem", ticket_item_id))?;

        match restored.quantity_after {
            Some(quantity) => tracing::info!(
                "Restored {} of item {} from ticket {} (now {})",
                restored.ticket_item.quantity_used,
                restored.ticket_item.item_id,
                restored.ticket_item.ticket_id,
                quantity
            ),
            None => tracing::warn!(
                "Consumption {} removed but item {} no longer exists",
                ticket_item_id,
                restored.ticket_item.item_id
            ),
        }
        Ok(restored)
    }

    /// Resolves the ticket and applies every line that can be satisfied.
    /// Lines that cannot are reported back, never fatal.
    pub async fn resolve_with_consumption(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        lines: Vec<ConsumptionLine>,
    ) -> Result<ResolveReport, ServiceError> {
        require_admin(actor, "resolve ticket")?;
        let ticket = self.load_ticket(ticket_id).await?;

        if !ticket.status.can_transition_to(TicketStatus::Resolvido) {
            return Err(ServiceError::InvalidTransition {
                ticket_id,
                from: ticket.status,
                to: TicketStatus::Resolvido,
            });
        }

        let mut warnings = Vec::new();
        let mut positions = Vec::with_capacity(lines.len());
        let mut valid = Vec::with_capacity(lines.len());

        for (index, line) in lines.into_iter().enumerate() {
            if line.quantity < 1 {
                warnings.push(LineWarning {
                    line: index,
                    item_id: line.item_id,
                    requested: line.quantity,
                    reason: SkipReason::InvalidQuantity,
                });
                continue;
            }
            positions.push((index, line.item_id, line.quantity));
            valid.push(ConsumptionLine {
                notes: line.notes.filter(|n| !n.trim().is_empty()),
                ..line
            });
        }

        let Some((ticket, outcomes)) = self
            .store
            .resolve_ticket_with_items(ticket_id, ticket.status, valid, Utc::now())
            .await?
        else {
            let to = TicketStatus::Resolvido;
            return Err(match self.store.get_ticket(ticket_id).await? {
                Some(current) => ServiceError::InvalidTransition { ticket_id, from: current.status, to },
                None => ServiceError::not_found("Ticket", ticket_id),
            });
        };

        let mut consumed = Vec::with_capacity(outcomes.len());
        for ((line, item_id, requested), outcome) in positions.into_iter().zip(outcomes) {
            let reason = match outcome {
                ConsumeOutcome::Consumed { ticket_item, remaining } => {
                    consumed.push(ConsumedItem { ticket_item, remaining });
                    continue;
                }
                ConsumeOutcome::InsufficientStock { available } => {
                    tracing::warn!(
                        "Ticket {} resolved without item {}: requested {}, available {}",
                        ticket_id,
                        item_id,
                        requested,
                        available
                    );
                    SkipReason::InsufficientStock { available }
                }
                ConsumeOutcome::ItemNotFound => SkipReason::ItemNotFound,
            };
            warnings.push(LineWarning { line, item_id, requested, reason });
        }
        warnings.sort_by_key(|w| w.line);

        tracing::info!(
            "Ticket {} resolved by {} ({} line(s) consumed, {} skipped)",
            ticket_id,
            actor.username,
            consumed.len(),
            warnings.len()
        );

        Ok(ResolveReport { ticket, consumed, warnings })
    }

    fn check_item(data: ItemData) -> Result<ItemData, ServiceError> {
        let name = required(&data.name, "name")?;
        let category = required(&data.category, "category")?;

        if data.quantity < 0 || data.min_quantity < 0 {
            return Err(ServiceError::Validation("quantities cannot be negative".to_string()));
        }
        if !data.unit_cost.is_finite() || data.unit_cost < 0.0 {
            return Err(ServiceError::Validation("unit cost cannot be negative".to_string()));
        }

        let optional = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(ItemData {
            name,
            category,
            description: optional(data.description),
            location: optional(data.location),
            supplier: optional(data.supplier),
            ..data
        })
    }

    pub async fn create_item(&self, actor: &Actor, data: ItemData) -> Result<Item, ServiceError> {
        require_admin(actor, "manage inventory")?;
        let data = Self::check_item(data)?;

        if self.store.get_item_by_name(&data.name).await?.is_some() {
            return Err(ServiceError::Conflict(format!("an item named {} already exists", data.name)));
        }

        let item = self.store.create_item(data).await?;
        tracing::info!("Item {} created with {} unit(s)", item.name, item.quantity);
        Ok(item)
    }

    pub async fn update_item(&self, actor: &Actor, item_id: Uuid, data: ItemData) -> Result<Item, ServiceError> {
        require_admin(actor, "manage inventory")?;
        let data = Self::check_item(data)?;

        if let Some(other) = self.store.get_item_by_name(&data.name).await? {
            if other.id != item_id {
                return Err(ServiceError::Conflict(format!("an item named {} already exists", data.name)));
            }
        }

        self.store
            .update_item(item_id, data)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", item_id))
    }

    pub async fn delete_item(&self, actor: &Actor, item_id: Uuid) -> Result<(), ServiceError> {
        require_admin(actor, "manage inventory")?;
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", item_id))?;

        if self.store.count_item_usage(item_id).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "item {} has been used in tickets and cannot be deleted",
                item.name
            )));
        }

        self.store.delete_item(item_id).await?;
        tracing::info!("Item {} deleted", item.name);
        Ok(())
    }

    pub async fn import_items(&self, actor: &Actor, sheet: &Sheet) -> Result<ImportSummary, ServiceError> {
        require_admin(actor, "import inventory")?;
        let rows = spreadsheet::parse_inventory_rows(sheet)?;

        let (updated, created) = self.store.upsert_items(rows).await?;
        tracing::info!("Inventory import: {} updated, {} created", updated, created);

        Ok(ImportSummary { updated, created })
    }
}
