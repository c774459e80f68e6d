// db/memorydb.rs
//
// In-process store used by the service tests. One mutex guards the whole
// state, so every trait method is atomic the way its SQL transaction is.
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    inventorydb::InventoryExt,
    settingsdb::SettingsExt,
    ticketdb::TicketExt,
    userdb::UserExt,
};
use crate::models::{
    inventorymodel::*,
    settingsmodel::{AppSettings, Category, DirectoryConfig, SlaSettings},
    ticketmodel::*,
    usermodel::{NewUser, User, UserRole},
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    tickets: Vec<Ticket>,
    observers: Vec<(Uuid, Uuid)>,
    comments: Vec<Comment>,
    attachments: Vec<Attachment>,
    items: Vec<Item>,
    ticket_items: Vec<TicketItem>,
    settings: Option<AppSettings>,
    categories: Vec<Category>,
}

impl State {
    fn item_mut(&mut self, item_id: Uuid) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    fn ticket_mut(&mut self, ticket_id: Uuid) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == ticket_id)
    }

    fn replace_observers(&mut self, ticket_id: Uuid, observer_ids: &[Uuid]) {
        self.observers.retain(|(t, _)| *t != ticket_id);
        for user_id in observer_ids {
            let known = self.users.iter().any(|u| u.id == *user_id);
            if known && !self.observers.contains(&(ticket_id, *user_id)) {
                self.observers.push((ticket_id, *user_id));
            }
        }
    }

    fn consume(&mut self, ticket_id: Uuid, line: ConsumptionLine, now: DateTime<Utc>) -> ConsumeOutcome {
        let Some(item) = self.item_mut(line.item_id) else {
            return ConsumeOutcome::ItemNotFound;
        };

        if item.quantity < line.quantity {
            return ConsumeOutcome::InsufficientStock { available: item.quantity };
        }

        item.quantity -= line.quantity;
        item.updated_at = now;
        let remaining = item.quantity;

        let ticket_item = TicketItem {
            id: Uuid::new_v4(),
            ticket_id,
            item_id: line.item_id,
            quantity_used: line.quantity,
            used_at: now,
            notes: line.notes,
        };
        self.ticket_items.push(ticket_item.clone());

        ConsumeOutcome::Consumed { ticket_item, remaining }
    }

    fn default_settings() -> AppSettings {
        AppSettings {
            id: Uuid::new_v4(),
            ad_server: None,
            ad_domain: None,
            ad_base_dn: None,
            ad_user_dn: None,
            ad_user_password: None,
            sla_hours_baixa: Some(48),
            sla_hours_media: Some(24),
            sla_hours_alta: Some(8),
            sla_hours_critica: Some(4),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, username: &str, role: UserRole, is_technician: bool) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            fullname: None,
            password: "hashed".to_string(),
            role,
            is_technician,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.users.push(user.clone());
        user
    }

    pub async fn seed_item(&self, name: &str, quantity: i32, min_quantity: i32) -> Item {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            category: "Geral".to_string(),
            quantity,
            min_quantity,
            unit_cost: 10.0,
            location: None,
            supplier: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.items.push(item.clone());
        item
    }

    pub async fn set_settings(&self, sla: SlaSettings) {
        let mut settings = State::default_settings();
        settings.sla_hours_baixa = sla.baixa;
        settings.sla_hours_media = sla.media;
        settings.sla_hours_alta = sla.alta;
        settings.sla_hours_critica = sla.critica;
        self.state.lock().await.settings = Some(settings);
    }

    pub async fn ticket_items_for(&self, ticket_id: Uuid) -> Vec<TicketItem> {
        let state = self.state.lock().await;
        state
            .ticket_items
            .iter()
            .filter(|ti| ti.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    pub async fn observers_of(&self, ticket_id: Uuid) -> Vec<Uuid> {
        let state = self.state.lock().await;
        state
            .observers
            .iter()
            .filter(|(t, _)| *t == ticket_id)
            .map(|(_, u)| *u)
            .collect()
    }

    pub async fn comments_of(&self, ticket_id: Uuid) -> Vec<Comment> {
        let state = self.state.lock().await;
        state
            .comments
            .iter()
            .filter(|c| c.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    pub async fn items(&self) -> Vec<Item> {
        self.state.lock().await.items.clone()
    }
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let state = self.state.lock().await;
        let user = state.users.iter().find(|u| {
            if let Some(user_id) = user_id {
                u.id == user_id
            } else if let Some(username) = username {
                u.username == username
            } else if let Some(email) = email {
                u.email == email
            } else {
                false
            }
        });
        Ok(user.cloned())
    }

    async fn get_users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| user_ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn save_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            fullname: user.fullname,
            password: user.password_hash,
            role: user.role,
            is_technician: user.is_technician,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.users.push(user.clone());
        Ok(user)
    }

    async fn import_users(&self, users: Vec<NewUser>) -> Result<(Vec<User>, usize), sqlx::Error> {
        let mut state = self.state.lock().await;
        let mut created = Vec::new();
        let mut skipped = 0;

        for user in users {
            let exists = state
                .users
                .iter()
                .any(|u| u.username == user.username || u.email == user.email);
            if exists {
                skipped += 1;
                continue;
            }

            let now = Utc::now();
            let saved = User {
                id: Uuid::new_v4(),
                username: user.username,
                email: user.email,
                fullname: user.fullname,
                password: user.password_hash,
                role: user.role,
                is_technician: user.is_technician,
                created_at: now,
                updated_at: now,
            };
            state.users.push(saved.clone());
            created.push(saved);
        }

        Ok((created, skipped))
    }
}

#[async_trait]
impl TicketExt for MemoryStore {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, sqlx::Error> {
        let mut state = self.state.lock().await;
        let created = Ticket {
            id: Uuid::new_v4(),
            title: ticket.title,
            description: ticket.description,
            category: ticket.category,
            priority: ticket.priority,
            status: TicketStatus::Aberto,
            user_id: ticket.user_id,
            assigned_to_id: None,
            assigned_by_id: None,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
            resolved_at: None,
            due_at: Some(ticket.due_at),
        };
        state.tickets.push(created.clone());
        state.replace_observers(created.id, &ticket.observer_ids);
        Ok(created)
    }

    async fn get_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.tickets.iter().find(|t| t.id == ticket_id).cloned())
    }

    async fn update_ticket(
        &self,
        ticket_id: Uuid,
        changes: TicketChanges,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.ticket_mut(ticket_id) else {
            return Ok(None);
        };

        ticket.title = changes.title;
        ticket.description = changes.description;
        ticket.category = changes.category;
        ticket.priority = changes.priority;
        ticket.user_id = changes.user_id;
        if let Some(due_at) = changes.due_at {
            ticket.due_at = Some(due_at);
        }
        ticket.updated_at = changes.updated_at;
        let updated = ticket.clone();

        if let Some(observer_ids) = changes.observer_ids {
            state.replace_observers(ticket_id, &observer_ids);
        }

        Ok(Some(updated))
    }

    async fn set_ticket_status(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        to: TicketStatus,
        resolved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let ticket = state
            .ticket_mut(ticket_id)
            .filter(|t| t.status == expected)
            .map(|ticket| {
                ticket.status = to;
                ticket.resolved_at = resolved_at;
                ticket.updated_at = now;
                ticket.clone()
            });
        Ok(ticket)
    }

    async fn reopen_ticket(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        actor_id: Uuid,
        audit_comment: String,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Comment)>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.ticket_mut(ticket_id).filter(|t| t.status == expected) else {
            return Ok(None);
        };

        ticket.status = TicketStatus::Aberto;
        ticket.resolved_at = None;
        ticket.updated_at = now;
        let ticket = ticket.clone();

        let comment = Comment {
            id: Uuid::new_v4(),
            ticket_id,
            user_id: actor_id,
            content: audit_comment,
            created_at: now,
        };
        state.comments.push(comment.clone());

        Ok(Some((ticket, comment)))
    }

    async fn delete_ticket(
        &self,
        ticket_id: Uuid,
        guard: Option<DeleteGuard>,
    ) -> Result<DeleteOutcome, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.tickets.iter().find(|t| t.id == ticket_id) else {
            return Ok(DeleteOutcome::NotFound);
        };
        if guard.is_some_and(|g| !g.allows(ticket)) {
            return Ok(DeleteOutcome::Refused);
        }

        let consumed: Vec<TicketItem> = state
            .ticket_items
            .iter()
            .filter(|ti| ti.ticket_id == ticket_id)
            .cloned()
            .collect();

        let mut restocked = HashSet::new();
        for record in consumed {
            if let Some(item) = state.item_mut(record.item_id) {
                item.quantity += record.quantity_used;
                restocked.insert(record.item_id);
            }
        }

        state.tickets.retain(|t| t.id != ticket_id);
        state.observers.retain(|(t, _)| *t != ticket_id);
        state.comments.retain(|c| c.ticket_id != ticket_id);
        state.attachments.retain(|a| a.ticket_id != ticket_id);
        state.ticket_items.retain(|ti| ti.ticket_id != ticket_id);

        Ok(DeleteOutcome::Deleted { restocked: restocked.len() as u64 })
    }

    async fn assign_ticket(
        &self,
        ticket_id: Uuid,
        assigned_to: Uuid,
        assigned_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let ticket = state.ticket_mut(ticket_id).map(|ticket| {
            ticket.assigned_to_id = Some(assigned_to);
            ticket.assigned_by_id = Some(assigned_by);
            ticket.updated_at = now;
            ticket.clone()
        });
        Ok(ticket)
    }

    async fn is_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.observers.contains(&(ticket_id, user_id)))
    }

    async fn add_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        if state.observers.contains(&(ticket_id, user_id)) {
            return Ok(false);
        }
        state.observers.push((ticket_id, user_id));
        Ok(true)
    }

    async fn remove_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        let before = state.observers.len();
        state.observers.retain(|entry| *entry != (ticket_id, user_id));
        Ok(state.observers.len() < before)
    }

    async fn add_comment(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Comment, sqlx::Error> {
        let mut state = self.state.lock().await;
        let comment = Comment {
            id: Uuid::new_v4(),
            ticket_id,
            user_id,
            content,
            created_at: now,
        };
        state.comments.push(comment.clone());
        if let Some(ticket) = state.ticket_mut(ticket_id) {
            ticket.updated_at = now;
        }
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.comments.iter().find(|c| c.id == comment_id).cloned())
    }

    async fn update_comment(
        &self,
        comment_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let comment = state.comments.iter_mut().find(|c| c.id == comment_id).map(|c| {
            c.content = content;
            c.clone()
        });
        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        let before = state.comments.len();
        state.comments.retain(|c| c.id != comment_id);
        Ok(state.comments.len() < before)
    }

    async fn add_attachment(
        &self,
        ticket_id: Uuid,
        filename: String,
        original_filename: String,
    ) -> Result<Attachment, sqlx::Error> {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            ticket_id,
            filename,
            original_filename,
            created_at: Utc::now(),
        };
        self.state.lock().await.attachments.push(attachment.clone());
        Ok(attachment)
    }

    async fn get_attachment_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<Attachment>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.attachments.iter().find(|a| a.filename == filename).cloned())
    }
}

#[async_trait]
impl InventoryExt for MemoryStore {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<Item>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.id == item_id).cloned())
    }

    async fn get_item_by_name(&self, name: &str) -> Result<Option<Item>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.name == name).cloned())
    }

    async fn create_item(&self, data: ItemData) -> Result<Item, sqlx::Error> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            category: data.category,
            quantity: data.quantity,
            min_quantity: data.min_quantity,
            unit_cost: data.unit_cost,
            location: data.location,
            supplier: data.supplier,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.items.push(item.clone());
        Ok(item)
    }

    async fn update_item(&self, item_id: Uuid, data: ItemData) -> Result<Option<Item>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let item = state.item_mut(item_id).map(|item| {
            item.name = data.name;
            item.description = data.description;
            item.category = data.category;
            item.quantity = data.quantity;
            item.min_quantity = data.min_quantity;
            item.unit_cost = data.unit_cost;
            item.location = data.location;
            item.supplier = data.supplier;
            item.updated_at = Utc::now();
            item.clone()
        });
        Ok(item)
    }

    async fn delete_item(&self, item_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|i| i.id != item_id);
        Ok(state.items.len() < before)
    }

    async fn count_item_usage(&self, item_id: Uuid) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.ticket_items.iter().filter(|ti| ti.item_id == item_id).count() as i64)
    }

    async fn get_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<TicketItem>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.ticket_items.iter().find(|ti| ti.id == ticket_item_id).cloned())
    }

    async fn consume_item(
        &self,
        ticket_id: Uuid,
        line: ConsumptionLine,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, sqlx::Error> {
        let mut state = self.state.lock().await;
        Ok(state.consume(ticket_id, line, now))
    }

    async fn restore_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<RestoredStock>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(position) = state.ticket_items.iter().position(|ti| ti.id == ticket_item_id) else {
            return Ok(None);
        };

        let ticket_item = state.ticket_items.remove(position);
        let quantity_after = state.item_mut(ticket_item.item_id).map(|item| {
            item.quantity += ticket_item.quantity_used;
            item.updated_at = Utc::now();
            item.quantity
        });

        Ok(Some(RestoredStock { ticket_item, quantity_after }))
    }

    async fn resolve_ticket_with_items(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        lines: Vec<ConsumptionLine>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Vec<ConsumeOutcome>)>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.ticket_mut(ticket_id).filter(|t| t.status == expected) else {
            return Ok(None);
        };

        ticket.status = TicketStatus::Resolvido;
        ticket.resolved_at = Some(now);
        ticket.updated_at = now;
        let ticket = ticket.clone();

        let outcomes = lines
            .into_iter()
            .map(|line| state.consume(ticket_id, line, now))
            .collect();

        Ok(Some((ticket, outcomes)))
    }

    async fn upsert_items(&self, items: Vec<ImportedItem>) -> Result<(usize, usize), sqlx::Error> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        let mut created = 0;
        let now = Utc::now();

        for row in items {
            match state.items.iter_mut().find(|i| i.name == row.name) {
                Some(item) => {
                    item.category = row.category;
                    item.quantity = row.quantity;
                    if let Some(min_quantity) = row.min_quantity {
                        item.min_quantity = min_quantity;
                    }
                    if let Some(unit_cost) = row.unit_cost {
                        item.unit_cost = unit_cost;
                    }
                    if row.description.is_some() {
                        item.description = row.description;
                    }
                    if row.location.is_some() {
                        item.location = row.location;
                    }
                    if row.supplier.is_some() {
                        item.supplier = row.supplier;
                    }
                    item.updated_at = now;
                    updated += 1;
                }
                None => {
                    state.items.push(Item {
                        id: Uuid::new_v4(),
                        name: row.name,
                        description: row.description,
                        category: row.category,
                        quantity: row.quantity,
                        min_quantity: row.min_quantity.unwrap_or(0),
                        unit_cost: row.unit_cost.unwrap_or(0.0),
                        location: row.location,
                        supplier: row.supplier,
                        created_at: now,
                        updated_at: now,
                    });
                    created += 1;
                }
            }
        }

        Ok((updated, created))
    }
}

#[async_trait]
impl SettingsExt for MemoryStore {
    async fn get_settings(&self) -> Result<Option<AppSettings>, sqlx::Error> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn ensure_settings(&self) -> Result<AppSettings, sqlx::Error> {
        let mut state = self.state.lock().await;
        Ok(state.settings.get_or_insert_with(State::default_settings).clone())
    }

    async fn update_sla(&self, sla: SlaSettings) -> Result<AppSettings, sqlx::Error> {
        let mut state = self.state.lock().await;
        let settings = state.settings.get_or_insert_with(State::default_settings);
        settings.sla_hours_baixa = sla.baixa;
        settings.sla_hours_media = sla.media;
        settings.sla_hours_alta = sla.alta;
        settings.sla_hours_critica = sla.critica;
        settings.updated_at = Utc::now();
        Ok(settings.clone())
    }

    async fn update_directory(&self, config: DirectoryConfig) -> Result<AppSettings, sqlx::Error> {
        let mut state = self.state.lock().await;
        let settings = state.settings.get_or_insert_with(State::default_settings);
        settings.apply_directory(config);
        settings.updated_at = Utc::now();
        Ok(settings.clone())
    }

    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        let mut categories = self.state.lock().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create_category(&self, name: String) -> Result<Option<Category>, sqlx::Error> {
        let mut state = self.state.lock().await;
        if state.categories.iter().any(|c| c.name == name) {
            return Ok(None);
        }
        let category = Category { id: Uuid::new_v4(), name };
        state.categories.push(category.clone());
        Ok(Some(category))
    }

    async fn delete_category(&self, category_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().await;
        let before = state.categories.len();
        state.categories.retain(|c| c.id != category_id);
        Ok(state.categories.len() < before)
    }
}
