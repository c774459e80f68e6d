// service/ticket_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::db::HelpdeskStore,
    models::{
        settingsmodel::SlaSettings,
        ticketmodel::*,
        usermodel::Actor,
    },
    service::{error::ServiceError, sla},
    utils::storage::AttachmentStorage,
};

#[derive(Debug, Clone, Default)]
pub struct CreateTicket {
    pub title: String,
    pub description: String,
    pub category: String,
    /// Free-form label; normalised with `TicketPriority::from_label`.
    pub priority: String,
    /// Honoured only when the actor is an admin.
    pub on_behalf_of: Option<Uuid>,
    pub observer_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct EditTicket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub author_id: Option<Uuid>,
    /// `Some` replaces the whole observer set.
    pub observer_ids: Option<Vec<Uuid>>,
}

pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::permission_denied(actor.id, action))
    }
}

pub(crate) fn required(value: &str, field: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub struct TicketService<S> {
    store: Arc<S>,
    storage: Arc<dyn AttachmentStorage>,
}

impl<S> std::fmt::Debug for TicketService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketService").finish_non_exhaustive()
    }
}

impl<S: HelpdeskStore> TicketService<S> {
    pub fn new(store: Arc<S>, storage: Arc<dyn AttachmentStorage>) -> Self {
        Self { store, storage }
    }

    async fn sla_settings(&self) -> Result<Option<SlaSettings>, ServiceError> {
        let settings = self.store.get_settings().await?;
        Ok(settings.as_ref().map(SlaSettings::from))
    }

    pub async fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket, ServiceError> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket", ticket_id))
    }

    /// Admins, the author, the assignee and observers may read a ticket.
    pub async fn can_view(&self, actor: &Actor, ticket: &Ticket) -> Result<bool, ServiceError> {
        if actor.is_admin() || ticket.user_id == actor.id || ticket.assigned_to_id == Some(actor.id) {
            return Ok(true);
        }
        Ok(self.store.is_observer(ticket.id, actor.id).await?)
    }

    pub async fn visible_ticket(&self, actor: &Actor, ticket_id: Uuid) -> Result<Ticket, ServiceError> {
        let ticket = self.load_ticket(ticket_id).await?;
        if !self.can_view(actor, &ticket).await? {
            return Err(ServiceError::permission_denied(actor.id, "view ticket"));
        }
        Ok(ticket)
    }

    fn ensure_editor(actor: &Actor, ticket: &Ticket, action: &str) -> Result<(), ServiceError> {
        if actor.is_admin() || ticket.user_id == actor.id {
            Ok(())
        } else {
            Err(ServiceError::permission_denied(actor.id, action))
        }
    }

    pub async fn create_ticket(&self, actor: &Actor, input: CreateTicket) -> Result<Ticket, ServiceError> {
        let title = required(&input.title, "title")?;
        let description = required(&input.description, "description")?;
        let category = required(&input.category, "category")?;
        let priority = TicketPriority::from_label(&input.priority);

        let user_id = match input.on_behalf_of {
            Some(author_id) if actor.is_admin() && author_id != actor.id => {
                self.store
                    .get_user(Some(author_id), None, None)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("User", author_id))?
                    .id
            }
            _ => actor.id,
        };

        let settings = self.sla_settings().await?;
        let created_at = Utc::now();
        let due_at = sla::compute_due_at(created_at, priority, settings.as_ref());

        let ticket = self
            .store
            .create_ticket(NewTicket {
                title,
                description,
                category,
                priority,
                user_id,
                observer_ids: input.observer_ids,
                created_at,
                due_at,
            })
            .await?;

        tracing::info!(
            "Ticket {} created by {} (priority {}, due {})",
            ticket.id,
            actor.username,
            priority,
            due_at
        );
        Ok(ticket)
    }

    pub async fn update_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        input: EditTicket,
    ) -> Result<Ticket, ServiceError> {
        let ticket = self.load_ticket(ticket_id).await?;
        Self::ensure_editor(actor, &ticket, "edit ticket")?;

        let title = required(&input.title, "title")?;
        let description = required(&input.description, "description")?;
        let category = required(&input.category, "category")?;
        let priority = TicketPriority::from_label(&input.priority);

        let user_id = match input.author_id {
            Some(author_id) if actor.is_admin() && author_id != ticket.user_id => {
                self.store
                    .get_user(Some(author_id), None, None)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("User", author_id))?
                    .id
            }
            _ => ticket.user_id,
        };

        // The SLA clock always restarts from creation, never from the edit.
        let due_at = if priority != ticket.priority {
            let settings = self.sla_settings().await?;
            Some(sla::compute_due_at(ticket.created_at, priority, settings.as_ref()))
        } else {
            None
        };

        let updated = self
            .store
            .update_ticket(
                ticket_id,
                TicketChanges {
                    title,
                    description,
                    category,
                    priority,
                    user_id,
                    due_at,
                    observer_ids: input.observer_ids,
                    updated_at: Utc::now(),
                },
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket", ticket_id))?;

        if let Some(due_at) = due_at {
            tracing::info!(
                "Ticket {} priority {} -> {}, due_at recomputed to {}",
                ticket_id,
                ticket.priority,
                priority,
                due_at
            );
        }
        Ok(updated)
    }

    /// A failed compare-and-swap means the ticket vanished or moved on.
    async fn lost_race(&self, ticket_id: Uuid, to: TicketStatus) -> ServiceError {
        match self.store.get_ticket(ticket_id).await {
            Ok(Some(current)) => ServiceError::InvalidTransition {
                ticket_id,
                from: current.status,
                to,
            },
            Ok(None) => ServiceError::not_found("Ticket", ticket_id),
            Err(e) => e.into(),
        }
    }

    pub async fn set_status(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        to: TicketStatus,
    ) -> Result<Ticket, ServiceError> {
        require_admin(actor, "change ticket status")?;
        let ticket = self.load_ticket(ticket_id).await?;

        if !ticket.status.can_transition_to(to) {
            return Err(ServiceError::InvalidTransition {
                ticket_id,
                from: ticket.status,
                to,
            });
        }

        let now = Utc::now();
        let resolved_at = if to.is_closed() { Some(now) } else { None };

        match self
            .store
            .set_ticket_status(ticket_id, ticket.status, to, resolved_at, now)
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    "Ticket {} status {} -> {} by {}",
                    ticket_id,
                    ticket.status,
                    to,
                    actor.username
                );
                Ok(updated)
            }
            None => Err(self.lost_race(ticket_id, to).await),
        }
    }

    pub async fn reopen(&self, actor: &Actor, ticket_id: Uuid) -> Result<(Ticket, Comment), ServiceError> {
        let ticket = self.load_ticket(ticket_id).await?;
        Self::ensure_editor(actor, &ticket, "reopen ticket")?;

        if !ticket.status.is_closed() {
            return Err(ServiceError::InvalidTransition {
                ticket_id,
                from: ticket.status,
                to: TicketStatus::Aberto,
            });
        }

        let audit = format!("Chamado reaberto pelo usuário {}.", actor.username);
        match self
            .store
            .reopen_ticket(ticket_id, ticket.status, actor.id, audit, Utc::now())
            .await?
        {
            Some(reopened) => {
                tracing::info!("Ticket {} reopened by {}", ticket_id, actor.username);
                Ok(reopened)
            }
            None => Err(self.lost_race(ticket_id, TicketStatus::Aberto).await),
        }
    }

    /// Deleting a ticket also puts its consumed stock back.
    pub async fn delete(&self, actor: &Actor, ticket_id: Uuid) -> Result<(), ServiceError> {
        let ticket = self.load_ticket(ticket_id).await?;

        // Non-admins may only delete their own ticket while nobody has picked it up.
        let guard = (!actor.is_admin()).then_some(DeleteGuard {
            author_id: actor.id,
            status: TicketStatus::Aberto,
            unassigned: true,
        });
        if guard.is_some_and(|g| !g.allows(&ticket)) {
            return Err(ServiceError::permission_denied(actor.id, "delete ticket"));
        }

        let restocked = match self.store.delete_ticket(ticket_id, guard).await? {
            DeleteOutcome::Deleted { restocked } => restocked,
            DeleteOutcome::NotFound => return Err(ServiceError::not_found("Ticket", ticket_id)),
            DeleteOutcome::Refused => {
                return Err(ServiceError::permission_denied(actor.id, "delete ticket"))
            }
        };

        tracing::info!(
            "Ticket {} deleted by {} ({} item(s) restocked)",
            ticket_id,
            actor.username,
            restocked
        );
        Ok(())
    }

    pub async fn assign(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        technician_id: Uuid,
    ) -> Result<Ticket, ServiceError> {
        require_admin(actor, "assign ticket")?;
        self.load_ticket(ticket_id).await?;

        let technician = self
            .store
            .get_user(Some(technician_id), None, None)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", technician_id))?;

        if !technician.can_be_assigned() {
            return Err(ServiceError::Validation(format!(
                "{} is not a technician",
                technician.username
            )));
        }

        let ticket = self
            .store
            .assign_ticket(ticket_id, technician.id, actor.id, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket", ticket_id))?;

        tracing::info!(
            "Ticket {} assigned to {} by {}",
            ticket_id,
            technician.username,
            actor.username
        );
        Ok(ticket)
    }

    /// Returns false when the user was already observing.
    pub async fn add_observer(&self, actor: &Actor, ticket_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        require_admin(actor, "manage observers")?;
        self.load_ticket(ticket_id).await?;
        self.store
            .get_user(Some(user_id), None, None)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        Ok(self.store.add_observer(ticket_id, user_id).await?)
    }

    pub async fn remove_observer(&self, actor: &Actor, ticket_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        require_admin(actor, "manage observers")?;
        self.load_ticket(ticket_id).await?;

        Ok(self.store.remove_observer(ticket_id, user_id).await?)
    }

    fn clean_comment(content: &str) -> Result<String, ServiceError> {
        let cleaned = ammonia::clean(content.trim());
        if cleaned.trim().is_empty() {
            return Err(ServiceError::Validation("comment cannot be empty".to_string()));
        }
        Ok(cleaned)
    }

    pub async fn add_comment(&self, actor: &Actor, ticket_id: Uuid, content: &str) -> Result<Comment, ServiceError> {
        self.visible_ticket(actor, ticket_id).await?;
        let content = Self::clean_comment(content)?;

        Ok(self
            .store
            .add_comment(ticket_id, actor.id, content, Utc::now())
            .await?)
    }

    async fn own_comment(&self, actor: &Actor, comment_id: Uuid, action: &str) -> Result<Comment, ServiceError> {
        let comment = self
            .store
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment", comment_id))?;

        if !actor.is_admin() && comment.user_id != actor.id {
            return Err(ServiceError::permission_denied(actor.id, action));
        }
        Ok(comment)
    }

    pub async fn edit_comment(&self, actor: &Actor, comment_id: Uuid, content: &str) -> Result<Comment, ServiceError> {
        self.own_comment(actor, comment_id, "edit comment").await?;
        let content = Self::clean_comment(content)?;

        self.store
            .update_comment(comment_id, content)
            .await?
            .ok_or_else(|| ServiceError::not_found("Comment", comment_id))
    }

    pub async fn delete_comment(&self, actor: &Actor, comment_id: Uuid) -> Result<Uuid, ServiceError> {
        let comment = self.own_comment(actor, comment_id, "delete comment").await?;
        self.store.delete_comment(comment_id).await?;
        Ok(comment.ticket_id)
    }

    pub async fn add_attachment(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<Attachment, ServiceError> {
        let ticket = self.load_ticket(ticket_id).await?;
        Self::ensure_editor(actor, &ticket, "attach files")?;

        let original_filename = required(original_filename, "filename")?;
        if bytes.is_empty() {
            return Err(ServiceError::Validation("attachment is empty".to_string()));
        }

        let filename = self.storage.save(&original_filename, bytes).await?;
        let attachment = self
            .store
            .add_attachment(ticket_id, filename, original_filename)
            .await?;

        tracing::info!("Attachment {} added to ticket {}", attachment.filename, ticket_id);
        Ok(attachment)
    }

    pub async fn download_attachment(
        &self,
        actor: &Actor,
        filename: &str,
    ) -> Result<(Attachment, Vec<u8>), ServiceError> {
        let attachment = self
            .store
            .get_attachment_by_filename(filename)
            .await?
            .ok_or_else(|| ServiceError::not_found("Attachment", filename))?;

        self.visible_ticket(actor, attachment.ticket_id).await?;

        let bytes = self.storage.load(&attachment.filename).await?;
        Ok((attachment, bytes))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        db::{memorydb::MemoryStore, ticketdb::TicketExt},
        models::usermodel::{User, UserRole},
    };

    #[derive(Default)]
    pub(crate) struct MemoryAttachments {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl AttachmentStorage for MemoryAttachments {
        async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String, ServiceError> {
            let filename = format!("{}_{}", Uuid::new_v4().simple(), original_filename);
            self.files.lock().await.insert(filename.clone(), bytes.to_vec());
            Ok(filename)
        }

        async fn load(&self, filename: &str) -> Result<Vec<u8>, ServiceError> {
            self.files
                .lock()
                .await
                .get(filename)
                .cloned()
                .ok_or_else(|| ServiceError::not_found("Attachment", filename))
        }
    }

    pub(crate) fn actor(user: &User) -> Actor {
        Actor::from(user)
    }

    fn service(store: &Arc<MemoryStore>) -> TicketService<MemoryStore> {
        TicketService::new(store.clone(), Arc::new(MemoryAttachments::default()))
    }

    fn input(title: &str, priority: &str) -> CreateTicket {
        CreateTicket {
            title: title.to_string(),
            description: "Impressora do 2º andar não imprime".to_string(),
            category: "Hardware".to_string(),
            priority: priority.to_string(),
            ..Default::default()
        }
    }

    fn edit_from(ticket: &Ticket, priority: &str) -> EditTicket {
        EditTicket {
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            category: ticket.category.clone(),
            priority: priority.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_sets_aberto_and_sla_deadline() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ana", UserRole::User, false).await;
        let svc = service(&store);

        let ticket = svc.create_ticket(&actor(&user), input("Impressora", "Alta")).await.unwrap();

        assert_eq!(ticket.status, TicketStatus::Aberto);
        assert_eq!(ticket.priority, TicketPriority::Alta);
        assert_eq!(ticket.resolved_at, None);
        assert_eq!(ticket.due_at, Some(ticket.created_at + Duration::hours(8)));
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let store = Arc::new(MemoryStore::new());
        let user = store.seed_user("ana", UserRole::User, false).await;
        let svc = service(&store);

        let err = svc.create_ticket(&actor(&user), input("   ", "Baixa")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn only_admins_author_on_behalf_of_others() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let user = store.seed_user("ana", UserRole::User, false).await;
        let other = store.seed_user("bruno", UserRole::User, false).await;
        let svc = service(&store);

        let mut on_behalf = input("Rede", "Media");
        on_behalf.on_behalf_of = Some(other.id);
        let ticket = svc.create_ticket(&actor(&admin), on_behalf.clone()).await.unwrap();
        assert_eq!(ticket.user_id, other.id);

        let ticket = svc.create_ticket(&actor(&user), on_behalf).await.unwrap();
        assert_eq!(ticket.user_id, user.id);

        let mut ghost = input("Rede", "Media");
        ghost.on_behalf_of = Some(Uuid::new_v4());
        let err = svc.create_ticket(&actor(&admin), ghost).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn priority_edit_recomputes_from_created_at() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_settings(SlaSettings { baixa: Some(48), media: Some(24), alta: Some(8), critica: Some(4) })
            .await;
        let user = store.seed_user("ana", UserRole::User, false).await;
        let svc = service(&store);

        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ticket = store
            .create_ticket(NewTicket {
                title: "VPN".to_string(),
                description: "Sem acesso".to_string(),
                category: "Rede".to_string(),
                priority: TicketPriority::Alta,
                user_id: user.id,
                observer_ids: vec![],
                created_at,
                due_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        let edited = svc
            .update_ticket(&actor(&user), ticket.id, edit_from(&ticket, "Critica"))
            .await
            .unwrap();
        assert_eq!(edited.due_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap()));

        // Changing the budgets afterwards does not move the deadline retroactively.
        store
            .set_settings(SlaSettings { baixa: Some(48), media: Some(24), alta: Some(8), critica: Some(1) })
            .await;
        let retitled = EditTicket { title: "VPN caiu".to_string(), ..edit_from(&edited, "Critica") };
        let edited = svc.update_ticket(&actor(&user), ticket.id, retitled).await.unwrap();
        assert_eq!(edited.due_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap()));

        let edited = svc
            .update_ticket(&actor(&user), ticket.id, edit_from(&edited, "Baixa"))
            .await
            .unwrap();
        assert_eq!(edited.due_at, Some(created_at + Duration::hours(48)));
    }

    #[tokio::test]
    async fn strangers_cannot_edit_or_view() {
        let store = Arc::new(MemoryStore::new());
        let author = store.seed_user("ana", UserRole::User, false).await;
        let stranger = store.seed_user("carla", UserRole::User, false).await;
        let svc = service(&store);

        let ticket = svc.create_ticket(&actor(&author), input("Email", "Baixa")).await.unwrap();

        let err = svc
            .update_ticket(&actor(&stranger), ticket.id, edit_from(&ticket, "Alta"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let err = svc.visible_ticket(&actor(&stranger), ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn observers_and_assignees_can_view() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let author = store.seed_user("ana", UserRole::User, false).await;
        let watcher = store.seed_user("bruno", UserRole::User, false).await;
        let tech = store.seed_user("tecnico", UserRole::User, true).await;
        let svc = service(&store);

        let ticket = svc.create_ticket(&actor(&author), input("Email", "Baixa")).await.unwrap();
        svc.add_observer(&actor(&admin), ticket.id, watcher.id).await.unwrap();
        svc.assign(&actor(&admin), ticket.id, tech.id).await.unwrap();

        assert!(svc.visible_ticket(&actor(&watcher), ticket.id).await.is_ok());
        assert!(svc.visible_ticket(&actor(&tech), ticket.id).await.is_ok());
    }

    #[tokio::test]
    async fn set_status_follows_transition_table() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&admin), input("Teclado", "Media")).await.unwrap();

        let progressing = svc.set_status(&actor(&admin), ticket.id, TicketStatus::EmAndamento).await.unwrap();
        assert_eq!(progressing.resolved_at, None);

        let resolved = svc.set_status(&actor(&admin), ticket.id, TicketStatus::Resolvido).await.unwrap();
        assert!(resolved.resolved_at.is_some());

        let err = svc
            .set_status(&actor(&admin), ticket.id, TicketStatus::EmAndamento)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition { from: TicketStatus::Resolvido, to: TicketStatus::EmAndamento, .. }
        ));

        let closed = svc.set_status(&actor(&admin), ticket.id, TicketStatus::Fechado).await.unwrap();
        assert!(closed.resolved_at.is_some());

        let reopened = svc.set_status(&actor(&admin), ticket.id, TicketStatus::Aberto).await.unwrap();
        assert_eq!(reopened.resolved_at, None);
    }

    #[tokio::test]
    async fn set_status_is_admin_only() {
        let store = Arc::new(MemoryStore::new());
        let author = store.seed_user("ana", UserRole::User, true).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Teclado", "Media")).await.unwrap();

        let err = svc
            .set_status(&actor(&author), ticket.id, TicketStatus::Fechado)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));
        assert_eq!(svc.load_ticket(ticket.id).await.unwrap().status, TicketStatus::Aberto);
    }

    #[tokio::test]
    async fn reopen_requires_closed_ticket_and_leaves_audit_comment() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let author = store.seed_user("ana", UserRole::User, false).await;
        let stranger = store.seed_user("carla", UserRole::User, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Monitor", "Baixa")).await.unwrap();

        let err = svc.reopen(&actor(&author), ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { from: TicketStatus::Aberto, .. }));

        svc.set_status(&actor(&admin), ticket.id, TicketStatus::Fechado).await.unwrap();

        let err = svc.reopen(&actor(&stranger), ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let (reopened, comment) = svc.reopen(&actor(&author), ticket.id).await.unwrap();
        assert_eq!(reopened.status, TicketStatus::Aberto);
        assert_eq!(reopened.resolved_at, None);
        assert_eq!(comment.user_id, author.id);
        assert!(comment.content.contains("ana"));
        assert_eq!(store.comments_of(ticket.id).await.len(), 1);
    }

    #[tokio::test]
    async fn author_cannot_delete_ticket_in_progress() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let author = store.seed_user("ana", UserRole::User, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Mouse", "Baixa")).await.unwrap();
        svc.set_status(&actor(&admin), ticket.id, TicketStatus::EmAndamento).await.unwrap();

        let err = svc.delete(&actor(&author), ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let persisted = svc.load_ticket(ticket.id).await.unwrap();
        assert_eq!(persisted.status, TicketStatus::EmAndamento);
    }

    #[tokio::test]
    async fn author_deletes_untouched_ticket_and_admin_deletes_any() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let author = store.seed_user("ana", UserRole::User, false).await;
        let svc = service(&store);

        let fresh = svc.create_ticket(&actor(&author), input("Mouse", "Baixa")).await.unwrap();
        svc.delete(&actor(&author), fresh.id).await.unwrap();
        assert!(matches!(svc.load_ticket(fresh.id).await, Err(ServiceError::NotFound { .. })));

        let assigned = svc.create_ticket(&actor(&author), input("Cabo", "Baixa")).await.unwrap();
        svc.assign(&actor(&admin), assigned.id, admin.id).await.unwrap();
        assert!(svc.delete(&actor(&author), assigned.id).await.is_err());
        svc.delete(&actor(&admin), assigned.id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_guard_is_rechecked_against_current_row() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let author = store.seed_user("ana", UserRole::User, false).await;
        let tech = store.seed_user("tecnico", UserRole::User, true).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Teclado", "Baixa")).await.unwrap();
        let guard = DeleteGuard { author_id: author.id, status: TicketStatus::Aberto, unassigned: true };

        // The author's earlier read saw an untouched ticket; an admin assigns it before the delete lands.
        assert!(guard.allows(&ticket));
        svc.assign(&actor(&admin), ticket.id, tech.id).await.unwrap();

        let outcome = store.delete_ticket(ticket.id, Some(guard)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Refused);
        assert!(svc.load_ticket(ticket.id).await.is_ok());

        let outcome = store.delete_ticket(ticket.id, None).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { restocked: 0 });
        let outcome = store.delete_ticket(ticket.id, None).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn assign_requires_technician() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let regular = store.seed_user("ana", UserRole::User, false).await;
        let tech = store.seed_user("tecnico", UserRole::User, true).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&regular), input("Wi-Fi", "Alta")).await.unwrap();

        let err = svc.assign(&actor(&admin), ticket.id, regular.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = svc.assign(&actor(&admin), ticket.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let assigned = svc.assign(&actor(&admin), ticket.id, tech.id).await.unwrap();
        assert_eq!(assigned.assigned_to_id, Some(tech.id));
        assert_eq!(assigned.assigned_by_id, Some(admin.id));
        assert_eq!(assigned.status, TicketStatus::Aberto);
    }

    #[tokio::test]
    async fn adding_observer_twice_keeps_one_membership() {
        let store = Arc::new(MemoryStore::new());
        let admin = store.seed_user("admin", UserRole::Admin, false).await;
        let watcher = store.seed_user("bruno", UserRole::User, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&admin), input("Licença", "Media")).await.unwrap();

        assert!(svc.add_observer(&actor(&admin), ticket.id, watcher.id).await.unwrap());
        assert!(!svc.add_observer(&actor(&admin), ticket.id, watcher.id).await.unwrap());
        assert_eq!(store.observers_of(ticket.id).await, vec![watcher.id]);

        let err = svc.add_observer(&actor(&watcher), ticket.id, watcher.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        assert!(svc.remove_observer(&actor(&admin), ticket.id, watcher.id).await.unwrap());
        assert!(store.observers_of(ticket.id).await.is_empty());
    }

    #[tokio::test]
    async fn comments_are_sanitised_and_owned() {
        let store = Arc::new(MemoryStore::new());
        let author = store.seed_user("ana", UserRole::User, false).await;
        let stranger = store.seed_user("carla", UserRole::User, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Senha", "Baixa")).await.unwrap();

        let comment = svc
            .add_comment(&actor(&author), ticket.id, "<b>ok</b><script>alert(1)</script>")
            .await
            .unwrap();
        assert_eq!(comment.content, "<b>ok</b>");

        let err = svc.add_comment(&actor(&author), ticket.id, "<script></script>").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = svc.add_comment(&actor(&stranger), ticket.id, "oi").await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let err = svc.edit_comment(&actor(&stranger), comment.id, "x").await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let edited = svc.edit_comment(&actor(&author), comment.id, "resolvido").await.unwrap();
        assert_eq!(edited.content, "resolvido");

        assert_eq!(svc.delete_comment(&actor(&author), comment.id).await.unwrap(), ticket.id);
        assert!(store.comments_of(ticket.id).await.is_empty());
    }

    #[tokio::test]
    async fn attachments_follow_ticket_visibility() {
        let store = Arc::new(MemoryStore::new());
        let author = store.seed_user("ana", UserRole::User, false).await;
        let stranger = store.seed_user("carla", UserRole::User, false).await;
        let svc = service(&store);
        let ticket = svc.create_ticket(&actor(&author), input("Tela azul", "Critica")).await.unwrap();

        let err = svc
            .add_attachment(&actor(&stranger), ticket.id, "print.png", b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));

        let attachment = svc
            .add_attachment(&actor(&author), ticket.id, "print.png", b"img")
            .await
            .unwrap();
        assert_eq!(attachment.original_filename, "print.png");

        let (found, bytes) = svc.download_attachment(&actor(&author), &attachment.filename).await.unwrap();
        assert_eq!(found.id, attachment.id);
        assert_eq!(bytes, b"img");

        let err = svc
            .download_attachment(&actor(&stranger), &attachment.filename)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }));
    }
}
