use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::{inventorymodel::TicketItemView, usermodel::UserSummary};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "ticket_status")]
pub enum TicketStatus {
    #[sqlx(rename = "Aberto")]
    #[serde(rename = "Aberto")]
    Aberto,
    #[sqlx(rename = "Em andamento")]
    #[serde(rename = "Em andamento")]
    EmAndamento,
    #[sqlx(rename = "Resolvido")]
    #[serde(rename = "Resolvido")]
    Resolvido,
    #[sqlx(rename = "Fechado")]
    #[serde(rename = "Fechado")]
    Fechado,
}

impl TicketStatus {
    pub fn to_str(&self) -> &str {
        match self {
            TicketStatus::Aberto => "Aberto",
            TicketStatus::EmAndamento => "Em andamento",
            TicketStatus::Resolvido => "Resolvido",
            TicketStatus::Fechado => "Fechado",
        }
    }

    /// Resolvido and Fechado both carry a `resolved_at` timestamp.
    pub fn is_closed(&self) -> bool {
        matches!(self, TicketStatus::Resolvido | TicketStatus::Fechado)
    }

    pub fn can_transition_to(&self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        match (self, to) {
            (Aberto, _) => true,
            (EmAndamento, Resolvido | Fechado | Aberto) => true,
            (Resolvido, Aberto | Fechado) => true,
            (Fechado, Aberto) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "ticket_priority")]
pub enum TicketPriority {
    Baixa,
    Media,
    Alta,
    Critica,
}

impl TicketPriority {
    pub fn to_str(&self) -> &str {
        match self {
            TicketPriority::Baixa => "Baixa",
            TicketPriority::Media => "Media",
            TicketPriority::Alta => "Alta",
            TicketPriority::Critica => "Critica",
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub user_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_closed() && self.due_at.map(|due| due < now).unwrap_or(false)
    }
}

/// Insert payload for a ticket; the lifecycle service fills in the
/// derived fields before handing it to the store.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: TicketPriority,
    pub user_id: Uuid,
    pub observer_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TicketChanges {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: TicketPriority,
    pub user_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub observer_ids: Option<Vec<Uuid>>,
    pub updated_at: DateTime<Utc>,
}

/// Conditions a delete must still meet once the ticket row is locked.
/// Admin deletes pass `None` and skip them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleteGuard {
    pub author_id: Uuid,
    pub status: TicketStatus,
    pub unassigned: bool,
}

impl DeleteGuard {
    pub fn allows(&self, ticket: &Ticket) -> bool {
        ticket.user_id == self.author_id
            && ticket.status == self.status
            && (!self.unassigned || ticket.assigned_to_id.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeleteOutcome {
    Deleted { restocked: u64 },
    NotFound,
    /// The locked row no longer matched the guard.
    Refused,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,
    pub author_username: String,
    pub author_fullname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Attachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub author: Option<UserSummary>,
    pub assigned_to: Option<UserSummary>,
    pub assigned_by: Option<UserSummary>,
    pub observers: Vec<UserSummary>,
    pub comments: Vec<CommentWithAuthor>,
    pub attachments: Vec<Attachment>,
    pub used_items: Vec<TicketItemView>,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// `None` means the caller may see every ticket.
    pub visible_to: Option<Uuid>,
    pub q: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct DashboardStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub closed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct MonthlyTicketStats {
    pub year: i32,
    pub month: i32,
    pub opened: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminStats {
    pub total_tickets: i64,
    pub total_open: i64,
    pub overdue_count: i64,
    pub months: Vec<MonthlyTicketStats>,
}

/// One line of the detailed ticket report, with the people resolved to names.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct TicketReportRow {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub author_username: String,
    pub author_fullname: Option<String>,
    pub assignee_username: Option<String>,
    pub assignee_fullname: Option<String>,
}

impl TicketReportRow {
    pub fn resolution_hours(&self) -> Option<f64> {
        self.resolved_at
            .map(|resolved| (resolved - self.created_at).num_seconds() as f64 / 3600.0)
    }
}
