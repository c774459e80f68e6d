use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::HttpError,
    models::{
        inventorymodel::ConsumptionLine,
        ticketmodel::{Ticket, TicketPriority, TicketStatus},
    },
    service::ticket_service::{CreateTicket, EditTicket},
};

pub const TICKETS_PER_PAGE: i64 = 10;

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct CreateTicketDto {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    /// Admins may open a ticket for someone else.
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub observer_ids: Vec<Uuid>,
}

impl From<CreateTicketDto> for CreateTicket {
    fn from(dto: CreateTicketDto) -> Self {
        CreateTicket {
            title: dto.title,
            description: dto.description,
            category: dto.category,
            priority: dto.priority,
            on_behalf_of: dto.user_id,
            observer_ids: dto.observer_ids,
        }
    }
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct EditTicketDto {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    pub user_id: Option<Uuid>,
    pub observer_ids: Option<Vec<Uuid>>,
}

impl From<EditTicketDto> for EditTicket {
    fn from(dto: EditTicketDto) -> Self {
        EditTicket {
            title: dto.title,
            description: dto.description,
            category: dto.category,
            priority: dto.priority,
            author_id: dto.user_id,
            observer_ids: dto.observer_ids,
        }
    }
}

#[derive(Validate, Debug, Default, Deserialize)]
pub struct TicketListQueryDto {
    pub q: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[validate(range(min = 1, max = 100000))]
    pub page: Option<i64>,
}

impl TicketListQueryDto {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    /// Row offset for the requested page, `None` when it cannot be represented.
    pub fn offset(&self) -> Option<i64> {
        self.page().checked_sub(1)?.checked_mul(TICKETS_PER_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct TicketListResponseDto {
    pub status: String,
    pub tickets: Vec<Ticket>,
    pub results: i64,
    pub page: i64,
    pub pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketStatusDto {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketDto {
    pub technician_id: Uuid,
}

#[derive(Validate, Debug, Deserialize)]
pub struct CommentDto {
    #[validate(length(min = 1, max = 5000, message = "Comment cannot be empty"))]
    pub content: String,
}

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ConsumeItemDto {
    pub item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveLineDto {
    pub item_id: Uuid,
    pub quantity: i32,
    pub notes: Option<String>,
}

/// Lines are validated one by one by the service; bad quantities become
/// warnings instead of failing the resolution.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveTicketDto {
    #[serde(default)]
    pub items: Vec<ResolveLineDto>,
}

impl ResolveTicketDto {
    pub fn into_lines(self) -> Vec<ConsumptionLine> {
        self.items
            .into_iter()
            .map(|line| ConsumptionLine {
                item_id: line.item_id,
                quantity: line.quantity,
                notes: line.notes,
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQueryDto {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQueryDto {
    /// `YYYY-MM-DD` bounds; the end date covers the whole day.
    pub fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), HttpError> {
        let parse = |raw: &Option<String>| -> Result<Option<NaiveDate>, HttpError> {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|_| HttpError::bad_request(format!("Invalid date {}, expected YYYY-MM-DD", raw))),
                None => Ok(None),
            }
        };

        let start = parse(&self.start_date)?
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|at| at.and_utc());
        let end = parse(&self.end_date)?
            .and_then(|date| date.and_hms_opt(23, 59, 59))
            .map(|at| at.and_utc());

        Ok((start, end))
    }
}
