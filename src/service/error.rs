use thiserror::Error;
use uuid::Uuid;
use crate::{
    models::ticketmodel::TicketStatus,
    error::HttpError,
};
use axum::http::StatusCode;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("User {actor} is not allowed to {action}")]
    PermissionDenied { actor: Uuid, action: String },

    #[error("Ticket {ticket_id} cannot move from {from} to {to}")]
    InvalidTransition {
        ticket_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn permission_denied(actor: Uuid, action: impl Into<String>) -> Self {
        ServiceError::PermissionDenied {
            actor,
            action: action.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::PermissionDenied { .. } => StatusCode::FORBIDDEN,

            ServiceError::InvalidTransition { .. }
            | ServiceError::InsufficientStock { .. }
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,

            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Storage(_)
            | ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", error);
        }
        HttpError::new(error.to_string(), status)
    }
}
