use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query},
    http::header,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::ticketdb::TicketQueryExt,
    dtos::{
        ticketdtos::*,
        userdtos::{Response, UserIdDto},
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::ticketmodel::TicketFilter,
    utils::storage::secure_filename,
    AppState,
};

pub fn tickets_handler() -> Router {
    Router::new()
        .route("/", get(get_tickets).post(create_ticket))
        .route("/:ticket_id", get(get_ticket).put(edit_ticket).delete(delete_ticket))
        .route("/:ticket_id/status", put(update_status))
        .route("/:ticket_id/resolve", post(resolve_ticket))
        .route("/:ticket_id/reopen", post(reopen_ticket))
        .route("/:ticket_id/assign", put(assign_ticket))
        .route("/:ticket_id/observers", post(add_observer))
        .route("/:ticket_id/observers/:user_id", delete(remove_observer))
        .route("/:ticket_id/comments", post(add_comment))
        .route("/:ticket_id/items", post(consume_item))
        .route("/:ticket_id/attachments", post(upload_attachment))
}

pub fn comments_handler() -> Router {
    Router::new().route("/:comment_id", put(edit_comment).delete(delete_comment))
}

pub fn ticket_items_handler() -> Router {
    Router::new().route("/:ticket_item_id", delete(reverse_item))
}

pub fn uploads_handler() -> Router {
    Router::new().route("/:filename", get(download_attachment))
}

pub async fn get_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<TicketListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = query.page();
    let offset = query.offset()
        .ok_or_else(|| HttpError::bad_request("Page out of range"))?;
    let filter = TicketFilter {
        visible_to: if auth.user.is_admin() { None } else { Some(auth.user.id) },
        q: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
        status: query.status,
        priority: query.priority,
    };

    let (tickets, results) = app_state.db_client
        .get_tickets(&filter, TICKETS_PER_PAGE, offset)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(TicketListResponseDto {
        status: "success".to_string(),
        tickets,
        results,
        page,
        pages: ((results + TICKETS_PER_PAGE - 1) / TICKETS_PER_PAGE).max(1),
    }))
}

pub async fn create_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state.ticket_service
        .create_ticket(&auth.actor(), body.into())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "ticket": ticket }
    })))
}

pub async fn get_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket = app_state.ticket_service
        .visible_ticket(&auth.actor(), ticket_id)
        .await?;

    let details = app_state.db_client
        .get_ticket_details(ticket, Utc::now())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": details
    })))
}

pub async fn edit_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<EditTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state.ticket_service
        .update_ticket(&auth.actor(), ticket_id, body.into())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "ticket": ticket }
    })))
}

pub async fn delete_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.ticket_service.delete(&auth.actor(), ticket_id).await?;

    Ok(Json(Response {
        status: "success",
        message: "Ticket deleted".to_string(),
    }))
}

pub async fn update_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<UpdateTicketStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket = app_state.ticket_service
        .set_status(&auth.actor(), ticket_id, body.status)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "ticket": ticket }
    })))
}

pub async fn resolve_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<ResolveTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state.inventory_service
        .resolve_with_consumption(&auth.actor(), ticket_id, body.into_lines())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": report
    })))
}

pub async fn reopen_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let (ticket, comment) = app_state.ticket_service
        .reopen(&auth.actor(), ticket_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "ticket": ticket, "comment": comment }
    })))
}

pub async fn assign_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<AssignTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket = app_state.ticket_service
        .assign(&auth.actor(), ticket_id, body.technician_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "ticket": ticket }
    })))
}

pub async fn add_observer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<UserIdDto>,
) -> Result<impl IntoResponse, HttpError> {
    let added = app_state.ticket_service
        .add_observer(&auth.actor(), ticket_id, body.user_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "added": added
    })))
}

pub async fn remove_observer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((ticket_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let removed = app_state.ticket_service
        .remove_observer(&auth.actor(), ticket_id, user_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "removed": removed
    })))
}

pub async fn add_comment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<CommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let comment = app_state.ticket_service
        .add_comment(&auth.actor(), ticket_id, &body.content)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "comment": comment }
    })))
}

pub async fn edit_comment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(comment_id): Path<Uuid>,
    Json(body): Json<CommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let comment = app_state.ticket_service
        .edit_comment(&auth.actor(), comment_id, &body.content)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "comment": comment }
    })))
}

pub async fn delete_comment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(comment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket_id = app_state.ticket_service
        .delete_comment(&auth.actor(), comment_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "ticket_id": ticket_id
    })))
}

pub async fn consume_item(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<ConsumeItemDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let consumed = app_state.inventory_service
        .consume(&auth.actor(), ticket_id, body.item_id, body.quantity, body.notes)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": consumed
    })))
}

pub async fn reverse_item(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let restored = app_state.inventory_service
        .reverse(&auth.actor(), ticket_item_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "ticket_item": restored.ticket_item,
            "quantity_after": restored.quantity_after
        }
    })))
}

pub async fn upload_attachment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| HttpError::bad_request(e.to_string()))?;

        let attachment = app_state.ticket_service
            .add_attachment(&auth.actor(), ticket_id, &original_filename, &bytes)
            .await?;

        return Ok(Json(json!({
            "status": "success",
            "data": { "attachment": attachment }
        })));
    }

    Err(HttpError::bad_request("Missing file field"))
}

pub async fn download_attachment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let (attachment, bytes) = app_state.ticket_service
        .download_attachment(&auth.actor(), &filename)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        secure_filename(&attachment.original_filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
