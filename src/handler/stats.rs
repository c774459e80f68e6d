use std::sync::Arc;

use axum::{
    extract::Query,
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;

use crate::{
    db::ticketdb::TicketQueryExt,
    dtos::ticketdtos::DateRangeQueryDto,
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware},
    models::usermodel::UserRole,
    service::spreadsheet,
    AppState,
};

const RECENT_OPEN_TICKETS: i64 = 5;

pub fn stats_handler() -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route(
            "/admin",
            get(get_admin_stats).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Admin])
            })),
        )
        .route(
            "/export",
            get(export_ticket_report).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Admin])
            })),
        )
}

/// Admins see every ticket; everyone else sees their own.
pub async fn get_dashboard(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let author = if auth.user.is_admin() { None } else { Some(auth.user.id) };

    let stats = app_state.db_client
        .get_dashboard_stats(author)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let recent = app_state.db_client
        .get_recent_open_tickets(author, RECENT_OPEN_TICKETS)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "stats": stats, "recent_tickets": recent }
    })))
}

pub async fn get_admin_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<DateRangeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let (start, end) = query.bounds()?;

    let stats = app_state.db_client
        .get_admin_stats(start, end)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": stats
    })))
}

pub async fn export_ticket_report(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<DateRangeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let (start, end) = query.bounds()?;

    let rows = app_state.db_client
        .get_ticket_report(start, end)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(spreadsheet::ticket_report_sheet(&rows)))
}
