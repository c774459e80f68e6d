use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::inventorydb::InventoryQueryExt,
    dtos::{
        inventorydtos::{ItemDto, ItemListQueryDto, ItemListResponseDto},
        ticketdtos::DateRangeQueryDto,
        userdtos::Response,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::inventorymodel::{InventoryTotals, ItemFilter, ItemView},
    service::spreadsheet::{self, Sheet},
    AppState,
};

/// Mounted behind the admin role check.
pub fn inventory_handler() -> Router {
    Router::new()
        .route("/items", get(get_items).post(create_item))
        .route("/items/:item_id", put(update_item).delete(delete_item))
        .route("/available", get(get_available_items))
        .route("/export", get(export_inventory))
        .route("/usage-export", get(export_usage))
        .route("/import", post(import_inventory))
}

pub async fn get_items(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<ItemListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = ItemFilter::from(query);

    let items = app_state.db_client
        .get_items(&filter)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let categories = app_state.db_client
        .get_item_categories()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let totals = InventoryTotals::from_items(&items);

    Ok(Json(ItemListResponseDto {
        status: "success".to_string(),
        items: items.into_iter().map(ItemView::from).collect(),
        totals,
        categories,
    }))
}

/// Items with stock left, for the consumption picker.
pub async fn get_available_items(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let items = app_state.db_client
        .get_available_items()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "items": items
    })))
}

pub async fn create_item(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<ItemDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let item = app_state.inventory_service
        .create_item(&auth.actor(), body.into())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "item": ItemView::from(item) }
    })))
}

pub async fn update_item(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(item_id): Path<Uuid>,
    Json(body): Json<ItemDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let item = app_state.inventory_service
        .update_item(&auth.actor(), item_id, body.into())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "item": ItemView::from(item) }
    })))
}

pub async fn delete_item(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.inventory_service
        .delete_item(&auth.actor(), item_id)
        .await?;

    Ok(Json(Response {
        status: "success",
        message: "Item deleted".to_string(),
    }))
}

pub async fn export_inventory(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let items = app_state.db_client
        .get_items(&ItemFilter::default())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(spreadsheet::inventory_sheet(&items)))
}

pub async fn export_usage(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<DateRangeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let (start, end) = query.bounds()?;

    let records = app_state.db_client
        .get_usage_records(start, end)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(spreadsheet::usage_sheet(&records)?))
}

pub async fn import_inventory(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(sheet): Json<Sheet>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state.inventory_service
        .import_items(&auth.actor(), &sheet)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": summary
    })))
}
