use std::sync::Arc;

use axum::{
    extract::Path,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::settingsdb::SettingsExt,
    dtos::{
        settingsdtos::{CategoryDto, DirectoryConfigDto, DirectoryImportDto, SlaSettingsDto},
        userdtos::Response,
    },
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware},
    models::usermodel::UserRole,
    service::directory_sync::import_directory_users,
    AppState,
};

/// Mounted behind the admin role check.
pub fn settings_handler() -> Router {
    Router::new()
        .route("/", get(get_settings))
        .route("/sla", put(update_sla))
        .route("/directory", put(update_directory))
        .route("/directory/import", post(import_directory))
}

/// Anyone signed in may list categories; changing them is for admins.
pub fn categories_handler() -> Router {
    Router::new()
        .route("/", get(get_categories))
        .route(
            "/",
            post(create_category).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Admin])
            })),
        )
        .route(
            "/:category_id",
            delete(delete_category).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Admin])
            })),
        )
}

pub async fn get_settings(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let settings = app_state.db_client
        .ensure_settings()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "settings": settings,
            "has_directory_password": settings.ad_user_password.is_some()
        }
    })))
}

pub async fn update_sla(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<SlaSettingsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let settings = app_state.db_client
        .update_sla(body.into())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    tracing::info!("SLA hours updated");

    Ok(Json(json!({
        "status": "success",
        "data": { "settings": settings }
    })))
}

pub async fn update_directory(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<DirectoryConfigDto>,
) -> Result<impl IntoResponse, HttpError> {
    let settings = app_state.db_client
        .update_directory(body.into())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "settings": settings }
    })))
}

pub async fn import_directory(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<DirectoryImportDto>,
) -> Result<impl IntoResponse, HttpError> {
    let result = import_directory_users(&app_state.db_client, &auth.actor(), &body.users).await?;

    Ok(Json(json!({
        "status": "success",
        "data": result
    })))
}

pub async fn get_categories(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let categories = app_state.db_client
        .get_categories()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "categories": categories
    })))
}

pub async fn create_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CategoryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(HttpError::bad_request("Category name is required"));
    }

    let category = app_state.db_client
        .create_category(name.clone())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::conflict(format!("Category {} already exists", name)))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "category": category }
    })))
}

pub async fn delete_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(category_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let deleted = app_state.db_client
        .delete_category(category_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !deleted {
        return Err(HttpError::not_found("Category not found"));
    }

    Ok(Json(Response {
        status: "success",
        message: "Category deleted".to_string(),
    }))
}
