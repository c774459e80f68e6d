use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::userdb::{UserAdminExt, UserExt},
    dtos::userdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::usermodel::{NewUser, User, UserChanges},
    utils::password,
    AppState,
};

/// Mounted behind the admin role check.
pub fn users_handler() -> Router {
    Router::new()
        .route("/", get(get_users).post(create_user).delete(delete_regular_users))
        .route("/:user_id", put(update_user).delete(delete_user))
}

pub fn technicians_handler() -> Router {
    Router::new().route("/", get(get_technicians))
}

async fn ensure_unique(
    app_state: &AppState,
    username: &str,
    email: &str,
    except: Option<Uuid>,
) -> Result<(), HttpError> {
    let clashes = |found: Option<User>| found.map_or(false, |user| Some(user.id) != except);

    let by_username = app_state.db_client
        .get_user(None, Some(username), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    if clashes(by_username) {
        return Err(HttpError::conflict(format!("Username {} is already taken", username)));
    }

    let by_email = app_state.db_client
        .get_user(None, None, Some(email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    if clashes(by_email) {
        return Err(HttpError::conflict(format!("Email {} is already registered", email)));
    }

    Ok(())
}

pub async fn get_users(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<UserSearchQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let users = app_state.db_client
        .get_users(search)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let counts = app_state.db_client
        .get_user_counts()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(UserListResponseDto {
        status: "success".to_string(),
        users: FilterUserDto::filter_users(&users),
        counts,
    }))
}

pub async fn get_technicians(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let users = app_state.db_client
        .get_technicians()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "technicians": FilterUserDto::filter_users(&users),
    })))
}

pub async fn create_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let username = body.username.trim().to_string();
    let email = body.email.trim().to_string();
    ensure_unique(&app_state, &username, &email, None).await?;

    let password_hash = password::hash(&body.password)
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = app_state.db_client
        .save_user(NewUser {
            username,
            email,
            fullname: body.fullname,
            password_hash,
            role: body.role,
            is_technician: body.is_technician,
        })
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    tracing::info!("User {} created", user.username);

    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData { user: FilterUserDto::filter_user(&user) },
    }))
}

pub async fn update_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let username = body.username.trim().to_string();
    let email = body.email.trim().to_string();
    ensure_unique(&app_state, &username, &email, Some(user_id)).await?;

    let password_hash = match body.password.as_deref() {
        Some(new_password) => Some(
            password::hash(new_password).map_err(|e| HttpError::server_error(e.to_string()))?,
        ),
        None => None,
    };

    let user = app_state.db_client
        .update_user(
            user_id,
            UserChanges {
                username,
                email,
                fullname: body.fullname,
                role: body.role,
                is_technician: body.is_technician,
                password_hash,
            },
        )
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData { user: FilterUserDto::filter_user(&user) },
    }))
}

pub async fn delete_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    if auth.user.id == user_id {
        return Err(HttpError::forbidden("You cannot delete your own account"));
    }

    let authored = app_state.db_client
        .count_authored_tickets(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if authored > 0 {
        return Err(HttpError::conflict(format!(
            "User still owns {} ticket(s) and cannot be deleted",
            authored
        )));
    }

    let deleted = app_state.db_client
        .delete_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !deleted {
        return Err(HttpError::not_found("User not found"));
    }

    tracing::info!("User {} deleted by {}", user_id, auth.user.username);

    Ok(Json(Response {
        status: "success",
        message: "User deleted".to_string(),
    }))
}

pub async fn delete_regular_users(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let (deleted, kept) = app_state.db_client
        .delete_non_admin_users()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    tracing::info!(
        "Bulk delete by {}: {} removed, {} kept",
        auth.user.username,
        deleted,
        kept.len()
    );

    Ok(Json(BulkDeleteResponseDto {
        status: "success".to_string(),
        deleted,
        kept,
    }))
}
