use std::sync::Arc;

use axum::{
    http::{header, HeaderMap},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use validator::Validate;

use crate::{
    db::userdb::{UserAdminExt, UserExt},
    dtos::{
        FilterUserDto, LoginUserDto, Response, UserData, UserLoginResponseDto,
        UserPasswordUpdateDto, UserResponseDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{auth, JWTAuthMiddeware},
    utils::{password, token},
    AppState,
};

pub fn auth_handler() -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(get_me).layer(middleware::from_fn(auth)))
        .route("/password", put(update_password).layer(middleware::from_fn(auth)))
}

fn set_cookie(response: impl IntoResponse, cookie: Cookie<'static>) -> Result<axum::response::Response, HttpError> {
    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        cookie
            .to_string()
            .parse()
            .map_err(|_| HttpError::server_error("Invalid cookie"))?,
    );

    let mut response = response.into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

pub async fn login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let login = body.username.trim();

    let mut result = app_state.db_client
        .get_user(None, Some(login), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    // Falls back to the e-mail so either identifier works.
    if result.is_none() {
        result = app_state.db_client
            .get_user(None, None, Some(login))
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
    }

    let user = result.ok_or(HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string()))?;

    let password_matched = password::compare(&body.password, &user.password)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string()))?;

    if !password_matched {
        tracing::warn!("Failed login for {}", login);
        return Err(HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string()));
    }

    let token = token::create_token(
        &user.id.to_string(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = Cookie::build(("token", token.clone()))
        .path("/")
        .max_age(time::Duration::minutes(app_state.env.jwt_maxage))
        .http_only(true)
        .build();

    tracing::info!("User {} logged in", user.username);

    set_cookie(
        Json(UserLoginResponseDto {
            status: "success".to_string(),
            token,
        }),
        cookie,
    )
}

pub async fn logout() -> Result<impl IntoResponse, HttpError> {
    let cookie = Cookie::build(("token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build();

    set_cookie(
        Json(Response {
            status: "success",
            message: "Logged out".to_string(),
        }),
        cookie,
    )
}

pub async fn get_me(
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user.user),
        },
    }))
}

pub async fn update_password(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<UserPasswordUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let password_match = password::compare(&body.current_password, &user.user.password)
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !password_match {
        return Err(HttpError::bad_request("Current password is incorrect".to_string()));
    }

    let hash_password = password::hash(&body.new_password)
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    app_state.db_client
        .update_user_password(user.user.id, hash_password)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(Response {
        status: "success",
        message: "Password updated Successfully".to_string(),
    }))
}
