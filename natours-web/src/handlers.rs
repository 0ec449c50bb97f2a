//! HTTP request handlers

use crate::{
    auth::{token_cookie, CurrentPrincipal},
    error::{ApiError, ApiJson},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use natours_auth::{IssuedToken, Signup};
use natours_core::PrincipalId;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password_current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Token body plus the token cookie
fn token_response(state: &AppState, status: StatusCode, issued: IssuedToken) -> Response {
    let cookie = token_cookie(
        &issued.token,
        state.config.auth.cookie_lifetime(),
        state.config.auth.production,
    );
    let body = json!({
        "status": "success",
        "token": issued.token,
        "data": { "principal": issued.principal.view() },
    });

    (status, [(SET_COOKIE, cookie)], Json(body)).into_response()
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<Response, ApiError> {
    let issued = state
        .service
        .signup(Signup {
            name: request.name,
            email: request.email,
            password: request.password,
            password_confirm: request.password_confirm,
        })
        .await?;

    Ok(token_response(&state, StatusCode::CREATED, issued))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let issued = state
        .service
        .login(&request.email, &request.password)
        .await?;

    Ok(token_response(&state, StatusCode::OK, issued))
}

/// Always answers the same way for known and unknown addresses
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    state.service.forgot_password(&request.email).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "If that email is registered, a reset link has been sent.",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let issued = state
        .service
        .reset_password(&token, &request.password, &request.password_confirm)
        .await?;

    Ok(token_response(&state, StatusCode::OK, issued))
}

pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ApiJson(request): ApiJson<UpdatePasswordRequest>,
) -> Result<Response, ApiError> {
    let issued = state
        .service
        .update_password(
            &principal,
            &request.password_current,
            &request.password,
            &request.password_confirm,
        )
        .await?;

    Ok(token_response(&state, StatusCode::OK, issued))
}

pub async fn get_me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": { "principal": principal.view() },
    }))
}

/// Principal lookup for staff
pub async fn get_principal(
    State(state): State<AppState>,
    CurrentPrincipal(caller): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: PrincipalId = id.parse().map_err(|_| ApiError::BadRequest {
        message: "Invalid principal id".to_string(),
        field: Some("id".to_string()),
    })?;

    let principal = state
        .service
        .principal(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No principal found with that id".to_string()))?;

    info!(caller = %caller.id(), principal_id = %id, "Principal looked up");
    Ok(Json(json!({
        "status": "success",
        "data": { "principal": principal.view() },
    })))
}
