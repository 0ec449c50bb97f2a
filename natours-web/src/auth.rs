//! Request authentication middleware, role gating and the token cookie

use crate::{error::ApiError, AppState};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use natours_auth::{authorize, AuthError, Credentials, UnauthenticatedReason, TOKEN_COOKIE};
use natours_core::{Principal, Role};
use tracing::debug;

/// Principal admitted by [`protect`], available to downstream handlers
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentPrincipal>()
            .cloned()
            .ok_or(ApiError::Auth(AuthError::Unauthenticated(
                UnauthenticatedReason::MissingToken,
            )))
    }
}

/// Authenticate the request from its bearer header or token cookie
pub async fn protect(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default().to_string());
    let cookie = cookie_value(request.headers(), TOKEN_COOKIE);

    let principal = state
        .service
        .protect(Credentials {
            authorization: authorization.as_deref(),
            cookie: cookie.as_deref(),
        })
        .await?;

    debug!(principal_id = %principal.id(), "Request authenticated");
    request.extensions_mut().insert(CurrentPrincipal(principal));
    Ok(next.run(request).await)
}

/// Admit only principals holding one of `allowed`. Must run after [`protect`].
pub async fn require_role(
    allowed: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let CurrentPrincipal(principal) = request
        .extensions()
        .get::<CurrentPrincipal>()
        .ok_or(ApiError::Auth(AuthError::Unauthenticated(
            UnauthenticatedReason::MissingToken,
        )))?;

    authorize(principal, allowed)?;
    Ok(next.run(request).await)
}

/// Value of cookie `name` across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a bearer token
pub fn token_cookie(token: &str, lifetime: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        TOKEN_COOKIE,
        token,
        lifetime.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
