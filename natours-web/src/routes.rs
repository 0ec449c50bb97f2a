//! Route definitions for the Natours web server

use crate::{
    auth::{protect, require_role},
    handlers, AppState,
};
use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{get, patch, post},
    Router,
};
use natours_core::Role;

/// Roles allowed to look up other principals
pub const STAFF_ROLES: &[Role] = &[Role::Admin, Role::Operator];

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/users", user_routes(state))
        .nest("/admin", admin_routes(state))
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/updateMyPassword", patch(handlers::update_my_password))
        .route("/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), protect));

    Router::new()
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route("/forgotPassword", post(handlers::forgot_password))
        .route("/resetPassword/{token}", patch(handlers::reset_password))
        .merge(protected)
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    // Layers run outermost first, so `protect` precedes the role check
    Router::new()
        .route("/principals/{id}", get(handlers::get_principal))
        .route_layer(middleware::from_fn(|request: Request, next: Next| {
            require_role(STAFF_ROLES, request, next)
        }))
        .route_layer(middleware::from_fn_with_state(state.clone(), protect))
}
