use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(handlers::register))
        .route("/users/verify-otp", post(handlers::verify_otp))
        .route("/users/resend-otp", post(handlers::resend_otp))
        .route("/users/login", post(handlers::login))
        .route("/users/refresh", post(handlers::refresh))
        .route("/users/me", get(handlers::me))
        .route("/users", get(handlers::list_users))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
