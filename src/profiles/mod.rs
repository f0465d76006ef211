use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod handlers;
pub mod repo_types;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/profiles",
            post(handlers::create_profile).get(handlers::list_profiles),
        )
        .route("/profiles/me", get(handlers::my_profile))
        .route(
            "/profiles/:id",
            get(handlers::get_profile)
                .put(handlers::update_profile)
                .delete(handlers::delete_profile),
        )
}
