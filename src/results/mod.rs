use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod ingest;
pub mod repo_types;
pub mod verdict;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/results",
            post(handlers::create_result).get(handlers::list_results),
        )
        .route(
            "/results/:id",
            get(handlers::get_result)
                .put(handlers::update_result)
                .delete(handlers::delete_result),
        )
}
