mod auth;
mod backend;

use axum::Router;

use crate::state::AppState;

/// Create the API router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/backend", backend::router(state))
}
