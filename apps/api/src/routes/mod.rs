pub mod admin;
pub mod health;
pub mod proposals;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::auth::require_session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Everything below the session gate also gets no-cache headers.
    let gated = Router::new()
        .route("/api/v1/admin/proposals", post(admin::handle_create))
        .route(
            "/api/v1/admin/proposals/:id",
            put(admin::handle_update).delete(admin::handle_delete),
        )
        .route("/api/v1/admin/proposals/undo", post(admin::handle_undo))
        .route("/api/v1/admin/proposals/import", post(admin::handle_import))
        .route("/api/v1/admin/activity", get(admin::handle_activity))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        // Public read API consumed by the map, listing, and detail views
        .route("/api/v1/proposals", get(proposals::handle_list))
        .route("/api/v1/proposals/latest", get(proposals::handle_latest))
        .route(
            "/api/v1/proposals/slug/:slug",
            get(proposals::handle_get_by_slug),
        )
        .route("/api/v1/proposals/:id", get(proposals::handle_get))
        // Access gate
        .route("/api/v1/admin/login", post(admin::handle_login))
        .route("/api/v1/admin/logout", post(admin::handle_logout))
        .route("/api/v1/admin/status", get(admin::handle_status))
        .merge(gated)
        .with_state(state)
}
