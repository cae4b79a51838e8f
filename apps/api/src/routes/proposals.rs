use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::proposal::Proposal;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LatestQuery {
    pub n: Option<usize>,
}

/// GET /api/v1/proposals
pub async fn handle_list(State(state): State<AppState>) -> Json<Vec<Proposal>> {
    Json(state.store.list().await)
}

/// GET /api/v1/proposals/latest?n=6
pub async fn handle_latest(
    State(state): State<AppState>,
    Query(params): Query<LatestQuery>,
) -> Json<Vec<Proposal>> {
    Json(state.store.latest(params.n.unwrap_or(6)).await)
}

/// GET /api/v1/proposals/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, AppError> {
    let proposal = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Proposal {id} not found")))?;
    Ok(Json(proposal))
}

/// GET /api/v1/proposals/slug/:slug
pub async fn handle_get_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Proposal>, AppError> {
    let proposal = state
        .store
        .get_by_slug(&slug)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No proposal with slug '{slug}'")))?;
    Ok(Json(proposal))
}
