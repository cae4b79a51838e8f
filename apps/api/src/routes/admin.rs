use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::TOKEN_HEADER;
use crate::errors::AppError;
use crate::models::activity::ActivityEntry;
use crate::models::proposal::{Proposal, ProposalDraft, ProposalPatch};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/admin/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    if req.password != state.config.admin_password {
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                message: "Invalid password".to_string(),
                token: None,
                expires_at: None,
            }),
        );
    }

    let session = state.sessions.issue(Utc::now()).await;
    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            message: "Logged in".to_string(),
            token: Some(session.token),
            expires_at: Some(session.expires_at),
        }),
    )
}

/// POST /api/v1/admin/logout
pub async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let token = header_token(&headers);
    let revoked = state.sessions.revoke(token).await;
    Json(json!({
        "success": revoked,
        "message": if revoked { "Logged out" } else { "No active session" }
    }))
}

/// GET /api/v1/admin/status
pub async fn handle_status(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let token = header_token(&headers);
    let expires_at = state.sessions.validate(token, Utc::now()).await;
    Json(json!({
        "success": true,
        "authenticated": expires_at.is_some(),
        "expires_at": expires_at
    }))
}

/// POST /api/v1/admin/proposals
pub async fn handle_create(
    State(state): State<AppState>,
    Json(draft): Json<ProposalDraft>,
) -> Result<Json<Proposal>, AppError> {
    Ok(Json(state.store.create(draft).await?))
}

/// PUT /api/v1/admin/proposals/:id
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ProposalPatch>,
) -> Result<Json<Proposal>, AppError> {
    let updated = state
        .store
        .update(&id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Proposal {id} not found")))?;
    Ok(Json(updated))
}

/// DELETE /api/v1/admin/proposals/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = state.store.delete(&id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// POST /api/v1/admin/proposals/undo
pub async fn handle_undo(State(state): State<AppState>) -> Result<Json<Proposal>, AppError> {
    let restored = state
        .store
        .undo_delete()
        .await?
        .ok_or_else(|| AppError::NotFound("Nothing to undo".to_string()))?;
    Ok(Json(restored))
}

/// POST /api/v1/admin/proposals/import
///
/// Accepts an array of records in any historical shape; normalization
/// happens before the store sees them.
pub async fn handle_import(
    State(state): State<AppState>,
    Json(raw): Json<Vec<Value>>,
) -> Result<Json<Value>, AppError> {
    let records: Vec<Proposal> = raw.iter().filter_map(Proposal::from_value).collect();
    let imported = state.store.import(records).await?;
    Ok(Json(json!({ "imported": imported })))
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/admin/activity?limit=50
pub async fn handle_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Json<Vec<ActivityEntry>> {
    Json(state.store.activity(params.limit.unwrap_or(50)).await)
}

fn header_token(headers: &HeaderMap) -> &str {
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
