//! The access gate: a shared-secret login issuing opaque, time-boxed
//! session tokens. A credential check, not a protocol.
//!
//! `SessionStore` methods take `now` explicitly so expiry is driven by the
//! caller's clock, not an ambient timer.

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Header carrying the admin session token.
pub const TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh token expiring `ttl` after `now`. Expired tokens are
    /// pruned on the way through.
    pub async fn issue(&self, now: DateTime<Utc>) -> Session {
        let token = Uuid::new_v4().to_string();
        let expires_at = now + self.ttl;
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, expiry| *expiry > now);
        sessions.insert(token.clone(), expires_at);
        Session { token, expires_at }
    }

    /// Returns the expiry of a live session, or `None` for unknown and
    /// expired tokens alike.
    pub async fn validate(&self, token: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let sessions = self.sessions.read().await;
        sessions.get(token).copied().filter(|expiry| *expiry > now)
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Middleware guarding the admin routes. Rejects missing/expired tokens and
/// marks every gated response as uncacheable.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if state.sessions.validate(token, Utc::now()).await.is_none() {
        return Err(AppError::Unauthorized);
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    Ok(response)
}
