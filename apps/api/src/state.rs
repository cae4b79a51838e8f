use std::sync::Arc;

use crate::auth::SessionStore;
use crate::config::Config;
use crate::store::ProposalStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Collection operations over whichever adapter is active.
    pub store: Arc<ProposalStore>,
    /// Admin session tokens for the access gate.
    pub sessions: Arc<SessionStore>,
    pub config: Config,
}
