use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One admin action in the activity log. Entries are prepended (newest
/// first) and the log is capped, so this is a short rolling window, not an
/// audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl ActivityEntry {
    pub fn new(action: &str, details: impl Into<String>, now: DateTime<Utc>) -> Self {
        ActivityEntry {
            action: action.to_string(),
            timestamp: now,
            details: details.into(),
        }
    }
}
