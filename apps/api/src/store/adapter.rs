//! Adapter traits: the seam between collection-level operations and the
//! three interchangeable persistence backends (redis key-value, Postgres,
//! static file pair).
//!
//! All three backends hold the same logical collection but differ in
//! durability and query characteristics, so the contract is deliberately
//! coarse: load the whole collection, save the whole collection. There are
//! no row-level writes through this interface.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::activity::ActivityEntry;
use crate::models::proposal::Proposal;

/// Which backend a `CollectionAdapter` writes to. Selected at startup from
/// configuration; used for logging and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    KeyValue,
    Relational,
    StaticFiles,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::KeyValue => "kv",
            AdapterKind::Relational => "relational",
            AdapterKind::StaticFiles => "static",
        }
    }
}

impl std::str::FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kv" => Ok(AdapterKind::KeyValue),
            "relational" => Ok(AdapterKind::Relational),
            "static" => Ok(AdapterKind::StaticFiles),
            other => Err(format!(
                "unknown adapter '{other}' (expected kv, relational, or static)"
            )),
        }
    }
}

/// A persistence backend capable of holding the proposal collection.
///
/// Implementations normalize legacy record shapes on `load` and always write
/// the canonical shape on `save`, so field-name drift never crosses this
/// boundary.
#[async_trait]
pub trait CollectionAdapter: Send + Sync {
    async fn load(&self) -> Result<Vec<Proposal>, StoreError>;
    async fn save(&self, proposals: &[Proposal]) -> Result<(), StoreError>;
    fn kind(&self) -> AdapterKind;
}

/// Storage for the admin activity log. Lives alongside the key-value
/// collection key in production; swapped for an in-memory impl in tests.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn load_activity(&self) -> Result<Vec<ActivityEntry>, StoreError>;
    async fn save_activity(&self, entries: &[ActivityEntry]) -> Result<(), StoreError>;
}

/// Durable per-record bookkeeping for the local→remote migration. A single
/// boolean flag cannot distinguish a finished run from a half-finished one;
/// per-record acks let a failed run resume at record granularity.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    async fn is_complete(&self) -> Result<bool, StoreError>;
    async fn mark_complete(&self) -> Result<(), StoreError>;
    async fn acked_ids(&self) -> Result<HashSet<String>, StoreError>;
    async fn ack_ids(&self, ids: &[String]) -> Result<(), StoreError>;
}

/// The remote side of the migration: row existence plus idempotent batch
/// insert. Implemented by the relational adapter.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn count(&self) -> Result<i64, StoreError>;
    /// Inserts one batch. Must tolerate re-delivery of rows that already
    /// exist (the ledger acks a batch only after this returns Ok).
    async fn insert_all(&self, records: &[Proposal]) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    fn injected_failure() -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected failure",
        ))
    }

    /// In-memory stand-in for every adapter trait, with save/insert failure
    /// injection for the error-path tests.
    #[derive(Default)]
    pub struct MemoryBackend {
        pub proposals: Mutex<Vec<Proposal>>,
        pub activity: Mutex<Vec<ActivityEntry>>,
        pub acked: Mutex<HashSet<String>>,
        pub complete: AtomicBool,
        pub fail_saves: AtomicBool,
        pub insert_calls: AtomicUsize,
        /// When set, the nth `insert_all` call (1-based) fails.
        pub fail_insert_call: Mutex<Option<usize>>,
    }

    impl MemoryBackend {
        pub fn with_proposals(proposals: Vec<Proposal>) -> Self {
            let backend = MemoryBackend::default();
            *backend.proposals.lock().unwrap() = proposals;
            backend
        }
    }

    #[async_trait]
    impl CollectionAdapter for MemoryBackend {
        async fn load(&self) -> Result<Vec<Proposal>, StoreError> {
            Ok(self.proposals.lock().unwrap().clone())
        }

        async fn save(&self, proposals: &[Proposal]) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(injected_failure());
            }
            *self.proposals.lock().unwrap() = proposals.to_vec();
            Ok(())
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::KeyValue
        }
    }

    #[async_trait]
    impl ActivityLog for MemoryBackend {
        async fn load_activity(&self) -> Result<Vec<ActivityEntry>, StoreError> {
            Ok(self.activity.lock().unwrap().clone())
        }

        async fn save_activity(&self, entries: &[ActivityEntry]) -> Result<(), StoreError> {
            *self.activity.lock().unwrap() = entries.to_vec();
            Ok(())
        }
    }

    #[async_trait]
    impl MigrationLedger for MemoryBackend {
        async fn is_complete(&self) -> Result<bool, StoreError> {
            Ok(self.complete.load(Ordering::SeqCst))
        }

        async fn mark_complete(&self) -> Result<(), StoreError> {
            self.complete.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn acked_ids(&self) -> Result<HashSet<String>, StoreError> {
            Ok(self.acked.lock().unwrap().clone())
        }

        async fn ack_ids(&self, ids: &[String]) -> Result<(), StoreError> {
            let mut acked = self.acked.lock().unwrap();
            for id in ids {
                acked.insert(id.clone());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteCollection for MemoryBackend {
        async fn count(&self) -> Result<i64, StoreError> {
            Ok(self.proposals.lock().unwrap().len() as i64)
        }

        async fn insert_all(&self, records: &[Proposal]) -> Result<(), StoreError> {
            let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if *self.fail_insert_call.lock().unwrap() == Some(call) {
                return Err(injected_failure());
            }
            let mut rows = self.proposals.lock().unwrap();
            for record in records {
                if !rows.iter().any(|r| r.id == record.id) {
                    rows.push(record.clone());
                }
            }
            Ok(())
        }
    }
}
