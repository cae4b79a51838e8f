//! One-way migration of the key-value collection into the relational
//! backend, run at service startup.
//!
//! Guarding this with one "migration complete" flag would make a partially
//! failed bulk insert permanent: the next run would see a non-empty remote
//! table and skip the rest. The ledger therefore acknowledges records
//! individually; a failed batch leaves the acks of the batches that
//! succeeded and the next run resumes with only the unacknowledged records.
//! Inserts are idempotent on the remote side, which makes re-delivery of an
//! inserted-but-unacked batch safe.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::models::proposal::Proposal;
use crate::store::adapter::{CollectionAdapter, MigrationLedger, RemoteCollection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The completion flag was already set; nothing to do.
    AlreadyComplete,
    /// The local adapter holds no records; marked complete.
    NothingLocal,
    /// The remote table already had rows before we ever migrated anything.
    /// The pre-existing remote dataset wins; no merge is attempted.
    RemoteAdopted,
    /// Records were copied (possibly resuming an earlier partial run).
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
    /// Records inserted and acknowledged by this run.
    pub migrated: usize,
}

/// Copies every local record the ledger has not acknowledged yet into the
/// remote collection, in fixed-size batches with a flat delay between them.
/// Batch N+1 never starts before batch N's delay has elapsed.
///
/// A batch failure aborts the run and is returned to the caller; acks
/// already written stay, so the next run retries at record granularity.
pub async fn migrate_local_to_remote(
    local: &dyn CollectionAdapter,
    remote: &dyn RemoteCollection,
    ledger: &dyn MigrationLedger,
    batch_size: usize,
    batch_delay: Duration,
) -> Result<MigrationReport, StoreError> {
    if ledger.is_complete().await? {
        return Ok(MigrationReport {
            outcome: MigrationOutcome::AlreadyComplete,
            migrated: 0,
        });
    }

    let local_records = local.load().await?;
    if local_records.is_empty() {
        ledger.mark_complete().await?;
        return Ok(MigrationReport {
            outcome: MigrationOutcome::NothingLocal,
            migrated: 0,
        });
    }

    let acked = ledger.acked_ids().await?;
    if acked.is_empty() && remote.count().await? > 0 {
        // First contact with a remote table that was populated some other
        // way. The remote dataset is authoritative; do not merge into it.
        info!("Remote collection already populated; adopting it as-is");
        ledger.mark_complete().await?;
        return Ok(MigrationReport {
            outcome: MigrationOutcome::RemoteAdopted,
            migrated: 0,
        });
    }

    let pending: Vec<&Proposal> = local_records
        .iter()
        .filter(|p| !acked.contains(&p.id))
        .collect();

    let mut migrated = 0usize;
    let batch_size = batch_size.max(1);
    for (index, batch) in pending.chunks(batch_size).enumerate() {
        if index > 0 {
            sleep(batch_delay).await;
        }
        let records: Vec<Proposal> = batch.iter().map(|p| (*p).clone()).collect();
        remote.insert_all(&records).await?;
        let ids: Vec<String> = records.iter().map(|p| p.id.clone()).collect();
        ledger.ack_ids(&ids).await?;
        migrated += records.len();
        info!(
            "Migrated batch {} ({} records, {} total)",
            index + 1,
            records.len(),
            migrated
        );
    }

    ledger.mark_complete().await?;
    info!(
        "Migration complete: {} of {} local records copied this run",
        migrated,
        local_records.len()
    );
    Ok(MigrationReport {
        outcome: MigrationOutcome::Migrated,
        migrated,
    })
}

/// Startup connectivity probe for the remote collection: a bounded number
/// of attempts with exponential backoff between them.
pub async fn wait_for_remote(
    remote: &dyn RemoteCollection,
    attempts: u32,
    initial_delay: Duration,
) -> Result<(), StoreError> {
    let attempts = attempts.max(1);
    let mut delay = initial_delay;
    let mut last_err = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            sleep(delay).await;
            delay *= 2;
        }
        match remote.count().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!("Remote collection not reachable (attempt {attempt}/{attempts}): {e}");
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
