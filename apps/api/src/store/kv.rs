//! Redis key-value adapter. The whole collection lives as one JSON array
//! blob under a well-known key; further keys hold the activity log and the
//! migration ledger.

use std::collections::HashSet;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::errors::StoreError;
use crate::models::activity::ActivityEntry;
use crate::models::proposal::{normalize_collection, Proposal};
use crate::store::adapter::{
    ActivityLog, AdapterKind, CollectionAdapter, MigrationLedger,
};

pub const PROPOSALS_KEY: &str = "policymap:proposals";
pub const ACTIVITY_KEY: &str = "policymap:activity";
pub const MIGRATED_IDS_KEY: &str = "policymap:migrated_ids";
pub const MIGRATION_COMPLETE_KEY: &str = "policymap:migration_complete";

pub struct KvAdapter {
    client: redis::Client,
}

impl KvAdapter {
    pub fn new(client: redis::Client) -> Self {
        KvAdapter { client }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CollectionAdapter for KvAdapter {
    async fn load(&self) -> Result<Vec<Proposal>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(PROPOSALS_KEY).await?;
        match raw {
            None => Ok(Vec::new()),
            Some(blob) => {
                // Blobs written by older frontends carry legacy field names;
                // normalize here so nothing downstream sees them.
                let value: serde_json::Value = serde_json::from_str(&blob)?;
                Ok(normalize_collection(&value))
            }
        }
    }

    async fn save(&self, proposals: &[Proposal]) -> Result<(), StoreError> {
        let blob = serde_json::to_string(proposals)?;
        let mut conn = self.conn().await?;
        let _: () = conn.set(PROPOSALS_KEY, blob).await?;
        Ok(())
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::KeyValue
    }
}

#[async_trait]
impl ActivityLog for KvAdapter {
    async fn load_activity(&self) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(ACTIVITY_KEY).await?;
        match raw {
            None => Ok(Vec::new()),
            Some(blob) => Ok(serde_json::from_str(&blob)?),
        }
    }

    async fn save_activity(&self, entries: &[ActivityEntry]) -> Result<(), StoreError> {
        let blob = serde_json::to_string(entries)?;
        let mut conn = self.conn().await?;
        let _: () = conn.set(ACTIVITY_KEY, blob).await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationLedger for KvAdapter {
    async fn is_complete(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let flag: Option<String> = conn.get(MIGRATION_COMPLETE_KEY).await?;
        Ok(flag.as_deref() == Some("true"))
    }

    async fn mark_complete(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(MIGRATION_COMPLETE_KEY, "true").await?;
        Ok(())
    }

    async fn acked_ids(&self) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(MIGRATED_IDS_KEY).await?;
        Ok(ids.into_iter().collect())
    }

    async fn ack_ids(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: () = conn.sadd(MIGRATED_IDS_KEY, ids).await?;
        Ok(())
    }
}
