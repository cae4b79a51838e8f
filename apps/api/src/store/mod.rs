//! Collection-level operations over whichever persistence adapter is
//! active, independent of transport.
//!
//! Every mutation read-modify-writes the full collection through the
//! adapter (no row-level writes) and broadcasts one coarse change event;
//! consumers re-read whatever they need. State lives on the store instance,
//! never at module level.

pub mod adapter;
pub mod kv;
pub mod relational;
pub mod static_files;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::models::activity::ActivityEntry;
use crate::models::proposal::{
    dedupe_slug, next_id, slugify, Proposal, ProposalDraft, ProposalPatch,
};
use crate::store::adapter::{ActivityLog, CollectionAdapter};

/// The activity log keeps this many entries, newest first.
const ACTIVITY_CAP: usize = 100;

/// Broadcast on every successful mutation. Deliberately coarse: the store
/// invalidates the whole collection, it does not describe the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Changed,
}

pub struct ProposalStore {
    adapter: Arc<dyn CollectionAdapter>,
    activity: Arc<dyn ActivityLog>,
    proposals: RwLock<Vec<Proposal>>,
    /// Snapshots of deleted records, most recent last. Process-local only;
    /// undo does not survive a restart.
    undo_stack: Mutex<Vec<Proposal>>,
    events: broadcast::Sender<StoreEvent>,
}

impl ProposalStore {
    /// Loads the collection from the active adapter and wraps it in a store.
    pub async fn open(
        adapter: Arc<dyn CollectionAdapter>,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self, StoreError> {
        let proposals = adapter.load().await?;
        info!(
            "Loaded {} proposals from {} adapter",
            proposals.len(),
            adapter.kind().as_str()
        );
        let (events, _) = broadcast::channel(16);
        Ok(ProposalStore {
            adapter,
            activity,
            proposals: RwLock::new(proposals),
            undo_stack: Mutex::new(Vec::new()),
            events,
        })
    }

    /// The observer interface: one receiver per presentation consumer.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn list(&self) -> Vec<Proposal> {
        self.proposals.read().await.clone()
    }

    /// The `n` most recently created proposals. Records without a creation
    /// time sort as epoch 0 and therefore come last.
    pub async fn latest(&self, n: usize) -> Vec<Proposal> {
        let mut proposals = self.proposals.read().await.clone();
        proposals.sort_by_key(|p| std::cmp::Reverse(p.created_millis()));
        proposals.truncate(n);
        proposals
    }

    pub async fn get(&self, id: &str) -> Option<Proposal> {
        self.proposals.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn get_by_slug(&self, slug: &str) -> Option<Proposal> {
        self.proposals
            .read()
            .await
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
    }

    pub async fn create(&self, draft: ProposalDraft) -> Result<Proposal, StoreError> {
        let mut proposals = self.proposals.read().await.clone();
        let now = Utc::now();
        let id = next_id(&proposals, now);
        let slug = dedupe_slug(&slugify(&draft.city), &proposals, None);
        let proposal = Proposal {
            id,
            city: draft.city,
            state: draft.state,
            country: draft.country,
            slug,
            title: draft.title,
            description: draft.description,
            background: draft.background,
            policy: draft.policy,
            stakeholders: draft.stakeholders,
            costs: draft.costs,
            metrics: draft.metrics,
            timeline: draft.timeline,
            full_text: draft.full_text,
            tags: draft.tags,
            lat: draft.lat,
            lng: draft.lng,
            created_at: Some(now),
            submitter_name: draft.submitter_name,
            email: draft.email,
            institution: draft.institution,
        };
        proposals.push(proposal.clone());
        self.commit(proposals).await?;
        self.record_activity(
            "create",
            format!("Created proposal '{}' ({})", proposal.title, proposal.city),
        )
        .await;
        Ok(proposal)
    }

    /// Merges `patch` onto the record. The slug is re-derived (and
    /// re-deduplicated) only when the patch carries a new city.
    pub async fn update(
        &self,
        id: &str,
        patch: ProposalPatch,
    ) -> Result<Option<Proposal>, StoreError> {
        let mut proposals = self.proposals.read().await.clone();
        let Some(pos) = proposals.iter().position(|p| p.id == id) else {
            return Ok(None);
        };

        let mut updated = proposals[pos].clone();
        let city_changed = patch.city.is_some();
        apply_patch(&mut updated, patch);
        if city_changed {
            updated.slug = dedupe_slug(&slugify(&updated.city), &proposals, Some(id));
        }
        proposals[pos] = updated.clone();
        self.commit(proposals).await?;
        self.record_activity(
            "update",
            format!("Updated proposal '{}' ({})", updated.title, updated.city),
        )
        .await;
        Ok(Some(updated))
    }

    /// Removes the record and keeps a snapshot for [`undo_delete`]. `false`
    /// means the id was not present; storage failures are `Err`, not
    /// `false`.
    ///
    /// [`undo_delete`]: ProposalStore::undo_delete
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut proposals = self.proposals.read().await.clone();
        let Some(pos) = proposals.iter().position(|p| p.id == id) else {
            return Ok(false);
        };

        let removed = proposals.remove(pos);
        self.commit(proposals).await?;
        self.record_activity(
            "delete",
            format!("Deleted proposal '{}' ({})", removed.title, removed.city),
        )
        .await;
        self.undo_stack.lock().await.push(removed);
        Ok(true)
    }

    /// Reinserts the most recently deleted record exactly as it was.
    pub async fn undo_delete(&self) -> Result<Option<Proposal>, StoreError> {
        let Some(snapshot) = self.undo_stack.lock().await.pop() else {
            return Ok(None);
        };

        let mut proposals = self.proposals.read().await.clone();
        proposals.push(snapshot.clone());
        if let Err(e) = self.commit(proposals).await {
            // Keep the snapshot so the admin can retry the undo.
            self.undo_stack.lock().await.push(snapshot);
            return Err(e);
        }
        self.record_activity(
            "undo",
            format!("Restored proposal '{}' ({})", snapshot.title, snapshot.city),
        )
        .await;
        Ok(Some(snapshot))
    }

    /// Bulk import of already-normalized records. Records whose id is
    /// already present are skipped so re-running an import cannot duplicate;
    /// missing ids and clashing slugs are assigned fresh values.
    pub async fn import(&self, records: Vec<Proposal>) -> Result<usize, StoreError> {
        let mut proposals = self.proposals.read().await.clone();
        let mut imported = 0usize;
        for mut record in records {
            if record.city.is_empty() && record.title.is_empty() {
                continue;
            }
            if !record.id.is_empty() && proposals.iter().any(|p| p.id == record.id) {
                continue;
            }
            if record.id.is_empty() {
                record.id = next_id(&proposals, Utc::now());
            }
            let base = if record.slug.is_empty() {
                slugify(&record.city)
            } else {
                record.slug.clone()
            };
            record.slug = dedupe_slug(&base, &proposals, None);
            proposals.push(record);
            imported += 1;
        }
        if imported > 0 {
            self.commit(proposals).await?;
            self.record_activity("import", format!("Imported {imported} proposals"))
                .await;
        }
        Ok(imported)
    }

    pub async fn activity(&self, limit: usize) -> Vec<ActivityEntry> {
        match self.activity.load_activity().await {
            Ok(mut entries) => {
                entries.truncate(limit);
                entries
            }
            Err(e) => {
                warn!("Failed to load activity log: {e}");
                Vec::new()
            }
        }
    }

    /// Persists the new collection, swaps it into memory only on success,
    /// and notifies subscribers. The in-memory view never diverges from the
    /// last successful save.
    async fn commit(&self, proposals: Vec<Proposal>) -> Result<(), StoreError> {
        self.adapter.save(&proposals).await?;
        *self.proposals.write().await = proposals;
        let _ = self.events.send(StoreEvent::Changed);
        Ok(())
    }

    /// Activity logging is auxiliary: a failure is logged and swallowed so
    /// it can never fail the mutation it describes.
    async fn record_activity(&self, action: &str, details: String) {
        let mut entries = match self.activity.load_activity().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load activity log: {e}");
                return;
            }
        };
        entries.insert(0, ActivityEntry::new(action, details, Utc::now()));
        entries.truncate(ACTIVITY_CAP);
        if let Err(e) = self.activity.save_activity(&entries).await {
            warn!("Failed to save activity log: {e}");
        }
    }
}

fn apply_patch(proposal: &mut Proposal, patch: ProposalPatch) {
    let ProposalPatch {
        city,
        state,
        country,
        title,
        description,
        background,
        policy,
        stakeholders,
        costs,
        metrics,
        timeline,
        full_text,
        tags,
        lat,
        lng,
        submitter_name,
        email,
        institution,
    } = patch;

    if let Some(city) = city {
        proposal.city = city;
    }
    if let Some(state) = state {
        proposal.state = state;
    }
    if let Some(country) = country {
        proposal.country = country;
    }
    if let Some(title) = title {
        proposal.title = title;
    }
    if let Some(description) = description {
        proposal.description = description;
    }
    if let Some(background) = background {
        proposal.background = background;
    }
    if let Some(policy) = policy {
        proposal.policy = policy;
    }
    if let Some(stakeholders) = stakeholders {
        proposal.stakeholders = stakeholders;
    }
    if let Some(costs) = costs {
        proposal.costs = costs;
    }
    if let Some(metrics) = metrics {
        proposal.metrics = metrics;
    }
    if let Some(timeline) = timeline {
        proposal.timeline = timeline;
    }
    if let Some(full_text) = full_text {
        proposal.full_text = full_text;
    }
    if let Some(tags) = tags {
        proposal.tags = tags;
    }
    if let Some(lat) = lat {
        proposal.lat = Some(lat);
    }
    if let Some(lng) = lng {
        proposal.lng = Some(lng);
    }
    if let Some(submitter_name) = submitter_name {
        proposal.submitter_name = submitter_name;
    }
    if let Some(email) = email {
        proposal.email = email;
    }
    if let Some(institution) = institution {
        proposal.institution = institution;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::adapter::testing::MemoryBackend;
    use super::*;
    use serde_json::json;

    async fn make_store() -> (Arc<MemoryBackend>, ProposalStore) {
        let backend = Arc::new(MemoryBackend::default());
        let store = ProposalStore::open(backend.clone(), backend.clone())
            .await
            .unwrap();
        (backend, store)
    }

    fn make_draft(city: &str, title: &str) -> ProposalDraft {
        ProposalDraft {
            city: city.to_string(),
            title: title.to_string(),
            description: "A community health proposal.".to_string(),
            tags: vec!["prevention".to_string(), "access".to_string()],
            lat: Some(30.04),
            lng: Some(31.24),
            ..ProposalDraft::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let (_, store) = make_store().await;
        let created = store.create(make_draft("Cairo", "Diabetes Prevention")).await.unwrap();

        assert_eq!(created.id, "1");
        assert_eq!(created.slug, "cairo");
        assert!(created.created_at.is_some());

        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.get_by_slug("cairo").await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_persists_whole_collection_to_adapter() {
        let (backend, store) = make_store().await;
        store.create(make_draft("Cairo", "A")).await.unwrap();
        store.create(make_draft("Giza", "B")).await.unwrap();
        assert_eq!(backend.proposals.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_broadcasts_change_event() {
        let (_, store) = make_store().await;
        let mut events = store.subscribe();
        store.create(make_draft("Cairo", "A")).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Changed);
    }

    #[tokio::test]
    async fn test_slug_collision_gets_suffix() {
        let (_, store) = make_store().await;
        let first = store.create(make_draft("Springfield", "A")).await.unwrap();
        let second = store.create(make_draft("Springfield", "B")).await.unwrap();
        assert_eq!(first.slug, "springfield");
        assert_eq!(second.slug, "springfield-2");
    }

    #[tokio::test]
    async fn test_update_city_moves_slug() {
        let (_, store) = make_store().await;
        let created = store.create(make_draft("Cairo", "Diabetes Prevention")).await.unwrap();

        let updated = store
            .update(
                &created.id,
                ProposalPatch {
                    city: Some("Giza".to_string()),
                    ..ProposalPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.slug, "giza");
        assert!(store.get_by_slug("cairo").await.is_none());
        assert_eq!(store.get_by_slug("giza").await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_update_without_city_keeps_slug() {
        let (_, store) = make_store().await;
        let created = store.create(make_draft("Cairo", "A")).await.unwrap();
        let updated = store
            .update(
                &created.id,
                ProposalPatch {
                    description: Some("Revised narrative.".to_string()),
                    ..ProposalPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.slug, "cairo");
        assert_eq!(updated.description, "Revised narrative.");
    }

    #[tokio::test]
    async fn test_update_missing_id_is_none_not_error() {
        let (_, store) = make_store().await;
        let result = store.update("999", ProposalPatch::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_undo_restores_deep_equal_record() {
        let (_, store) = make_store().await;
        store.create(make_draft("Giza", "Other")).await.unwrap();
        let target = store.create(make_draft("Cairo", "Diabetes Prevention")).await.unwrap();
        let before = store.list().await;

        assert!(store.delete(&target.id).await.unwrap());
        assert_eq!(store.list().await.len(), before.len() - 1);
        assert!(store.get(&target.id).await.is_none());

        let restored = store.undo_delete().await.unwrap().unwrap();
        assert_eq!(restored, target);
        assert_eq!(restored.tags, vec!["prevention", "access"]);
        assert_eq!(store.list().await.len(), before.len());
    }

    #[tokio::test]
    async fn test_undo_with_empty_stack_is_none() {
        let (_, store) = make_store().await;
        assert!(store.undo_delete().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_id_returns_false() {
        let (_, store) = make_store().await;
        assert!(!store.delete("42").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_failure_surfaces_as_error_and_keeps_memory_consistent() {
        let (backend, store) = make_store().await;
        store.create(make_draft("Cairo", "A")).await.unwrap();

        backend.fail_saves.store(true, Ordering::SeqCst);
        assert!(store.create(make_draft("Giza", "B")).await.is_err());

        // The failed mutation must not leak into the in-memory view.
        backend.fail_saves.store(false, Ordering::SeqCst);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_orders_by_created_at_with_missing_last() {
        let (_, store) = make_store().await;
        let dated = store.create(make_draft("Cairo", "Dated")).await.unwrap();
        let undated = Proposal::from_value(&json!({
            "id": "p0", "city": "Giza", "title": "Undated"
        }))
        .unwrap();
        store.import(vec![undated]).await.unwrap();

        let latest = store.latest(10).await;
        assert_eq!(latest[0].id, dated.id);
        assert_eq!(latest[1].title, "Undated");

        assert_eq!(store.latest(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_import_skips_existing_ids_and_dedupes_slugs() {
        let (_, store) = make_store().await;
        let existing = store.create(make_draft("Cairo", "A")).await.unwrap();

        let records = vec![
            Proposal::from_value(&json!({"id": existing.id, "city": "Cairo", "title": "dup"}))
                .unwrap(),
            Proposal::from_value(&json!({"city": "Cairo", "title": "Second Cairo"})).unwrap(),
        ];
        let imported = store.import(records).await.unwrap();

        assert_eq!(imported, 1);
        let all = store.list().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].slug, "cairo-2");
        assert!(!all[1].id.is_empty());
    }

    #[tokio::test]
    async fn test_activity_log_prepends_and_caps() {
        let (backend, store) = make_store().await;
        for i in 0..110 {
            store.create(make_draft(&format!("City{i}"), "T")).await.unwrap();
        }
        let entries = backend.activity.lock().unwrap().clone();
        assert_eq!(entries.len(), ACTIVITY_CAP);
        // Newest first.
        assert!(entries[0].details.contains("City109"));

        let limited = store.activity(5).await;
        assert_eq!(limited.len(), 5);
    }
}
