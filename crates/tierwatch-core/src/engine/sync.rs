//! Snapshot sync: track new wanted items, refresh known ones, archive finds.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::Engine;
use crate::cooldown;
use crate::history::FindRecord;
use crate::model::{Item, ItemKey, ItemSnapshot, SearchKind};
use crate::upstream::Upstream;

/// Counts from syncing one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub added: usize,
    /// Items that left both snapshots (searched or not).
    pub found: usize,
    /// The instance could not be fetched completely; no finds were inferred.
    pub failed: bool,
}

impl Engine {
    /// Pull both wanted snapshots for `up` and reconcile the item map.
    pub(super) async fn sync_instance(
        &self,
        up: &Arc<dyn Upstream>,
        now: DateTime<Utc>,
    ) -> Result<SyncCounts> {
        let instance = up.instance();
        let mut counts = SyncCounts::default();

        let missing = up.fetch_missing().await;
        let cutoff = up.fetch_cutoff_unmet().await;
        let complete = missing.is_ok() && cutoff.is_ok();

        let mut wanted: HashMap<ItemKey, (ItemSnapshot, SearchKind)> = HashMap::new();
        for (result, kind) in [(cutoff, SearchKind::Upgrade), (missing, SearchKind::Missing)] {
            match result {
                // Missing is inserted last so it wins over cutoff-unmet.
                Ok(snaps) => {
                    for snap in snaps {
                        let key = ItemKey::new(instance, snap.media_type, snap.external_id);
                        wanted.insert(key, (snap, kind));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        instance,
                        "fetch {} snapshot failed: {}",
                        kind.as_str(),
                        e
                    );
                    counts.failed = true;
                }
            }
        }

        for (key, (snap, kind)) in &wanted {
            match self.item_entry(key).await {
                Some(entry) => {
                    let mut item = entry.lock().await;
                    if item.refresh_from(snap, *kind) {
                        self.store.upsert_item(&item).await?;
                    }
                }
                None => {
                    let item = Item::from_snapshot(instance, snap, *kind, now);
                    self.store.upsert_item(&item).await?;
                    let mut map = self.items.write().await;
                    map.entry(key.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(item)));
                    counts.added += 1;
                }
            }
        }

        if !complete {
            return Ok(counts);
        }

        let gone: Vec<(ItemKey, Arc<Mutex<Item>>)> = self
            .items
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.instance == instance && !wanted.contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, entry) in gone {
            if self.archive_found(&key, &entry, now).await? {
                counts.found += 1;
            }
        }

        if counts.added > 0 || counts.found > 0 {
            tracing::info!(
                instance,
                "synced: {} wanted, {} new, {} found",
                wanted.len(),
                counts.added,
                counts.found
            );
        }
        Ok(counts)
    }

    /// Mark an item found and drop it from tracking. Items with a search in
    /// flight are left for the next sync.
    async fn archive_found(
        &self,
        key: &ItemKey,
        entry: &Arc<Mutex<Item>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut map = self.items.write().await;
        let mut item = entry.lock().await;
        if item.in_flight {
            return Ok(false);
        }

        let tier = self.cooldown.tier_of(&item, now);
        let attempts = item.attempt_count;
        let searched_at = item.last_searched_at;
        cooldown::mark_found(&mut item, now);

        if let Some(searched_at) = searched_at {
            let find = FindRecord {
                item: key.clone(),
                title: item.title.clone(),
                kind: item.search_kind,
                tier,
                searched_at,
                found_at: now,
                attempts,
            };
            self.store.record_find(&find, self.settings.finds_cap).await?;
            tracing::info!(item = %key, tier = %tier, "found after {} searches", attempts);
        }

        let cleared = self.escalation.lock().await.on_found(key);
        if !cleared.is_empty() {
            self.store.delete_interventions(&cleared).await?;
        }
        self.store.delete_item(key).await?;
        map.remove(key);
        Ok(true)
    }
}
