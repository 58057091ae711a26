//! Manual actions: ad-hoc search, manual resolve, intervention decisions.
//!
//! These run under the same locking discipline as the cycles; they only skip
//! the wait for the next tick.

use chrono::{DateTime, Utc};

use super::search_cycle::Executed;
use super::{Engine, QueueCycleReport};
use crate::budget::BudgetStatus;
use crate::cooldown;
use crate::error::EngineError;
use crate::escalation::{Category, Decision, Intervention, Subject};
use crate::history::SearchOutcome;
use crate::model::ItemKey;
use crate::queue_monitor::{IssueKey, IssueState};

/// Result of `Engine::search_now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualSearchOutcome {
    Triggered,
    ProviderError(String),
    /// A group search covered the item recently; no call was made.
    SkippedDuplicate,
    /// No budget right now (quiet hours or daily limit).
    Deferred(BudgetStatus),
    /// A search for this item is already running.
    InFlight,
}

impl Engine {
    /// Search one item now, bypassing its cooldown but not the daily budget.
    pub async fn search_now(
        &self,
        key: &ItemKey,
        now: DateTime<Utc>,
    ) -> Result<ManualSearchOutcome, EngineError> {
        if self.item_entry(key).await.is_none() {
            return Err(EngineError::UnknownItem(key.clone()));
        }
        self.search_with_budget(key, now).await
    }

    /// Reserve one slot and search `key`, releasing the slot if no call is made.
    async fn search_with_budget(
        &self,
        key: &ItemKey,
        now: DateTime<Utc>,
    ) -> Result<ManualSearchOutcome, EngineError> {
        {
            let mut budget = self.budget.lock().await;
            let status = budget.status(now);
            if budget.reserve(1, now) == 0 {
                return Ok(ManualSearchOutcome::Deferred(status));
            }
            if let Err(e) = self.save_budget(&budget).await {
                budget.release(1);
                return Err(e.into());
            }
        }

        let executed = self.execute_search(key, now, false).await?;
        if !matches!(executed, Executed::Searched(..)) {
            let mut budget = self.budget.lock().await;
            budget.release(1);
            self.save_budget(&budget).await?;
        }

        Ok(match executed {
            Executed::Searched(SearchOutcome::Triggered, _) => ManualSearchOutcome::Triggered,
            Executed::Searched(_, error) | Executed::NotSearched(SearchOutcome::ProviderError, error) => {
                ManualSearchOutcome::ProviderError(error.unwrap_or_default())
            }
            Executed::NotSearched(_, _) => ManualSearchOutcome::SkippedDuplicate,
            Executed::InFlight | Executed::Ineligible => ManualSearchOutcome::InFlight,
            Executed::Untracked => return Err(EngineError::UnknownItem(key.clone())),
        })
    }

    /// Search the item behind a removed download, if it is still tracked.
    pub(super) async fn research_after_removal(
        &self,
        key: &ItemKey,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if self.item_entry(key).await.is_none() {
            return Ok(false);
        }
        match self.search_with_budget(key, now).await {
            Ok(ManualSearchOutcome::Triggered) => Ok(true),
            Ok(other) => {
                tracing::debug!(item = %key, "re-search after removal: {:?}", other);
                Ok(false)
            }
            Err(EngineError::Store(e)) => Err(e),
            Err(e) => {
                tracing::debug!(item = %key, "re-search after removal skipped: {}", e);
                Ok(false)
            }
        }
    }

    /// Remove and blocklist a queue issue's download now, regardless of its
    /// deadline or kind.
    pub async fn resolve_issue(
        &self,
        key: &IssueKey,
        now: DateTime<Utc>,
    ) -> Result<IssueState, EngineError> {
        let up = self
            .upstreams
            .get(&key.instance)
            .cloned()
            .ok_or_else(|| EngineError::UnknownInstance(key.instance.clone()))?;
        let issue = self.queue.lock().await.begin_manual(key)?;

        let mut report = QueueCycleReport::default();
        let state = self.run_removal(&up, &issue, now, &mut report).await?;
        let state = state.ok_or_else(|| EngineError::UnknownIssue(key.to_string()))?;
        if state == IssueState::Resolved {
            // A human resolved it; any queue-stuck request is moot.
            let cleared = self
                .escalation
                .lock()
                .await
                .on_download_gone(&key.instance, &key.download_id);
            if !cleared.is_empty() {
                self.store.delete_interventions(&cleared).await?;
            }
        }
        Ok(state)
    }

    /// Record a human decision on an intervention. "reset" on an urgent
    /// intervention also resets the item's attempts and cooldown.
    pub async fn decide(
        &self,
        id: &str,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Intervention, EngineError> {
        let (category, subject) = {
            let esc = self.escalation.lock().await;
            let iv = esc
                .get(id)
                .ok_or_else(|| EngineError::UnknownIntervention(id.to_string()))?;
            (iv.category, iv.subject.clone())
        };

        // Item before escalation, as everywhere else.
        let entry = match (&subject, category) {
            (Subject::Item { key }, Category::Urgent) => self.item_entry(key).await,
            _ => None,
        };
        let mut item = match &entry {
            Some(entry) => Some(entry.lock().await),
            None => None,
        };

        let effect = self.escalation.lock().await.decide(id, decision, now)?;
        self.store.upsert_intervention(&effect.intervention).await?;
        if let Subject::Item { key } = &subject {
            let state = self.escalation.lock().await.item_state(key);
            self.store.save_escalation(key, &state).await?;
        }
        if let (Some(key), Some(item)) = (&effect.reset_item, item.as_mut()) {
            cooldown::reset(item);
            self.store.upsert_item(item).await?;
            tracing::info!(item = %key, "attempts reset by decision");
        }
        Ok(effect.intervention)
    }

    /// Pending interventions, oldest first.
    pub async fn open_interventions(&self) -> Vec<Intervention> {
        self.escalation.lock().await.open()
    }

    /// Every intervention, decided ones included.
    pub async fn interventions(&self) -> Vec<Intervention> {
        let mut all: Vec<Intervention> = self.escalation.lock().await.all().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}
