//! One scheduled search cycle, and the per-item executor shared with manual searches.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::Engine;
use crate::budget::BudgetStatus;
use crate::cooldown;
use crate::escalation::Intervention;
use crate::history::{OutcomeCounts, SearchOutcome, SearchRecord};
use crate::model::{Item, ItemKey};
use crate::selector::Candidate;
use crate::tier::Tier;

/// Summary of one search cycle.
#[derive(Debug, Clone, Default)]
pub struct SearchCycleReport {
    pub items_added: usize,
    pub items_found: usize,
    pub instances_failed: usize,
    pub eligible: usize,
    pub granted: u32,
    /// Selected per tier, indexed by `Tier::index`.
    pub selected: [usize; 4],
    pub outcomes: OutcomeCounts,
    /// Selected but no longer eligible when their turn came.
    pub skipped_ineligible: usize,
    pub interventions_raised: Vec<Intervention>,
    /// Budget state before selection; anything but `Available` means nothing ran.
    pub budget: Option<BudgetStatus>,
    pub daily_rollover: bool,
}

/// Result of executing one reserved search slot.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Executed {
    Searched(SearchOutcome, Option<String>),
    /// No call was made; the slot must be released.
    NotSearched(SearchOutcome, Option<String>),
    Ineligible,
    InFlight,
    Untracked,
}

impl Executed {
    fn spent_slot(&self) -> bool {
        matches!(self, Executed::Searched(..))
    }

    pub(super) fn outcome(&self) -> Option<SearchOutcome> {
        match self {
            Executed::Searched(o, _) | Executed::NotSearched(o, _) => Some(*o),
            Executed::Ineligible | Executed::InFlight | Executed::Untracked => None,
        }
    }
}

impl Engine {
    /// Sync snapshots, evaluate escalations, then search a batch of eligible
    /// items within today's budget.
    pub async fn run_search_cycle(&self, now: DateTime<Utc>) -> Result<SearchCycleReport> {
        let mut report = SearchCycleReport::default();

        {
            let mut budget = self.budget.lock().await;
            if budget.roll(now) {
                report.daily_rollover = true;
                self.groups.lock().await.clear();
                self.save_budget(&budget).await?;
            }
        }

        let upstreams: Vec<_> = self.upstreams.values().cloned().collect();
        for up in &upstreams {
            let counts = self.sync_instance(up, now).await?;
            report.items_added += counts.added;
            report.items_found += counts.found;
            if counts.failed {
                report.instances_failed += 1;
            }
        }

        report.interventions_raised = self.sweep_escalations(now).await?;

        let status = self.budget.lock().await.status(now);
        report.budget = Some(status);

        let candidates = self.eligible_candidates(now).await;
        report.eligible = candidates.len();
        if !matches!(status, BudgetStatus::Available(_)) {
            tracing::info!(
                "search cycle deferred ({}): {} eligible items wait",
                status,
                report.eligible
            );
            return Ok(report);
        }
        if candidates.is_empty() {
            tracing::debug!("search cycle: nothing eligible");
            return Ok(report);
        }

        let request = self
            .settings
            .searches_per_cycle
            .min(u32::try_from(candidates.len()).unwrap_or(u32::MAX));
        let granted = {
            let mut budget = self.budget.lock().await;
            let granted = budget.reserve(request, now);
            if let Err(e) = self.save_budget(&budget).await {
                budget.release(granted);
                return Err(e);
            }
            granted
        };
        report.granted = granted;

        let selected = {
            let mut rng = self.rng.lock().await;
            self.selector.select(candidates, granted as usize, &mut *rng)
        };
        for c in &selected {
            report.selected[c.tier.index()] += 1;
        }

        // A store failure stops the cycle; slots of items not yet searched go back.
        let total = selected.len();
        let mut unspent = 0u32;
        let mut failure = None;
        for (i, c) in selected.into_iter().enumerate() {
            let executed = match self.execute_search(&c.key, now, true).await {
                Ok(executed) => executed,
                Err(e) => {
                    unspent += u32::try_from(total - i - 1).unwrap_or(u32::MAX);
                    failure = Some(e);
                    break;
                }
            };
            if !executed.spent_slot() {
                unspent += 1;
            }
            match executed.outcome() {
                Some(SearchOutcome::Triggered) => report.outcomes.triggered += 1,
                Some(SearchOutcome::ProviderError) => report.outcomes.provider_error += 1,
                Some(SearchOutcome::SkippedDuplicate) => report.outcomes.skipped_duplicate += 1,
                None => report.skipped_ineligible += 1,
            }
        }
        if unspent > 0 {
            let mut budget = self.budget.lock().await;
            budget.release(unspent);
            let saved = self.save_budget(&budget).await;
            if failure.is_none() {
                saved?;
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        tracing::info!(
            "search cycle: {} eligible, {} granted, hot/warm/cool/cold {:?}, {} triggered, {} errors, {} duplicates",
            report.eligible,
            report.granted,
            report.selected,
            report.outcomes.triggered,
            report.outcomes.provider_error,
            report.outcomes.skipped_duplicate
        );
        Ok(report)
    }

    /// Evaluate every tracked item for urgent and milestone escalations.
    async fn sweep_escalations(&self, now: DateTime<Utc>) -> Result<Vec<Intervention>> {
        let mut raised = Vec::new();
        for entry in self.all_entries().await {
            let item = entry.lock().await;
            if let Some(iv) = self.evaluate_item(&item, now).await? {
                raised.push(iv);
            }
        }
        Ok(raised)
    }

    /// Run the escalation check for one (locked) item and persist any change.
    pub(super) async fn evaluate_item(
        &self,
        item: &Item,
        now: DateTime<Utc>,
    ) -> Result<Option<Intervention>> {
        let tier = self.cooldown.tier_of(item, now);
        let pacing = self.cooldown.pacing().tier(tier);
        let mut esc = self.escalation.lock().await;
        let raised = esc.evaluate(item, tier, pacing, now);
        if let Some(iv) = &raised {
            self.store.upsert_intervention(iv).await?;
            self.store
                .save_escalation(&item.key, &esc.item_state(&item.key))
                .await?;
        }
        Ok(raised)
    }

    async fn eligible_candidates(&self, now: DateTime<Utc>) -> Vec<Candidate> {
        let mut out = Vec::new();
        for entry in self.all_entries().await {
            let item = entry.lock().await;
            if self.cooldown.is_eligible(&item, now) {
                out.push(Candidate {
                    key: item.key.clone(),
                    tier: self.cooldown.tier_of(&item, now),
                    last_searched_at: item.last_searched_at,
                });
            }
        }
        out
    }

    /// Search one item against a slot the caller has already reserved.
    /// `respect_cooldown` is false for manual and post-resolve searches.
    pub(super) async fn execute_search(
        &self,
        key: &ItemKey,
        now: DateTime<Utc>,
        respect_cooldown: bool,
    ) -> Result<Executed> {
        let Some(entry) = self.item_entry(key).await else {
            return Ok(Executed::Untracked);
        };
        let upstream = self.upstreams.get(&key.instance).cloned();

        let (snapshot, tier, up) = {
            let mut item = entry.lock().await;
            if item.in_flight {
                return Ok(Executed::InFlight);
            }
            if respect_cooldown && !self.cooldown.is_eligible(&item, now) {
                return Ok(Executed::Ineligible);
            }
            let tier = self.cooldown.tier_of(&item, now);

            let Some(up) = upstream else {
                let error = format!("no upstream registered for instance {}", key.instance);
                tracing::warn!(item = %key, "{}", error);
                let rec = self.search_record(
                    &item,
                    tier,
                    SearchOutcome::ProviderError,
                    now,
                    Some(error.clone()),
                );
                self.store
                    .record_search(&item, &rec, self.settings.history_cap)
                    .await?;
                return Ok(Executed::NotSearched(
                    SearchOutcome::ProviderError,
                    Some(error),
                ));
            };

            if let Some(group) = item.group_id.filter(|_| self.settings.prefer_group_search) {
                let mut groups = self.groups.lock().await;
                let slot = (key.instance.clone(), group);
                let recent = groups
                    .get(&slot)
                    .is_some_and(|at| now - *at < self.settings.group_dedup_window);
                if recent {
                    cooldown::record_covered(&mut item, now);
                    drop(groups);
                    let rec = self.search_record(
                        &item,
                        tier,
                        SearchOutcome::SkippedDuplicate,
                        now,
                        None,
                    );
                    self.store
                        .record_search(&item, &rec, self.settings.history_cap)
                        .await?;
                    tracing::debug!(item = %key, group, "group searched recently; skipped");
                    return Ok(Executed::NotSearched(SearchOutcome::SkippedDuplicate, None));
                }
                // Claim the group before the call so a concurrent search of a
                // sibling item is suppressed.
                groups.insert(slot, now);
            }

            item.in_flight = true;
            (item.clone(), tier, up)
        };

        let result = up.trigger_search(&snapshot, snapshot.search_kind).await;

        let mut item = entry.lock().await;
        item.in_flight = false;
        cooldown::record_attempt(&mut item, now);
        let (outcome, error) = match result {
            Ok(()) => {
                tracing::debug!(
                    item = %key,
                    tier = %tier,
                    attempt = item.attempt_count,
                    "search triggered"
                );
                (SearchOutcome::Triggered, None)
            }
            Err(e) => {
                tracing::warn!(item = %key, "search failed: {}", e);
                if let Some(group) = item.group_id.filter(|_| self.settings.prefer_group_search) {
                    let mut groups = self.groups.lock().await;
                    if groups.get(&(key.instance.clone(), group)) == Some(&now) {
                        groups.remove(&(key.instance.clone(), group));
                    }
                }
                (SearchOutcome::ProviderError, Some(e.to_string()))
            }
        };
        let rec = self.search_record(&item, tier, outcome, now, error.clone());
        self.store
            .record_search(&item, &rec, self.settings.history_cap)
            .await?;
        self.evaluate_item(&item, now).await?;
        Ok(Executed::Searched(outcome, error))
    }

    fn search_record(
        &self,
        item: &Item,
        tier: Tier,
        outcome: SearchOutcome,
        now: DateTime<Utc>,
        error: Option<String>,
    ) -> SearchRecord {
        SearchRecord {
            at: now,
            item: item.key.clone(),
            title: item.title.clone(),
            group_id: item.group_id,
            kind: item.search_kind,
            tier,
            outcome,
            error,
        }
    }
}
