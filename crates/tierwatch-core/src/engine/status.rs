//! Read-only views for the CLI and API layer.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use super::Engine;
use crate::budget::BudgetStatus;
use crate::history::{FindRecord, SearchRecord};
use crate::model::ItemKey;
use crate::pacing::PresetName;
use crate::tier::Tier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCount {
    pub total: usize,
    pub eligible: usize,
    /// At or past `max_attempts`, so on the secondary cooldown.
    pub exhausted: usize,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub preset: PresetName,
    /// Indexed by `Tier::index`.
    pub tiers: [TierCount; 4],
    pub in_flight: usize,
    pub budget_day: NaiveDate,
    pub budget_used: u32,
    pub budget_ceiling: u32,
    pub budget: BudgetStatus,
    pub searches_per_cycle: u32,
    pub open_interventions: usize,
    pub queue_issues: usize,
}

impl EngineStatus {
    pub fn tracked(&self) -> usize {
        self.tiers.iter().map(|t| t.total).sum()
    }
}

impl Engine {
    /// Items per tier at `now`, with how many are eligible.
    pub async fn tier_counts(&self, now: DateTime<Utc>) -> [TierCount; 4] {
        let mut counts = [TierCount::default(); 4];
        for entry in self.all_entries().await {
            let item = entry.lock().await;
            let tier = self.cooldown.tier_of(&item, now);
            let c = &mut counts[tier.index()];
            c.total += 1;
            if self.cooldown.is_eligible(&item, now) {
                c.eligible += 1;
            }
            if item.attempt_count >= self.cooldown.pacing().tier(tier).max_attempts {
                c.exhausted += 1;
            }
        }
        counts
    }

    pub async fn status(&self, now: DateTime<Utc>) -> EngineStatus {
        let tiers = self.tier_counts(now).await;
        let mut in_flight = 0;
        for entry in self.all_entries().await {
            if entry.lock().await.in_flight {
                in_flight += 1;
            }
        }
        let (budget_day, budget_used, budget_ceiling, budget) = {
            let mut b = self.budget.lock().await;
            let status = b.status(now);
            (b.day(), b.used(), b.ceiling(), status)
        };
        EngineStatus {
            preset: self.settings.pacing.name,
            tiers,
            in_flight,
            budget_day,
            budget_used,
            budget_ceiling,
            budget,
            searches_per_cycle: self.settings.searches_per_cycle,
            open_interventions: self.escalation.lock().await.open().len(),
            queue_issues: self.queue.lock().await.all().len(),
        }
    }

    /// Most recent search records, newest first.
    pub async fn recent_searches(&self, limit: usize) -> Result<Vec<SearchRecord>> {
        self.store.recent_searches(limit).await
    }

    /// Most recent finds, newest first.
    pub async fn recent_finds(&self, limit: usize) -> Result<Vec<FindRecord>> {
        self.store.recent_finds(limit).await
    }

    /// Tier of a tracked item at `now`.
    pub async fn tier_of(&self, key: &ItemKey, now: DateTime<Utc>) -> Option<Tier> {
        let item = self.item(key).await?;
        Some(self.cooldown.tier_of(&item, now))
    }
}
