//! Escalation state machine and intervention registry.
//!
//! Hot/warm items: `normal -> urgent-pending -> (dismissed | normal on reset)`.
//! Cool/cold items: `normal -> milestone-pending -> acknowledged`, once per
//! configured age milestone. Queue-stuck interventions are raised on behalf of
//! the queue monitor and share the same registry.
//!
//! The manager only reads items; resetting attempt counters on a "reset"
//! decision is left to the caller (see `DecisionEffect`).

mod intervention;

pub use intervention::{humanize, Category, Decision, DecisionState, Intervention, Subject};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{Item, ItemKey};
use crate::pacing::TierPacing;
use crate::queue_monitor::QueueIssue;
use crate::tier::Tier;

/// Per-item escalation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EscalationState {
    #[default]
    Normal,
    UrgentPending,
    /// Urgent intervention dismissed; no re-escalation until attempts reset.
    Dismissed,
    MilestonePending { milestone_months: u32 },
    Acknowledged { milestone_months: u32 },
}

impl EscalationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationState::Normal => "normal",
            EscalationState::UrgentPending => "urgent-pending",
            EscalationState::Dismissed => "dismissed",
            EscalationState::MilestonePending { .. } => "milestone-pending",
            EscalationState::Acknowledged { .. } => "acknowledged",
        }
    }

    fn allows_urgent(&self) -> bool {
        matches!(
            self,
            EscalationState::Normal | EscalationState::Acknowledged { .. }
        )
    }

    fn allows_milestone(&self) -> bool {
        matches!(
            self,
            EscalationState::Normal
                | EscalationState::Dismissed
                | EscalationState::Acknowledged { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEscalation {
    pub state: EscalationState,
    /// Milestones (months) already notified, ascending.
    pub notified_milestones: Vec<u32>,
}

/// Side effects the caller must apply after a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEffect {
    pub intervention: Intervention,
    /// Reset the item's attempt counters (urgent + reset).
    pub reset_item: Option<ItemKey>,
}

/// Owns every `ItemEscalation` and `Intervention`.
#[derive(Debug, Default)]
pub struct EscalationManager {
    milestones: Vec<u32>,
    items: HashMap<ItemKey, ItemEscalation>,
    interventions: BTreeMap<String, Intervention>,
}

impl EscalationManager {
    pub fn new(milestones: Vec<u32>) -> Self {
        Self {
            milestones,
            ..Default::default()
        }
    }

    /// Load persisted state (startup).
    pub fn restore(
        &mut self,
        items: impl IntoIterator<Item = (ItemKey, ItemEscalation)>,
        interventions: impl IntoIterator<Item = Intervention>,
    ) {
        self.items.extend(items);
        for iv in interventions {
            self.interventions.insert(iv.id.clone(), iv);
        }
    }

    pub fn item_state(&self, key: &ItemKey) -> ItemEscalation {
        self.items.get(key).cloned().unwrap_or_default()
    }

    /// Evaluate `item` after a search (or a sync) and raise an intervention if a
    /// transition fires. Returns the new intervention, if any.
    pub fn evaluate(
        &mut self,
        item: &Item,
        tier: Tier,
        pacing: &TierPacing,
        now: DateTime<Utc>,
    ) -> Option<Intervention> {
        if item.found_at.is_some() {
            return None;
        }
        let entry = self.items.entry(item.key.clone()).or_default();

        if tier.escalates_on_failure() {
            let streak_long_enough = item
                .streak_started_at
                .is_some_and(|start| now - start >= pacing.escalation_window);
            if entry.state.allows_urgent()
                && item.attempt_count >= pacing.max_attempts
                && streak_long_enough
            {
                entry.state = EscalationState::UrgentPending;
                let since = item.streak_started_at;
                let detail = format!(
                    "searched {} times in {} without a find",
                    item.attempt_count,
                    humanize(since.map(|s| now - s).unwrap_or_default())
                );
                tracing::info!(item = %item.key, tier = %tier, "{}", detail);
                return Some(self.raise(
                    Category::Urgent,
                    Subject::Item {
                        key: item.key.clone(),
                    },
                    &item.title,
                    Some(tier),
                    item.attempt_count,
                    since,
                    detail,
                    now,
                ));
            }
            return None;
        }

        let months = item.age_days(now)? / 30;
        let reached = self
            .milestones
            .iter()
            .copied()
            .filter(|m| u64::from(*m) <= months)
            .filter(|m| !entry.notified_milestones.contains(m))
            .max()?;
        if !entry.state.allows_milestone() {
            return None;
        }
        for m in self.milestones.iter().copied().filter(|m| *m <= reached) {
            if !entry.notified_milestones.contains(&m) {
                entry.notified_milestones.push(m);
            }
        }
        entry.notified_milestones.sort_unstable();
        entry.state = EscalationState::MilestonePending {
            milestone_months: reached,
        };
        let detail = format!("missing {} months after release", reached);
        tracing::info!(item = %item.key, tier = %tier, "{}", detail);
        Some(self.raise(
            Category::LongMissing,
            Subject::Item {
                key: item.key.clone(),
            },
            &item.title,
            Some(tier),
            item.attempt_count,
            item.released_at,
            detail,
            now,
        ))
    }

    /// Raise a queue-stuck intervention for an escalated queue issue.
    pub fn raise_queue_stuck(&mut self, issue: &QueueIssue, now: DateTime<Utc>) -> Intervention {
        let detail = format!(
            "{} for {}",
            issue.kind.as_str(),
            humanize(now - issue.first_seen)
        );
        self.raise(
            Category::QueueStuck,
            Subject::Download {
                instance: issue.key.instance.clone(),
                download_id: issue.key.download_id.clone(),
            },
            &issue.title,
            None,
            0,
            Some(issue.first_seen),
            detail,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn raise(
        &mut self,
        category: Category,
        subject: Subject,
        title: &str,
        tier: Option<Tier>,
        attempt_count: u32,
        since: Option<DateTime<Utc>>,
        detail: String,
        now: DateTime<Utc>,
    ) -> Intervention {
        let id = Intervention::make_id(category, &subject);
        let iv = Intervention {
            id: id.clone(),
            category,
            subject,
            title: title.to_string(),
            created_at: now,
            tier,
            attempt_count,
            since,
            detail,
            decision: DecisionState::Pending,
            decided_at: None,
        };
        self.interventions.insert(id, iv.clone());
        iv
    }

    /// Record a human decision. Invalid or repeated decisions change nothing.
    pub fn decide(
        &mut self,
        id: &str,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<DecisionEffect, EngineError> {
        let iv = self
            .interventions
            .get(id)
            .ok_or_else(|| EngineError::UnknownIntervention(id.to_string()))?;
        if !iv.is_open() {
            return Err(EngineError::AlreadyDecided(id.to_string()));
        }
        if !iv.category.accepts(decision) {
            return Err(EngineError::InvalidDecision {
                category: iv.category.as_str(),
                decision: decision.as_str(),
            });
        }

        let mut reset_item = None;
        if let Subject::Item { key } = &iv.subject {
            let entry = self.items.entry(key.clone()).or_default();
            match (iv.category, decision) {
                (Category::Urgent, Decision::Reset) => {
                    entry.state = EscalationState::Normal;
                    reset_item = Some(key.clone());
                }
                (Category::Urgent, _) => entry.state = EscalationState::Dismissed,
                (Category::LongMissing, _) => {
                    let milestone_months = match entry.state {
                        EscalationState::MilestonePending { milestone_months } => milestone_months,
                        _ => entry.notified_milestones.last().copied().unwrap_or(0),
                    };
                    entry.state = EscalationState::Acknowledged { milestone_months };
                }
                (Category::QueueStuck, _) => {}
            }
        }

        let iv = self
            .interventions
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownIntervention(id.to_string()))?;
        iv.decision = decision.into();
        iv.decided_at = Some(now);
        tracing::info!(intervention = %id, "decision recorded: {}", decision);
        Ok(DecisionEffect {
            intervention: iv.clone(),
            reset_item,
        })
    }

    /// The item was found: drop its escalation state and every intervention
    /// about it. Returns the removed intervention ids.
    pub fn on_found(&mut self, key: &ItemKey) -> Vec<String> {
        self.items.remove(key);
        self.remove_where(|s| matches!(s, Subject::Item { key: k } if k == key))
    }

    /// A queue entry disappeared: drop its queue-stuck intervention.
    pub fn on_download_gone(&mut self, instance: &str, download_id: &str) -> Vec<String> {
        self.remove_where(|s| {
            matches!(s, Subject::Download { instance: i, download_id: d }
                if i == instance && d == download_id)
        })
    }

    fn remove_where(&mut self, pred: impl Fn(&Subject) -> bool) -> Vec<String> {
        let ids: Vec<String> = self
            .interventions
            .values()
            .filter(|iv| pred(&iv.subject))
            .map(|iv| iv.id.clone())
            .collect();
        for id in &ids {
            self.interventions.remove(id);
        }
        ids
    }

    pub fn get(&self, id: &str) -> Option<&Intervention> {
        self.interventions.get(id)
    }

    /// Pending interventions, oldest first.
    pub fn open(&self) -> Vec<Intervention> {
        let mut out: Vec<Intervention> = self
            .interventions
            .values()
            .filter(|iv| iv.is_open())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn all(&self) -> impl Iterator<Item = &Intervention> {
        self.interventions.values()
    }
}
