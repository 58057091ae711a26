//! Per-item cooldown and attempt bookkeeping.
//!
//! This is the only place that mutates `last_searched_at`, `attempt_count` and
//! `streak_started_at`. Eligibility is evaluated against the tier the item is in
//! *now*, so items age into slower cadences without migration.

use chrono::{DateTime, Duration, Utc};

use crate::model::Item;
use crate::pacing::PacingPreset;
use crate::tier::{Tier, TierConfig};

/// Tier-aware cooldown policy.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    tiers: TierConfig,
    pacing: PacingPreset,
}

impl CooldownTracker {
    pub fn new(tiers: TierConfig, pacing: PacingPreset) -> Self {
        Self { tiers, pacing }
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    pub fn pacing(&self) -> &PacingPreset {
        &self.pacing
    }

    /// Tier of `item` at `now`.
    pub fn tier_of(&self, item: &Item, now: DateTime<Utc>) -> Tier {
        self.tiers.classify_age(item.age_days(now))
    }

    /// Cooldown that applies after `attempt_count` attempts in `tier`.
    /// Past `max_attempts` the slower secondary cooldown applies, forever.
    pub fn cooldown(&self, tier: Tier, attempt_count: u32) -> Duration {
        let p = self.pacing.tier(tier);
        if attempt_count < p.max_attempts {
            p.cooldown
        } else {
            p.secondary_cooldown
        }
    }

    /// Whether `item` may be searched at `now`. Boundary inclusive.
    pub fn is_eligible(&self, item: &Item, now: DateTime<Utc>) -> bool {
        if item.in_flight || item.found_at.is_some() {
            return false;
        }
        match item.last_searched_at {
            None => true,
            Some(last) => {
                let tier = self.tier_of(item, now);
                now - last >= self.cooldown(tier, item.attempt_count)
            }
        }
    }

    /// Earliest time `item` becomes eligible; `None` if it already is (or is never-searched).
    pub fn next_eligible_at(&self, item: &Item, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let last = item.last_searched_at?;
        let at = last + self.cooldown(self.tier_of(item, now), item.attempt_count);
        (at > now).then_some(at)
    }
}

/// An executed search (successful or provider error): one more attempt.
pub fn record_attempt(item: &mut Item, now: DateTime<Utc>) {
    item.attempt_count = item.attempt_count.saturating_add(1);
    item.last_searched_at = Some(now);
    if item.streak_started_at.is_none() {
        item.streak_started_at = Some(now);
    }
}

/// A group search already covered this item; restart its cooldown without
/// counting an attempt.
pub fn record_covered(item: &mut Item, now: DateTime<Utc>) {
    item.last_searched_at = Some(now);
}

/// Human "reset & try again": the item is eligible again immediately.
pub fn reset(item: &mut Item) {
    item.attempt_count = 0;
    item.last_searched_at = None;
    item.streak_started_at = None;
}

/// The item left the wanted snapshots.
pub fn mark_found(item: &mut Item, now: DateTime<Utc>) {
    item.found_at = Some(now);
    item.attempt_count = 0;
    item.streak_started_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemSnapshot, MediaType, SearchKind};
    use crate::pacing::PresetName;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn tracker() -> CooldownTracker {
        CooldownTracker::new(
            TierConfig::new(0, 8, 31, 91).unwrap(),
            PacingPreset::builtin(PresetName::Fast),
        )
    }

    fn hot_item() -> Item {
        let snap = ItemSnapshot {
            external_id: 1,
            media_type: MediaType::Episode,
            title: "Show - S02E03".into(),
            released_at: Some(now() - Duration::days(2)),
            group_id: Some(9),
        };
        Item::from_snapshot("tv", &snap, SearchKind::Missing, now() - Duration::days(1))
    }

    #[test]
    fn never_searched_items_are_eligible() {
        assert!(tracker().is_eligible(&hot_item(), now()));
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let t = tracker();
        let mut item = hot_item();
        item.attempt_count = 1;
        item.last_searched_at = Some(now() - Duration::minutes(30) + Duration::seconds(1));
        assert!(!t.is_eligible(&item, now()));
        item.last_searched_at = Some(now() - Duration::minutes(30));
        assert!(t.is_eligible(&item, now()));
    }

    #[test]
    fn secondary_cooldown_applies_past_max_attempts() {
        let t = tracker();
        let mut item = hot_item();
        item.attempt_count = 16;
        item.last_searched_at = Some(now() - Duration::minutes(60));
        assert!(!t.is_eligible(&item, now()));
        assert_eq!(
            t.next_eligible_at(&item, now()),
            Some(now() + Duration::minutes(120))
        );
        item.last_searched_at = Some(now() - Duration::minutes(180));
        assert!(t.is_eligible(&item, now()));
    }

    #[test]
    fn in_flight_items_are_never_eligible() {
        let mut item = hot_item();
        item.in_flight = true;
        assert!(!tracker().is_eligible(&item, now()));
    }

    #[test]
    fn attempts_streak_and_reset() {
        let mut item = hot_item();
        record_attempt(&mut item, now());
        record_attempt(&mut item, now() + Duration::minutes(30));
        assert_eq!(item.attempt_count, 2);
        assert_eq!(item.streak_started_at, Some(now()));
        assert_eq!(item.last_searched_at, Some(now() + Duration::minutes(30)));

        record_covered(&mut item, now() + Duration::hours(2));
        assert_eq!(item.attempt_count, 2);

        reset(&mut item);
        assert_eq!(item.attempt_count, 0);
        assert!(item.last_searched_at.is_none());
        assert!(item.streak_started_at.is_none());
        assert!(tracker().is_eligible(&item, now()));
    }
}
