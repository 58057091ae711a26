//! Per-cycle batch selection under a capacity limit.
//!
//! Capacity is split across tiers by weight, shortfalls cascade from hot
//! toward cold, and whatever is still unspent is filled from leftovers in
//! priority order. The result size is always `min(capacity, eligible)`.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::ItemKey;
use crate::pacing::DistributionPolicy;
use crate::tier::Tier;

/// An eligible item as the selector sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: ItemKey,
    pub tier: Tier,
    pub last_searched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Selector {
    policy: DistributionPolicy,
    randomize: bool,
}

impl Selector {
    pub fn new(policy: DistributionPolicy, randomize: bool) -> Self {
        Self { policy, randomize }
    }

    /// Per-tier targets for `capacity`, indexed by `Tier::index`. Sums to
    /// `capacity` whenever any weight is non-zero.
    pub fn targets(&self, capacity: usize) -> [usize; 4] {
        let total = self.policy.total();
        let mut targets = [0usize; 4];
        if total == 0 || capacity == 0 {
            return targets;
        }
        let cap = capacity as u64;
        for tier in Tier::ALL {
            let w = u64::from(self.policy.weight(tier));
            // round(cap * w / total), halves up
            targets[tier.index()] = ((2 * cap * w + total) / (2 * total)) as usize;
        }
        let sum: usize = targets.iter().sum();
        if sum < capacity {
            targets[Tier::Hot.index()] += capacity - sum;
        } else if sum > capacity {
            let mut excess = sum - capacity;
            for tier in Tier::ALL.into_iter().rev() {
                let cut = excess.min(targets[tier.index()]);
                targets[tier.index()] -= cut;
                excess -= cut;
                if excess == 0 {
                    break;
                }
            }
        }
        targets
    }

    /// Pick up to `capacity` candidates, hot tier first.
    pub fn select<R: Rng + ?Sized>(
        &self,
        candidates: Vec<Candidate>,
        capacity: usize,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let mut by_tier: [Vec<Candidate>; 4] = Default::default();
        for c in candidates {
            by_tier[c.tier.index()].push(c);
        }
        for bucket in by_tier.iter_mut() {
            // Never-searched first, then oldest search, then identity.
            bucket.sort_by(|a, b| {
                a.last_searched_at
                    .cmp(&b.last_searched_at)
                    .then_with(|| a.key.cmp(&b.key))
            });
            if self.randomize {
                bucket.shuffle(rng);
            }
        }

        let targets = self.targets(capacity);
        let mut taken = [0usize; 4];
        let mut carry = 0usize;
        for tier in Tier::ALL {
            let i = tier.index();
            let want = targets[i] + carry;
            taken[i] = want.min(by_tier[i].len());
            carry = want - taken[i];
        }

        let mut remaining = capacity.saturating_sub(taken.iter().sum());
        for tier in Tier::ALL {
            if remaining == 0 {
                break;
            }
            let i = tier.index();
            let extra = remaining.min(by_tier[i].len() - taken[i]);
            taken[i] += extra;
            remaining -= extra;
        }

        let mut out = Vec::with_capacity(taken.iter().sum());
        for (bucket, n) in by_tier.into_iter().zip(taken) {
            out.extend(bucket.into_iter().take(n));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidates(counts: [usize; 4]) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut id = 0;
        for tier in Tier::ALL {
            for _ in 0..counts[tier.index()] {
                id += 1;
                out.push(Candidate {
                    key: ItemKey::new("tv", MediaType::Episode, id),
                    tier,
                    last_searched_at: None,
                });
            }
        }
        out
    }

    fn per_tier(selected: &[Candidate]) -> [usize; 4] {
        let mut counts = [0; 4];
        for c in selected {
            counts[c.tier.index()] += 1;
        }
        counts
    }

    #[test]
    fn shortfall_cascades_to_next_tier() {
        let selector = Selector::new(DistributionPolicy::default(), false);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = selector.select(candidates([2, 10, 10, 10]), 10, &mut rng);
        assert_eq!(per_tier(&picked), [2, 5, 2, 1]);
    }

    #[test]
    fn rounding_remainder_goes_to_hot() {
        let selector = Selector::new(DistributionPolicy::default(), false);
        // 7 * (40, 30, 20, 10)% = 2.8, 2.1, 1.4, 0.7 -> 3, 2, 1, 1
        assert_eq!(selector.targets(7), [3, 2, 1, 1]);
        let even = Selector::new(
            DistributionPolicy {
                hot: 1,
                warm: 1,
                cool: 1,
                cold: 0,
            },
            false,
        );
        // 3.33 each rounds to 3; the leftover slot goes to hot.
        assert_eq!(even.targets(10), [4, 3, 3, 0]);
        // 0.5 each rounds up to 1 for every tier; cold gives back first.
        let halves = Selector::new(
            DistributionPolicy {
                hot: 1,
                warm: 1,
                cool: 1,
                cold: 1,
            },
            false,
        );
        assert_eq!(halves.targets(2), [1, 1, 0, 0]);
    }

    #[test]
    fn never_exceeds_capacity_nor_undershoots() {
        let policies = [
            DistributionPolicy::default(),
            DistributionPolicy {
                hot: 0,
                warm: 0,
                cool: 0,
                cold: 0,
            },
            DistributionPolicy {
                hot: 0,
                warm: 0,
                cool: 0,
                cold: 5,
            },
            DistributionPolicy {
                hot: 7,
                warm: 13,
                cool: 0,
                cold: 1,
            },
        ];
        let shapes = [[0, 0, 0, 0], [1, 0, 0, 0], [0, 0, 0, 9], [3, 1, 4, 1], [20, 20, 20, 20]];
        let mut rng = StdRng::seed_from_u64(7);
        for policy in policies {
            for randomize in [false, true] {
                let selector = Selector::new(policy, randomize);
                for shape in shapes {
                    let total: usize = shape.iter().sum();
                    for capacity in 0..25 {
                        let picked = selector.select(candidates(shape), capacity, &mut rng);
                        assert_eq!(picked.len(), capacity.min(total), "{policy:?} {shape:?} {capacity}");
                    }
                }
            }
        }
    }

    #[test]
    fn deterministic_order_prefers_never_then_oldest() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mk = |id, last: Option<DateTime<Utc>>| Candidate {
            key: ItemKey::new("movies", MediaType::Movie, id),
            tier: Tier::Cool,
            last_searched_at: last,
        };
        let selector = Selector::new(DistributionPolicy::default(), false);
        let mut rng = StdRng::seed_from_u64(3);
        let picked = selector.select(
            vec![
                mk(1, Some(now - Duration::hours(1))),
                mk(2, Some(now - Duration::hours(5))),
                mk(3, None),
                mk(4, Some(now - Duration::hours(5))),
            ],
            3,
            &mut rng,
        );
        let ids: Vec<i64> = picked.iter().map(|c| c.key.external_id).collect();
        assert_eq!(ids, vec![3, 2, 4]);
    }

    #[test]
    fn randomized_selection_reaches_every_item() {
        let selector = Selector::new(DistributionPolicy::default(), true);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            for c in selector.select(candidates([10, 0, 0, 0]), 2, &mut rng) {
                seen.insert(c.key.external_id);
            }
        }
        assert_eq!(seen.len(), 10);
    }
}
