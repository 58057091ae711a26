//! Age-based priority tiers.
//!
//! Tiers partition the age axis `[0, ∞)` by lower bound: an age belongs to the
//! last tier whose lower bound is `<=` the age. Tier is recomputed every cycle
//! and never stored on the item.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Priority bucket, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cool,
    Cold,
}

impl Tier {
    /// All tiers in priority order (hot first).
    pub const ALL: [Tier; 4] = [Tier::Hot, Tier::Warm, Tier::Cool, Tier::Cold];

    /// Position in priority order; usable as an index into per-tier arrays.
    pub fn index(self) -> usize {
        match self {
            Tier::Hot => 0,
            Tier::Warm => 1,
            Tier::Cool => 2,
            Tier::Cold => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cool => "cool",
            Tier::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(Tier::Hot),
            "warm" => Some(Tier::Warm),
            "cool" => Some(Tier::Cool),
            "cold" => Some(Tier::Cold),
            _ => None,
        }
    }

    /// Hot and warm tiers escalate on failing retries; cool and cold get milestones.
    pub fn escalates_on_failure(self) -> bool {
        matches!(self, Tier::Hot | Tier::Warm)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated tier lower bounds in days, indexed by `Tier::index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    lower_bounds: [u64; 4],
}

impl TierConfig {
    /// Build from the four lower bounds. Hot must start at 0 and bounds must be
    /// strictly increasing so the tiers cover every age exactly once.
    pub fn new(hot: u64, warm: u64, cool: u64, cold: u64) -> Result<Self, ConfigError> {
        if hot != 0 {
            return Err(ConfigError::HotTierMustStartAtZero(hot));
        }
        let lower_bounds = [hot, warm, cool, cold];
        for pair in lower_bounds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::TierBoundsNotIncreasing {
                    bounds: lower_bounds,
                });
            }
        }
        Ok(Self { lower_bounds })
    }

    pub fn lower_bound(&self, tier: Tier) -> u64 {
        self.lower_bounds[tier.index()]
    }

    /// Exclusive upper bound of `tier`; `None` for cold.
    pub fn upper_bound(&self, tier: Tier) -> Option<u64> {
        self.lower_bounds.get(tier.index() + 1).copied()
    }

    /// Classify an age in days. Lower bounds are inclusive.
    pub fn classify(&self, age_days: u64) -> Tier {
        Tier::ALL
            .into_iter()
            .rev()
            .find(|t| age_days >= self.lower_bound(*t))
            .unwrap_or(Tier::Hot)
    }

    /// Classify an optional age; undated items are treated as the oldest content.
    pub fn classify_age(&self, age_days: Option<u64>) -> Tier {
        match age_days {
            Some(age) => self.classify(age),
            None => Tier::Cold,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            lower_bounds: [0, 91, 366, 1096],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_ages_belong_to_the_tier_they_start() {
        let tiers = TierConfig::new(0, 8, 31, 91).unwrap();
        assert_eq!(tiers.classify(0), Tier::Hot);
        assert_eq!(tiers.classify(7), Tier::Hot);
        assert_eq!(tiers.classify(8), Tier::Warm);
        assert_eq!(tiers.classify(10), Tier::Warm);
        assert_eq!(tiers.classify(30), Tier::Warm);
        assert_eq!(tiers.classify(31), Tier::Cool);
        assert_eq!(tiers.classify(90), Tier::Cool);
        assert_eq!(tiers.classify(91), Tier::Cold);
        assert_eq!(tiers.classify(100_000), Tier::Cold);
    }

    #[test]
    fn tiers_partition_the_age_axis() {
        let tiers = TierConfig::new(0, 8, 31, 91).unwrap();
        let mut previous = Tier::Hot;
        for age in 0..500u64 {
            let tier = tiers.classify(age);
            // Exactly one tier owns the age, and the owning tier's range contains it.
            assert!(age >= tiers.lower_bound(tier));
            if let Some(upper) = tiers.upper_bound(tier) {
                assert!(age < upper);
            }
            // Tiers only ever move to lower priority as age grows, one step at a time.
            assert!(tier.index() == previous.index() || tier.index() == previous.index() + 1);
            previous = tier;
        }
        assert_eq!(previous, Tier::Cold);
    }

    #[test]
    fn invalid_bounds_fail_fast() {
        assert!(matches!(
            TierConfig::new(1, 8, 31, 91),
            Err(ConfigError::HotTierMustStartAtZero(1))
        ));
        assert!(matches!(
            TierConfig::new(0, 31, 31, 91),
            Err(ConfigError::TierBoundsNotIncreasing { .. })
        ));
        assert!(matches!(
            TierConfig::new(0, 40, 31, 91),
            Err(ConfigError::TierBoundsNotIncreasing { .. })
        ));
    }

    #[test]
    fn undated_items_are_cold() {
        let tiers = TierConfig::default();
        assert_eq!(tiers.classify_age(None), Tier::Cold);
        assert_eq!(tiers.classify_age(Some(3)), Tier::Hot);
        assert_eq!(tiers.classify_age(Some(91)), Tier::Warm);
    }
}
