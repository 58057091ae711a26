//! Pacing presets and the per-cycle distribution policy.
//!
//! A preset bundles per-tier cooldowns and attempt thresholds calibrated to a
//! daily API budget. Presets are immutable once built; `Settings` owns the
//! active one.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::{config_minutes, ConfigError, TierPacingOverride};
use crate::tier::Tier;

/// Named preset, or `Auto` to derive one from the daily API limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    #[default]
    Auto,
    Steady,
    Fast,
    Faster,
    Blazing,
}

impl PresetName {
    /// Resolve `Auto` against the daily API limit.
    pub fn resolve(self, daily_api_limit: u32) -> PresetName {
        match self {
            PresetName::Auto => match daily_api_limit {
                0..=500 => PresetName::Steady,
                501..=2000 => PresetName::Fast,
                2001..=5000 => PresetName::Faster,
                _ => PresetName::Blazing,
            },
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Auto => "auto",
            PresetName::Steady => "steady",
            PresetName::Fast => "fast",
            PresetName::Faster => "faster",
            PresetName::Blazing => "blazing",
        }
    }
}

/// Pacing for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPacing {
    /// Cooldown while `attempt_count < max_attempts`.
    pub cooldown: Duration,
    /// Attempts before the secondary cooldown (and, for hot/warm, escalation) applies.
    pub max_attempts: u32,
    /// Cooldown once `max_attempts` has been reached.
    pub secondary_cooldown: Duration,
    /// Minimum age of the current attempt streak before an urgent escalation.
    pub escalation_window: Duration,
}

impl TierPacing {
    fn minutes(cooldown: i64, max_attempts: u32, secondary: i64) -> Self {
        Self {
            cooldown: Duration::minutes(cooldown),
            max_attempts,
            secondary_cooldown: Duration::minutes(secondary),
            escalation_window: Duration::minutes(cooldown * i64::from(max_attempts)),
        }
    }

    fn apply(mut self, tier: Tier, o: &TierPacingOverride) -> Result<Self, ConfigError> {
        let field = |name: &str| format!("pacing_overrides.{}.{}", tier.as_str(), name);
        if let Some(m) = o.cooldown_minutes {
            self.cooldown = config_minutes(field("cooldown_minutes"), m)?;
        }
        if let Some(n) = o.max_attempts {
            if n == 0 {
                return Err(ConfigError::MaxAttemptsZero(tier));
            }
            self.max_attempts = n;
        }
        if let Some(m) = o.secondary_cooldown_minutes {
            self.secondary_cooldown = config_minutes(field("secondary_cooldown_minutes"), m)?;
        }
        self.escalation_window = match o.escalation_window_minutes {
            Some(m) => config_minutes(field("escalation_window_minutes"), m)?,
            None => {
                // cooldown x max_attempts; the cooldown is already in range.
                let minutes = u64::try_from(self.cooldown.num_minutes())
                    .ok()
                    .and_then(|m| m.checked_mul(u64::from(self.max_attempts)))
                    .unwrap_or(u64::MAX);
                config_minutes(field("escalation_window_minutes"), minutes)?
            }
        };
        Ok(self)
    }
}

/// Per-tier pacing table plus the default cycle cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPreset {
    pub name: PresetName,
    tiers: [TierPacing; 4],
    /// Default search-cycle interval for this preset.
    pub cycle_interval: Duration,
}

impl PacingPreset {
    /// Built-in table for a concrete preset name (`Auto` must be resolved first;
    /// it falls back to `Steady`).
    pub fn builtin(name: PresetName) -> Self {
        let p = TierPacing::minutes;
        let (tiers, cycle) = match name {
            PresetName::Auto | PresetName::Steady => (
                [p(60, 24, 360), p(360, 8, 1440), p(10080, 4, 43200), p(43200, 3, 129600)],
                60,
            ),
            PresetName::Fast => (
                [p(30, 16, 180), p(180, 8, 720), p(4320, 7, 20160), p(20160, 4, 43200)],
                30,
            ),
            PresetName::Faster => (
                [p(15, 16, 60), p(60, 8, 360), p(1440, 7, 10080), p(10080, 4, 20160)],
                15,
            ),
            PresetName::Blazing => (
                [p(10, 12, 30), p(30, 8, 180), p(360, 14, 4320), p(4320, 10, 10080)],
                10,
            ),
        };
        let name = match name {
            PresetName::Auto => PresetName::Steady,
            other => other,
        };
        Self {
            name,
            tiers,
            cycle_interval: Duration::minutes(cycle),
        }
    }

    /// Build a preset from explicit per-tier pacing (hot, warm, cool, cold).
    pub fn custom(tiers: [TierPacing; 4], cycle_interval: Duration) -> Result<Self, ConfigError> {
        for tier in Tier::ALL {
            if tiers[tier.index()].max_attempts == 0 {
                return Err(ConfigError::MaxAttemptsZero(tier));
            }
        }
        Ok(Self {
            name: PresetName::Auto,
            tiers,
            cycle_interval,
        })
    }

    /// Apply a config override to one tier.
    pub fn with_override(
        mut self,
        tier: Tier,
        o: &TierPacingOverride,
    ) -> Result<Self, ConfigError> {
        self.tiers[tier.index()] = self.tiers[tier.index()].apply(tier, o)?;
        Ok(self)
    }

    pub fn tier(&self, tier: Tier) -> &TierPacing {
        &self.tiers[tier.index()]
    }
}

/// Relative share of each selection batch per tier. Weights need not sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPolicy {
    pub hot: u32,
    pub warm: u32,
    pub cool: u32,
    pub cold: u32,
}

impl DistributionPolicy {
    pub fn weight(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Hot => self.hot,
            Tier::Warm => self.warm,
            Tier::Cool => self.cool,
            Tier::Cold => self.cold,
        }
    }

    pub fn total(&self) -> u64 {
        Tier::ALL.iter().map(|t| u64::from(self.weight(*t))).sum()
    }
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self {
            hot: 40,
            warm: 30,
            cool: 20,
            cold: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_preset_follows_daily_limit() {
        assert_eq!(PresetName::Auto.resolve(100), PresetName::Steady);
        assert_eq!(PresetName::Auto.resolve(500), PresetName::Steady);
        assert_eq!(PresetName::Auto.resolve(501), PresetName::Fast);
        assert_eq!(PresetName::Auto.resolve(2000), PresetName::Fast);
        assert_eq!(PresetName::Auto.resolve(5000), PresetName::Faster);
        assert_eq!(PresetName::Auto.resolve(5001), PresetName::Blazing);
        assert_eq!(PresetName::Fast.resolve(100), PresetName::Fast);
    }

    #[test]
    fn fast_hot_pacing_matches_table() {
        let preset = PacingPreset::builtin(PresetName::Fast);
        let hot = preset.tier(Tier::Hot);
        assert_eq!(hot.cooldown, Duration::minutes(30));
        assert_eq!(hot.max_attempts, 16);
        assert_eq!(hot.escalation_window, Duration::hours(8));
        assert_eq!(preset.cycle_interval, Duration::minutes(30));
    }

    #[test]
    fn secondary_cooldown_is_slower_in_every_builtin() {
        for name in [
            PresetName::Steady,
            PresetName::Fast,
            PresetName::Faster,
            PresetName::Blazing,
        ] {
            let preset = PacingPreset::builtin(name);
            for tier in Tier::ALL {
                let p = preset.tier(tier);
                assert!(p.max_attempts >= 1);
                assert!(p.secondary_cooldown > p.cooldown, "{:?} {:?}", name, tier);
            }
        }
    }

    #[test]
    fn override_recomputes_window_and_rejects_zero_attempts() {
        let preset = PacingPreset::builtin(PresetName::Steady)
            .with_override(
                Tier::Warm,
                &TierPacingOverride {
                    cooldown_minutes: Some(10),
                    max_attempts: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(preset.tier(Tier::Warm).escalation_window, Duration::minutes(30));

        let err = PacingPreset::builtin(PresetName::Steady).with_override(
            Tier::Cold,
            &TierPacingOverride {
                max_attempts: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(ConfigError::MaxAttemptsZero(Tier::Cold))));
    }

    #[test]
    fn derived_window_that_overflows_is_rejected() {
        // Each value is in range; their product is not.
        let err = PacingPreset::builtin(PresetName::Steady).with_override(
            Tier::Cool,
            &TierPacingOverride {
                cooldown_minutes: Some(crate::config::MAX_CONFIG_MINUTES),
                max_attempts: Some(u32::MAX),
                ..Default::default()
            },
        );
        match err {
            Err(ConfigError::DurationOutOfRange { field, .. }) => {
                assert_eq!(field, "pacing_overrides.cool.escalation_window_minutes")
            }
            other => panic!("expected DurationOutOfRange, got {:?}", other),
        }

        let ok = PacingPreset::builtin(PresetName::Steady)
            .with_override(
                Tier::Cool,
                &TierPacingOverride {
                    cooldown_minutes: Some(crate::config::MAX_CONFIG_MINUTES),
                    max_attempts: Some(u32::MAX),
                    escalation_window_minutes: Some(60),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ok.tier(Tier::Cool).escalation_window, Duration::hours(1));
        assert!(ok.tier(Tier::Cool).cooldown > Duration::zero());
    }
}
