use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::budget::QuietHours;
use crate::model::MediaType;
use crate::pacing::{DistributionPolicy, PacingPreset, PresetName};
use crate::queue_monitor::IssueKind;
use crate::tier::{Tier, TierConfig};

/// Configuration invariant violations. Raised at load time, never mid-run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("hot tier must start at 0 days (got {0})")]
    HotTierMustStartAtZero(u64),
    #[error("tier lower bounds must be strictly increasing (got {bounds:?})")]
    TierBoundsNotIncreasing { bounds: [u64; 4] },
    #[error("daily_api_limit must be at least 1")]
    ZeroDailyLimit,
    #[error("quiet hours must be within 0..=23 (got {start}..{end})")]
    InvalidQuietHours { start: u32, end: u32 },
    #[error("max_attempts for the {0} tier must be at least 1")]
    MaxAttemptsZero(Tier),
    #[error("milestone months must be positive and strictly increasing (got {0:?})")]
    InvalidMilestones(Vec<u32>),
    #[error("cycle intervals must be at least one minute")]
    ZeroInterval,
    #[error("duplicate instance name {0:?}")]
    DuplicateInstance(String),
    #[error("utc_offset_minutes must be within -1439..=1439 (got {0})")]
    InvalidUtcOffset(i32),
    #[error("{field} = {value} is out of range (at most 100 years)")]
    DurationOutOfRange { field: String, value: u64 },
}

/// Longest duration accepted anywhere in the config: 100 years.
pub const MAX_CONFIG_MINUTES: u64 = 100 * 366 * 24 * 60;

/// Convert a configured minute count, rejecting anything past `MAX_CONFIG_MINUTES`.
pub(crate) fn config_minutes(
    field: impl Into<String>,
    value: u64,
) -> Result<Duration, ConfigError> {
    let out_of_range = |field: String| ConfigError::DurationOutOfRange { field, value };
    let field = field.into();
    if value > MAX_CONFIG_MINUTES {
        return Err(out_of_range(field));
    }
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_minutes)
        .ok_or_else(|| out_of_range(field))
}

/// Tier lower bounds in days (`[tiers]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    pub hot_min_days: u64,
    pub warm_min_days: u64,
    pub cool_min_days: u64,
    pub cold_min_days: u64,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            hot_min_days: 0,
            warm_min_days: 91,
            cool_min_days: 366,
            cold_min_days: 1096,
        }
    }
}

/// Optional quiet window (`[quiet_hours]`), in local hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 2,
            end_hour: 7,
        }
    }
}

/// Stuck-queue remediation (`[auto_resolve]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResolveConfig {
    pub enabled: bool,
    /// Minutes an issue must persist before auto-resolution.
    pub grace_minutes: u64,
    /// Minutes between queue polls.
    pub poll_interval_minutes: u64,
    /// Issue kinds never auto-resolved (treated as manual-only).
    #[serde(default)]
    pub disabled_kinds: Vec<IssueKind>,
}

impl Default for AutoResolveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_minutes: 30,
            poll_interval_minutes: 5,
            disabled_kinds: Vec::new(),
        }
    }
}

/// Partial per-tier pacing override (`[pacing_overrides.<tier>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierPacingOverride {
    #[serde(default)]
    pub cooldown_minutes: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub secondary_cooldown_minutes: Option<u64>,
    #[serde(default)]
    pub escalation_window_minutes: Option<u64>,
}

/// Per-tier overrides; any tier may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacingOverrides {
    #[serde(default)]
    pub hot: Option<TierPacingOverride>,
    #[serde(default)]
    pub warm: Option<TierPacingOverride>,
    #[serde(default)]
    pub cool: Option<TierPacingOverride>,
    #[serde(default)]
    pub cold: Option<TierPacingOverride>,
}

impl PacingOverrides {
    fn get(&self, tier: Tier) -> Option<&TierPacingOverride> {
        match tier {
            Tier::Hot => self.hot.as_ref(),
            Tier::Warm => self.warm.as_ref(),
            Tier::Cool => self.cool.as_ref(),
            Tier::Cold => self.cold.as_ref(),
        }
    }
}

/// One upstream instance (`[[instances]]`). Connection details belong to the
/// collaborator that implements the upstream, not to this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub media_type: MediaType,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Global configuration loaded from `~/.config/tierwatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierwatchConfig {
    /// Hard ceiling on search calls per local day. The main tuning knob.
    pub daily_api_limit: u32,
    /// Items searched per cycle; derived from the daily limit when missing.
    #[serde(default)]
    pub searches_per_cycle: Option<u32>,
    /// Minutes between search cycles; the preset's cadence when missing.
    #[serde(default)]
    pub cycle_interval_minutes: Option<u64>,
    /// Shuffle within a tier instead of oldest-searched-first.
    pub randomize_selection: bool,
    /// Suppress repeat searches of the same group (series) within `group_dedup_hours`.
    pub prefer_group_search: bool,
    pub group_dedup_hours: u64,
    /// Search records kept.
    pub history_cap: usize,
    /// Find records kept.
    pub finds_cap: usize,
    #[serde(default)]
    pub pacing: PresetName,
    /// Long-missing notification milestones, in months since release.
    pub milestone_months: Vec<u32>,
    /// Fixed offset for the budget day and quiet hours; the system zone when missing.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub distribution: DistributionPolicy,
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub auto_resolve: AutoResolveConfig,
    #[serde(default)]
    pub pacing_overrides: PacingOverrides,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl Default for TierwatchConfig {
    fn default() -> Self {
        Self {
            daily_api_limit: 500,
            searches_per_cycle: None,
            cycle_interval_minutes: None,
            randomize_selection: true,
            prefer_group_search: true,
            group_dedup_hours: 6,
            history_cap: 500,
            finds_cap: 100,
            pacing: PresetName::Auto,
            milestone_months: vec![1, 3, 6, 12, 18, 24],
            utc_offset_minutes: None,
            tiers: TiersConfig::default(),
            distribution: DistributionPolicy::default(),
            quiet_hours: QuietHoursConfig::default(),
            auto_resolve: AutoResolveConfig::default(),
            pacing_overrides: PacingOverrides::default(),
            instances: Vec::new(),
        }
    }
}

/// Validated, immutable runtime policy built from `TierwatchConfig`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tiers: TierConfig,
    pub pacing: PacingPreset,
    pub distribution: DistributionPolicy,
    pub daily_api_limit: u32,
    pub searches_per_cycle: u32,
    pub search_interval: Duration,
    pub queue_interval: Duration,
    pub randomize_selection: bool,
    pub prefer_group_search: bool,
    pub group_dedup_window: Duration,
    pub history_cap: usize,
    pub finds_cap: usize,
    pub milestone_months: Vec<u32>,
    pub quiet_hours: Option<QuietHours>,
    /// `None` means the system's local zone.
    pub utc_offset: Option<FixedOffset>,
    pub auto_resolve_enabled: bool,
    pub grace_period: Duration,
    pub disabled_kinds: Vec<IssueKind>,
    pub instances: Vec<InstanceConfig>,
}

impl Settings {
    /// Validate `cfg` and derive runtime values. Fails fast on any invariant violation.
    pub fn from_config(cfg: &TierwatchConfig) -> Result<Self, ConfigError> {
        if cfg.daily_api_limit == 0 {
            return Err(ConfigError::ZeroDailyLimit);
        }
        let tiers = TierConfig::new(
            cfg.tiers.hot_min_days,
            cfg.tiers.warm_min_days,
            cfg.tiers.cool_min_days,
            cfg.tiers.cold_min_days,
        )?;

        let mut pacing = PacingPreset::builtin(cfg.pacing.resolve(cfg.daily_api_limit));
        for tier in Tier::ALL {
            if let Some(o) = cfg.pacing_overrides.get(tier) {
                pacing = pacing.with_override(tier, o)?;
            }
        }

        let search_interval = match cfg.cycle_interval_minutes {
            Some(0) => return Err(ConfigError::ZeroInterval),
            Some(m) => config_minutes("cycle_interval_minutes", m)?,
            None => pacing.cycle_interval,
        };
        if cfg.auto_resolve.poll_interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let queue_interval = config_minutes(
            "auto_resolve.poll_interval_minutes",
            cfg.auto_resolve.poll_interval_minutes,
        )?;
        let grace_period =
            config_minutes("auto_resolve.grace_minutes", cfg.auto_resolve.grace_minutes)?;
        let group_dedup_window = match cfg.group_dedup_hours.checked_mul(60) {
            Some(m) => config_minutes("group_dedup_hours", m)?,
            None => {
                return Err(ConfigError::DurationOutOfRange {
                    field: "group_dedup_hours".into(),
                    value: cfg.group_dedup_hours,
                })
            }
        };

        let searches_per_cycle = cfg
            .searches_per_cycle
            .unwrap_or_else(|| {
                let minutes = u64::try_from(search_interval.num_minutes()).unwrap_or(0);
                let per_day = u64::from(cfg.daily_api_limit).saturating_mul(minutes);
                per_day.div_ceil(24 * 60).min(u64::from(u32::MAX)) as u32
            })
            .max(1);

        if cfg.milestone_months.first() == Some(&0)
            || cfg.milestone_months.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(ConfigError::InvalidMilestones(cfg.milestone_months.clone()));
        }

        let quiet_hours = if cfg.quiet_hours.enabled {
            Some(QuietHours::new(
                cfg.quiet_hours.start_hour,
                cfg.quiet_hours.end_hour,
            )?)
        } else {
            None
        };

        let utc_offset = match cfg.utc_offset_minutes {
            Some(m) => Some(
                FixedOffset::east_opt(m.saturating_mul(60))
                    .ok_or(ConfigError::InvalidUtcOffset(m))?,
            ),
            None => None,
        };

        let mut seen = HashSet::new();
        for inst in &cfg.instances {
            if !seen.insert(inst.name.as_str()) {
                return Err(ConfigError::DuplicateInstance(inst.name.clone()));
            }
        }

        Ok(Self {
            tiers,
            pacing,
            distribution: cfg.distribution,
            daily_api_limit: cfg.daily_api_limit,
            searches_per_cycle,
            search_interval,
            queue_interval,
            randomize_selection: cfg.randomize_selection,
            prefer_group_search: cfg.prefer_group_search,
            group_dedup_window,
            history_cap: cfg.history_cap.max(1),
            finds_cap: cfg.finds_cap.max(1),
            milestone_months: cfg.milestone_months.clone(),
            quiet_hours,
            utc_offset,
            auto_resolve_enabled: cfg.auto_resolve.enabled,
            grace_period,
            disabled_kinds: cfg.auto_resolve.disabled_kinds.clone(),
            instances: cfg.instances.iter().filter(|i| i.enabled).cloned().collect(),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        // The default config always validates.
        match Settings::from_config(&TierwatchConfig::default()) {
            Ok(s) => s,
            Err(e) => unreachable!("default config is invalid: {e}"),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tierwatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TierwatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TierwatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit path; the file must exist.
pub fn load_from_path(path: &Path) -> Result<TierwatchConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: TierwatchConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
