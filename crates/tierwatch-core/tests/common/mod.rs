#![allow(dead_code)]

pub mod mock_upstream;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tierwatch_core::config::{Settings, TierwatchConfig};
use tierwatch_core::model::{ItemKey, ItemSnapshot, MediaType};
use tierwatch_core::pacing::PresetName;

/// 2026-06-01 00:00 UTC; tests pin the budget day to UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

/// Deterministic settings: fast pacing, no shuffling, no group dedup, UTC day.
pub fn base_config() -> TierwatchConfig {
    TierwatchConfig {
        daily_api_limit: 2000,
        searches_per_cycle: Some(10),
        cycle_interval_minutes: Some(30),
        randomize_selection: false,
        prefer_group_search: false,
        pacing: PresetName::Fast,
        utc_offset_minutes: Some(0),
        ..TierwatchConfig::default()
    }
}

pub fn settings(cfg: &TierwatchConfig) -> Settings {
    Settings::from_config(cfg).unwrap()
}

/// Episode released `age_days` before `t0()`.
pub fn episode(id: i64, age_days: i64, group: Option<i64>) -> ItemSnapshot {
    ItemSnapshot {
        external_id: id,
        media_type: MediaType::Episode,
        title: format!("Show - E{id:02}"),
        released_at: Some(t0() - Duration::days(age_days)),
        group_id: group,
    }
}

pub fn episode_key(instance: &str, id: i64) -> ItemKey {
    ItemKey::new(instance, MediaType::Episode, id)
}
