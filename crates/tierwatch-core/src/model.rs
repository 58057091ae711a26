//! Wanted items and their identities.
//!
//! An `Item` is created from an upstream snapshot the first time it is seen
//! missing or below cutoff, mutated by the cooldown tracker on every search,
//! and archived as a find once it leaves the snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media an upstream instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Episode,
    Movie,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Episode => "episode",
            MediaType::Movie => "movie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "episode" => Some(MediaType::Episode),
            "movie" => Some(MediaType::Movie),
            _ => None,
        }
    }
}

/// Why an item is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Not downloaded at all.
    Missing,
    /// Downloaded, but below the quality cutoff.
    Upgrade,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Missing => "missing",
            SearchKind::Upgrade => "upgrade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing" => Some(SearchKind::Missing),
            "upgrade" => Some(SearchKind::Upgrade),
            _ => None,
        }
    }
}

/// Stable identity of a wanted item: `(instance, media type, external id)`.
///
/// Rendered as `instance:media:id`, e.g. `tv-main:episode:4211`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub instance: String,
    pub media_type: MediaType,
    pub external_id: i64,
}

impl ItemKey {
    pub fn new(instance: impl Into<String>, media_type: MediaType, external_id: i64) -> Self {
        Self {
            instance: instance.into(),
            media_type,
            external_id,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.instance,
            self.media_type.as_str(),
            self.external_id
        )
    }
}

/// Error parsing an `ItemKey` from its display form.
#[derive(Debug, thiserror::Error)]
#[error("invalid item key {0:?} (expected instance:episode|movie:id)")]
pub struct ParseKeyError(pub String);

impl FromStr for ItemKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Instance names may contain ':' so split from the right.
        let mut parts = s.rsplitn(3, ':');
        let id = parts.next();
        let media = parts.next();
        let instance = parts.next();
        match (instance, media.and_then(MediaType::parse), id.map(str::parse::<i64>)) {
            (Some(instance), Some(media_type), Some(Ok(external_id))) if !instance.is_empty() => {
                Ok(ItemKey::new(instance, media_type, external_id))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

/// One row of a `fetch_missing` / `fetch_cutoff_unmet` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub external_id: i64,
    pub media_type: MediaType,
    pub title: String,
    /// Air date (episodes) or earliest release date (movies).
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    /// Group the upstream can search as a whole (the series of an episode).
    #[serde(default)]
    pub group_id: Option<i64>,
}

/// A tracked wanted item.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub title: String,
    pub released_at: Option<DateTime<Utc>>,
    pub group_id: Option<i64>,
    pub search_kind: SearchKind,
    pub first_seen_at: DateTime<Utc>,
    pub last_searched_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    /// First attempt of the current streak; cleared whenever `attempt_count` resets.
    pub streak_started_at: Option<DateTime<Utc>>,
    pub found_at: Option<DateTime<Utc>>,
    /// A search call for this item is running. Never persisted.
    pub in_flight: bool,
}

impl Item {
    /// Create a never-searched item from a snapshot row.
    pub fn from_snapshot(
        instance: &str,
        snapshot: &ItemSnapshot,
        kind: SearchKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: ItemKey::new(instance, snapshot.media_type, snapshot.external_id),
            title: snapshot.title.clone(),
            released_at: snapshot.released_at,
            group_id: snapshot.group_id,
            search_kind: kind,
            first_seen_at: now,
            last_searched_at: None,
            attempt_count: 0,
            streak_started_at: None,
            found_at: None,
            in_flight: false,
        }
    }

    /// Refresh descriptive fields from a newer snapshot. Search state is untouched.
    /// Returns true if anything changed.
    pub fn refresh_from(&mut self, snapshot: &ItemSnapshot, kind: SearchKind) -> bool {
        let changed = self.title != snapshot.title
            || self.released_at != snapshot.released_at
            || self.group_id != snapshot.group_id
            || self.search_kind != kind;
        if changed {
            self.title = snapshot.title.clone();
            self.released_at = snapshot.released_at;
            self.group_id = snapshot.group_id;
            self.search_kind = kind;
        }
        changed
    }

    /// Age in whole days at `now`, floored at zero. `None` when the release date is unknown.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<u64> {
        self.released_at
            .map(|released| (now - released).num_days().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn item_key_display_and_parse_roundtrip() {
        let key = ItemKey::new("tv:main", MediaType::Episode, 42);
        assert_eq!(key.to_string(), "tv:main:episode:42");
        let parsed: ItemKey = "tv:main:episode:42".parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn item_key_rejects_garbage() {
        assert!("movies:film:1".parse::<ItemKey>().is_err());
        assert!("movie:1".parse::<ItemKey>().is_err());
        assert!("movies:movie:abc".parse::<ItemKey>().is_err());
    }

    #[test]
    fn age_is_floored_at_zero_for_future_releases() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snap = ItemSnapshot {
            external_id: 1,
            media_type: MediaType::Movie,
            title: "Upcoming".into(),
            released_at: Some(now + Duration::days(10)),
            group_id: None,
        };
        let item = Item::from_snapshot("movies", &snap, SearchKind::Missing, now);
        assert_eq!(item.age_days(now), Some(0));

        let mut old = snap.clone();
        old.released_at = Some(now - Duration::days(45) - Duration::hours(3));
        let item = Item::from_snapshot("movies", &old, SearchKind::Missing, now);
        assert_eq!(item.age_days(now), Some(45));
    }

    #[test]
    fn refresh_reports_changes_only() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let snap = ItemSnapshot {
            external_id: 7,
            media_type: MediaType::Episode,
            title: "Show - S01E01".into(),
            released_at: None,
            group_id: Some(3),
        };
        let mut item = Item::from_snapshot("tv", &snap, SearchKind::Missing, now);
        assert!(!item.refresh_from(&snap, SearchKind::Missing));
        assert!(item.refresh_from(&snap, SearchKind::Upgrade));
        assert_eq!(item.search_kind, SearchKind::Upgrade);
    }
}
