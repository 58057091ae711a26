//! Search and find records. Both are append-only; the store prunes them to
//! their configured caps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ItemKey, SearchKind};
use crate::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchOutcome {
    Triggered,
    ProviderError,
    SkippedDuplicate,
}

impl SearchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchOutcome::Triggered => "triggered",
            SearchOutcome::ProviderError => "provider-error",
            SearchOutcome::SkippedDuplicate => "skipped-duplicate",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "provider-error" => SearchOutcome::ProviderError,
            "skipped-duplicate" => SearchOutcome::SkippedDuplicate,
            _ => SearchOutcome::Triggered,
        }
    }

    /// Whether an upstream call was made (and budget spent).
    pub fn consumed_call(self) -> bool {
        !matches!(self, SearchOutcome::SkippedDuplicate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub at: DateTime<Utc>,
    pub item: ItemKey,
    pub title: String,
    /// Group the search covered, when the upstream searched a whole group.
    #[serde(default)]
    pub group_id: Option<i64>,
    pub kind: SearchKind,
    pub tier: Tier,
    pub outcome: SearchOutcome,
    /// Provider error text, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl SearchRecord {
    pub fn instance(&self) -> &str {
        &self.item.instance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindRecord {
    pub item: ItemKey,
    pub title: String,
    pub kind: SearchKind,
    pub tier: Tier,
    pub searched_at: DateTime<Utc>,
    pub found_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Outcome counts over a slice of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub triggered: usize,
    pub provider_error: usize,
    pub skipped_duplicate: usize,
}

impl OutcomeCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a SearchRecord>) -> Self {
        let mut c = Self::default();
        for r in records {
            match r.outcome {
                SearchOutcome::Triggered => c.triggered += 1,
                SearchOutcome::ProviderError => c.provider_error += 1,
                SearchOutcome::SkippedDuplicate => c.skipped_duplicate += 1,
            }
        }
        c
    }

    pub fn calls(&self) -> usize {
        self.triggered + self.provider_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;
    use chrono::TimeZone;

    #[test]
    fn tally_counts_calls() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let rec = |outcome| SearchRecord {
            at,
            item: ItemKey::new("movies", MediaType::Movie, 1),
            title: "Film".into(),
            group_id: None,
            kind: SearchKind::Missing,
            tier: Tier::Cold,
            outcome,
            error: None,
        };
        let records = vec![
            rec(SearchOutcome::Triggered),
            rec(SearchOutcome::ProviderError),
            rec(SearchOutcome::SkippedDuplicate),
            rec(SearchOutcome::Triggered),
        ];
        let c = OutcomeCounts::tally(&records);
        assert_eq!(c.triggered, 2);
        assert_eq!(c.calls(), 3);
        assert!(!SearchOutcome::SkippedDuplicate.consumed_call());
        assert_eq!(
            SearchOutcome::from_str(SearchOutcome::ProviderError.as_str()),
            SearchOutcome::ProviderError
        );
    }
}
