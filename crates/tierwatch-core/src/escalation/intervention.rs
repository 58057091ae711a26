//! Intervention records and human decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ItemKey;
use crate::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Hot/warm item failing repeated searches.
    Urgent,
    /// Cool/cold item crossed an age milestone.
    LongMissing,
    /// Download stuck in the queue that could not be auto-resolved.
    QueueStuck,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Urgent => "urgent",
            Category::LongMissing => "long-missing",
            Category::QueueStuck => "queue-stuck",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "urgent" => Some(Category::Urgent),
            "long-missing" => Some(Category::LongMissing),
            "queue-stuck" => Some(Category::QueueStuck),
            _ => None,
        }
    }

    pub fn accepts(self, decision: Decision) -> bool {
        matches!(
            (self, decision),
            (Category::Urgent, Decision::Dismiss)
                | (Category::Urgent, Decision::Reset)
                | (Category::LongMissing, Decision::Acknowledge)
                | (Category::LongMissing, Decision::Dismiss)
                | (Category::QueueStuck, Decision::Acknowledge)
                | (Category::QueueStuck, Decision::Dismiss)
        )
    }
}

/// What a human can say about an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Dismiss,
    Reset,
    Acknowledge,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Dismiss => "dismiss",
            Decision::Reset => "reset",
            Decision::Acknowledge => "acknowledge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dismiss" => Some(Decision::Dismiss),
            "reset" => Some(Decision::Reset),
            "acknowledge" | "ack" => Some(Decision::Acknowledge),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded decision on an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionState {
    Pending,
    Dismissed,
    Reset,
    Acknowledged,
}

impl DecisionState {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionState::Pending => "pending",
            DecisionState::Dismissed => "dismissed",
            DecisionState::Reset => "reset",
            DecisionState::Acknowledged => "acknowledged",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "dismissed" => DecisionState::Dismissed,
            "reset" => DecisionState::Reset,
            "acknowledged" => DecisionState::Acknowledged,
            _ => DecisionState::Pending,
        }
    }
}

impl From<Decision> for DecisionState {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Dismiss => DecisionState::Dismissed,
            Decision::Reset => DecisionState::Reset,
            Decision::Acknowledge => DecisionState::Acknowledged,
        }
    }
}

/// What an intervention is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    Item { key: ItemKey },
    Download { instance: String, download_id: String },
}

impl Subject {
    pub fn instance(&self) -> &str {
        match self {
            Subject::Item { key } => &key.instance,
            Subject::Download { instance, .. } => instance,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Item { key } => write!(f, "{}", key),
            Subject::Download {
                instance,
                download_id,
            } => write!(f, "{}:{}", instance, download_id),
        }
    }
}

/// A request for human attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    /// `<category>:<subject>`; at most one intervention per category and subject.
    pub id: String,
    pub category: Category,
    pub subject: Subject,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub tier: Option<Tier>,
    pub attempt_count: u32,
    /// Start of whatever is being measured: the attempt streak, the release, or
    /// the issue's first sighting.
    pub since: Option<DateTime<Utc>>,
    /// Human-readable summary, e.g. "searched 16 times in 8h".
    pub detail: String,
    pub decision: DecisionState,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Intervention {
    pub fn make_id(category: Category, subject: &Subject) -> String {
        format!("{}:{}", category.as_str(), subject)
    }

    pub fn is_open(&self) -> bool {
        self.decision == DecisionState::Pending
    }
}

/// Compact "3d4h" / "8h" / "45m" rendering for details and status output.
pub fn humanize(d: chrono::Duration) -> String {
    let mins = d.num_minutes().max(0);
    let (days, hours, minutes) = (mins / 1440, (mins % 1440) / 60, mins % 60);
    match (days, hours, minutes) {
        (0, 0, m) => format!("{}m", m),
        (0, h, 0) => format!("{}h", h),
        (0, h, m) => format!("{}h{}m", h, m),
        (d, 0, _) => format!("{}d", d),
        (d, h, _) => format!("{}d{}h", d, h),
    }
}
