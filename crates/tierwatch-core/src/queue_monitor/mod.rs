//! Stuck-download lifecycle.
//!
//! `detected -> auto-resolving -> resolved`, or `-> escalated` for manual-only
//! kinds and failed auto-resolves. The monitor is pure state: the engine feeds
//! it queue snapshots, performs the removal calls it asks for, and reports the
//! results back with `complete`.

mod classify;

pub use classify::IssueKind;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::ItemKey;

/// Stable identity of a queued download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueKey {
    pub instance: String,
    pub download_id: String,
}

impl IssueKey {
    pub fn new(instance: impl Into<String>, download_id: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            download_id: download_id.into(),
        }
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instance, self.download_id)
    }
}

impl FromStr for IssueKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((instance, id)) if !instance.is_empty() && !id.is_empty() => {
                Ok(IssueKey::new(instance, id))
            }
            _ => Err(EngineError::UnknownIssue(s.to_string())),
        }
    }
}

/// One row of a `fetch_queue` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub download_id: String,
    pub title: String,
    /// Wanted item this download would satisfy, when known.
    #[serde(default)]
    pub item: Option<ItemKey>,
    #[serde(default)]
    pub issues: Vec<IssueKind>,
    /// Raw status messages; classified when `issues` is empty.
    #[serde(default)]
    pub messages: Vec<String>,
}

impl QueueEntry {
    pub fn effective_issues(&self) -> Vec<IssueKind> {
        if self.issues.is_empty() {
            IssueKind::from_messages(&self.messages)
        } else {
            self.issues.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueState {
    Detected,
    AutoResolving,
    Resolved,
    Escalated,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Detected => "detected",
            IssueState::AutoResolving => "auto-resolving",
            IssueState::Resolved => "resolved",
            IssueState::Escalated => "escalated",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "auto-resolving" => IssueState::AutoResolving,
            "resolved" => IssueState::Resolved,
            "escalated" => IssueState::Escalated,
            _ => IssueState::Detected,
        }
    }

    fn is_waiting(self) -> bool {
        matches!(self, IssueState::Detected | IssueState::AutoResolving)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueIssue {
    pub key: IssueKey,
    pub title: String,
    pub item: Option<ItemKey>,
    pub kind: IssueKind,
    pub messages: Vec<String>,
    /// First poll that reported the problem.
    pub first_seen: DateTime<Utc>,
    /// Latest poll that reported the problem.
    pub detected_at: DateTime<Utc>,
    /// `None` for manual-only issues.
    pub deadline: Option<DateTime<Utc>>,
    pub state: IssueState,
    /// A removal call is running. Never persisted.
    #[serde(skip)]
    pub resolving: bool,
}

impl QueueIssue {
    /// Countdown to auto-resolution, for issues still waiting.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.state.is_waiting() {
            return None;
        }
        self.deadline.map(|d| (d - now).max(Duration::zero()))
    }
}

/// Which kinds are auto-resolved and after how long.
#[derive(Debug, Clone)]
pub struct ResolvePolicy {
    pub enabled: bool,
    pub grace_period: Duration,
    pub disabled_kinds: Vec<IssueKind>,
}

impl ResolvePolicy {
    pub fn is_manual_only(&self, kind: IssueKind) -> bool {
        !self.enabled || kind.is_manual_only() || self.disabled_kinds.contains(&kind)
    }

    /// Kind an entry is tracked under: a manual-only kind if any, else the first.
    pub fn primary_kind(&self, kinds: &[IssueKind]) -> Option<IssueKind> {
        kinds
            .iter()
            .copied()
            .find(|k| self.is_manual_only(*k))
            .or_else(|| kinds.first().copied())
    }
}

/// Result of observing one instance's queue.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Issues past their deadline; the caller must run the removal and `complete` them.
    pub due: Vec<QueueIssue>,
    /// Issues seen for the first time.
    pub detected: usize,
    /// Newly escalated (manual-only) issues.
    pub escalated: Vec<QueueIssue>,
    /// Issues whose entry left the queue (or stopped reporting a problem).
    pub removed: Vec<IssueKey>,
    /// Every issue that still exists for the instance, after the update.
    pub current: Vec<QueueIssue>,
}

/// Owns every `QueueIssue`.
#[derive(Debug)]
pub struct QueueMonitor {
    policy: ResolvePolicy,
    issues: BTreeMap<IssueKey, QueueIssue>,
}

impl QueueMonitor {
    pub fn new(policy: ResolvePolicy) -> Self {
        Self {
            policy,
            issues: BTreeMap::new(),
        }
    }

    pub fn restore(&mut self, issues: impl IntoIterator<Item = QueueIssue>) {
        for issue in issues {
            self.issues.insert(issue.key.clone(), issue);
        }
    }

    /// Apply one successful queue snapshot for `instance`.
    pub fn observe(
        &mut self,
        instance: &str,
        entries: &[QueueEntry],
        now: DateTime<Utc>,
    ) -> PollOutcome {
        let mut out = PollOutcome::default();
        let mut flagged = HashSet::new();

        for entry in entries {
            let kinds = entry.effective_issues();
            let Some(primary) = self.policy.primary_kind(&kinds) else {
                continue;
            };
            let key = IssueKey::new(instance, entry.download_id.clone());
            flagged.insert(key.clone());

            match self.issues.get_mut(&key) {
                Some(issue) => {
                    issue.detected_at = now;
                    issue.messages = entry.messages.clone();
                    if issue.state == IssueState::Detected {
                        issue.state = IssueState::AutoResolving;
                    }
                }
                None => {
                    let manual = self.policy.is_manual_only(primary);
                    let issue = QueueIssue {
                        key: key.clone(),
                        title: entry.title.clone(),
                        item: entry.item.clone(),
                        kind: primary,
                        messages: entry.messages.clone(),
                        first_seen: now,
                        detected_at: now,
                        deadline: (!manual).then(|| now + self.policy.grace_period),
                        state: if manual {
                            IssueState::Escalated
                        } else {
                            IssueState::Detected
                        },
                        resolving: false,
                    };
                    tracing::info!(
                        issue = %key,
                        kind = %primary,
                        "queue issue detected{}",
                        if manual { " (manual only)" } else { "" }
                    );
                    out.detected += 1;
                    if manual {
                        out.escalated.push(issue.clone());
                    }
                    self.issues.insert(key.clone(), issue);
                }
            }

            if let Some(issue) = self.issues.get_mut(&key) {
                let due = issue.state.is_waiting()
                    && !issue.resolving
                    && issue.deadline.is_some_and(|d| now >= d);
                if due {
                    issue.resolving = true;
                    out.due.push(issue.clone());
                }
            }
        }

        let gone: Vec<IssueKey> = self
            .issues
            .keys()
            .filter(|k| k.instance == instance && !flagged.contains(*k))
            .cloned()
            .collect();
        for key in gone {
            self.issues.remove(&key);
            tracing::debug!(issue = %key, "queue issue cleared upstream");
            out.removed.push(key);
        }

        out.current = self.for_instance(instance);
        out
    }

    /// Claim an issue for a manual resolve. Resolved or in-flight issues are refused.
    pub fn begin_manual(&mut self, key: &IssueKey) -> Result<QueueIssue, EngineError> {
        let issue = self
            .issues
            .get_mut(key)
            .ok_or_else(|| EngineError::UnknownIssue(key.to_string()))?;
        if issue.resolving || issue.state == IssueState::Resolved {
            return Err(EngineError::IssueNotResolvable {
                key: key.to_string(),
                reason: if issue.resolving {
                    "a resolve is already in progress"
                } else {
                    "it is already resolved"
                },
            });
        }
        issue.resolving = true;
        Ok(issue.clone())
    }

    /// Record the result of a removal. `None` if the issue vanished meanwhile.
    pub fn complete(&mut self, key: &IssueKey, succeeded: bool) -> Option<QueueIssue> {
        let issue = self.issues.get_mut(key)?;
        issue.resolving = false;
        issue.state = if succeeded {
            IssueState::Resolved
        } else {
            IssueState::Escalated
        };
        Some(issue.clone())
    }

    /// Drop claims whose removal never ran, so the next poll dispatches them again.
    pub fn abandon(&mut self, claimed: &[QueueIssue]) {
        for c in claimed {
            if let Some(issue) = self.issues.get_mut(&c.key) {
                if issue.resolving {
                    issue.resolving = false;
                    tracing::debug!(issue = %c.key, "auto-resolve claim released");
                }
            }
        }
    }

    pub fn get(&self, key: &IssueKey) -> Option<&QueueIssue> {
        self.issues.get(key)
    }

    pub fn for_instance(&self, instance: &str) -> Vec<QueueIssue> {
        self.issues
            .values()
            .filter(|i| i.key.instance == instance)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<QueueIssue> {
        self.issues.values().cloned().collect()
    }
}
