//! Errors surfaced to callers of the engine (CLI, API layer).

use crate::model::ItemKey;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown item {0}")]
    UnknownItem(ItemKey),
    #[error("no queue issue for {0}")]
    UnknownIssue(String),
    #[error("cannot resolve {key}: {reason}")]
    IssueNotResolvable { key: String, reason: &'static str },
    #[error("unknown intervention {0}")]
    UnknownIntervention(String),
    #[error("no upstream registered for instance {0:?}")]
    UnknownInstance(String),
    #[error("cannot {decision} a {category} intervention")]
    InvalidDecision {
        category: &'static str,
        decision: &'static str,
    },
    #[error("intervention {0} has already been decided")]
    AlreadyDecided(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
