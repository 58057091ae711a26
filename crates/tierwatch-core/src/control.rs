//! Control requests: manual actions routed to the engine that owns the state.
//!
//! While `tierwatch run` is active it is the only process allowed to mutate
//! the state database. It listens on a control socket and applies each
//! request to its live `Engine`; other CLI invocations send their write
//! commands there instead of loading a second engine. Wire format is one JSON
//! object per line in each direction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, ManualSearchOutcome};
use crate::error::EngineError;
use crate::escalation::Decision;
use crate::model::ItemKey;
use crate::queue_monitor::IssueKey;

/// A write command for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlRequest {
    Search { key: ItemKey },
    Resolve { key: IssueKey },
    Decide { id: String, decision: Decision },
    /// Liveness check; a running scheduler answers `Done`.
    Ping,
}

/// The engine's answer, already phrased for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ControlReply {
    Done { message: String },
    Failed { message: String },
}

impl ControlReply {
    pub fn from_result(result: Result<String, EngineError>) -> Self {
        match result {
            Ok(message) => ControlReply::Done { message },
            Err(e) => ControlReply::Failed {
                message: e.to_string(),
            },
        }
    }
}

/// Apply `request` to `engine` and describe what happened.
pub async fn execute(
    engine: &Engine,
    request: &ControlRequest,
    now: DateTime<Utc>,
) -> Result<String, EngineError> {
    match request {
        ControlRequest::Search { key } => Ok(match engine.search_now(key, now).await? {
            ManualSearchOutcome::Triggered => format!("Search triggered for {key}"),
            ManualSearchOutcome::ProviderError(e) => format!("Search for {key} failed: {e}"),
            ManualSearchOutcome::SkippedDuplicate => {
                format!("{key} was covered by a recent group search; nothing sent")
            }
            ManualSearchOutcome::Deferred(status) => format!("Not searched ({status})"),
            ManualSearchOutcome::InFlight => format!("A search for {key} is already running"),
        }),
        ControlRequest::Resolve { key } => {
            let state = engine.resolve_issue(key, now).await?;
            Ok(format!("{key}: {}", state.as_str()))
        }
        ControlRequest::Decide { id, decision } => {
            let iv = engine.decide(id, *decision, now).await?;
            Ok(format!("{} -> {}", iv.id, iv.decision.as_str()))
        }
        ControlRequest::Ping => Ok("running".to_string()),
    }
}

/// Default control socket, next to the default state database.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("tierwatch")?.get_state_home();
    Ok(dir.join("control.sock"))
}

/// Control socket for a state database at an explicit path: `<db>.sock`.
pub fn control_socket_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".sock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::MediaType;
    use crate::store::StateStore;

    #[test]
    fn requests_are_tagged_json_lines() {
        let req = ControlRequest::Decide {
            id: "urgent:tv:episode:4".into(),
            decision: Decision::Reset,
        };
        let line = serde_json::to_string(&req).unwrap();
        assert!(line.contains(r#""op":"decide""#));
        assert!(line.contains(r#""decision":"reset""#));
        assert!(!line.contains('\n'));
        assert_eq!(serde_json::from_str::<ControlRequest>(&line).unwrap(), req);

        let reply: ControlReply =
            serde_json::from_str(r#"{"status":"failed","message":"nope"}"#).unwrap();
        assert_eq!(
            reply,
            ControlReply::Failed {
                message: "nope".into()
            }
        );
    }

    #[test]
    fn socket_sits_next_to_explicit_db() {
        assert_eq!(
            control_socket_path_for(Path::new("/var/lib/tw/state.db")),
            PathBuf::from("/var/lib/tw/state.db.sock")
        );
    }

    #[tokio::test]
    async fn unknown_targets_fail_without_mutation() {
        let store = StateStore::open_in_memory().await.unwrap();
        let engine = Engine::load(Settings::default(), store, Vec::new(), Utc::now())
            .await
            .unwrap();
        let now = Utc::now();

        let search = ControlRequest::Search {
            key: ItemKey::new("tv", MediaType::Episode, 9),
        };
        let reply = ControlReply::from_result(execute(&engine, &search, now).await);
        assert_eq!(
            reply,
            ControlReply::Failed {
                message: "unknown item tv:episode:9".into()
            }
        );

        let decide = ControlRequest::Decide {
            id: "urgent:tv:episode:9".into(),
            decision: Decision::Dismiss,
        };
        assert!(matches!(
            execute(&engine, &decide, now).await,
            Err(EngineError::UnknownIntervention(_))
        ));
        assert_eq!(engine.status(now).await.budget_used, 0);
        assert_eq!(
            execute(&engine, &ControlRequest::Ping, now).await.unwrap(),
            "running"
        );
    }
}
