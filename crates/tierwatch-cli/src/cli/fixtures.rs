//! File-backed upstream used by `--fixtures DIR`.
//!
//! Each instance reads `DIR/<instance>/{missing,cutoff_unmet,queue}.json`
//! (absent files are empty) and appends every search and removal to
//! `DIR/<instance>/actions.jsonl`. A removal also drops the entry from
//! `queue.json`, as a real download client would.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tierwatch_core::config::Settings;
use tierwatch_core::model::{Item, ItemKey, ItemSnapshot, SearchKind};
use tierwatch_core::queue_monitor::{QueueEntry, QueueIssue};
use tierwatch_core::upstream::{Upstream, UpstreamError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of `actions.jsonl`.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Action<'a> {
    Search {
        at: chrono::DateTime<Utc>,
        item: &'a ItemKey,
        kind: SearchKind,
        group_id: Option<i64>,
    },
    Remove {
        at: chrono::DateTime<Utc>,
        download_id: &'a str,
        blocklist: bool,
    },
}

pub struct FixtureUpstream {
    name: String,
    dir: PathBuf,
    /// Serializes writes to `actions.jsonl` and `queue.json`.
    write_lock: Mutex<()>,
}

impl FixtureUpstream {
    pub fn new(name: impl Into<String>, root: &Path) -> Self {
        let name = name.into();
        Self {
            dir: root.join(&name),
            name,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_list<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, UpstreamError> {
        let path = self.dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| UpstreamError::Transport(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(UpstreamError::Transport(format!("{}: {}", path.display(), e))),
        }
    }

    async fn append(&self, action: &Action<'_>) -> Result<(), UpstreamError> {
        let mut line = serde_json::to_string(action)
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        line.push('\n');
        let path = self.dir.join("actions.jsonl");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| UpstreamError::Transport(format!("{}: {}", path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| UpstreamError::Transport(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Upstream for FixtureUpstream {
    fn instance(&self) -> &str {
        &self.name
    }

    async fn fetch_missing(&self) -> Result<Vec<ItemSnapshot>, UpstreamError> {
        self.read_list("missing.json").await
    }

    async fn fetch_cutoff_unmet(&self) -> Result<Vec<ItemSnapshot>, UpstreamError> {
        self.read_list("cutoff_unmet.json").await
    }

    async fn trigger_search(&self, item: &Item, kind: SearchKind) -> Result<(), UpstreamError> {
        let _guard = self.write_lock.lock().await;
        self.append(&Action::Search {
            at: Utc::now(),
            item: &item.key,
            kind,
            group_id: item.group_id,
        })
        .await
    }

    async fn fetch_queue(&self) -> Result<Vec<QueueEntry>, UpstreamError> {
        self.read_list("queue.json").await
    }

    async fn remove_and_blocklist(&self, issue: &QueueIssue) -> Result<(), UpstreamError> {
        let _guard = self.write_lock.lock().await;
        let mut queue: Vec<QueueEntry> = self.read_list("queue.json").await?;
        let before = queue.len();
        queue.retain(|e| e.download_id != issue.key.download_id);
        if queue.len() == before {
            return Err(UpstreamError::NotFound(issue.key.download_id.clone()));
        }
        let data = serde_json::to_string_pretty(&queue)
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let path = self.dir.join("queue.json");
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| UpstreamError::Transport(format!("{}: {}", path.display(), e)))?;
        self.append(&Action::Remove {
            at: Utc::now(),
            download_id: &issue.key.download_id,
            blocklist: true,
        })
        .await
    }
}

/// One fixture upstream per configured instance, or per subdirectory of
/// `root` when the config lists none.
pub async fn load_upstreams(root: &Path, settings: &Settings) -> Result<Vec<Arc<dyn Upstream>>> {
    let mut names: Vec<String> = settings.instances.iter().map(|i| i.name.clone()).collect();
    if names.is_empty() {
        let mut entries = tokio::fs::read_dir(root)
            .await
            .with_context(|| format!("read fixture dir: {}", root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
    }
    if names.is_empty() {
        bail!("no instances configured and no fixture dirs in {}", root.display());
    }
    tracing::debug!("fixture upstreams: {:?}", names);
    Ok(names
        .into_iter()
        .map(|name| Arc::new(FixtureUpstream::new(name, root)) as Arc<dyn Upstream>)
        .collect())
}
