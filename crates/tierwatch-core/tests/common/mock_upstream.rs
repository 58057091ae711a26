//! Scripted in-memory upstream for engine tests.
//!
//! Snapshots, queue contents and failures are set by the test; every search
//! and removal call is logged for assertions. `hold_searches` parks every
//! search call until the test hands out permits, keeping it in flight.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tierwatch_core::model::{Item, ItemKey, ItemSnapshot, SearchKind};
use tierwatch_core::queue_monitor::{IssueKey, QueueEntry, QueueIssue};
use tierwatch_core::upstream::{Upstream, UpstreamError};

#[derive(Debug, Default)]
struct MockState {
    missing: Vec<ItemSnapshot>,
    cutoff_unmet: Vec<ItemSnapshot>,
    queue: Vec<QueueEntry>,
    fail_fetch: bool,
    fail_search: bool,
    fail_remove: bool,
    fail_queue: bool,
    searches: Vec<(ItemKey, SearchKind)>,
    removals: Vec<IssueKey>,
}

pub struct MockUpstream {
    name: String,
    state: Mutex<MockState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    search_started: Notify,
}

impl MockUpstream {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(MockState::default()),
            gate: Mutex::new(None),
            search_started: Notify::new(),
        })
    }

    pub fn as_upstream(self: &Arc<Self>) -> Arc<dyn Upstream> {
        self.clone()
    }

    pub fn set_missing(&self, snaps: Vec<ItemSnapshot>) {
        self.state.lock().unwrap().missing = snaps;
    }

    pub fn set_cutoff_unmet(&self, snaps: Vec<ItemSnapshot>) {
        self.state.lock().unwrap().cutoff_unmet = snaps;
    }

    pub fn set_queue(&self, entries: Vec<QueueEntry>) {
        self.state.lock().unwrap().queue = entries;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetch = fail;
    }

    pub fn fail_search(&self, fail: bool) {
        self.state.lock().unwrap().fail_search = fail;
    }

    pub fn fail_remove(&self, fail: bool) {
        self.state.lock().unwrap().fail_remove = fail;
    }

    pub fn fail_queue(&self, fail: bool) {
        self.state.lock().unwrap().fail_queue = fail;
    }

    /// Park search calls from now on; each permit added lets one finish.
    pub fn hold_searches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once `n` search calls have started (held ones are parked).
    pub async fn wait_for_searches(&self, n: usize) {
        while self.search_count() < n {
            self.search_started.notified().await;
        }
    }

    pub fn searches(&self) -> Vec<(ItemKey, SearchKind)> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn search_count(&self) -> usize {
        self.state.lock().unwrap().searches.len()
    }

    pub fn removals(&self) -> Vec<IssueKey> {
        self.state.lock().unwrap().removals.clone()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    fn instance(&self) -> &str {
        &self.name
    }

    async fn fetch_missing(&self) -> Result<Vec<ItemSnapshot>, UpstreamError> {
        let s = self.state.lock().unwrap();
        if s.fail_fetch {
            return Err(UpstreamError::Transport("connection refused".into()));
        }
        Ok(s.missing.clone())
    }

    async fn fetch_cutoff_unmet(&self) -> Result<Vec<ItemSnapshot>, UpstreamError> {
        let s = self.state.lock().unwrap();
        if s.fail_fetch {
            return Err(UpstreamError::Transport("connection refused".into()));
        }
        Ok(s.cutoff_unmet.clone())
    }

    async fn trigger_search(&self, item: &Item, kind: SearchKind) -> Result<(), UpstreamError> {
        let fail = {
            let mut s = self.state.lock().unwrap();
            s.searches.push((item.key.clone(), kind));
            s.fail_search
        };
        let gate = self.gate.lock().unwrap().clone();
        self.search_started.notify_one();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if fail {
            return Err(UpstreamError::Provider {
                status: 503,
                message: "indexer unavailable".into(),
            });
        }
        Ok(())
    }

    async fn fetch_queue(&self) -> Result<Vec<QueueEntry>, UpstreamError> {
        let s = self.state.lock().unwrap();
        if s.fail_queue {
            return Err(UpstreamError::Transport("timed out".into()));
        }
        Ok(s.queue.clone())
    }

    async fn remove_and_blocklist(&self, issue: &QueueIssue) -> Result<(), UpstreamError> {
        let mut s = self.state.lock().unwrap();
        s.removals.push(issue.key.clone());
        if s.fail_remove {
            return Err(UpstreamError::NotFound(issue.key.download_id.clone()));
        }
        s.queue.retain(|e| e.download_id != issue.key.download_id);
        Ok(())
    }
}
