//! Capability interface implemented once per upstream instance.
//!
//! The engine depends only on this trait; HTTP clients for concrete providers
//! live outside this crate.

use async_trait::async_trait;

use crate::model::{Item, ItemSnapshot, SearchKind};
use crate::queue_monitor::{QueueEntry, QueueIssue};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("not found upstream: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Instance name; matches `ItemKey::instance`.
    fn instance(&self) -> &str;

    /// Items not downloaded at all.
    async fn fetch_missing(&self) -> Result<Vec<ItemSnapshot>, UpstreamError>;

    /// Items downloaded below the quality cutoff.
    async fn fetch_cutoff_unmet(&self) -> Result<Vec<ItemSnapshot>, UpstreamError>;

    /// Ask the provider to search for `item`. With `group_id` set the provider
    /// may search the whole group.
    async fn trigger_search(&self, item: &Item, kind: SearchKind) -> Result<(), UpstreamError>;

    async fn fetch_queue(&self) -> Result<Vec<QueueEntry>, UpstreamError>;

    /// Remove the download, blocklist its release, and let the provider
    /// look for another.
    async fn remove_and_blocklist(&self, issue: &QueueIssue) -> Result<(), UpstreamError>;
}
