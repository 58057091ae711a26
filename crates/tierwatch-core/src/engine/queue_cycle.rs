//! Queue polling and auto-resolution.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::Engine;
use crate::escalation::Intervention;
use crate::queue_monitor::{IssueKey, IssueState, PollOutcome, QueueIssue};
use crate::upstream::Upstream;

/// Summary of one queue cycle.
#[derive(Debug, Clone, Default)]
pub struct QueueCycleReport {
    pub polled: usize,
    pub polls_failed: usize,
    pub detected: usize,
    pub removed: usize,
    pub auto_resolved: usize,
    pub auto_resolve_failed: usize,
    /// Items re-searched after their download was removed.
    pub researched: usize,
    pub interventions_raised: Vec<Intervention>,
}

impl Engine {
    /// Poll every instance's queue once, advance issue states, and run due
    /// auto-resolutions.
    pub async fn run_queue_cycle(&self, now: DateTime<Utc>) -> Result<QueueCycleReport> {
        let mut report = QueueCycleReport::default();
        let upstreams: Vec<_> = self.upstreams.values().cloned().collect();

        for up in &upstreams {
            let entries = match up.fetch_queue().await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(instance = up.instance(), "queue poll failed: {}", e);
                    report.polls_failed += 1;
                    continue;
                }
            };
            report.polled += 1;

            let outcome = self.queue.lock().await.observe(up.instance(), &entries, now);
            report.detected += outcome.detected;

            // Due issues are claimed by `observe`; every claim must be either
            // completed by `run_removal` or released before returning.
            if let Err(e) = self.record_poll(&outcome, now, &mut report).await {
                self.queue.lock().await.abandon(&outcome.due);
                return Err(e);
            }
            for (i, issue) in outcome.due.iter().enumerate() {
                let state = match self.run_removal(up, issue, now, &mut report).await {
                    Ok(state) => state,
                    Err(e) => {
                        self.queue.lock().await.abandon(&outcome.due[i + 1..]);
                        return Err(e);
                    }
                };
                match state {
                    Some(IssueState::Resolved) => report.auto_resolved += 1,
                    Some(IssueState::Escalated) => report.auto_resolve_failed += 1,
                    _ => {}
                }
            }
        }

        if report.detected > 0 || report.auto_resolved > 0 || report.auto_resolve_failed > 0 {
            tracing::info!(
                "queue cycle: {} polled, {} new issues, {} auto-resolved, {} escalated, {} cleared",
                report.polled,
                report.detected,
                report.auto_resolved,
                report.auto_resolve_failed,
                report.removed
            );
        }
        Ok(report)
    }

    /// Persist one poll: current issues, cleared issues, new escalations.
    async fn record_poll(
        &self,
        outcome: &PollOutcome,
        now: DateTime<Utc>,
        report: &mut QueueCycleReport,
    ) -> Result<()> {
        for issue in &outcome.current {
            self.store.upsert_issue(issue).await?;
        }
        for key in &outcome.removed {
            self.store.delete_issue(key).await?;
            let cleared = self
                .escalation
                .lock()
                .await
                .on_download_gone(&key.instance, &key.download_id);
            if !cleared.is_empty() {
                self.store.delete_interventions(&cleared).await?;
            }
        }
        report.removed += outcome.removed.len();

        for issue in &outcome.escalated {
            let iv = self.raise_queue_stuck(issue, now).await?;
            report.interventions_raised.push(iv);
        }
        Ok(())
    }

    /// Remove and blocklist a claimed issue's download, record the result, and
    /// re-search the underlying item on success. Returns the issue's new state,
    /// or `None` if it vanished while the call ran.
    pub(super) async fn run_removal(
        &self,
        up: &Arc<dyn Upstream>,
        issue: &QueueIssue,
        now: DateTime<Utc>,
        report: &mut QueueCycleReport,
    ) -> Result<Option<IssueState>> {
        let result = up.remove_and_blocklist(issue).await;
        if let Err(e) = &result {
            tracing::warn!(issue = %issue.key, "remove and blocklist failed: {}", e);
        }

        let Some(updated) = self.queue.lock().await.complete(&issue.key, result.is_ok()) else {
            return Ok(None);
        };
        self.store.upsert_issue(&updated).await?;

        match updated.state {
            IssueState::Escalated => {
                report
                    .interventions_raised
                    .push(self.raise_queue_stuck(&updated, now).await?);
            }
            IssueState::Resolved => {
                tracing::info!(issue = %updated.key, kind = %updated.kind, "queue issue resolved");
                if let Some(item) = &updated.item {
                    if self.research_after_removal(item, now).await? {
                        report.researched += 1;
                    }
                }
            }
            IssueState::Detected | IssueState::AutoResolving => {}
        }
        Ok(Some(updated.state))
    }

    async fn raise_queue_stuck(
        &self,
        issue: &QueueIssue,
        now: DateTime<Utc>,
    ) -> Result<Intervention> {
        let iv = self.escalation.lock().await.raise_queue_stuck(issue, now);
        self.store.upsert_intervention(&iv).await?;
        tracing::info!(issue = %issue.key, kind = %issue.kind, "queue issue needs a human");
        Ok(iv)
    }

    /// Current queue issues, oldest first.
    pub async fn queue_issues(&self) -> Vec<QueueIssue> {
        let mut issues = self.queue.lock().await.all();
        issues.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.key.cmp(&b.key))
        });
        issues
    }

    pub async fn queue_issue(&self, key: &IssueKey) -> Option<QueueIssue> {
        self.queue.lock().await.get(key).cloned()
    }
}
