//! Queue issue rows.

use anyhow::Result;
use sqlx::Row;

use super::db::{from_ts, opt_from_ts, to_ts, StateStore};
use crate::model::ItemKey;
use crate::queue_monitor::{IssueKey, IssueKind, IssueState, QueueIssue};

impl StateStore {
    pub async fn upsert_issue(&self, issue: &QueueIssue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO queue_issues (
                instance, download_id, title, item_key, kind, messages_json,
                first_seen, detected_at, deadline, state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&issue.key.instance)
        .bind(&issue.key.download_id)
        .bind(&issue.title)
        .bind(issue.item.as_ref().map(|k| k.to_string()))
        .bind(issue.kind.as_str())
        .bind(serde_json::to_string(&issue.messages)?)
        .bind(to_ts(issue.first_seen))
        .bind(to_ts(issue.detected_at))
        .bind(issue.deadline.map(to_ts))
        .bind(issue.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_issue(&self, key: &IssueKey) -> Result<()> {
        sqlx::query(r#"DELETE FROM queue_issues WHERE instance = ?1 AND download_id = ?2"#)
            .bind(&key.instance)
            .bind(&key.download_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_issues(&self) -> Result<Vec<QueueIssue>> {
        let rows = sqlx::query(
            r#"
            SELECT instance, download_id, title, item_key, kind, messages_json,
                   first_seen, detected_at, deadline, state
            FROM queue_issues
            ORDER BY first_seen, instance, download_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key = IssueKey::new(
                row.get::<String, _>("instance"),
                row.get::<String, _>("download_id"),
            );
            let kind: String = row.get("kind");
            let Some(kind) = IssueKind::parse(&kind) else {
                tracing::warn!("skipping queue issue {} with unknown kind {:?}", key, kind);
                continue;
            };
            let item_key: Option<String> = row.get("item_key");
            let item = item_key.as_deref().and_then(|k| k.parse::<ItemKey>().ok());
            let messages_json: String = row.get("messages_json");
            let state: String = row.get("state");
            out.push(QueueIssue {
                key,
                title: row.get("title"),
                item,
                kind,
                messages: serde_json::from_str(&messages_json).unwrap_or_default(),
                first_seen: from_ts(row.get("first_seen")),
                detected_at: from_ts(row.get("detected_at")),
                deadline: opt_from_ts(row.get("deadline")),
                state: IssueState::from_str(&state),
                resolving: false,
            });
        }
        Ok(out)
    }
}
