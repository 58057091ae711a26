//! Search history, finds, and the rate-budget row.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use super::db::{from_ts, to_ts, StateStore};
use crate::history::{FindRecord, SearchOutcome, SearchRecord};
use crate::model::{Item, ItemKey, SearchKind};
use crate::tier::Tier;

impl StateStore {
    /// Persist a search attempt together with the item row it updated, in one
    /// transaction, then prune history beyond `cap`.
    pub async fn record_search(&self, item: &Item, rec: &SearchRecord, cap: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE items
            SET last_searched_at = ?1, attempt_count = ?2, streak_started_at = ?3
            WHERE instance = ?4 AND media_type = ?5 AND external_id = ?6
            "#,
        )
        .bind(item.last_searched_at.map(to_ts))
        .bind(i64::from(item.attempt_count))
        .bind(item.streak_started_at.map(to_ts))
        .bind(&item.key.instance)
        .bind(item.key.media_type.as_str())
        .bind(item.key.external_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO search_history (at, item_key, title, group_id, kind, tier, outcome, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(to_ts(rec.at))
        .bind(rec.item.to_string())
        .bind(&rec.title)
        .bind(rec.group_id)
        .bind(rec.kind.as_str())
        .bind(rec.tier.as_str())
        .bind(rec.outcome.as_str())
        .bind(rec.error.as_deref())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM search_history
            WHERE id NOT IN (SELECT id FROM search_history ORDER BY id DESC LIMIT ?1)
            "#,
        )
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Most recent search records, newest first.
    pub async fn recent_searches(&self, limit: usize) -> Result<Vec<SearchRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT at, item_key, title, group_id, kind, tier, outcome, error
            FROM search_history
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("item_key");
            let Ok(item) = key.parse::<ItemKey>() else {
                continue;
            };
            let kind: String = row.get("kind");
            let tier: String = row.get("tier");
            let outcome: String = row.get("outcome");
            out.push(SearchRecord {
                at: from_ts(row.get("at")),
                item,
                title: row.get("title"),
                group_id: row.get("group_id"),
                kind: SearchKind::parse(&kind).unwrap_or(SearchKind::Missing),
                tier: Tier::parse(&tier).unwrap_or(Tier::Cold),
                outcome: SearchOutcome::from_str(&outcome),
                error: row.get("error"),
            });
        }
        Ok(out)
    }

    /// Group searches made since `since`, as `(instance, group_id, at)`.
    /// Used to rebuild duplicate suppression after a restart.
    pub async fn group_searches_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64, DateTime<Utc>)>> {
        let rows = sqlx::query(
            r#"
            SELECT item_key, group_id, MAX(at) AS at
            FROM search_history
            WHERE group_id IS NOT NULL AND outcome = 'triggered' AND at >= ?1
            GROUP BY item_key, group_id
            "#,
        )
        .bind(to_ts(since))
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("item_key");
            let Ok(key) = key.parse::<ItemKey>() else {
                continue;
            };
            out.push((key.instance, row.get("group_id"), from_ts(row.get("at"))));
        }
        Ok(out)
    }

    /// Archive a find and drop the item, in one transaction.
    pub async fn record_find(&self, find: &FindRecord, cap: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO finds (item_key, title, kind, tier, searched_at, found_at, attempts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(find.item.to_string())
        .bind(&find.title)
        .bind(find.kind.as_str())
        .bind(find.tier.as_str())
        .bind(to_ts(find.searched_at))
        .bind(to_ts(find.found_at))
        .bind(i64::from(find.attempts))
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            DELETE FROM finds
            WHERE id NOT IN (SELECT id FROM finds ORDER BY id DESC LIMIT ?1)
            "#,
        )
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Most recent finds, newest first.
    pub async fn recent_finds(&self, limit: usize) -> Result<Vec<FindRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT item_key, title, kind, tier, searched_at, found_at, attempts
            FROM finds
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("item_key");
            let Ok(item) = key.parse::<ItemKey>() else {
                continue;
            };
            let kind: String = row.get("kind");
            let tier: String = row.get("tier");
            let attempts: i64 = row.get("attempts");
            out.push(FindRecord {
                item,
                title: row.get("title"),
                kind: SearchKind::parse(&kind).unwrap_or(SearchKind::Missing),
                tier: Tier::parse(&tier).unwrap_or(Tier::Cold),
                searched_at: from_ts(row.get("searched_at")),
                found_at: from_ts(row.get("found_at")),
                attempts: attempts.max(0) as u32,
            });
        }
        Ok(out)
    }

    pub async fn save_budget(&self, day: NaiveDate, used: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_budget (id, day, used) VALUES (1, ?1, ?2)
            ON CONFLICT (id) DO UPDATE SET day = excluded.day, used = excluded.used
            "#,
        )
        .bind(day.to_string())
        .bind(i64::from(used))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_budget(&self) -> Result<Option<(NaiveDate, u32)>> {
        let row = sqlx::query(r#"SELECT day, used FROM rate_budget WHERE id = 1"#)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let day: String = row.get("day");
        let used: i64 = row.get("used");
        Ok(Some((day.parse()?, used.max(0) as u32)))
    }
}
