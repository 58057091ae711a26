//! Item and per-item escalation rows.

use anyhow::{Context, Result};
use sqlx::Row;

use super::db::{from_ts, opt_from_ts, to_ts, StateStore};
use crate::escalation::ItemEscalation;
use crate::model::{Item, ItemKey, MediaType, SearchKind};

impl StateStore {
    /// Insert or replace one item row.
    pub async fn upsert_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (
                instance, media_type, external_id, title, released_at, group_id,
                search_kind, first_seen_at, last_searched_at, attempt_count, streak_started_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (instance, media_type, external_id) DO UPDATE SET
                title = excluded.title,
                released_at = excluded.released_at,
                group_id = excluded.group_id,
                search_kind = excluded.search_kind,
                last_searched_at = excluded.last_searched_at,
                attempt_count = excluded.attempt_count,
                streak_started_at = excluded.streak_started_at
            "#,
        )
        .bind(&item.key.instance)
        .bind(item.key.media_type.as_str())
        .bind(item.key.external_id)
        .bind(&item.title)
        .bind(item.released_at.map(to_ts))
        .bind(item.group_id)
        .bind(item.search_kind.as_str())
        .bind(to_ts(item.first_seen_at))
        .bind(item.last_searched_at.map(to_ts))
        .bind(i64::from(item.attempt_count))
        .bind(item.streak_started_at.map(to_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove an item and its escalation row.
    pub async fn delete_item(&self, key: &ItemKey) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"DELETE FROM items WHERE instance = ?1 AND media_type = ?2 AND external_id = ?3"#,
        )
        .bind(&key.instance)
        .bind(key.media_type.as_str())
        .bind(key.external_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(r#"DELETE FROM escalations WHERE item_key = ?1"#)
            .bind(key.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// All tracked items.
    pub async fn load_items(&self) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT instance, media_type, external_id, title, released_at, group_id,
                   search_kind, first_seen_at, last_searched_at, attempt_count, streak_started_at
            FROM items
            ORDER BY instance, media_type, external_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let media: String = row.get("media_type");
            let kind: String = row.get("search_kind");
            let Some(media_type) = MediaType::parse(&media) else {
                tracing::warn!("skipping item row with unknown media type {:?}", media);
                continue;
            };
            let attempt_count: i64 = row.get("attempt_count");
            out.push(Item {
                key: ItemKey::new(
                    row.get::<String, _>("instance"),
                    media_type,
                    row.get("external_id"),
                ),
                title: row.get("title"),
                released_at: opt_from_ts(row.get("released_at")),
                group_id: row.get("group_id"),
                search_kind: SearchKind::parse(&kind).unwrap_or(SearchKind::Missing),
                first_seen_at: from_ts(row.get("first_seen_at")),
                last_searched_at: opt_from_ts(row.get("last_searched_at")),
                attempt_count: attempt_count.clamp(0, i64::from(u32::MAX)) as u32,
                streak_started_at: opt_from_ts(row.get("streak_started_at")),
                found_at: None,
                in_flight: false,
            });
        }
        Ok(out)
    }

    pub async fn save_escalation(&self, key: &ItemKey, esc: &ItemEscalation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO escalations (item_key, escalation_json) VALUES (?1, ?2)
            ON CONFLICT (item_key) DO UPDATE SET escalation_json = excluded.escalation_json
            "#,
        )
        .bind(key.to_string())
        .bind(serde_json::to_string(esc)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_escalations(&self) -> Result<Vec<(ItemKey, ItemEscalation)>> {
        let rows = sqlx::query(r#"SELECT item_key, escalation_json FROM escalations"#)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("item_key");
            let json: String = row.get("escalation_json");
            let key: ItemKey = key.parse()?;
            let esc: ItemEscalation = serde_json::from_str(&json)
                .with_context(|| format!("decode escalation for {}", key))?;
            out.push((key, esc));
        }
        Ok(out)
    }
}
