//! Intervention rows.

use anyhow::{Context, Result};
use sqlx::Row;

use super::db::{from_ts, opt_from_ts, to_ts, StateStore};
use crate::escalation::{Category, DecisionState, Intervention, Subject};
use crate::tier::Tier;

impl StateStore {
    pub async fn upsert_intervention(&self, iv: &Intervention) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO interventions (
                id, category, subject_json, title, created_at, tier,
                attempt_count, since, detail, decision, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&iv.id)
        .bind(iv.category.as_str())
        .bind(serde_json::to_string(&iv.subject)?)
        .bind(&iv.title)
        .bind(to_ts(iv.created_at))
        .bind(iv.tier.map(|t| t.as_str()))
        .bind(i64::from(iv.attempt_count))
        .bind(iv.since.map(to_ts))
        .bind(&iv.detail)
        .bind(iv.decision.as_str())
        .bind(iv.decided_at.map(to_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_interventions(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(r#"DELETE FROM interventions WHERE id = ?1"#)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_interventions(&self) -> Result<Vec<Intervention>> {
        let rows = sqlx::query(
            r#"
            SELECT id, category, subject_json, title, created_at, tier,
                   attempt_count, since, detail, decision, decided_at
            FROM interventions
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let category: String = row.get("category");
            let Some(category) = Category::parse(&category) else {
                tracing::warn!("skipping intervention {} with unknown category", id);
                continue;
            };
            let subject_json: String = row.get("subject_json");
            let subject: Subject = serde_json::from_str(&subject_json)
                .with_context(|| format!("decode subject of intervention {}", id))?;
            let tier: Option<String> = row.get("tier");
            let decision: String = row.get("decision");
            let attempt_count: i64 = row.get("attempt_count");
            out.push(Intervention {
                id,
                category,
                subject,
                title: row.get("title"),
                created_at: from_ts(row.get("created_at")),
                tier: tier.as_deref().and_then(Tier::parse),
                attempt_count: attempt_count.max(0) as u32,
                since: opt_from_ts(row.get("since")),
                detail: row.get("detail"),
                decision: DecisionState::from_str(&decision),
                decided_at: opt_from_ts(row.get("decided_at")),
            });
        }
        Ok(out)
    }
}
