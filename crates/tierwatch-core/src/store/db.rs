//! SQLite-backed state store.
//!
//! Handles connection, migrations, and timestamp helpers. Per-entity reads and
//! writes live in the sibling modules.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the persisted scheduler state.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/tierwatch/state.db`.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) pool: Pool<Sqlite>,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        instance TEXT NOT NULL,
        media_type TEXT NOT NULL,
        external_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        released_at INTEGER,
        group_id INTEGER,
        search_kind TEXT NOT NULL,
        first_seen_at INTEGER NOT NULL,
        last_searched_at INTEGER,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        streak_started_at INTEGER,
        PRIMARY KEY (instance, media_type, external_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS escalations (
        item_key TEXT PRIMARY KEY,
        escalation_json TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interventions (
        id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        subject_json TEXT NOT NULL,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        tier TEXT,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        since INTEGER,
        detail TEXT NOT NULL,
        decision TEXT NOT NULL,
        decided_at INTEGER
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queue_issues (
        instance TEXT NOT NULL,
        download_id TEXT NOT NULL,
        title TEXT NOT NULL,
        item_key TEXT,
        kind TEXT NOT NULL,
        messages_json TEXT NOT NULL,
        first_seen INTEGER NOT NULL,
        detected_at INTEGER NOT NULL,
        deadline INTEGER,
        state TEXT NOT NULL,
        PRIMARY KEY (instance, download_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        at INTEGER NOT NULL,
        item_key TEXT NOT NULL,
        title TEXT NOT NULL,
        group_id INTEGER,
        kind TEXT NOT NULL,
        tier TEXT NOT NULL,
        outcome TEXT NOT NULL,
        error TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS finds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_key TEXT NOT NULL,
        title TEXT NOT NULL,
        kind TEXT NOT NULL,
        tier TEXT NOT NULL,
        searched_at INTEGER NOT NULL,
        found_at INTEGER NOT NULL,
        attempts INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rate_budget (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        day TEXT NOT NULL,
        used INTEGER NOT NULL
    );
    "#,
];

impl StateStore {
    /// Default database path under the XDG state directory.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tierwatch")?;
        Ok(xdg_dirs.get_state_home().join("state.db"))
    }

    /// Open (or create) the default state database and run migrations.
    pub async fn open_default() -> Result<Self> {
        Self::open_at(Self::default_path()?).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = StateStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database (no disk I/O). Single connection so every query sees
    /// the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = StateStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close every connection; later queries fail. Waits for in-progress writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Timestamp to Unix milliseconds (DB representation). Cooldown and grace
/// boundaries are compared after reload, so sub-second precision is kept.
pub(crate) fn to_ts(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_ts(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub(crate) fn opt_from_ts(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.map(from_ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_keep_milliseconds() {
        let t = DateTime::from_timestamp_millis(1_785_576_600_750).unwrap();
        assert_eq!(to_ts(t), 1_785_576_600_750);
        assert_eq!(from_ts(to_ts(t)), t);
        assert_eq!(opt_from_ts(None), None);
    }

    #[test]
    fn sqlite_uri_escapes_special_chars() {
        let uri = path_to_sqlite_uri(Path::new("/tmp/my state#1/db?.sqlite"));
        assert_eq!(uri, "sqlite:///tmp/my%20state%231/db%3F.sqlite");
    }
}
