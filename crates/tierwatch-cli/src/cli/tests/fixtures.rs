//! Tests for the file-backed fixture upstream.

use chrono::{TimeZone, Utc};
use tempfile::tempdir;
use tierwatch_core::config::{InstanceConfig, Settings};
use tierwatch_core::model::{Item, ItemSnapshot, MediaType, SearchKind};
use tierwatch_core::queue_monitor::{IssueKey, IssueKind, IssueState, QueueEntry, QueueIssue};
use tierwatch_core::upstream::{Upstream, UpstreamError};

use crate::cli::fixtures::{load_upstreams, FixtureUpstream};

fn snapshot(id: i64) -> ItemSnapshot {
    ItemSnapshot {
        external_id: id,
        media_type: MediaType::Episode,
        title: format!("Show - E{id}"),
        released_at: None,
        group_id: Some(3),
    }
}

fn entry(id: &str) -> QueueEntry {
    QueueEntry {
        download_id: id.to_string(),
        title: format!("Release {id}"),
        item: None,
        issues: vec![IssueKind::SampleOnly],
        messages: Vec::new(),
    }
}

#[tokio::test]
async fn reads_snapshots_and_treats_missing_files_as_empty() {
    let dir = tempdir().unwrap();
    let inst = dir.path().join("tv");
    std::fs::create_dir_all(&inst).unwrap();
    std::fs::write(
        inst.join("missing.json"),
        serde_json::to_string(&vec![snapshot(1), snapshot(2)]).unwrap(),
    )
    .unwrap();

    let up = FixtureUpstream::new("tv", dir.path());
    assert_eq!(up.instance(), "tv");
    assert_eq!(up.fetch_missing().await.unwrap().len(), 2);
    assert!(up.fetch_cutoff_unmet().await.unwrap().is_empty());
    assert!(up.fetch_queue().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_fixture_is_a_transport_error() {
    let dir = tempdir().unwrap();
    let inst = dir.path().join("tv");
    std::fs::create_dir_all(&inst).unwrap();
    std::fs::write(inst.join("missing.json"), "{not json").unwrap();

    let up = FixtureUpstream::new("tv", dir.path());
    assert!(matches!(
        up.fetch_missing().await,
        Err(UpstreamError::Transport(_))
    ));
}

#[tokio::test]
async fn actions_are_appended_and_removals_edit_the_queue() {
    let dir = tempdir().unwrap();
    let inst = dir.path().join("tv");
    std::fs::create_dir_all(&inst).unwrap();
    std::fs::write(
        inst.join("queue.json"),
        serde_json::to_string(&vec![entry("a"), entry("b")]).unwrap(),
    )
    .unwrap();
    let up = FixtureUpstream::new("tv", dir.path());

    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let item = Item::from_snapshot("tv", &snapshot(1), SearchKind::Missing, now);
    up.trigger_search(&item, SearchKind::Missing).await.unwrap();

    let issue = QueueIssue {
        key: IssueKey::new("tv", "a"),
        title: "Release a".into(),
        item: None,
        kind: IssueKind::SampleOnly,
        messages: Vec::new(),
        first_seen: now,
        detected_at: now,
        deadline: Some(now),
        state: IssueState::AutoResolving,
        resolving: true,
    };
    up.remove_and_blocklist(&issue).await.unwrap();

    let queue = up.fetch_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].download_id, "b");

    // Already gone: the download client would report not found.
    assert!(matches!(
        up.remove_and_blocklist(&issue).await,
        Err(UpstreamError::NotFound(_))
    ));

    let actions = std::fs::read_to_string(inst.join("actions.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = actions
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["action"], "search");
    assert_eq!(lines[0]["kind"], "missing");
    assert_eq!(lines[0]["group_id"], 3);
    assert_eq!(lines[1]["action"], "remove");
    assert_eq!(lines[1]["download_id"], "a");
}

#[tokio::test]
async fn upstreams_come_from_config_or_fixture_dirs() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("movies")).unwrap();
    std::fs::create_dir_all(dir.path().join("anime")).unwrap();

    let settings = Settings::default();
    let ups = load_upstreams(dir.path(), &settings).await.unwrap();
    let names: Vec<&str> = ups.iter().map(|u| u.instance()).collect();
    assert_eq!(names, vec!["anime", "movies"]);

    let mut settings = Settings::default();
    settings.instances = vec![InstanceConfig {
        name: "tv".into(),
        media_type: MediaType::Episode,
        enabled: true,
    }];
    let ups = load_upstreams(dir.path(), &settings).await.unwrap();
    assert_eq!(ups.len(), 1);
    assert_eq!(ups[0].instance(), "tv");

    let empty = tempdir().unwrap();
    assert!(load_upstreams(empty.path(), &Settings::default())
        .await
        .is_err());
}
