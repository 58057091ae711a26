//! Tests for routing write commands to a running scheduler.

use std::sync::Arc;

use chrono::Utc;
use tempfile::tempdir;
use tierwatch_core::config::Settings;
use tierwatch_core::control::{control_socket_path_for, ControlReply, ControlRequest};
use tierwatch_core::engine::Engine;
use tierwatch_core::escalation::Decision;
use tierwatch_core::model::{ItemKey, ItemSnapshot, MediaType};
use tierwatch_core::queue_monitor::IssueKey;
use tierwatch_core::store::StateStore;

use super::parse;
use crate::cli::commands::control_request;
use crate::cli::control_socket::{ensure_not_running, send_request, spawn_control_listener};
use crate::cli::fixtures::load_upstreams;

async fn scheduler_with_one_item(root: &std::path::Path) -> Arc<Engine> {
    let fixtures = root.join("fixtures");
    std::fs::create_dir_all(fixtures.join("tv")).unwrap();
    let snapshot = ItemSnapshot {
        external_id: 1,
        media_type: MediaType::Episode,
        title: "Show - E1".into(),
        released_at: None,
        group_id: None,
    };
    std::fs::write(
        fixtures.join("tv").join("missing.json"),
        serde_json::to_string(&vec![snapshot]).unwrap(),
    )
    .unwrap();

    let settings = Settings::default();
    let upstreams = load_upstreams(&fixtures, &settings).await.unwrap();
    let store = StateStore::open_at(root.join("state.db")).await.unwrap();
    Engine::load(settings, store, upstreams, Utc::now())
        .await
        .unwrap()
}

#[test]
fn write_commands_map_to_control_requests() {
    let cli = parse(&["tierwatch", "search", "tv:episode:7", "--fixtures", "/tmp/fx"]);
    assert_eq!(
        control_request(&cli.command).unwrap(),
        Some(ControlRequest::Search {
            key: ItemKey::new("tv", MediaType::Episode, 7)
        })
    );

    let cli = parse(&["tierwatch", "resolve", "tv:dl-9", "--fixtures", "/tmp/fx"]);
    assert_eq!(
        control_request(&cli.command).unwrap(),
        Some(ControlRequest::Resolve {
            key: IssueKey::new("tv", "dl-9")
        })
    );

    let cli = parse(&["tierwatch", "decide", "urgent:tv:episode:7", "ack"]);
    assert_eq!(
        control_request(&cli.command).unwrap(),
        Some(ControlRequest::Decide {
            id: "urgent:tv:episode:7".into(),
            decision: Decision::Acknowledge
        })
    );

    let cli = parse(&["tierwatch", "decide", "urgent:tv:episode:7", "retry"]);
    assert!(control_request(&cli.command).is_err());

    let cli = parse(&["tierwatch", "status"]);
    assert_eq!(control_request(&cli.command).unwrap(), None);
}

#[tokio::test]
async fn no_scheduler_means_no_reply() {
    let dir = tempdir().unwrap();
    let socket = control_socket_path_for(&dir.path().join("state.db"));
    assert_eq!(send_request(&socket, &ControlRequest::Ping).await.unwrap(), None);

    // A socket file left behind by a crashed scheduler is not a live one.
    drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
    assert!(socket.exists());
    assert_eq!(send_request(&socket, &ControlRequest::Ping).await.unwrap(), None);
    ensure_not_running(&socket).await.unwrap();
}

#[tokio::test]
async fn requests_are_applied_to_the_live_engine() {
    let dir = tempdir().unwrap();
    let engine = scheduler_with_one_item(dir.path()).await;
    engine.run_search_cycle(Utc::now()).await.unwrap();
    let key = ItemKey::new("tv", MediaType::Episode, 1);
    assert_eq!(engine.item(&key).await.unwrap().attempt_count, 1);

    let socket = control_socket_path_for(&dir.path().join("state.db"));
    let listener = spawn_control_listener(Arc::clone(&engine), &socket)
        .await
        .unwrap();

    // One owner per state database.
    assert!(ensure_not_running(&socket).await.is_err());
    assert!(spawn_control_listener(Arc::clone(&engine), &socket)
        .await
        .is_err());

    let reply = send_request(&socket, &ControlRequest::Search { key: key.clone() })
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(ControlReply::Done {
            message: "Search triggered for tv:episode:1".into()
        })
    );
    // Counted by the scheduler's own item and budget, not a second copy.
    assert_eq!(engine.item(&key).await.unwrap().attempt_count, 2);
    assert_eq!(engine.status(Utc::now()).await.budget_used, 2);

    let reply = send_request(
        &socket,
        &ControlRequest::Decide {
            id: "urgent:tv:episode:1".into(),
            decision: Decision::Reset,
        },
    )
    .await
    .unwrap();
    assert_eq!(
        reply,
        Some(ControlReply::Failed {
            message: "unknown intervention urgent:tv:episode:1".into()
        })
    );
    assert_eq!(engine.item(&key).await.unwrap().attempt_count, 2);

    listener.abort();
}
