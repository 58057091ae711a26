//! `tierwatch run` – drive the search and queue cycles.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tierwatch_core::engine::{Engine, QueueCycleReport, SearchCycleReport};
use tierwatch_core::runner;
use tokio::sync::watch;

use crate::cli::control_socket;

/// Own the state for the whole run: manual commands from other processes
/// arrive over the control socket at `socket_path`.
pub async fn run_scheduler(engine: Arc<Engine>, once: bool, socket_path: &Path) -> Result<()> {
    let listener = control_socket::spawn_control_listener(Arc::clone(&engine), socket_path).await?;
    let result = drive(Arc::clone(&engine), once).await;
    listener.abort();
    let _ = std::fs::remove_file(socket_path);
    engine.store().close().await;
    result
}

async fn drive(engine: Arc<Engine>, once: bool) -> Result<()> {
    if once {
        let (search, queue) = runner::run_once(&engine).await?;
        print_search(&search);
        print_queue(&queue);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received; finishing current cycles"),
            Err(e) => tracing::warn!("could not listen for ctrl-c: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    println!(
        "Running: search every {} min, queue every {} min. Ctrl-C to stop.",
        engine.settings().search_interval.num_minutes(),
        engine.settings().queue_interval.num_minutes()
    );
    runner::run_cycles(engine, shutdown_rx).await;
    Ok(())
}

fn print_search(r: &SearchCycleReport) {
    if let Some(budget) = r.budget {
        println!("Budget: {}", budget);
    }
    println!(
        "Synced: {} new, {} found, {} instance(s) failed",
        r.items_added, r.items_found, r.instances_failed
    );
    println!(
        "Searched: {} eligible, {} granted (hot {}, warm {}, cool {}, cold {})",
        r.eligible, r.granted, r.selected[0], r.selected[1], r.selected[2], r.selected[3]
    );
    println!(
        "Outcomes: {} triggered, {} provider errors, {} duplicates",
        r.outcomes.triggered, r.outcomes.provider_error, r.outcomes.skipped_duplicate
    );
    for iv in &r.interventions_raised {
        println!("New intervention: {} ({})", iv.id, iv.detail);
    }
}

fn print_queue(r: &QueueCycleReport) {
    println!(
        "Queue: {} polled, {} failed, {} new issues, {} auto-resolved, {} escalated, {} cleared",
        r.polled, r.polls_failed, r.detected, r.auto_resolved, r.auto_resolve_failed, r.removed
    );
    for iv in &r.interventions_raised {
        println!("New intervention: {} ({})", iv.id, iv.detail);
    }
}
