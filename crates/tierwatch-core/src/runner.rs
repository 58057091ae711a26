//! Periodic driver: the search cycle and the queue cycle on independent tokio intervals.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::engine::{Engine, QueueCycleReport, SearchCycleReport};

/// Which cycle a loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Search,
    Queue,
}

impl Cycle {
    fn as_str(self) -> &'static str {
        match self {
            Cycle::Search => "search",
            Cycle::Queue => "queue",
        }
    }
}

fn to_std(d: Duration) -> StdDuration {
    d.to_std()
        .unwrap_or(StdDuration::from_secs(60))
        .max(StdDuration::from_secs(1))
}

/// Run one search cycle and one queue cycle, in that order.
pub async fn run_once(engine: &Engine) -> Result<(SearchCycleReport, QueueCycleReport)> {
    let search = engine.run_search_cycle(Utc::now()).await?;
    let queue = engine.run_queue_cycle(Utc::now()).await?;
    Ok((search, queue))
}

/// Drive both cycles until `shutdown` turns true or its sender is dropped.
/// A cycle that fails is logged and retried at the next tick. A cycle already
/// running when shutdown arrives finishes first.
pub async fn run_cycles(engine: Arc<Engine>, shutdown: watch::Receiver<bool>) {
    let search_every = to_std(engine.settings().search_interval);
    let queue_every = to_std(engine.settings().queue_interval);
    tracing::info!(
        "cycle runner started: search every {:?}, queue every {:?}",
        search_every,
        queue_every
    );

    tokio::join!(
        cycle_loop(engine.clone(), Cycle::Search, search_every, shutdown.clone()),
        cycle_loop(engine, Cycle::Queue, queue_every, shutdown),
    );

    tracing::info!("cycle runner stopped");
}

async fn cycle_loop(
    engine: Arc<Engine>,
    cycle: Cycle,
    every: StdDuration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = timer.tick() => {
                let now = Utc::now();
                let result = match cycle {
                    Cycle::Search => engine.run_search_cycle(now).await.map(|_| ()),
                    Cycle::Queue => engine.run_queue_cycle(now).await.map(|_| ()),
                };
                if let Err(e) = result {
                    tracing::error!("{} cycle failed: {:#}", cycle.as_str(), e);
                }
            }
        }
    }
}
