//! `tierwatch interventions`.

use anyhow::Result;
use chrono::Utc;
use tierwatch_core::engine::Engine;
use tierwatch_core::escalation::humanize;

pub async fn run_interventions(engine: &Engine, all: bool) -> Result<()> {
    let now = Utc::now();
    let list = if all {
        engine.interventions().await
    } else {
        engine.open_interventions().await
    };
    if list.is_empty() {
        println!("No interventions.");
        return Ok(());
    }
    println!("{:<40} {:<10} {:<8} {:<6} {}", "ID", "DECISION", "AGE", "TIER", "DETAIL");
    for iv in list {
        println!(
            "{:<40} {:<10} {:<8} {:<6} {}: {}",
            iv.id,
            iv.decision.as_str(),
            humanize(now - iv.created_at),
            iv.tier.map(|t| t.as_str()).unwrap_or("-"),
            iv.title,
            iv.detail
        );
    }
    Ok(())
}
