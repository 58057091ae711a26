//! `tierwatch issues`.

use anyhow::Result;
use chrono::Utc;
use tierwatch_core::engine::Engine;
use tierwatch_core::escalation::humanize;

pub async fn run_issues(engine: &Engine) -> Result<()> {
    let now = Utc::now();
    let issues = engine.queue_issues().await;
    if issues.is_empty() {
        println!("No queue issues.");
        return Ok(());
    }
    println!(
        "{:<28} {:<24} {:<15} {:<10} {}",
        "KEY", "KIND", "STATE", "REMAINING", "TITLE"
    );
    for issue in issues {
        let remaining = issue
            .time_remaining(now)
            .map(humanize)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<24} {:<15} {:<10} {}",
            issue.key.to_string(),
            issue.kind.as_str(),
            issue.state.as_str(),
            remaining,
            issue.title
        );
    }
    Ok(())
}
