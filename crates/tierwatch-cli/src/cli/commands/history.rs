//! `tierwatch history` – recent searches or finds.

use anyhow::Result;
use tierwatch_core::engine::Engine;
use tierwatch_core::escalation::humanize;
use tierwatch_core::history::OutcomeCounts;

pub async fn run_history(engine: &Engine, limit: usize, finds: bool) -> Result<()> {
    if finds {
        let finds = engine.recent_finds(limit).await?;
        if finds.is_empty() {
            println!("No finds yet.");
            return Ok(());
        }
        println!("{:<20} {:<6} {:>8} {:<10} {}", "FOUND", "TIER", "ATTEMPTS", "AFTER", "ITEM");
        for f in finds {
            println!(
                "{:<20} {:<6} {:>8} {:<10} {} ({})",
                f.found_at.format("%Y-%m-%d %H:%M"),
                f.tier.as_str(),
                f.attempts,
                humanize(f.found_at - f.searched_at),
                f.title,
                f.item
            );
        }
        return Ok(());
    }

    let searches = engine.recent_searches(limit).await?;
    if searches.is_empty() {
        println!("No searches yet.");
        return Ok(());
    }
    let counts = OutcomeCounts::tally(&searches);
    println!("{:<20} {:<6} {:<8} {:<18} {}", "AT", "TIER", "KIND", "OUTCOME", "ITEM");
    for s in &searches {
        println!(
            "{:<20} {:<6} {:<8} {:<18} {} ({}){}",
            s.at.format("%Y-%m-%d %H:%M"),
            s.tier.as_str(),
            s.kind.as_str(),
            s.outcome.as_str(),
            s.title,
            s.item,
            s.error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        );
    }
    println!();
    println!(
        "{} triggered, {} provider errors, {} duplicates ({} calls)",
        counts.triggered,
        counts.provider_error,
        counts.skipped_duplicate,
        counts.calls()
    );
    Ok(())
}
