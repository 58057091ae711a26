//! `tierwatch status` – tier counts, budget and open work.

use anyhow::Result;
use chrono::Utc;
use tierwatch_core::engine::Engine;
use tierwatch_core::tier::Tier;

pub async fn run_status(engine: &Engine) -> Result<()> {
    let now = Utc::now();
    let status = engine.status(now).await;
    let tiers = &engine.settings().tiers;

    println!(
        "Preset: {}  ({} searches per cycle)",
        status.preset.as_str(),
        status.searches_per_cycle
    );
    println!(
        "Budget: {}/{} used on {} ({})",
        status.budget_used, status.budget_ceiling, status.budget_day, status.budget
    );
    println!();
    println!(
        "{:<6} {:<12} {:>7} {:>9} {:>10}",
        "TIER", "AGE (DAYS)", "ITEMS", "ELIGIBLE", "EXHAUSTED"
    );
    for tier in Tier::ALL {
        let c = status.tiers[tier.index()];
        let range = match tiers.upper_bound(tier) {
            Some(upper) => format!("{}-{}", tiers.lower_bound(tier), upper - 1),
            None => format!("{}+", tiers.lower_bound(tier)),
        };
        println!(
            "{:<6} {:<12} {:>7} {:>9} {:>10}",
            tier.as_str(),
            range,
            c.total,
            c.eligible,
            c.exhausted
        );
    }
    println!();
    println!(
        "Tracked: {}  In flight: {}  Open interventions: {}  Queue issues: {}",
        status.tracked(),
        status.in_flight,
        status.open_interventions,
        status.queue_issues
    );
    Ok(())
}
