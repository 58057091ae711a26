//! `tierwatch check-config` – validate the config and show the derived pacing.

use anyhow::Result;
use tierwatch_core::config::Settings;
use tierwatch_core::escalation::humanize;
use tierwatch_core::tier::Tier;

pub fn run_check_config(settings: &Settings) -> Result<()> {
    println!("Config OK.");
    println!(
        "Daily limit {} calls, {} per cycle, search every {}, queue every {}",
        settings.daily_api_limit,
        settings.searches_per_cycle,
        humanize(settings.search_interval),
        humanize(settings.queue_interval)
    );
    match settings.quiet_hours {
        Some(q) => println!("Quiet hours {:02}:00-{:02}:00", q.start(), q.end()),
        None => println!("No quiet hours"),
    }
    println!();
    println!(
        "{:<6} {:>7} {:>9} {:>12} {:>10} {:>7}",
        "TIER", "WEIGHT", "COOLDOWN", "MAX ATTEMPTS", "SECONDARY", "WINDOW"
    );
    for tier in Tier::ALL {
        let p = settings.pacing.tier(tier);
        println!(
            "{:<6} {:>7} {:>9} {:>12} {:>10} {:>7}",
            tier.as_str(),
            settings.distribution.weight(tier),
            humanize(p.cooldown),
            p.max_attempts,
            humanize(p.secondary_cooldown),
            humanize(p.escalation_window)
        );
    }
    println!();
    println!(
        "Auto-resolve: {}, grace {}",
        if settings.auto_resolve_enabled { "on" } else { "off" },
        humanize(settings.grace_period)
    );
    for inst in &settings.instances {
        println!("Instance {} ({})", inst.name, inst.media_type.as_str());
    }
    Ok(())
}
