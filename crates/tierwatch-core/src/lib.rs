pub mod config;
pub mod control;
pub mod logging;

// Policy: tiers, pacing, cooldowns, budget, selection
pub mod budget;
pub mod cooldown;
pub mod model;
pub mod pacing;
pub mod selector;
pub mod tier;

// Escalation and queue health
pub mod escalation;
pub mod queue_monitor;

// Collaborators, persistence and the engine that ties them together
pub mod engine;
pub mod error;
pub mod history;
pub mod runner;
pub mod store;
pub mod upstream;
