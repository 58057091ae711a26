//! Persistent scheduler state (SQLite via sqlx).
//!
//! Stores items, escalation state, interventions, queue issues, search history,
//! finds, and today's rate-budget usage. Each write touches the rows of a
//! single entity, so a crash never leaves a half-applied multi-item change.

pub mod db;
mod history;
mod interventions;
mod items;
mod queue;

pub use db::StateStore;
