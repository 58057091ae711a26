//! CLI command handlers, one file per command group.

mod check_config;
mod completions;
mod control;
mod history;
mod interventions;
mod issues;
mod run;
mod status;

pub use check_config::run_check_config;
pub use completions::{run_completions, run_man};
pub use history::run_history;
pub use control::{control_request, run_forwarded, run_local};
pub use interventions::run_interventions;
pub use issues::run_issues;
pub use run::run_scheduler;
pub use status::run_status;
