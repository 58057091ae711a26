//! Tracing setup for the scheduler and the one-shot commands.
//!
//! `tierwatch run` is usually started by a service manager with no terminal,
//! so events go to `tierwatch.log` in the XDG state dir next to `state.db`.
//! `RUST_LOG` replaces the default filter.

use anyhow::{anyhow, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Engine decisions (selection, escalations, removals) log at debug.
const DEFAULT_FILTER: &str = "info,tierwatch_core=debug,tierwatch=debug";

/// Destination for one formatted event.
enum LogSink {
    File(File),
    /// The log file handle could not be duplicated for this event.
    Stderr,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr => io::stderr().lock().flush(),
        }
    }
}

/// Hands every event a duplicate of the append-mode log file.
struct AppendLog(File);

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogSink::File(f),
            Err(_) => LogSink::Stderr,
        }
    }
}

/// `$XDG_STATE_HOME/tierwatch/tierwatch.log`.
pub fn log_path() -> Result<PathBuf> {
    let state = xdg::BaseDirectories::with_prefix("tierwatch")?.get_state_home();
    Ok(state.join("tierwatch.log"))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to `log_path()`. An Err leaves no subscriber installed; the caller
/// then switches to `init_logging_stderr`.
pub fn init_logging() -> Result<()> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(BoxMakeWriter::new(AppendLog(file)))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("tracing subscriber already set: {}", e))?;

    tracing::info!(path = %path.display(), "tierwatch log opened");
    Ok(())
}

/// Log to stderr. A second call is a no-op.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
