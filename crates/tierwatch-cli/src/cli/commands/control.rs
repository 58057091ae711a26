//! `tierwatch search`, `resolve` and `decide`.
//!
//! Forwarded to a running `tierwatch run` over its control socket; applied to
//! a locally loaded engine only when no scheduler is running.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tierwatch_core::control::{self, ControlReply, ControlRequest};
use tierwatch_core::engine::Engine;
use tierwatch_core::escalation::Decision;

use crate::cli::control_socket;
use crate::cli::CliCommand;

/// The control request behind a write command, or `None` for other commands.
pub fn control_request(command: &CliCommand) -> Result<Option<ControlRequest>> {
    Ok(match command {
        CliCommand::Search { key, .. } => Some(ControlRequest::Search { key: key.parse()? }),
        CliCommand::Resolve { key, .. } => Some(ControlRequest::Resolve { key: key.parse()? }),
        CliCommand::Decide { id, decision } => {
            let decision = Decision::parse(decision).ok_or_else(|| {
                anyhow!("unknown decision {:?} (dismiss, reset, acknowledge)", decision)
            })?;
            Some(ControlRequest::Decide {
                id: id.clone(),
                decision,
            })
        }
        _ => None,
    })
}

/// Send `request` to the scheduler on `socket_path`. Returns false when none
/// is running.
pub async fn run_forwarded(socket_path: &Path, request: &ControlRequest) -> Result<bool> {
    match control_socket::send_request(socket_path, request).await? {
        Some(reply) => {
            report(reply)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Apply `request` to a locally loaded engine.
pub async fn run_local(engine: &Engine, request: &ControlRequest) -> Result<()> {
    report(ControlReply::from_result(
        control::execute(engine, request, Utc::now()).await,
    ))
}

fn report(reply: ControlReply) -> Result<()> {
    match reply {
        ControlReply::Done { message } => {
            println!("{message}");
            Ok(())
        }
        ControlReply::Failed { message } => bail!(message),
    }
}
