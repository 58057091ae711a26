//! Control socket: server (during `tierwatch run`) and client (for `search`,
//! `resolve` and `decide`). Protocol: one JSON `ControlRequest` per line, each
//! answered by one JSON `ControlReply` line.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tierwatch_core::control::{self, ControlReply, ControlRequest};
use tierwatch_core::engine::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// Binds `path` and spawns a task applying every request to `engine`.
/// Fails if another scheduler already answers on `path`.
pub async fn spawn_control_listener(
    engine: Arc<Engine>,
    path: impl AsRef<Path>,
) -> Result<JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    ensure_not_running(&path).await?;
    // Anything left at the path is a stale socket from an unclean exit.
    let _ = std::fs::remove_file(&path);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create control socket dir: {}", dir.display()))?;
    }
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket: {}", path.display()))?;
    tracing::info!(path = %path.display(), "control socket listening");

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(&engine, stream).await {
                            tracing::debug!("control connection: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    }))
}

async fn serve_connection(engine: &Engine, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ControlRequest>(line) {
            Ok(request) => {
                tracing::debug!("control request: {:?}", request);
                ControlReply::from_result(control::execute(engine, &request, Utc::now()).await)
            }
            Err(e) => ControlReply::Failed {
                message: format!("malformed control request: {}", e),
            },
        };
        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Sends `request` to the scheduler listening on `socket_path`. `Ok(None)`
/// when no scheduler is running there.
pub async fn send_request(
    socket_path: &Path,
    request: &ControlRequest,
) -> Result<Option<ControlReply>> {
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Ok(None)
        }
        Err(e) => {
            return Err(e).with_context(|| format!("connect: {}", socket_path.display()))
        }
    };
    let (read, mut write) = stream.into_split();
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;

    let mut lines = BufReader::new(read).lines();
    match lines.next_line().await? {
        Some(reply) => Ok(Some(
            serde_json::from_str(&reply).context("malformed control reply")?,
        )),
        None => bail!("scheduler closed the control socket without replying"),
    }
}

/// Errors if a scheduler already answers on `socket_path`.
pub async fn ensure_not_running(socket_path: &Path) -> Result<()> {
    if send_request(socket_path, &ControlRequest::Ping)
        .await?
        .is_some()
    {
        bail!(
            "tierwatch run is already active (control socket {})",
            socket_path.display()
        );
    }
    Ok(())
}
