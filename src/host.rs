//! Line-delimited JSON host. Each stdin line is one request; each response is
//! written to stdout as one line. Requests run as independent tasks so a
//! message waiting on a screenshot never blocks the next one.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::{JoinError, JoinSet},
};

use crate::{
    capture::{CommandCapture, FocusTracker, NoCapture, SurfaceCapture},
    config::HostConfig,
    db::{Database, MemoryStore, PersistenceStore},
    models::TargetRef,
    recorder::{handle_message, Recorder},
};

/// Wire the recorder to its collaborators and serve stdin/stdout until stdin
/// closes.
pub async fn serve_stdio(config: HostConfig) -> Result<()> {
    let store: Arc<dyn PersistenceStore> = if config.ephemeral {
        info!("ephemeral mode: recorder state is kept in memory only");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(Database::new(config.database_path())?)
    };

    let capture: Arc<dyn SurfaceCapture> = match config.capture_command.as_deref() {
        Some(command) => Arc::new(
            CommandCapture::from_command_line(command)
                .context("invalid FLOWTRACE_CAPTURE_CMD")?,
        ),
        None => {
            warn!("FLOWTRACE_CAPTURE_CMD is not set; screenshots will be skipped");
            Arc::new(NoCapture)
        }
    };

    let focus = Arc::new(FocusTracker::new());
    let recorder = Recorder::restore(capture, focus.clone(), store).await;

    serve(
        recorder,
        focus,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

pub async fn serve<R, W>(
    recorder: Recorder,
    focus: Arc<FocusTracker>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (response_tx, response_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(write_responses(response_rx, output));

    let mut lines = input.lines();
    let mut handlers = JoinSet::new();

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(err) => {
                warn!("discarding unparseable request: {err}");
                let _ = response_tx.send(json!({
                    "ok": false,
                    "reason": "invalid-message",
                    "error": err.to_string(),
                }));
                continue;
            }
        };

        observe_focus(&focus, &message);

        reap_finished(&mut handlers);

        let recorder = recorder.clone();
        let response_tx = response_tx.clone();
        handlers.spawn(async move {
            let response = handle_message(&recorder, message).await;
            let _ = response_tx.send(response);
        });
    }

    while let Some(result) = handlers.join_next().await {
        log_join_failure(result);
    }

    drop(response_tx);
    writer.await.context("response writer panicked")?
}

/// Drop handlers that already finished so the set only holds in-flight
/// requests.
fn reap_finished(handlers: &mut JoinSet<()>) {
    while let Some(result) = handlers.try_join_next() {
        log_join_failure(result);
    }
}

fn log_join_failure(result: Result<(), JoinError>) {
    if let Err(err) = result {
        error!("request handler failed: {err}");
    }
}

async fn write_responses<W>(
    mut responses: mpsc::UnboundedReceiver<Value>,
    mut output: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = responses.recv().await {
        let mut line = serde_json::to_vec(&response).context("failed to encode response")?;
        line.push(b'\n');
        output
            .write_all(&line)
            .await
            .context("failed to write response")?;
        output.flush().await.context("failed to flush response")?;
    }
    Ok(())
}

/// Focus notifications also drive the resolver used for new sessions and notes.
fn observe_focus(focus: &FocusTracker, message: &Value) {
    if message.get("type").and_then(Value::as_str) != Some("TargetActivated") {
        return;
    }
    if let Some(target) = message
        .get("target")
        .and_then(|target| serde_json::from_value::<TargetRef>(target.clone()).ok())
    {
        focus.focus(Some(target));
    }
}
