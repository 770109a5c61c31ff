//! Session bridge: one client connection ↔ one analysis process.
//!
//! While a session is active, three forwarding loops run concurrently:
//! inbound (client → process stdin, validated and mirrored to disk),
//! outbound (process stdout → client), and a stderr log drain. Whichever
//! loop finishes first tears the whole bridge down: the other two are
//! cancelled and awaited, the process is killed, and the connection is
//! closed with a reason describing why.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::framing::{FrameReader, FrameWriter};
use crate::process::ProcessManager;
use crate::protocol::{self, ProtocolMessage};

const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Why the bridge came down. Decides the close frame sent to the client.
#[derive(Debug)]
enum BridgeEnd {
    /// The client disconnected or its socket failed.
    ClientGone,
    /// The process exited or closed its streams.
    ProcessExited,
    /// An inbound message failed validation; the session fails closed.
    Validation(String),
    /// The process emitted an undecodable frame.
    Framing(String),
}

/// Run one session connection to completion.
pub async fn run_session(
    socket: WebSocket,
    session_id: String,
    manager: Arc<ProcessManager>,
    mirror_path: PathBuf,
) {
    let process = match manager.spawn(&session_id).await {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "failed to start analysis process");
            close_with(socket, close_code::ERROR, &e.to_string()).await;
            return;
        }
    };

    let Some(stdio) = process.claim_stdio() else {
        tracing::warn!(session = %session_id, "session already has an active bridge");
        close_with(socket, close_code::AGAIN, "session busy").await;
        return;
    };

    tracing::info!(session = %session_id, "session active");

    let (client_sink, client_stream) = socket.split();
    let (client_tx, client_rx) = mpsc::channel::<Message>(CLIENT_CHANNEL_CAPACITY);
    let sender = tokio::spawn(client_sender(client_rx, client_sink));

    let mut inbound = tokio::spawn(inbound_loop(client_stream, stdio.stdin, mirror_path));
    let mut outbound = tokio::spawn(outbound_loop(stdio.stdout, client_tx.clone()));
    let mut diagnostics = tokio::spawn(stderr_loop(stdio.stderr, session_id.clone()));

    // First loop to finish wins; cancel the rest and wait for them.
    let end = tokio::select! {
        res = &mut inbound => {
            outbound.abort();
            diagnostics.abort();
            let _ = outbound.await;
            let _ = diagnostics.await;
            res.unwrap_or(BridgeEnd::ClientGone)
        }
        res = &mut outbound => {
            inbound.abort();
            diagnostics.abort();
            let _ = inbound.await;
            let _ = diagnostics.await;
            res.unwrap_or(BridgeEnd::ProcessExited)
        }
        res = &mut diagnostics => {
            inbound.abort();
            outbound.abort();
            let _ = inbound.await;
            let _ = outbound.await;
            res.unwrap_or(BridgeEnd::ProcessExited)
        }
    };

    tracing::info!(session = %session_id, end = ?end, "session closing");
    manager.kill(&session_id).await;

    let close = match end {
        BridgeEnd::Validation(reason) => Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        }),
        BridgeEnd::Framing(reason) => Some(CloseFrame {
            code: close_code::ERROR,
            reason: reason.into(),
        }),
        BridgeEnd::ProcessExited => Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "analysis process exited".into(),
        }),
        BridgeEnd::ClientGone => None,
    };
    if let Some(frame) = close {
        let _ = client_tx.send(Message::Close(Some(frame))).await;
    }
    drop(client_tx);
    let _ = sender.await;
}

/// Close an unsplit socket with a reason. Best effort.
async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

/// Single writer task for the client socket, so the forwarding loops and
/// teardown can all emit frames without sharing the sink.
async fn client_sender(
    mut client_rx: mpsc::Receiver<Message>,
    mut client_sink: SplitSink<WebSocket, Message>,
) {
    while let Some(msg) = client_rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if client_sink.send(msg).await.is_err() || is_close {
            break;
        }
    }
}

/// Client → process. Validates, mirrors document text, forwards.
async fn inbound_loop(
    mut client_stream: SplitStream<WebSocket>,
    stdin: ChildStdin,
    mirror_path: PathBuf,
) -> BridgeEnd {
    let mut writer = FrameWriter::new(stdin);
    while let Some(msg) = client_stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return BridgeEnd::ClientGone,
            // Pings are answered by axum; other frame kinds carry nothing.
            Ok(_) => continue,
            Err(_) => return BridgeEnd::ClientGone,
        };
        if let Err(end) = forward_inbound(&text, &mut writer, &mirror_path).await {
            return end;
        }
    }
    BridgeEnd::ClientGone
}

/// Handle one inbound client frame: parse, validate, mirror, forward.
///
/// Mirror failures are logged and swallowed; validation failures and dead
/// stdin abort the session.
async fn forward_inbound<W: AsyncWrite + Unpin>(
    raw: &str,
    writer: &mut FrameWriter<W>,
    mirror_path: &Path,
) -> Result<(), BridgeEnd> {
    let msg: ProtocolMessage = serde_json::from_str(raw)
        .map_err(|e| BridgeEnd::Validation(format!("message is not valid JSON: {e}")))?;

    if let Err(e) = protocol::validate(&msg) {
        return Err(BridgeEnd::Validation(e.to_string()));
    }

    if let Some(text) = protocol::sync_text(&msg) {
        mirror_document(mirror_path, text).await;
    }

    writer.write_frame(&msg).await.map_err(|e| {
        tracing::debug!(error = %e, "stdin write failed, process likely exited");
        BridgeEnd::ProcessExited
    })
}

/// Overwrite the shared mirror file with the latest accepted document text.
/// I/O failures are logged, never propagated to the connection.
async fn mirror_document(path: &Path, text: &str) {
    if let Err(source) = tokio::fs::write(path, text).await {
        let e = ServerError::MirrorWrite {
            path: path.to_path_buf(),
            source,
        };
        tracing::error!(error = %e, "document mirror write failed");
    }
}

/// Process stdout → client, one decoded frame at a time, order preserved.
async fn outbound_loop(stdout: ChildStdout, client_tx: mpsc::Sender<Message>) -> BridgeEnd {
    let mut reader = FrameReader::new(stdout);
    loop {
        match reader.read_frame().await {
            Ok(Some(msg)) => {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => return BridgeEnd::Framing(e.to_string()),
                };
                if client_tx.send(Message::Text(json)).await.is_err() {
                    return BridgeEnd::ClientGone;
                }
            }
            Ok(None) => return BridgeEnd::ProcessExited,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable frame on process stdout");
                return BridgeEnd::Framing(e.to_string());
            }
        }
    }
}

/// Process stderr → log sink. Observability only.
async fn stderr_loop(stderr: ChildStderr, session_id: String) -> BridgeEnd {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(target: "leanshare::analysis", session = %session_id, "{line}");
            }
            Ok(None) => return BridgeEnd::ProcessExited,
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "stderr read failed");
                return BridgeEnd::ProcessExited;
            }
        }
    }
}
