//! HTTP/WebSocket endpoints.
//!
//! Three routes define the server's external surface:
//! `GET /file-uri` answers with the fixed document and project-root URIs,
//! `GET /doc/{room}` upgrades into a document-room connection, and
//! `GET /lsp/{session_id}` upgrades into a session bridge.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::config::{FileUriInfo, ServerPaths};
use crate::process::ProcessManager;
use crate::registry::RoomRegistry;
use crate::session::run_session;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ProcessManager>,
    pub rooms: Arc<RoomRegistry>,
    pub paths: Arc<ServerPaths>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/file-uri", get(file_uri))
        .route("/doc/:room", get(doc_ws))
        .route("/lsp/:session_id", get(lsp_ws))
        .with_state(state)
}

/// Serve the router until `shutdown` resolves or the listener fails.
///
/// Room and session sockets stay open indefinitely, so shutdown must not
/// wait for in-flight connections to drain; the select drops them, and the
/// caller kills the analysis processes afterwards.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    tokio::select! {
        res = axum::serve(listener, router).into_future() => res,
        () = shutdown => Ok(()),
    }
}

async fn file_uri(State(state): State<AppState>) -> Json<FileUriInfo> {
    Json(state.paths.file_uri_info())
}

async fn doc_ws(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let room = state.rooms.get_or_create(&room).await;
        room.attach(socket).await;
    })
}

async fn lsp_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        run_session(
            socket,
            session_id,
            state.manager.clone(),
            state.paths.scratch_file.clone(),
        )
    })
}
