//! leanshare server binary.
//!
//! # Usage
//!
//! ```bash
//! leanshare-server --port 8080
//! leanshare-server --host 127.0.0.1 --project-dir ./lean-project
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use leanshare::{
    endpoints, AnalysisCommand, AppState, ProcessManager, RoomRegistry, ServerPaths,
};

/// Collaborative Lean 4 editor server
#[derive(Parser, Debug)]
#[command(name = "leanshare-server")]
#[command(about = "Collaborative Lean editing server with per-session LSP bridging")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Lean project directory (where `lake serve` runs)
    #[arg(long, default_value = "lean-project")]
    project_dir: PathBuf,

    /// Directory for per-room update logs
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("leanshare=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    std::fs::create_dir_all(&args.data_dir)?;

    let paths = Arc::new(ServerPaths::new(&args.project_dir, &args.data_dir));
    let manager = Arc::new(ProcessManager::new(AnalysisCommand::lake_serve(
        &paths.project_dir,
    )));
    let rooms = Arc::new(RoomRegistry::new(paths.data_dir.clone()));

    let app = endpoints::router(AppState {
        manager: manager.clone(),
        rooms,
        paths: paths.clone(),
    });

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Lean project dir: {}", paths.project_dir.display());
    tracing::info!("Listening on http://{addr}");
    tracing::info!("Document rooms:  ws://{addr}/doc/{{room}}");
    tracing::info!("LSP sessions:    ws://{addr}/lsp/{{session_id}}");

    endpoints::serve(listener, app, shutdown_signal()).await?;

    manager.kill_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
