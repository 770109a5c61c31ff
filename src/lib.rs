//! leanshare: collaborative Lean 4 editing server.
//!
//! Multiple clients edit one shared document while each receives live
//! language feedback from its own `lake serve` instance.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        leanshare-server                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  /doc/{room} ──► RoomRegistry ──► Room                           │
//! │                    get-or-create    replicated doc + update log  │
//! │                    lazy replay      broadcast relay to peers     │
//! │                                                                  │
//! │  /lsp/{session_id} ──► session bridge ──► ProcessManager         │
//! │                          validate           one `lake serve`     │
//! │                          mirror to disk     per session id       │
//! │                          three loops        graceful kill        │
//! │                                                                  │
//! │  /file-uri ──► fixed document + project-root file:// URIs        │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two subsystems never call each other: the bridge mirrors accepted
//! document text to a file on disk, and the analysis process reads that
//! file independently.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod framing;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::{AnalysisCommand, FileUriInfo, ServerPaths};
pub use endpoints::{router, serve, AppState};
pub use error::{Result, ServerError};
pub use framing::{FrameReader, FrameWriter, FramingError};
pub use process::{ProcessManager, SessionProcess, SessionStdio, KILL_GRACE};
pub use protocol::ProtocolMessage;
pub use registry::RoomRegistry;
pub use room::{ReplicatedDoc, Room};
pub use session::run_session;
pub use store::{StoreError, UpdateStore};
