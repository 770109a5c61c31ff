//! Error types for the leanshare server

use std::path::PathBuf;

use thiserror::Error;

use crate::framing::FramingError;
use crate::store::StoreError;

/// Main error type for server operations.
///
/// Propagation policy: errors are local to the session or room that produced
/// them. A `Validation` error tears down its session fail-closed; `RoomLoad`
/// and `MirrorWrite` are logged and the owning room/session stays usable.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid message: {reason}")]
    Validation { reason: String },

    #[error("failed to replay history for room `{room}`: {source}")]
    RoomLoad {
        room: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to mirror document to {path}: {source}")]
    MirrorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
