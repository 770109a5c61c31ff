//! Protocol message model and inbound validation.
//!
//! Messages are dictionary-shaped JSON with a `method` that varies the field
//! set, so the model is a tagged structure with an open parameter bag: the
//! known fields are typed and everything else rides along in `extra` so a
//! forwarded message keeps its full semantic content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ServerError;

/// Method names the bridge inspects. Everything else is forwarded opaquely.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const DID_OPEN: &str = "textDocument/didOpen";
    pub const DID_CHANGE: &str = "textDocument/didChange";
}

/// One JSON-RPC-style message, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Fields this server does not interpret (`id`, `result`, `jsonrpc`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ProtocolMessage {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }
}

/// Syntactic check for a usable `file://` URI: scheme exactly `file` and a
/// non-empty path component.
pub fn is_file_uri(uri: &str) -> bool {
    match Url::parse(uri) {
        Ok(url) => url.scheme() == "file" && !url.path().is_empty() && url.path() != "/",
        Err(_) => false,
    }
}

/// Validate an inbound message before it is forwarded to the process.
///
/// Messages without a params object pass untouched. With one present:
/// `initialize` must carry a valid `rootUri`, and any method with a
/// `textDocument` object must carry a valid `textDocument.uri`. A failure
/// here is fail-closed for the whole session.
pub fn validate(msg: &ProtocolMessage) -> Result<(), ServerError> {
    let Some(params) = msg.params.as_ref().and_then(Value::as_object) else {
        return Ok(());
    };

    if msg.method() == methods::INITIALIZE {
        match params.get("rootUri").and_then(Value::as_str) {
            Some(uri) if is_file_uri(uri) => {}
            Some(uri) => {
                return Err(ServerError::validation(format!(
                    "initialize rootUri is not a file:// URI: {uri:?}"
                )));
            }
            None => {
                return Err(ServerError::validation(
                    "initialize params carry no rootUri",
                ));
            }
        }
    }

    // Applies to every method that carries a textDocument object, not just
    // didOpen and didChange.
    if let Some(doc) = params.get("textDocument").and_then(Value::as_object) {
        match doc.get("uri").and_then(Value::as_str) {
            Some(uri) if is_file_uri(uri) => {}
            Some(uri) => {
                return Err(ServerError::validation(format!(
                    "textDocument.uri is not a file:// URI: {uri:?}"
                )));
            }
            None => {
                return Err(ServerError::validation("textDocument carries no uri"));
            }
        }
    }

    Ok(())
}

/// If this message carries the full document text, return it.
///
/// `didOpen` carries it directly. `didChange` uses full-document sync: only
/// the last `contentChanges` entry is authoritative, and only when it is a
/// whole-document entry (no `range`). Incremental entries yield `None`; the
/// caller forwards the message anyway and skips the disk mirror.
pub fn sync_text(msg: &ProtocolMessage) -> Option<&str> {
    let params = msg.params.as_ref()?.as_object()?;
    match msg.method.as_deref()? {
        methods::DID_OPEN => params.get("textDocument")?.get("text")?.as_str(),
        methods::DID_CHANGE => {
            let last = params.get("contentChanges")?.as_array()?.last()?.as_object()?;
            if last.contains_key("range") {
                return None;
            }
            last.get("text")?.as_str()
        }
        _ => None,
    }
}
