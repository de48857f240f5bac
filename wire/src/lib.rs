//! Shared message model and JSON codec for realtime WS transport.
//!
//! This crate owns the wire representation used by both the sync engine and
//! the relay. Messages are JSON text frames discriminated by a `type` tag,
//! decoded exactly once at the transport boundary into [`WireMessage`];
//! nothing downstream touches raw JSON. Record payloads stay flexible
//! (`serde_json::Value`) so the protocol never couples to shape internals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by [`encode_message`] and [`decode_message`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text frame is not valid JSON, or its `type` tag is unknown.
    #[error("failed to decode wire message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The message could not be serialized to JSON.
    #[error("failed to encode wire message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A single message on the realtime wire protocol.
///
/// The variant set is closed: anything else on the wire is a decode error
/// that callers log and skip without tearing down the connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Record mutations for one page, relayed verbatim between peers.
    Sync(SyncMessage),
    /// A page was created somewhere on the whiteboard.
    NewPage(PageMessage),
    /// A page was renamed somewhere on the whiteboard.
    UpdatePage(PageMessage),
    /// A page was deleted somewhere on the whiteboard.
    DeletePage(PageMessage),
    /// Cursor/viewport advertisement from one user on one page.
    Presence(PresenceMessage),
    /// A drawer left a page. Clients send it on teardown; the relay also
    /// synthesizes it when a socket drops without one.
    Leave(LeaveMessage),
}

impl WireMessage {
    /// Wire tag of this message, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::NewPage(_) => "new_page",
            Self::UpdatePage(_) => "update_page",
            Self::DeletePage(_) => "delete_page",
            Self::Presence(_) => "presence",
            Self::Leave(_) => "leave",
        }
    }
}

/// Store diff from one sender, scoped to a single page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Sender identity, used by receivers to suppress their own echo.
    /// Absent on authoritative bulk loads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Page the diff belongs to; receivers on other pages discard it.
    pub page_id: i64,
    pub payload: SyncPayload,
}

/// Record mutations keyed by record id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    /// Newly created records, full body.
    #[serde(default)]
    pub added: HashMap<String, Value>,
    /// Changed records as `[from, to]` pairs; receivers apply the `to` side.
    #[serde(default)]
    pub updated: HashMap<String, (Value, Value)>,
    /// Deleted records, full body at time of removal.
    #[serde(default)]
    pub removed: HashMap<String, Value>,
}

impl SyncPayload {
    /// True when the diff carries no mutations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Page lifecycle event body shared by `new_page`, `update_page` and
/// `delete_page`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMessage {
    pub page: PageInfo,
}

/// Identity and title of one page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page_id: i64,
    pub page_title: String,
}

/// Cursor position and viewport for one user on one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub user_id: String,
    pub user_name: String,
    pub page_id: i64,
    pub whiteboard_id: i64,
    /// Cursor position in page space.
    pub x: f64,
    pub y: f64,
    pub camera: Camera,
}

/// Viewport position and zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Departure notice for one drawer on one page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMessage {
    pub drawer_id: String,
    pub page_id: i64,
}

/// Encode a message into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the payload cannot be serialized.
pub fn encode_message(message: &WireMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Decode a JSON text frame into a message.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON, an unknown `type` tag,
/// or a body that does not match the tagged variant.
pub fn decode_message(text: &str) -> Result<WireMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
