//! Wire message shapes. Every frame is `{"type", "payload", "timestamp"}`
//! followed by `\n` (see `codec`); `payload`'s shape is determined by
//! `type` via serde's internally-tagged representation.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Client → Server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename = "discover")]
    Discover { client_name: String },

    /// Announces (or updates) this connection's display name. Defaults to
    /// the server-assigned `Client-<n>` until one of these arrives.
    #[serde(rename = "clientHello")]
    ClientHello { display_name: String },

    #[serde(rename = "documentUpdate")]
    DocumentUpdate { file_id: String, update: Vec<u8> },

    #[serde(rename = "requestDocument")]
    RequestDocument { file_id: String },

    /// Accepted by the wire format but rejected by the server-authoritative
    /// profile: see `ServerMessage::Error` and `server::state`.
    #[serde(rename = "unshareDocument")]
    UnshareDocument { file_id: String },
}

/// Server → Client message(s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "serverInfo")]
    ServerInfo {
        name: String,
        ip: String,
        tcp_port: u16,
        udp_port: u16,
        clients: usize,
    },

    /// A newtype variant so the payload serializes as a bare JSON array
    /// (`[ {..}, .. ]`), not `{"documents":[..]}` — spec.md §4.6/§6.
    #[serde(rename = "documentList")]
    DocumentList(Vec<DocumentSummary>),

    #[serde(rename = "documentShared")]
    DocumentShared {
        id: String,
        name: String,
        owner: String,
        shared_at: i64,
        content: String,
    },

    #[serde(rename = "documentUpdate")]
    DocumentUpdate {
        file_id: String,
        update: Vec<u8>,
        origin: String,
    },

    #[serde(rename = "documentContent")]
    DocumentContent {
        file_id: String,
        content: String,
        origin: String,
    },

    #[serde(rename = "clientJoined")]
    ClientJoined { name: String, id: String },

    #[serde(rename = "clientLeft")]
    ClientLeft { name: String, id: String },

    #[serde(rename = "error")]
    Error { message: String },
}

/// One entry of a `documentList` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub shared_at: i64,
    pub content: String,
}

/// The envelope every frame is wrapped in, generic over which message
/// family it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<M = serde_json::Value> {
    #[serde(flatten)]
    pub message: M,
    pub timestamp: i64,
}

impl<M> Envelope<M> {
    pub fn now(message: M) -> Self {
        Self {
            message,
            timestamp: unix_millis(),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
