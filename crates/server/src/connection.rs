//! A single accepted TCP connection's identity and write queue.

use svsmate_core::protocol::{Envelope, ServerMessage};
use tokio::sync::mpsc;

/// Server-assigned connection identifier:
/// `<remoteAddr>:<remotePort>_<unixMillis>`.
pub fn new_connection_id(remote: std::net::SocketAddr) -> String {
    format!("{}_{}", remote, svsmate_core::protocol::unix_millis())
}

/// The synthetic connection id representing the hosting participant's own
/// roster entry. Messages addressed to it are dropped before write.
pub const SERVER_HOST_ID: &str = "server_host";

/// Handle the dispatch/broadcast code holds for one live connection. The
/// actual socket is owned by that connection's read/write tasks; this
/// handle only holds the write queue's sending half plus display state.
pub struct ConnectionHandle {
    pub id: String,
    pub display_name: std::sync::Mutex<String>,
    pub joined_at: i64,
    pub tx: mpsc::Sender<Envelope<ServerMessage>>,
}

impl ConnectionHandle {
    pub fn new(id: String, display_name: String, tx: mpsc::Sender<Envelope<ServerMessage>>) -> Self {
        Self {
            id,
            display_name: std::sync::Mutex::new(display_name),
            joined_at: svsmate_core::protocol::unix_millis(),
            tx,
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name.lock().unwrap().clone()
    }

    /// Enqueues a frame for the writer task. Returns `false` if the queue
    /// is full (back-pressure / slow consumer) or the writer has gone
    /// away; the caller should then tear down the connection.
    pub fn try_send(&self, message: ServerMessage) -> bool {
        let envelope = Envelope::now(message);
        self.tx.try_send(envelope).is_ok()
    }
}
