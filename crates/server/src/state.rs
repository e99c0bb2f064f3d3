//! Server state machine: connection table, roster, message dispatch,
//! owner-side share/unshare, and newcomer bootstrap.
//!
//! This is the server-authoritative profile from the design notes: only
//! the hosting participant may share or unshare a document. A client that
//! sends `unshareDocument` gets a `ProtocolError`-shaped `error` reply,
//! never a state change.

use crate::connection::{ConnectionHandle, SERVER_HOST_ID};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use svsmate_core::editor::EditorCollaborator;
use svsmate_core::error::{error_channel, ErrorReceiver, ErrorSender, Result, SvsError};
use svsmate_core::protocol::{ClientMessage, DocumentSummary, ServerMessage};
use svsmate_core::registry::{DocumentRegistry, UpdateOutcome};

/// Default capacity of the error-event channel drained by `main`.
const ERROR_CHANNEL_CAP: usize = 64;

pub struct Server {
    pub name: String,
    pub registry: Arc<DocumentRegistry>,
    connections: DashMap<String, Arc<ConnectionHandle>>,
    editor: Arc<dyn EditorCollaborator>,
    next_client_seq: AtomicU64,
    error_tx: ErrorSender,
    error_rx: Mutex<Option<ErrorReceiver>>,
}

impl Server {
    pub fn new(name: impl Into<String>, editor: Arc<dyn EditorCollaborator>, pending_queue_cap: usize) -> Self {
        let (error_tx, error_rx) = error_channel(ERROR_CHANNEL_CAP);
        Self {
            name: name.into(),
            registry: Arc::new(DocumentRegistry::new("server", editor.clone(), pending_queue_cap)),
            connections: DashMap::new(),
            editor,
            next_client_seq: AtomicU64::new(0),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    /// Takes the error-event receiver. Returns `None` if it was already
    /// taken — there is only ever one outer-UI drain loop per `Server`.
    pub fn take_error_receiver(&self) -> Option<ErrorReceiver> {
        self.error_rx.lock().unwrap().take()
    }

    /// Feeds `err` into the error-event channel for the outer UI to drain.
    pub fn emit_error(&self, err: SvsError) {
        err.to_event(&self.error_tx);
    }

    /// Registers a newly accepted connection, sends it the initial
    /// `documentList` bootstrap, and broadcasts `clientJoined` to
    /// everyone else.
    pub fn register_connection(&self, handle: Arc<ConnectionHandle>) {
        let id = handle.id.clone();
        let seq = self.next_client_seq.fetch_add(1, Ordering::SeqCst) + 1;
        *handle.display_name.lock().unwrap() = format!("Client-{seq}");
        let name = handle.display_name();
        self.connections.insert(id.clone(), handle.clone());

        let documents = self.document_summaries();
        handle.try_send(ServerMessage::DocumentList(documents));

        self.broadcast(
            ServerMessage::ClientJoined { name, id: id.clone() },
            Some(&id),
        );
    }

    /// Drops a connection and broadcasts `clientLeft`. Safe to call more
    /// than once for the same id.
    pub fn disconnect(&self, conn_id: &str) {
        if let Some((_, handle)) = self.connections.remove(conn_id) {
            let name = handle.display_name();
            self.broadcast(
                ServerMessage::ClientLeft {
                    name,
                    id: conn_id.to_string(),
                },
                None,
            );
        }
    }

    pub fn rename_connection(&self, conn_id: &str, display_name: String) {
        if let Some(handle) = self.connections.get(conn_id) {
            *handle.display_name.lock().unwrap() = display_name;
        }
    }

    /// Dispatches one inbound client message. Unknown message shapes are
    /// rejected at the codec layer (parse error), not here — every
    /// variant of `ClientMessage` is handled.
    pub fn dispatch(&self, conn_id: &str, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::Discover { .. } => {
                // Discovery runs over UDP; a `discover` arriving on the
                // TCP session is a protocol misuse, logged and dropped.
                tracing::warn!(conn_id, "received discover over TCP session, dropping");
                Ok(())
            }
            ClientMessage::ClientHello { display_name } => {
                self.rename_connection(conn_id, display_name);
                Ok(())
            }
            ClientMessage::DocumentUpdate { file_id, update } => {
                self.handle_document_update(conn_id, file_id, update)
            }
            ClientMessage::RequestDocument { file_id } => self.handle_request_document(conn_id, file_id),
            ClientMessage::UnshareDocument { .. } => {
                if let Some(handle) = self.connections.get(conn_id) {
                    handle.try_send(ServerMessage::Error {
                        message: "clients may not unshare documents in this session".into(),
                    });
                }
                Ok(())
            }
        }
    }

    fn handle_document_update(&self, conn_id: &str, file_id: String, update: Vec<u8>) -> Result<()> {
        let outcome = self.registry.apply_update(&file_id, &update, conn_id)?;
        if outcome == UpdateOutcome::Applied {
            // Owner-authoritative persistence: the server always owns
            // what it shares, so every applied update is saved.
            if let Err(e) = self.registry.save_to_disk(&file_id) {
                tracing::warn!(file_id, error = %e, "failed to persist shared document");
            }
            self.broadcast(
                ServerMessage::DocumentUpdate {
                    file_id,
                    update,
                    origin: conn_id.to_string(),
                },
                Some(conn_id),
            );
        }
        Ok(())
    }

    fn handle_request_document(&self, conn_id: &str, file_id: String) -> Result<()> {
        let content = self.registry.text(&file_id).unwrap_or_default();
        if let Some(handle) = self.connections.get(conn_id) {
            handle.try_send(ServerMessage::DocumentContent {
                file_id,
                content,
                origin: "server".into(),
            });
        }
        Ok(())
    }

    /// Owner-side: share a local file. Creates the fileId
    /// `server_<unixMillis>_<basename>`, reads the file, creates the
    /// owned document, and broadcasts `documentShared` then a refreshed
    /// `documentList`.
    pub fn share_file(&self, local_path: PathBuf) -> Result<String> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SvsError::IoError("path has no file name".into()))?;
        let file_id = format!("server_{}_{}", svsmate_core::protocol::unix_millis(), name);

        let metadata = self.registry.create_owned(&file_id, &name, local_path)?;
        let content = self.registry.text(&file_id)?;

        self.broadcast(
            ServerMessage::DocumentShared {
                id: file_id.clone(),
                name: metadata.name,
                owner: metadata.owner_id,
                shared_at: metadata.shared_at,
                content,
            },
            None,
        );
        self.broadcast(
            ServerMessage::DocumentList(self.document_summaries()),
            None,
        );

        Ok(file_id)
    }

    /// Owner-side: unshare. Removes the document and broadcasts a
    /// refreshed `documentList`.
    pub fn unshare_file(&self, file_id: &str) {
        self.registry.remove(file_id);
        self.broadcast(
            ServerMessage::DocumentList(self.document_summaries()),
            None,
        );
    }

    /// Called when a local editor edit lands on an owned document:
    /// applies it, then broadcasts to everyone.
    pub fn handle_local_edit(&self, file_id: &str, offset: usize, delete_len: usize, insert_text: &str) -> Result<()> {
        let patch = self.registry.apply_editor_change(file_id, offset, delete_len, insert_text)?;
        if patch.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.registry.save_to_disk(file_id) {
            tracing::warn!(file_id, error = %e, "failed to persist local edit");
        }
        self.broadcast(
            ServerMessage::DocumentUpdate {
                file_id: file_id.to_string(),
                update: patch,
                origin: SERVER_HOST_ID.to_string(),
            },
            None,
        );
        Ok(())
    }

    fn document_summaries(&self) -> Vec<DocumentSummary> {
        self.registry
            .all_metadata()
            .into_iter()
            .filter_map(|meta| {
                let content = self.registry.text(&meta.file_id).ok()?;
                Some(DocumentSummary {
                    id: meta.file_id,
                    name: meta.name,
                    owner: meta.owner_id,
                    shared_at: meta.shared_at,
                    content,
                })
            })
            .collect()
    }

    /// Sends `message` to every connection except `exclude` (and never to
    /// the synthetic `server_host` id). Connections whose write queue is
    /// full are torn down as slow consumers.
    pub fn broadcast(&self, message: ServerMessage, exclude: Option<&str>) {
        let mut slow: Vec<String> = Vec::new();
        for entry in self.connections.iter() {
            let id = entry.key();
            if id == SERVER_HOST_ID {
                continue;
            }
            if exclude == Some(id.as_str()) {
                continue;
            }
            if !entry.value().try_send(message.clone()) {
                slow.push(id.clone());
            }
        }
        for id in slow {
            tracing::warn!(conn_id = %id, "slow consumer, closing connection");
            self.emit_error(SvsError::SlowConsumer);
            self.disconnect(&id);
        }
    }

    pub fn editor(&self) -> Arc<dyn EditorCollaborator> {
        self.editor.clone()
    }
}
