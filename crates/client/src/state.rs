//! Client state machine: roster cache, remote-document cache, and
//! dispatch of inbound `ServerMessage`s. Transport-agnostic — driven by
//! whatever reads frames off the wire (see `transport`).

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use svsmate_core::editor::EditorCollaborator;
use svsmate_core::error::{error_channel, ErrorReceiver, ErrorSender, Result, SvsError};
use svsmate_core::protocol::{ClientMessage, ServerMessage};
use svsmate_core::registry::DocumentRegistry;
use tokio::sync::mpsc;

/// Default capacity of the error-event channel drained by `main`.
const ERROR_CHANNEL_CAP: usize = 64;

/// One roster entry as seen by this client.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
}

pub struct Client {
    pub registry: Arc<DocumentRegistry>,
    roster: DashMap<String, RosterEntry>,
    outbound: Mutex<Option<mpsc::Sender<ClientMessage>>>,
    editor: Arc<dyn EditorCollaborator>,
    error_tx: ErrorSender,
    error_rx: Mutex<Option<ErrorReceiver>>,
}

impl Client {
    pub fn new(editor: Arc<dyn EditorCollaborator>, pending_queue_cap: usize) -> Self {
        let agent_id = uuid::Uuid::new_v4().to_string();
        let (error_tx, error_rx) = error_channel(ERROR_CHANNEL_CAP);
        Self {
            registry: Arc::new(DocumentRegistry::new(agent_id, editor.clone(), pending_queue_cap)),
            roster: DashMap::new(),
            outbound: Mutex::new(None),
            editor,
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    /// Called by `transport::connect` once the write task's channel
    /// exists, so `send` has somewhere to deliver outbound messages.
    pub fn attach_outbound(&self, tx: mpsc::Sender<ClientMessage>) {
        *self.outbound.lock().unwrap() = Some(tx);
    }

    /// Takes the error-event receiver. Returns `None` if it was already
    /// taken — there is only ever one outer-UI drain loop per `Client`.
    pub fn take_error_receiver(&self) -> Option<ErrorReceiver> {
        self.error_rx.lock().unwrap().take()
    }

    /// Feeds `err` into the error-event channel for the outer UI to drain.
    pub fn emit_error(&self, err: SvsError) {
        err.to_event(&self.error_tx);
    }

    /// Announces this client's display name to the server, defaulting to
    /// the editor collaborator's hostname. Sent once, right after
    /// connecting.
    pub fn send_hello(&self) {
        self.send(ClientMessage::ClientHello {
            display_name: self.editor.hostname(),
        });
    }

    /// Clears cached roster and document state. Called on disconnect;
    /// the connection itself is torn down by the transport layer.
    pub fn clear(&self) {
        *self.outbound.lock().unwrap() = None;
        self.roster.clear();
        for meta in self.registry.all_metadata() {
            self.registry.remove(&meta.file_id);
        }
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.iter().map(|e| e.value().clone()).collect()
    }

    fn send(&self, message: ClientMessage) {
        if let Some(tx) = self.outbound.lock().unwrap().as_ref() {
            let _ = tx.try_send(message);
        }
    }

    /// Dispatches one inbound message from the server.
    pub fn dispatch(&self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::ServerInfo { .. } => {
                // Discovery-only shape; never sent over the TCP session.
            }
            ServerMessage::DocumentList(documents) => {
                let seen: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
                for doc in documents {
                    self.registry.create_from_content(&doc.id, &doc.name, &doc.content, &doc.owner);
                }
                for meta in self.registry.all_metadata() {
                    if !seen.contains(&meta.file_id) {
                        self.registry.remove(&meta.file_id);
                    }
                }
            }
            ServerMessage::DocumentShared { id, name, owner, content, .. } => {
                self.registry.create_from_content(&id, &name, &content, &owner);
            }
            ServerMessage::DocumentUpdate { file_id, update, origin: _ } => {
                self.registry.apply_update(&file_id, &update, "server")?;
            }
            ServerMessage::DocumentContent { file_id, content, .. } => {
                let name = self
                    .registry
                    .metadata(&file_id)
                    .map(|m| m.name)
                    .unwrap_or_else(|| file_id.clone());
                self.registry.create_from_content(&file_id, &name, &content, "server");
            }
            ServerMessage::ClientJoined { name, id } => {
                self.roster.insert(id.clone(), RosterEntry { id, name });
            }
            ServerMessage::ClientLeft { id, .. } => {
                self.roster.remove(&id);
            }
            ServerMessage::Error { message } => {
                tracing::warn!(%message, "server reported an error");
            }
        }
        Ok(())
    }

    /// A local editor edit landed on a cached remote document: apply it
    /// and forward the patch to the server.
    pub fn handle_local_edit(&self, file_id: &str, offset: usize, delete_len: usize, insert_text: &str) -> Result<()> {
        let patch = self.registry.apply_editor_change(file_id, offset, delete_len, insert_text)?;
        if !patch.is_empty() {
            self.send(ClientMessage::DocumentUpdate {
                file_id: file_id.to_string(),
                update: patch,
            });
        }
        Ok(())
    }

    pub fn request_document(&self, file_id: &str) {
        self.send(ClientMessage::RequestDocument {
            file_id: file_id.to_string(),
        });
    }

    /// Materializes a scratch path for `file_id` (if it doesn't already
    /// have one) and returns it so the outer editor can open it.
    pub fn open_shared_file(&self, file_id: &str) -> Result<PathBuf> {
        self.registry.materialize_scratch_path(file_id)
    }

    pub fn editor(&self) -> Arc<dyn EditorCollaborator> {
        self.editor.clone()
    }
}
