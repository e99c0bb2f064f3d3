//! Positional text CRDT backing a single shared document.
//!
//! Built directly on `diamond_types::list::ListCRDT`, the same engine the
//! prototype used for its editor-agnostic sync: per-site unique operation
//! ids give commutative, associative, idempotent application, so any
//! permutation of the same operation set converges to the same text.

use crate::editor::Origin;
use crate::error::{Result, SvsError};
use diamond_types::list::ListCRDT;
use ropey::Rope;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Listener = Box<dyn Fn(&[u8], Origin) + Send + Sync>;

/// Handle returned by [`CrdtDocument::on_update`]. Dropping it unsubscribes
/// the listener; there is no separate `unsubscribe` call.
pub struct SubscriptionHandle {
    id: u64,
    listeners: Arc<Mutex<BTreeMap<u64, Listener>>>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&self.id);
        }
    }
}

/// A single shared document's CRDT state plus the character-addressable
/// view (`Rope`) used to translate editor offsets into CRDT operations.
pub struct CrdtDocument {
    content: Rope,
    crdt: ListCRDT,
    agent_id: String,
    listeners: Arc<Mutex<BTreeMap<u64, Listener>>>,
    next_listener_id: AtomicU64,
}

impl CrdtDocument {
    /// Seeds a fresh document with `initial_content`, attributing the seed
    /// to a synthetic `"seed"` agent so it is never confused with a real
    /// local edit from `agent_id` (and therefore never mis-reported as an
    /// echo).
    pub fn new(initial_content: &str, agent_id: impl Into<String>) -> Self {
        let mut crdt = ListCRDT::new();
        if !initial_content.is_empty() {
            let seed_agent = crdt.get_or_create_agent_id("seed");
            crdt.insert(seed_agent, 0, initial_content);
        }

        Self {
            content: Rope::from_str(initial_content),
            crdt,
            agent_id: agent_id.into(),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Reconstructs a document from a prior [`CrdtDocument::snapshot`].
    pub fn from_snapshot(bytes: &[u8], agent_id: impl Into<String>) -> Result<Self> {
        let mut crdt = ListCRDT::new();
        crdt.oplog
            .decode_and_add(bytes)
            .map_err(|e| SvsError::InvalidUpdate(format!("{e:?}")))?;
        crdt.branch
            .merge(&crdt.oplog, crdt.oplog.local_version_ref());
        let text = crdt.branch.content().to_string();

        Ok(Self {
            content: Rope::from_str(&text),
            crdt,
            agent_id: agent_id.into(),
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener_id: AtomicU64::new(0),
        })
    }

    /// Subscribes to every update this document emits (local edits only —
    /// see [`CrdtDocument::apply_remote_update`]). Returns a handle whose
    /// `Drop` unsubscribes.
    pub fn on_update<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&[u8], Origin) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, Box::new(listener));
        SubscriptionHandle {
            id,
            listeners: self.listeners.clone(),
        }
    }

    /// Applies the editor's `(rangeOffset, rangeLength, text)` edit
    /// contract as one atomic CRDT transaction (delete then insert),
    /// and notifies subscribers with `Origin::Local` carrying the
    /// resulting oplog delta.
    pub fn apply_local_edit(&mut self, offset: usize, delete_len: usize, insert_text: &str) -> Vec<u8> {
        let agent = self.crdt.get_or_create_agent_id(&self.agent_id);

        if delete_len > 0 {
            let end = (offset + delete_len).min(self.content.len_chars());
            if offset < end {
                self.crdt.delete(agent, offset..end);
            }
        }
        if !insert_text.is_empty() {
            self.crdt.insert(agent, offset, insert_text);
        }

        if delete_len > 0 {
            let end = (offset + delete_len).min(self.content.len_chars());
            if offset < end {
                self.content.remove(offset..end);
            }
        }
        if !insert_text.is_empty() {
            self.content.insert(offset, insert_text);
        }

        let patch = self
            .crdt
            .oplog
            .encode(diamond_types::list::encoding::EncodeOptions::default());

        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.values() {
            listener(&patch, Origin::Local);
        }
        patch
    }

    /// Merges a remote oplog delta. Idempotent: applying the same bytes
    /// twice leaves the state unchanged the second time, because
    /// diamond-types deduplicates operations already present in the log.
    /// Never invokes local listeners — the caller (the registry) decides
    /// whether and how to reflect this into the editor buffer, and the
    /// session transport never re-broadcasts a remote-origin update.
    pub fn apply_remote_update(&mut self, bytes: &[u8]) -> Result<()> {
        self.crdt
            .oplog
            .decode_and_add(bytes)
            .map_err(|e| SvsError::InvalidUpdate(format!("{e:?}")))?;

        self.crdt
            .branch
            .merge(&self.crdt.oplog, self.crdt.oplog.local_version_ref());

        let new_text = self.crdt.branch.content().to_string();
        self.content = Rope::from_str(&new_text);
        Ok(())
    }

    /// Full-state bytes sufficient to reconstruct this document elsewhere
    /// via [`CrdtDocument::from_snapshot`].
    pub fn snapshot(&self) -> Vec<u8> {
        self.crdt
            .oplog
            .encode(diamond_types::list::encoding::EncodeOptions::default())
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.content.to_string()
    }

    pub fn len_chars(&self) -> usize {
        self.content.len_chars()
    }
}
