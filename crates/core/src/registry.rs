//! Registry of shared documents, keyed by fileId.
//!
//! Generalizes the prototype's flat `Workspace` map (see `JustSync`'s
//! `state::Workspace`) with the metadata, pending-update queue, and
//! owner-only disk persistence the spec requires. Each entry is guarded
//! independently so mutations on different fileIds never block each
//! other, while mutations on the same fileId are serialized by that
//! entry's lock.

use crate::crdt::{CrdtDocument, SubscriptionHandle};
use crate::editor::{EditorCollaborator, Origin};
use crate::error::{Result, SvsError};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Result of [`DocumentRegistry::apply_update`].
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The document existed and the update was merged.
    Applied,
    /// The document doesn't exist yet; the update was queued.
    Queued,
}

/// Metadata tracked alongside a document's CRDT state.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub file_id: String,
    pub name: String,
    pub owner_id: String,
    pub shared_at: i64,
    pub is_owner: bool,
    pub local_path: Option<PathBuf>,
    pub version: u64,
    pub last_modified_by: String,
}

struct Entry {
    crdt: Mutex<CrdtDocument>,
    metadata: Mutex<DocumentMetadata>,
    suppressed: AtomicBool,
    version_counter: AtomicU64,
    /// Per-fileId editor handle registered via
    /// [`DocumentRegistry::register_editor`]; falls back to the
    /// registry's shared editor when unset.
    editor_override: Mutex<Option<Arc<dyn EditorCollaborator>>>,
    /// Text last pushed into the editor buffer via `replace_buffer`, so a
    /// repeat refresh with no actual change is a no-op.
    last_written_text: Mutex<Option<String>>,
    /// Bytes captured by `_update_sub`'s callback each time the CRDT emits
    /// a local-origin update; `apply_editor_change` reads this back instead
    /// of trusting `apply_local_edit`'s return value directly, so the
    /// `on_update` subscription is the one real path a patch travels
    /// before it reaches the broadcast layer.
    last_patch: Arc<Mutex<Option<Vec<u8>>>>,
    /// Kept alive for the entry's lifetime; dropping it would unsubscribe.
    _update_sub: SubscriptionHandle,
}

/// Subscribes to `crdt`'s local-origin updates, capturing each patch into
/// `last_patch` so callers can read it back after `apply_local_edit`
/// returns, instead of trusting the direct return value.
fn subscribe_local_patches(crdt: &CrdtDocument) -> (Arc<Mutex<Option<Vec<u8>>>>, SubscriptionHandle) {
    let last_patch = Arc::new(Mutex::new(None));
    let captured = last_patch.clone();
    let sub = crdt.on_update(move |bytes, origin| {
        if origin == Origin::Local {
            *captured.lock().unwrap() = Some(bytes.to_vec());
        }
    });
    (last_patch, sub)
}

/// Keyed registry of shared documents, owned by exactly one process (the
/// server or a client). All access goes through its operations.
pub struct DocumentRegistry {
    entries: DashMap<String, Arc<Entry>>,
    /// Updates that arrived for a fileId not yet in `entries`. Bounded per
    /// fileId; oldest entries are dropped once the cap is hit.
    pending: DashMap<String, VecDeque<(Vec<u8>, String)>>,
    pending_queue_cap: usize,
    agent_id: String,
    editor: Arc<dyn EditorCollaborator>,
}

impl DocumentRegistry {
    pub fn new(agent_id: impl Into<String>, editor: Arc<dyn EditorCollaborator>, pending_queue_cap: usize) -> Self {
        Self {
            entries: DashMap::new(),
            pending: DashMap::new(),
            pending_queue_cap,
            agent_id: agent_id.into(),
            editor,
        }
    }

    /// Creates an owned document by reading `local_path` off disk. Returns
    /// the existing document (idempotently) if `file_id` is already
    /// registered, matching the `AlreadyExists` policy.
    pub fn create_owned(&self, file_id: &str, name: &str, local_path: PathBuf) -> Result<DocumentMetadata> {
        if let Some(entry) = self.entries.get(file_id) {
            return Ok(entry.metadata.lock().unwrap().clone());
        }

        let bytes = self.editor.read_file(&local_path)?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let crdt = CrdtDocument::new(&content, self.agent_id.clone());
        let (last_patch, update_sub) = subscribe_local_patches(&crdt);
        let metadata = DocumentMetadata {
            file_id: file_id.to_string(),
            name: name.to_string(),
            owner_id: "server".to_string(),
            shared_at: crate::protocol::unix_millis(),
            is_owner: true,
            local_path: Some(local_path),
            version: 0,
            last_modified_by: "server".to_string(),
        };

        self.entries.insert(
            file_id.to_string(),
            Arc::new(Entry {
                crdt: Mutex::new(crdt),
                metadata: Mutex::new(metadata.clone()),
                suppressed: AtomicBool::new(false),
                version_counter: AtomicU64::new(0),
                editor_override: Mutex::new(None),
                last_written_text: Mutex::new(None),
                last_patch,
                _update_sub: update_sub,
            }),
        );
        self.drain_pending(file_id);

        Ok(metadata)
    }

    /// Seeds (or converges) a non-owned document from inline content, as
    /// received in `documentList`/`documentShared`/`documentContent`.
    /// Converges existing text to `content` via delete-all + insert only
    /// when the two actually differ, so an identical re-announce is a
    /// no-op that emits nothing.
    pub fn create_from_content(&self, file_id: &str, name: &str, content: &str, owner_id: &str) {
        if let Some(entry) = self.entries.get(file_id) {
            let mut crdt = entry.crdt.lock().unwrap();
            if crdt.text() != content {
                let len = crdt.len_chars();
                crdt.apply_local_edit(0, len, content);
            }
            return;
        }

        let crdt = CrdtDocument::new(content, self.agent_id.clone());
        let (last_patch, update_sub) = subscribe_local_patches(&crdt);
        let metadata = DocumentMetadata {
            file_id: file_id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            shared_at: crate::protocol::unix_millis(),
            is_owner: false,
            local_path: None,
            version: 0,
            last_modified_by: owner_id.to_string(),
        };

        self.entries.insert(
            file_id.to_string(),
            Arc::new(Entry {
                crdt: Mutex::new(crdt),
                metadata: Mutex::new(metadata),
                suppressed: AtomicBool::new(false),
                version_counter: AtomicU64::new(0),
                editor_override: Mutex::new(None),
                last_written_text: Mutex::new(None),
                last_patch,
                _update_sub: update_sub,
            }),
        );

        self.drain_pending(file_id);
    }

    /// Registers an editor handle for `file_id` specifically, overriding
    /// the registry's shared editor for this document's buffer refreshes
    /// and disk writes. Returns `NotFound` if `file_id` isn't registered
    /// yet.
    pub fn register_editor(&self, file_id: &str, handle: Box<dyn EditorCollaborator>) -> Result<()> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;
        *entry.editor_override.lock().unwrap() = Some(Arc::from(handle));
        Ok(())
    }

    /// Merges a remote update for `file_id`. If the document doesn't exist
    /// yet, queues the bytes (bounded, drop-oldest) instead of dropping
    /// them.
    pub fn apply_update(&self, file_id: &str, update: &[u8], origin: &str) -> Result<UpdateOutcome> {
        match self.entries.get(file_id) {
            Some(entry) => {
                entry.crdt.lock().unwrap().apply_remote_update(update)?;
                self.bump_version(&entry, origin);
                self.refresh_editor_buffer(file_id, &entry);
                Ok(UpdateOutcome::Applied)
            }
            None => {
                self.enqueue_pending(file_id, update.to_vec(), origin.to_string());
                Ok(UpdateOutcome::Queued)
            }
        }
    }

    /// Applies a local editor edit as one atomic transaction, bumping the
    /// document's version and last-modified-by field. Returns the CRDT
    /// patch bytes the caller should broadcast, or an empty patch if the
    /// edit was suppressed as a programmatic echo.
    pub fn apply_editor_change(&self, file_id: &str, offset: usize, delete_len: usize, insert_text: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;

        if entry.suppressed.load(Ordering::SeqCst) {
            // A programmatic rewrite is in flight; this notification is
            // its own echo, not a user edit. Swallow it.
            return Ok(Vec::new());
        }

        // The patch is read back from the `on_update` subscription captured
        // in `last_patch`, rather than trusted from `apply_local_edit`'s
        // return value directly, so that subscription is the one path a
        // local patch actually travels before reaching the broadcast layer.
        entry
            .crdt
            .lock()
            .unwrap()
            .apply_local_edit(offset, delete_len, insert_text);
        let patch = entry.last_patch.lock().unwrap().take().unwrap_or_default();

        self.bump_version(&entry, &self.agent_id.clone());

        Ok(patch)
    }

    pub fn snapshot(&self, file_id: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;
        Ok(entry.crdt.lock().unwrap().snapshot())
    }

    pub fn text(&self, file_id: &str) -> Result<String> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;
        Ok(entry.crdt.lock().unwrap().text())
    }

    pub fn metadata(&self, file_id: &str) -> Option<DocumentMetadata> {
        self.entries.get(file_id).map(|e| e.metadata.lock().unwrap().clone())
    }

    pub fn all_metadata(&self) -> Vec<DocumentMetadata> {
        self.entries
            .iter()
            .map(|e| e.metadata.lock().unwrap().clone())
            .collect()
    }

    /// Tears down a document: drops its CRDT, its pending queue, and its
    /// editor registration.
    pub fn remove(&self, file_id: &str) {
        self.entries.remove(file_id);
        self.pending.remove(file_id);
    }

    /// Persists the current CRDT text to disk, if and only if this
    /// participant owns the document.
    pub fn save_to_disk(&self, file_id: &str) -> Result<()> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;
        let (is_owner, path) = {
            let meta = entry.metadata.lock().unwrap();
            (meta.is_owner, meta.local_path.clone())
        };
        if !is_owner {
            return Ok(());
        }
        let path = path.ok_or_else(|| SvsError::IoError("owned document missing local_path".into()))?;

        let text = entry.crdt.lock().unwrap().text();
        self.editor_for(&entry).write_file(&path, text.as_bytes())
    }

    /// Materializes a scratch path for a document with no `local_path` yet
    /// (always true for a non-owner's documents), so the host editor has
    /// something to open. Writing this file is a one-off convenience, not
    /// an ownership change: `save_to_disk` still no-ops for it, since
    /// `is_owner` stays `false`.
    pub fn materialize_scratch_path(&self, file_id: &str) -> Result<PathBuf> {
        let entry = self
            .entries
            .get(file_id)
            .ok_or_else(|| SvsError::NotFound(file_id.to_string()))?;

        let (existing, name) = {
            let meta = entry.metadata.lock().unwrap();
            (meta.local_path.clone(), meta.name.clone())
        };
        if let Some(path) = existing {
            return Ok(path);
        }

        let path = std::env::temp_dir().join(format!("svsmate_{file_id}_{name}"));
        let text = entry.crdt.lock().unwrap().text();
        self.editor_for(&entry).write_file(&path, text.as_bytes())?;
        entry.metadata.lock().unwrap().local_path = Some(path.clone());
        Ok(path)
    }

    /// The editor handle in effect for `entry`: its per-fileId override if
    /// [`DocumentRegistry::register_editor`] was called, else the
    /// registry's shared default.
    fn editor_for(&self, entry: &Entry) -> Arc<dyn EditorCollaborator> {
        entry
            .editor_override
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.editor.clone())
    }

    fn bump_version(&self, entry: &Entry, modified_by: &str) {
        let mut meta = entry.metadata.lock().unwrap();
        meta.version = entry.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        meta.last_modified_by = modified_by.to_string();
    }

    /// Replays every queued update for `file_id`, in arrival order, as
    /// soon as the document exists.
    fn drain_pending(&self, file_id: &str) {
        let Some(entry) = self.entries.get(file_id) else {
            return;
        };
        let Some((_, queued)) = self.pending.remove(file_id) else {
            return;
        };
        for (bytes, origin) in queued {
            if entry.crdt.lock().unwrap().apply_remote_update(&bytes).is_ok() {
                self.bump_version(&entry, &origin);
            }
        }
        self.refresh_editor_buffer(file_id, &entry);
    }

    fn enqueue_pending(&self, file_id: &str, bytes: Vec<u8>, origin: String) {
        let mut queue = self.pending.entry(file_id.to_string()).or_default();
        if queue.len() >= self.pending_queue_cap {
            queue.pop_front();
        }
        queue.push_back((bytes, origin));
    }

    /// Before writing the editor buffer, compares current editor text to
    /// CRDT text and no-ops on equality — the loop-safety rule that keeps
    /// a remote update from re-entering `apply_editor_change` via the
    /// editor's own change notification. The suppression flag brackets
    /// the write so the registry can recognize (and swallow) that
    /// re-entrant notification if the editor integration issues one
    /// anyway.
    fn refresh_editor_buffer(&self, file_id: &str, entry: &Entry) {
        let text = entry.crdt.lock().unwrap().text();

        let mut last_written = entry.last_written_text.lock().unwrap();
        if last_written.as_deref() == Some(text.as_str()) {
            return;
        }

        entry.suppressed.store(true, Ordering::SeqCst);
        self.editor_for(entry).replace_buffer(file_id, &text);
        entry.suppressed.store(false, Ordering::SeqCst);
        *last_written = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::FsEditor;
    use std::io::Write;

    fn registry(cap: usize) -> DocumentRegistry {
        DocumentRegistry::new("agent-a", Arc::new(FsEditor), cap)
    }

    #[test]
    fn create_owned_reads_file_and_seeds_crdt() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "hello").unwrap();

        let reg = registry(256);
        let meta = reg
            .create_owned("f1", "a.txt", tmp.path().to_path_buf())
            .unwrap();

        assert!(meta.is_owner);
        assert_eq!(reg.text("f1").unwrap(), "hello");
    }

    #[test]
    fn create_owned_is_idempotent_on_existing_file_id() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "hello").unwrap();

        let reg = registry(256);
        let first = reg.create_owned("f1", "a.txt", tmp.path().to_path_buf()).unwrap();
        let second = reg.create_owned("f1", "a.txt", tmp.path().to_path_buf()).unwrap();
        assert_eq!(first.file_id, second.file_id);
    }

    #[test]
    fn create_from_content_converges_only_on_diff() {
        let reg = registry(256);
        reg.create_from_content("f1", "a.txt", "hello", "server");
        assert_eq!(reg.text("f1").unwrap(), "hello");

        // Re-announcing identical content is a no-op.
        reg.create_from_content("f1", "a.txt", "hello", "server");
        assert_eq!(reg.metadata("f1").unwrap().version, 0);

        // Different content converges.
        reg.create_from_content("f1", "a.txt", "goodbye", "server");
        assert_eq!(reg.text("f1").unwrap(), "goodbye");
    }

    #[test]
    fn unknown_file_id_queues_update_instead_of_dropping() {
        let reg = registry(256);
        let mut a = CrdtDocument::new("hello", "agent-a");
        let patch = a.apply_local_edit(5, 0, " world");

        let outcome = reg.apply_update("f1", &patch, "agent-a").unwrap();
        assert_eq!(outcome, UpdateOutcome::Queued);

        reg.create_from_content("f1", "a.txt", "hello", "server");
        assert_eq!(reg.text("f1").unwrap(), "hello world");
    }

    #[test]
    fn pending_queue_drops_oldest_above_cap() {
        let reg = registry(2);
        for i in 0..5u8 {
            let _ = reg.apply_update("f1", &[i], "peer");
        }
        let len = reg.pending.get("f1").map(|q| q.len()).unwrap_or(0);
        assert_eq!(len, 2);
    }

    #[test]
    fn save_to_disk_is_noop_for_non_owner() {
        let reg = registry(256);
        reg.create_from_content("f1", "a.txt", "hello", "server");
        // No local_path on a non-owned document; must not error.
        assert!(reg.save_to_disk("f1").is_ok());
    }

    #[test]
    fn materialize_scratch_path_writes_content_once() {
        let reg = registry(256);
        reg.create_from_content("f1", "a.txt", "hello", "server");

        let path = reg.materialize_scratch_path("f1").unwrap();
        assert!(path.to_string_lossy().contains("svsmate_f1_a.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

        // Second call returns the same path without re-deriving it.
        let again = reg.materialize_scratch_path("f1").unwrap();
        assert_eq!(path, again);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn suppressed_editor_change_returns_empty_patch() {
        let reg = registry(256);
        reg.create_from_content("f1", "a.txt", "hello", "server");
        let entry = reg.entries.get("f1").unwrap();
        entry.suppressed.store(true, Ordering::SeqCst);
        let patch = reg.apply_editor_change("f1", 0, 0, "x").unwrap();
        assert!(patch.is_empty());
    }
}
