//! The boundary between `core` and the external editor surface. Everything
//! outside this trait (tree views, tabs, dialogs) is out of scope; `core`
//! only ever talks to an editor through these five operations.

use crate::error::Result;
use std::path::Path;

/// Tags who produced a CRDT update, so the registry can tell a real local
/// edit apart from its own programmatic buffer rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced by a local, user-driven edit.
    Local,
    /// Produced by merging a remote update; carries the originating
    /// connection id.
    Remote,
    /// The registry rewriting the buffer to reflect a remote update.
    /// An editor integration must not re-enter `on_text_change` for a
    /// change it reports under this origin.
    Programmatic,
}

/// Stands in for the external "open editor" the host application provides.
/// `core` never touches a filesystem path the editor didn't already read
/// or a buffer it didn't already hold; it calls back through this trait.
pub trait EditorCollaborator: Send + Sync {
    /// Replace the entire buffer backing `file_id` with `text`. The
    /// implementation must suppress its own `on_text_change` notification
    /// for this write and invoke `done` once the buffer reflects `text`.
    fn replace_buffer(&self, file_id: &str, text: &str);

    /// Read a file's bytes from disk.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write bytes to disk at `path`, creating parent directories as
    /// needed.
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Enumerate this host's broadcast-reachable addresses.
    fn list_broadcast_addresses(&self) -> Vec<std::net::Ipv4Addr> {
        crate::net::broadcast_addresses()
    }

    /// This host's display hostname, used as the default discovery
    /// `clientName`.
    fn hostname(&self) -> String {
        hostname_or_default()
    }
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// A filesystem-backed `EditorCollaborator` used by the binaries and by
/// tests: buffer replacement is a no-op callback list rather than an
/// actual UI, but disk I/O is real.
pub struct FsEditor;

impl EditorCollaborator for FsEditor {
    fn replace_buffer(&self, _file_id: &str, _text: &str) {
        // No attached UI in the headless binaries; the registry is the
        // only consumer of `text()` going forward.
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| crate::error::SvsError::IoError(e.to_string()))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::SvsError::IoError(e.to_string()))?;
        }
        std::fs::write(path, contents).map_err(|e| crate::error::SvsError::IoError(e.to_string()))
    }
}
