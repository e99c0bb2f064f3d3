//! Shared library for the `svsmate-server` and `svsmate-client` binaries:
//! the CRDT document engine, the document registry, the wire codec and
//! protocol, discovery, configuration, logging, and the editor
//! integration boundary. Transport and state-machine wiring (TCP
//! listen/accept/dial, connection tables, dispatch) live in the binaries
//! that consume this crate.

pub mod codec;
pub mod config;
pub mod crdt;
pub mod discovery;
pub mod editor;
pub mod error;
pub mod logging;
pub mod net;
pub mod protocol;
pub mod registry;

pub use error::{Result, SvsError};
