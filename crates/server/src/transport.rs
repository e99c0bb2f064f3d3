//! TCP accept loop and the per-connection read/write tasks.

use crate::connection::{new_connection_id, ConnectionHandle};
use crate::state::Server;
use std::sync::Arc;
use svsmate_core::codec::{encode_frame, FrameReader, ReadOutcome};
use svsmate_core::error::SvsError;
use svsmate_core::protocol::{ClientMessage, Envelope, ServerMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Binds `addr` and accepts connections for as long as the listener
/// lives. Each accepted socket gets its own read task and write task;
/// this function itself never returns unless the listener errors.
/// `write_queue_cap` is `Config::write_queue_cap`, threaded through so
/// every connection's back-pressure threshold actually reflects it.
pub async fn run(server: Arc<Server>, addr: std::net::SocketAddr, write_queue_cap: usize) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    loop {
        let (socket, remote) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(server, socket, remote, write_queue_cap).await {
                tracing::warn!(%remote, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    server: Arc<Server>,
    socket: TcpStream,
    remote: std::net::SocketAddr,
    write_queue_cap: usize,
) -> std::io::Result<()> {
    let conn_id = new_connection_id(remote);
    let (read_half, mut write_half) = socket.into_split();

    let (tx, mut rx) = mpsc::channel::<Envelope<ServerMessage>>(write_queue_cap);
    let handle = Arc::new(ConnectionHandle::new(conn_id.clone(), "pending".to_string(), tx));

    server.register_connection(handle.clone());
    tracing::info!(%remote, conn_id = %conn_id, "client connected");

    let writer_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(bytes) = encode_frame(&envelope) else {
                continue;
            };
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut reader = FrameReader::<_, ClientMessage>::new(read_half);
    loop {
        match reader.next_envelope().await {
            Ok(ReadOutcome::Envelope(envelope)) => {
                if let Err(e) = server.dispatch(&conn_id, envelope.message) {
                    tracing::warn!(conn_id = %conn_id, error = %e, "dispatch failed");
                    server.emit_error(e);
                }
            }
            Ok(ReadOutcome::ParseError(msg)) => {
                tracing::warn!(conn_id = %conn_id, %msg, "dropping unparseable frame");
            }
            Ok(ReadOutcome::Eof) => break,
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "read error, closing connection");
                server.emit_error(SvsError::from(e));
                break;
            }
        }
    }

    server.disconnect(&conn_id);
    writer_task.abort();
    tracing::info!(conn_id = %conn_id, "client disconnected");
    Ok(())
}
