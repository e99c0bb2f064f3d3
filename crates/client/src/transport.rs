//! Dial the server, then run the read loop and write queue for the
//! single TCP session a client holds.

use crate::state::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use svsmate_core::codec::{encode_frame, FrameReader, ReadOutcome};
use svsmate_core::error::SvsError;
use svsmate_core::protocol::{ClientMessage, Envelope, ServerMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Dials `addr`, wires up the client's outbound channel, and runs the
/// read loop until the connection closes or errors. Returns once the
/// session ends; the caller decides whether to reconnect.
/// `write_queue_cap` is `Config::write_queue_cap`.
pub async fn connect(client: Arc<Client>, addr: SocketAddr, write_queue_cap: usize) -> std::io::Result<()> {
    let socket = TcpStream::connect(addr).await?;
    tracing::info!(%addr, "connected to server");
    let (read_half, mut write_half) = socket.into_split();

    let (tx, mut rx) = mpsc::channel::<ClientMessage>(write_queue_cap);
    client.attach_outbound(tx);
    client.send_hello();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let envelope = Envelope::now(message);
            let Ok(bytes) = encode_frame(&envelope) else {
                continue;
            };
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut reader = FrameReader::<_, ServerMessage>::new(read_half);
    loop {
        match reader.next_envelope().await {
            Ok(ReadOutcome::Envelope(envelope)) => {
                if let Err(e) = client.dispatch(envelope.message) {
                    tracing::warn!(error = %e, "dispatch failed");
                    client.emit_error(e);
                }
            }
            Ok(ReadOutcome::ParseError(msg)) => {
                tracing::warn!(%msg, "dropping unparseable frame");
            }
            Ok(ReadOutcome::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "read error, disconnecting");
                client.emit_error(SvsError::from(e));
                break;
            }
        }
    }

    client.clear();
    writer_task.abort();
    tracing::info!("disconnected from server");
    Ok(())
}
