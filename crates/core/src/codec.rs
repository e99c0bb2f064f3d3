//! Newline-delimited JSON framing over a byte stream.
//!
//! Each message is one UTF-8 JSON object followed by `\n`. Unlike the
//! prototype's `Content-Length`-prefixed LSP framing, there is no header to
//! parse — a [`FrameReader`] just buffers incoming bytes and splits on the
//! delimiter, which is what lets a malformed or truncated frame be skipped
//! without losing connection framing for the next one.

use crate::protocol::Envelope;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Incrementally reassembles newline-delimited JSON frames from an
/// `AsyncRead` byte stream, decoding each into `Envelope<M>`. The server
/// reads `FrameReader<_, ClientMessage>`; the client reads
/// `FrameReader<_, ServerMessage>`.
pub struct FrameReader<R, M> {
    inner: R,
    buf: BytesMut,
    _marker: std::marker::PhantomData<M>,
}

/// Outcome of reading one frame.
pub enum ReadOutcome<M> {
    /// A complete, parsed envelope.
    Envelope(Envelope<M>),
    /// A complete line that failed to parse. The caller should log and
    /// keep reading; the connection stays open.
    ParseError(String),
    /// The stream reached EOF with nothing else buffered.
    Eof,
}

impl<R: AsyncRead + Unpin, M: DeserializeOwned> FrameReader<R, M> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            _marker: std::marker::PhantomData,
        }
    }

    /// Reads and parses the next frame, pulling more bytes off the wire as
    /// needed. Empty lines are silently skipped (not returned as an
    /// outcome) per the framing contract.
    pub async fn next_envelope(&mut self) -> std::io::Result<ReadOutcome<M>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let line = &line[..line.len() - 1];

                if line.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }

                return Ok(parse_line(line));
            }

            let mut chunk = [0u8; 4096];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                // Trailing bytes with no newline: treat as a final frame.
                let line = self.buf.split();
                return Ok(parse_line(&line));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn parse_line<M: DeserializeOwned>(line: &[u8]) -> ReadOutcome<M> {
    match serde_json::from_slice::<Envelope<M>>(line) {
        Ok(envelope) => ReadOutcome::Envelope(envelope),
        Err(e) => ReadOutcome::ParseError(e.to_string()),
    }
}

/// Encodes an envelope as a single `\n`-terminated JSON line.
pub fn encode_frame<M: Serialize>(envelope: &Envelope<M>) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(envelope)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, ServerMessage};
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trip_single_frame() {
        let envelope = Envelope::now(ServerMessage::ClientLeft {
            name: "Ada".into(),
            id: "c1".into(),
        });
        let bytes = encode_frame(&envelope).unwrap();

        let mut reader: FrameReader<_, ServerMessage> = FrameReader::new(Cursor::new(bytes));
        match reader.next_envelope().await.unwrap() {
            ReadOutcome::Envelope(got) => assert_eq!(got.timestamp, envelope.timestamp),
            _ => panic!("expected an envelope"),
        }
    }

    #[tokio::test]
    async fn multiple_frames_in_one_chunk_all_parse() {
        let e1 = Envelope::now(ServerMessage::ClientLeft {
            name: "Ada".into(),
            id: "c1".into(),
        });
        let e2 = Envelope::now(ServerMessage::ClientLeft {
            name: "Bob".into(),
            id: "c2".into(),
        });
        let mut bytes = encode_frame(&e1).unwrap();
        bytes.extend(encode_frame(&e2).unwrap());

        let mut reader: FrameReader<_, ServerMessage> = FrameReader::new(Cursor::new(bytes));
        let first = reader.next_envelope().await.unwrap();
        let second = reader.next_envelope().await.unwrap();
        assert!(matches!(first, ReadOutcome::Envelope(_)));
        assert!(matches!(second, ReadOutcome::Envelope(_)));
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let mut bytes = b"\n\n".to_vec();
        let e1 = Envelope::now(ServerMessage::ClientLeft {
            name: "Ada".into(),
            id: "c1".into(),
        });
        bytes.extend(encode_frame(&e1).unwrap());

        let mut reader: FrameReader<_, ServerMessage> = FrameReader::new(Cursor::new(bytes));
        match reader.next_envelope().await.unwrap() {
            ReadOutcome::Envelope(_) => {}
            _ => panic!("expected an envelope after skipping blank lines"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_reports_parse_error_not_eof() {
        let bytes = b"{not json}\n".to_vec();
        let mut reader: FrameReader<_, ServerMessage> = FrameReader::new(Cursor::new(bytes));
        match reader.next_envelope().await.unwrap() {
            ReadOutcome::ParseError(_) => {}
            _ => panic!("expected a parse error"),
        }
    }

    #[tokio::test]
    async fn clean_eof_with_nothing_buffered() {
        let mut reader: FrameReader<_, ServerMessage> = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        match reader.next_envelope().await.unwrap() {
            ReadOutcome::Eof => {}
            _ => panic!("expected EOF"),
        }
    }
}
