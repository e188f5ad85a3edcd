//! `Connection`: the transport layer of one peer socket.
//!
//! A `Connection` knows nothing about IRC semantics — it turns bytes into
//! complete, still-unparsed frame strings and back, using only non-blocking
//! reads and writes so that a single process loop can poll every connection
//! in turn without ever suspending on one of them.
//!
//! Incoming and outgoing bytes are kept in separate buffers so that polling
//! for new frames can never discard queued-but-unflushed output.

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::TcpStream;

use irc_reader::{FillOutcome, FrameBuffer};

use crate::error::{ConnectionError, FramingError};

/// Host used when reverse DNS resolution fails or is skipped.
pub const UNKNOWN_HOST: &str = "unknown";

/// Wire limit for one frame, including its trailing CRLF.
pub const MESSAGE_LENGTH: usize = 512;

pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    incoming: FrameBuffer,
    pending: std::collections::VecDeque<Vec<u8>>,
    outgoing: Vec<u8>,
    last_activity: Instant,
    pub host: String,
}

impl Connection {
    /// Opens an outbound connection (client side). The host attribute is the
    /// address dialed; there is no reverse lookup to do here.
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        Ok(Connection::new(stream, peer_addr, peer_addr.ip().to_string()))
    }

    /// Wraps an accepted socket (server side), resolving `peer_addr` to a
    /// hostname on a blocking thread, best-effort, defaulting to
    /// [`UNKNOWN_HOST`] on any failure.
    pub async fn accept(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let host = tokio::task::spawn_blocking(move || {
            dns_lookup::lookup_addr(&peer_addr.ip()).unwrap_or_else(|_| UNKNOWN_HOST.to_owned())
        })
        .await
        .unwrap_or_else(|_| UNKNOWN_HOST.to_owned());
        Connection::new(stream, peer_addr, host)
    }

    fn new(stream: TcpStream, peer_addr: SocketAddr, host: String) -> Self {
        Connection {
            stream,
            peer_addr,
            incoming: FrameBuffer::new(),
            pending: std::collections::VecDeque::new(),
            outgoing: Vec::new(),
            last_activity: Instant::now(),
            host,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Attempts one non-blocking read off the socket and appends any
    /// complete frames to the pending queue. Resolves with
    /// [`ConnectionError::Eof`] once the peer has closed its write half; a
    /// tick with nothing to read is simply a no-op, not an error.
    pub fn poll_messages(&mut self) -> Result<(), ConnectionError> {
        let stream = &self.stream;
        let outcome = self.incoming.poll_fill(|buf| stream.try_read(buf))?;
        match outcome {
            FillOutcome::Eof => return Err(ConnectionError::Eof),
            FillOutcome::WouldBlock => return Ok(()),
            FillOutcome::Filled => {}
        }
        self.last_activity = Instant::now();
        self.pending.extend(self.incoming.take_frames());
        Ok(())
    }

    /// Polls for new frames, then reports whether any are queued. Propagates
    /// [`ConnectionError::Eof`] from the poll rather than swallowing it, so a
    /// caller using this method alone (without also calling
    /// [`Self::poll_messages`] itself) still learns about a closed peer.
    pub fn has_messages(&mut self) -> Result<bool, ConnectionError> {
        self.poll_messages()?;
        Ok(!self.pending.is_empty())
    }

    /// Pops the oldest pending frame, lossily decoded as UTF-8 — IRC wire
    /// traffic isn't guaranteed valid UTF-8, and a lossy decode keeps a
    /// stray non-UTF-8 byte from tearing down the connection.
    pub fn next_message(&mut self) -> Option<String> {
        self.pending.pop_front().map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Queues `line` for the next [`Self::flush`], appending a terminating
    /// `CRLF` if it isn't already present. Rejects frames whose total length
    /// including that CRLF would exceed [`MESSAGE_LENGTH`], leaving the
    /// outgoing queue untouched.
    pub fn enqueue(&mut self, line: impl AsRef<str>) -> Result<(), FramingError> {
        let line = line.as_ref();
        let needs_crlf = !line.ends_with("\r\n");
        let total = line.len() + if needs_crlf { 2 } else { 0 };
        if total > MESSAGE_LENGTH {
            return Err(FramingError::OversizedFrame(total));
        }
        self.outgoing.extend_from_slice(line.as_bytes());
        if needs_crlf {
            self.outgoing.extend_from_slice(b"\r\n");
        }
        Ok(())
    }

    /// Queues a pre-built blob of one or more already `CRLF`-terminated
    /// lines (as produced by [`irc_tokens::Buffer`]/[`irc_tokens::ReplyBuffer`]),
    /// each already kept under the wire limit by construction — e.g. the
    /// `RPL_NAMEREPLY` batching in [`crate::server::channel::Channel`]. Skips
    /// the single-frame size check in [`Self::enqueue`], which would
    /// misfire against a blob carrying more than one frame.
    pub fn enqueue_batch(&mut self, blob: impl AsRef<str>) {
        self.outgoing.extend_from_slice(blob.as_ref().as_bytes());
    }

    /// Writes out as much as the socket accepts right now of whatever was
    /// queued by [`Self::enqueue`]. A no-op, not an error, when nothing is
    /// queued or the socket can't take more this tick.
    pub fn flush(&mut self) -> Result<(), ConnectionError> {
        while !self.outgoing.is_empty() {
            match self.stream.try_write(&self.outgoing) {
                Ok(n) => {
                    self.outgoing.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream.shutdown().await
    }

    pub fn idle_seconds(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, client) = tokio::join!(listener.accept(), Connection::connect(addr));
        let (stream, peer_addr) = accepted.unwrap();
        (Connection::new(stream, peer_addr, UNKNOWN_HOST.to_owned()), client.unwrap())
    }

    #[tokio::test]
    async fn enqueue_adds_missing_crlf_once() {
        let (mut server_side, mut client_side) = pair().await;

        client_side.enqueue("PING").unwrap();
        client_side.enqueue("PONG\r\n").unwrap();
        client_side.flush().unwrap();

        // Give the kernel a moment to deliver bytes to the accepted socket.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(server_side.has_messages().unwrap());
        assert_eq!(server_side.next_message().unwrap(), "PING");
        assert_eq!(server_side.next_message().unwrap(), "PONG");
        assert!(server_side.next_message().is_none());
    }

    #[tokio::test]
    async fn would_block_is_not_an_error() {
        let (mut server_side, _client_side) = pair().await;
        assert!(!server_side.has_messages().unwrap());
    }

    #[tokio::test]
    async fn enqueue_rejects_frames_over_the_wire_limit() {
        let (mut server_side, _client_side) = pair().await;
        let oversized = "x".repeat(MESSAGE_LENGTH - 1);
        let err = server_side.enqueue(oversized).unwrap_err();
        assert!(matches!(err, FramingError::OversizedFrame(n) if n == MESSAGE_LENGTH + 1));
    }

    #[tokio::test]
    async fn enqueue_accepts_a_frame_exactly_at_the_limit() {
        let (mut server_side, _client_side) = pair().await;
        let exact = "x".repeat(MESSAGE_LENGTH - 2);
        assert!(server_side.enqueue(exact).is_ok());
    }

    #[tokio::test]
    async fn eof_is_reported_once_peer_closes() {
        let (mut server_side, client_side) = pair().await;
        drop(client_side);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = server_side.poll_messages().unwrap_err();
        assert!(matches!(err, ConnectionError::Eof));
    }
}
