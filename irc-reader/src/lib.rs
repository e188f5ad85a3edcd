//! Non-blocking CRLF framing for IRC connections.
//!
//! Bytes arrive from the socket in arbitrary chunks; this crate's only job
//! is to turn them into complete `CRLF`-terminated frames, buffering any
//! trailing partial frame until more bytes arrive. It knows nothing about
//! sockets or tokio — callers supply a single non-blocking read attempt as a
//! closure, so the same buffer works for a real `TcpStream::try_read` or,
//! in tests, a canned sequence of chunks.

use std::io;

use memchr::memmem;

/// Largest single read performed per [`FrameBuffer::poll_fill`] call.
pub const READ_CHUNK: usize = 512;

/// Outcome of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Bytes were read and appended to the buffer.
    Filled,
    /// The reader reported it had nothing available right now.
    WouldBlock,
    /// The reader reported readable with zero bytes: the peer is gone.
    Eof,
}

/// Accumulates bytes read off a socket and splits them into complete
/// `CRLF`-terminated frames.
///
/// A frame ends at the first `CRLF`. Bytes before the first `CRLF` in the
/// buffer belong to exactly one frame; bytes after the last `CRLF` of a read
/// are retained for the next call. Empty frames (back-to-back `CRLF`s) are
/// yielded as empty byte strings; it's up to the caller (the dispatcher) to
/// treat them as an unknown, ignored command.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer { buf: Vec::new() }
    }

    /// Attempts one non-blocking read via `try_read`, appending whatever
    /// arrived to the internal buffer. `try_read` is expected to behave like
    /// `TcpStream::try_read`: `Ok(0)` means EOF, `Err(WouldBlock)` means
    /// nothing is available yet, and any other error is propagated.
    pub fn poll_fill(
        &mut self,
        mut try_read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    ) -> io::Result<FillOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        match try_read(&mut chunk) {
            Ok(0) => Ok(FillOutcome::Eof),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(FillOutcome::Filled)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(FillOutcome::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// Extracts every complete frame currently buffered, in order, leaving
    /// any trailing partial frame in place for the next [`Self::poll_fill`].
    pub fn take_frames(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = memmem::find(&self.buf[start..], b"\r\n") {
            let end = start + offset;
            frames.push(self.buf[start..end].to_vec());
            start = end + 2;
        }
        self.buf.drain(..start);
        frames
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
