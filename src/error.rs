//! Error taxonomy for the connection, codec and dispatch layers.
//!
//! None of these are allowed to tear down the accept loop, the process
//! loop, or a handler's caller: every fallible path that reaches the loop
//! boundary is logged and the loop continues. Handler-level protocol
//! violations are translated into numeric replies instead of being
//! surfaced as errors at all.

use thiserror::Error;

/// Errors from framing bytes into/out of a [`crate::connection::Connection`].
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame of {0} bytes would exceed the 512-byte wire limit")]
    OversizedFrame(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced while processing one connection's queue of incoming
/// frames in the server or client process loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Eof,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
