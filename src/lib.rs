//! Core library behind the `server` and `client` binaries: connection
//! framing, the IRC wire codec (re-exported from `irc-tokens`), a reusable
//! message dispatcher, and the server/client state machines built on top of
//! them.

pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod server;
