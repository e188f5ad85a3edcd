//! Parse IRC like a boss.
//!
//! This library provides helpers to tokenize and build IRC messages, while
//! keeping the number of allocations minimal.

pub use buffers::{Buffer, MessageBuffer, ReplyBuffer};
pub use message::{parse, serialize, CodecError, Message, MESSAGE_LENGTH, PARAMS_LENGTH};

mod buffers;
mod message;
pub mod rpl;

/// Asserts all data of a message in one call.
///
/// Empty elements in `params` will not be asserted against their equivalent
/// in `msg.params`, but still count for the assertion of the number of
/// parameters. Useful for reply params whose order is not deterministic
/// (e.g. `RPL_NAMEREPLY`'s member list, which comes from a `HashMap`).
pub fn assert_msg(msg: &Message<'_>, prefix: Option<&str>, command: &str, params: &[&str]) {
    assert_eq!(msg.prefix, prefix, "prefix of {msg:?}");
    assert_eq!(msg.command, command, "command of {msg:?}");
    assert_eq!(msg.params.len(), params.len(), "number of parameters of {msg:?}");
    for (i, (actual, expected)) in msg.params.iter().zip(params.iter()).enumerate() {
        if expected.is_empty() {
            continue;
        }
        assert_eq!(actual, expected, "parameter #{i} of {msg:?}");
    }
}
