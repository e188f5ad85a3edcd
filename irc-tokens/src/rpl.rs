//! Numeric reply codes emitted by the server.
//!
//! Kept as `&str` rather than an integer type or enum: replies are sent as
//! the first token after the prefix on the wire, and every call site that
//! produces one immediately hands it to [`crate::ReplyBuffer::reply`], which
//! wants a `&str` command anyway.

pub const RPL_NAMEREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";

pub const ERR_NONICKNAMEGIVEN: &str = "431";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_NICKCOLLISION: &str = "436";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_ALREADYREGISTERED: &str = "462";
pub const ERR_NOTEXTTOSEND: &str = "412";
