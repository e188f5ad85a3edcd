//! Ergonomic, infallible builders for server- and client-generated messages.
//!
//! Unlike [`crate::message::serialize`], which validates arbitrary
//! caller-supplied parameters and can fail, the types here are meant for
//! messages built out of values the caller already controls (nicknames,
//! channel names, numeric codes): they never fail, and instead accumulate
//! one or more CRLF-terminated lines into a single buffer that gets flushed
//! to a connection in one write.

/// A buffer of zero or more complete, CRLF-terminated IRC lines.
#[derive(Default)]
pub struct Buffer(String);

impl Buffer {
    pub fn new() -> Self {
        Buffer(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Starts a new line in this buffer.
    pub fn message<'a>(&'a mut self, prefix: Option<&str>, command: &str) -> MessageBuffer<'a> {
        if let Some(prefix) = prefix {
            self.0.push(':');
            self.0.push_str(prefix);
            self.0.push(' ');
        }
        self.0.push_str(command);
        MessageBuffer { buf: &mut self.0, terminated: false }
    }

    /// Consumes the buffer, returning its accumulated lines.
    pub fn build(self) -> String {
        self.0
    }
}

impl From<Buffer> for String {
    fn from(buf: Buffer) -> Self {
        buf.build()
    }
}

/// A single message line under construction.
///
/// Dropping a `MessageBuffer` (or calling [`MessageBuffer::build`]
/// explicitly) terminates the line with CRLF.
pub struct MessageBuffer<'a> {
    buf: &'a mut String,
    terminated: bool,
}

impl<'a> MessageBuffer<'a> {
    /// Appends a middle parameter.
    pub fn param(self, value: impl AsRef<str>) -> Self {
        self.buf.push(' ');
        self.buf.push_str(value.as_ref());
        self
    }

    /// Appends the trailing parameter (may contain spaces or be empty).
    pub fn trailing_param(self, value: impl AsRef<str>) -> Self {
        self.buf.push_str(" :");
        self.buf.push_str(value.as_ref());
        self
    }

    /// Returns the underlying buffer positioned to write a middle parameter
    /// byte-by-byte, for callers building up a parameter incrementally.
    pub fn raw_param(&mut self) -> &mut String {
        self.buf.push(' ');
        self.buf
    }

    /// Same as [`Self::raw_param`], but for the trailing parameter.
    pub fn raw_trailing_param(&mut self) -> &mut String {
        self.buf.push_str(" :");
        self.buf
    }

    /// Explicitly terminates the line. Equivalent to dropping the builder.
    pub fn build(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.buf.push_str("\r\n");
            self.terminated = true;
        }
    }
}

impl Drop for MessageBuffer<'_> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// A [`Buffer`] bound to a server domain and a recipient nickname, for
/// building numeric replies (`:domain CODE nick ...`) without repeating the
/// prefix and first parameter at every call site.
pub struct ReplyBuffer {
    domain: String,
    nick: String,
    inner: Buffer,
}

impl ReplyBuffer {
    pub fn new(domain: &str, nick: &str) -> Self {
        ReplyBuffer { domain: domain.to_owned(), nick: nick.to_owned(), inner: Buffer::new() }
    }

    /// Starts a numeric reply line, with the recipient nickname already
    /// appended as the first parameter.
    pub fn reply(&mut self, code: &str) -> MessageBuffer<'_> {
        let nick = self.nick.clone();
        self.inner.message(Some(&self.domain), code).param(nick)
    }

    /// Starts a non-numeric line (e.g. a server-prefixed command).
    pub fn message<'a>(&'a mut self, prefix: Option<&str>, command: &str) -> MessageBuffer<'a> {
        self.inner.message(prefix, command)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn build(self) -> String {
        self.inner.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_multiple_lines() {
        let mut rb = ReplyBuffer::new("test.invalid", "Drew");
        rb.reply("353").param("#global").trailing_param("Drew");
        rb.reply("366").param("#global").trailing_param("End of /NAMES list.");
        let out = rb.build();
        assert_eq!(
            out,
            ":test.invalid 353 Drew #global :Drew\r\n:test.invalid 366 Drew #global :End of /NAMES list.\r\n"
        );
    }

    #[test]
    fn plain_message_without_prefix() {
        let mut buf = Buffer::new();
        buf.message(None, "PING").param("test.invalid");
        assert_eq!(buf.build(), "PING test.invalid\r\n");
    }
}
