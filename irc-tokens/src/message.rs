use std::fmt;

use thiserror::Error;

/// Maximum wire length of a frame, including the trailing CRLF.
pub const MESSAGE_LENGTH: usize = 512;

/// Maximum number of parameters a message may carry.
pub const PARAMS_LENGTH: usize = 15;

/// Errors returned by [`serialize`] when the requested message cannot be
/// represented on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("parameter contains CR or LF")]
    CrLfInParam,
    #[error("only the last parameter may contain a space")]
    SpaceInMiddleParam,
    #[error("serialized message would exceed {MESSAGE_LENGTH} bytes")]
    OversizedMessage,
}

/// A parsed IRC message, borrowing from the line it was parsed out of.
///
/// `command` is the verb (`"NICK"`, `"PRIVMSG"`, ...) or a three-digit
/// numeric reply code (`"353"`). An empty `command` means the input was a
/// blank or otherwise unparseable frame; callers treat it like any other
/// unrecognized command (logged and ignored), per the wire grammar's
/// best-effort parsing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<'a> {
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

/// Parses one CRLF-terminated (or bare) line into a [`Message`].
///
/// This never fails: a malformed line simply yields a message with an empty
/// or partial command, which the dispatcher treats as unknown.
pub fn parse(line: &str) -> Message<'_> {
    let line = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);

    let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
        match stripped.find(' ') {
            Some(i) => (Some(&stripped[..i]), stripped[i + 1..].trim_start_matches(' ')),
            None => (Some(stripped), ""),
        }
    } else {
        (None, line)
    };

    let (middle, trailing) = match rest.find(':') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let mut params: Vec<&str> = middle.split(' ').filter(|s| !s.is_empty()).collect();
    let command = if params.is_empty() { "" } else { params.remove(0) };

    if let Some(trailing) = trailing {
        params.push(trailing);
    }
    params.truncate(PARAMS_LENGTH);

    Message { prefix, command, params }
}

/// Serializes a command, its parameters and an optional prefix into one
/// wire-format line, without the trailing CRLF (the connection layer adds
/// that). The last parameter is sent in trailing (`:`-prefixed) form when it
/// is empty or contains a space; every other parameter must contain neither
/// a space nor CR/LF.
pub fn serialize<S: AsRef<str>>(
    command: &str,
    params: &[S],
    prefix: Option<&str>,
) -> Result<String, CodecError> {
    let mut out = String::new();
    if let Some(prefix) = prefix {
        out.push(':');
        out.push_str(prefix);
        out.push(' ');
    }
    out.push_str(command);

    let last = params.len().checked_sub(1);
    for (i, param) in params.iter().enumerate() {
        let param = param.as_ref();
        if param.contains('\r') || param.contains('\n') {
            return Err(CodecError::CrLfInParam);
        }
        let is_last = Some(i) == last;
        let needs_trailing = param.contains(' ') || param.is_empty();
        if needs_trailing && !is_last {
            return Err(CodecError::SpaceInMiddleParam);
        }
        out.push(' ');
        if needs_trailing {
            out.push(':');
        }
        out.push_str(param);
    }

    if out.len() + 2 > MESSAGE_LENGTH {
        return Err(CodecError::OversizedMessage);
    }
    Ok(out)
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}
