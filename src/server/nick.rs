//! Nickname case-folding, validation, and the server's uniqueness registry.

use std::collections::HashSet;

use irc_unicase::UniCase;

/// Nicknames fold and validate to between 1 and 9 characters.
pub const MAX_LENGTH: usize = 9;

/// Characters allowed after the first (which must be a letter).
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '[' | ']' | '\\' | '|' | '`' | '^' | '{' | '}')
}

/// Whether `nick` is well-formed: 1–9 characters, starting with a letter,
/// the rest drawn from letters, digits, and `-[]\|`^{}`.
pub fn is_valid(nick: &str) -> bool {
    if nick.is_empty() || nick.chars().count() > MAX_LENGTH {
        return false;
    }
    let mut chars = nick.chars();
    let first = chars.next().expect("checked non-empty above");
    first.is_ascii_alphabetic() && chars.all(is_allowed_char)
}

/// The server's uniqueness registry: the set of currently-registered,
/// case-folded nicknames, plus the counter used to mint `anon0`, `anon1`, …
/// for clients that complete `USER` without ever sending `NICK`.
#[derive(Default)]
pub struct Registry {
    taken: HashSet<UniCase<String>>,
    next_anon: u64,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.taken.contains(&UniCase::new(nick.to_owned()))
    }

    pub fn insert(&mut self, nick: &str) {
        self.taken.insert(UniCase::new(nick.to_owned()));
    }

    pub fn remove(&mut self, nick: &str) {
        self.taken.remove(&UniCase::new(nick.to_owned()));
    }

    /// Mints the next anonymous nickname (`anon0`, `anon1`, …). The counter
    /// is global to the server and never reused, even if an earlier `anonN`
    /// has since disconnected.
    pub fn next_anonymous(&mut self) -> String {
        let nick = format!("anon{}", self.next_anon);
        self.next_anon += 1;
        nick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_nicknames() {
        assert!(is_valid("Drew"));
        assert!(is_valid("a"));
        assert!(is_valid("a12345678"));
        assert!(is_valid("W-[]\\|^"));
    }

    #[test]
    fn invalid_nicknames() {
        assert!(!is_valid(""));
        assert!(!is_valid("1abc"));
        assert!(!is_valid("abcdefghij"));
        assert!(!is_valid("a b"));
    }

    #[test]
    fn collision_check_is_case_and_bracket_folded() {
        let mut registry = Registry::new();
        registry.insert("Wiz");
        assert!(registry.contains("wiz"));
        assert!(registry.contains("WIZ"));
        assert!(!registry.contains("Angel"));
    }

    #[test]
    fn anonymous_counter_is_monotonic() {
        let mut registry = Registry::new();
        assert_eq!(registry.next_anonymous(), "anon0");
        assert_eq!(registry.next_anonymous(), "anon1");
        assert_eq!(registry.next_anonymous(), "anon2");
    }
}
