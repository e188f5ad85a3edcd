//! The `view` collaborator: a small interface the client publishes display
//! lines to, kept separate from any concrete terminal UI (out of scope here
//! — rendering belongs to a real TUI crate, not this core).
//!
//! An explicit trait the client depends on, rather than a duck-typed
//! object passed around by convention, plus one minimal, console-only
//! implementation good enough to run the client headless or in tests.

/// Receives `(user, line)` tuples to display. `user` is either a nickname,
/// a channel name, or the literal `"SYSTEM"` for client-internal notices.
pub trait View: Send + Sync {
    fn add_msg(&self, user: &str, line: &str);
}

/// Prints every message to stdout as `<user> line`, with no buffering,
/// coloring, or layout — the minimal implementation of [`View`] that a real
/// terminal UI would replace.
#[derive(Default)]
pub struct ConsoleView;

impl ConsoleView {
    pub fn new() -> Self {
        ConsoleView
    }
}

impl View for ConsoleView {
    fn add_msg(&self, user: &str, line: &str) {
        println!("<{user}> {line}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::View;
    use std::sync::Mutex;

    /// A [`View`] that records every call instead of printing, for
    /// assertions in tests that exercise client handlers.
    #[derive(Default)]
    pub struct RecordingView {
        pub messages: Mutex<Vec<(String, String)>>,
    }

    impl View for RecordingView {
        fn add_msg(&self, user: &str, line: &str) {
            self.messages.lock().unwrap().push((user.to_owned(), line.to_owned()));
        }
    }
}
