//! A reusable message dispatcher.
//!
//! Binds command verbs (`"NICK"`, `"PRIVMSG"`, a numeric reply code, ...) to
//! asynchronous handlers, either generally or scoped to one connection, and
//! routes parsed messages to whichever of those match. Used by both the
//! server and the client — `Ctx` is whatever a concrete handler needs
//! (typically a cheaply-`Clone`-able handle to shared, mutex-guarded state
//! plus a connection identifier), and `Key` identifies "which connection" a
//! specific binding applies to.
//!
//! Handlers close over an `Arc<Mutex<..>>`-style shared state rather than
//! borrowing it, so that the general and specific handler bound to the same
//! message can be polled concurrently (`futures::future::join_all`) without
//! the borrow checker ever seeing two live `&mut` references to the same
//! data; any actual mutation is serialized by locking inside the handler
//! body, not by the dispatcher.
//!
//! Registrations performed from inside a handler (most notably `bind_once`
//! removing its own slot) take effect only for messages dispatched
//! afterwards: `handle_message` snapshots the matching handlers before
//! awaiting any of them.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use irc_tokens::parse;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// An asynchronous handler bound to a command.
pub type Handler<Ctx> = Arc<dyn Fn(Ctx, Vec<String>, Option<String>) -> BoxFuture + Send + Sync>;

/// Wraps a plain `async fn(ctx, params, prefix)` into a [`Handler`], so
/// command handlers can be written as ordinary `async fn`s instead of
/// closures that box their own future.
pub fn handler<Ctx, F, Fut>(f: F) -> Handler<Ctx>
where
    Ctx: 'static,
    F: Fn(Ctx, Vec<String>, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx, params, prefix| Box::pin(f(ctx, params, prefix)))
}

struct Inner<Ctx, Key> {
    general: HashMap<String, Handler<Ctx>>,
    specific: HashMap<(String, Key), Handler<Ctx>>,
}

impl<Ctx, Key> Default for Inner<Ctx, Key> {
    fn default() -> Self {
        Inner { general: HashMap::new(), specific: HashMap::new() }
    }
}

/// A cloneable handle to a shared handler registry.
pub struct Dispatcher<Ctx, Key> {
    inner: Arc<Mutex<Inner<Ctx, Key>>>,
}

impl<Ctx, Key> Clone for Dispatcher<Ctx, Key> {
    fn clone(&self) -> Self {
        Dispatcher { inner: Arc::clone(&self.inner) }
    }
}

impl<Ctx, Key> Default for Dispatcher<Ctx, Key> {
    fn default() -> Self {
        Dispatcher { inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

impl<Ctx, Key> Dispatcher<Ctx, Key>
where
    Ctx: Clone + Send + 'static,
    Key: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `command`, replacing any existing general binding.
    pub fn bind(&self, command: impl Into<String>, handler: Handler<Ctx>) {
        self.inner.lock().unwrap().general.insert(command.into(), handler);
    }

    /// Binds `handler` to `command`, but only for messages arriving on the
    /// connection identified by `key`, replacing any existing binding for
    /// that exact `(command, key)` pair.
    pub fn bind_for(&self, command: impl Into<String>, key: Key, handler: Handler<Ctx>) {
        self.inner.lock().unwrap().specific.insert((command.into(), key), handler);
    }

    /// Removes whatever is bound to `command` (optionally scoped to `key`).
    /// A no-op if nothing is bound there. Matches the slot, not a specific
    /// handler instance — the handler passed in plays no role in deciding
    /// what gets removed.
    pub fn unbind(&self, command: &str, key: Option<Key>) {
        let mut inner = self.inner.lock().unwrap();
        match key {
            None => {
                inner.general.remove(command);
            }
            Some(key) => {
                inner.specific.remove(&(command.to_owned(), key));
            }
        }
    }

    /// Binds a handler that removes itself before its first invocation.
    pub fn bind_once(&self, command: impl Into<String>, key: Option<Key>, handler: Handler<Ctx>) {
        let command = command.into();
        let dispatcher = self.clone();
        let wrap_command = command.clone();
        let wrap_key = key.clone();
        let wrapper: Handler<Ctx> = Arc::new(move |ctx, params, prefix| {
            let dispatcher = dispatcher.clone();
            let command = wrap_command.clone();
            let key = wrap_key.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                dispatcher.unbind(&command, key);
                handler(ctx, params, prefix).await;
            })
        });
        match key {
            None => self.bind(command, wrapper),
            Some(key) => self.bind_for(command, key, wrapper),
        }
    }

    /// Parses `line`, looks up the general and (`command`, `key`) specific
    /// handlers, and awaits both concurrently. Unknown commands (no match
    /// at all) are logged and dropped, not treated as an error.
    pub async fn handle_message(&self, ctx: Ctx, key: Key, line: &str) {
        let msg = parse(line);
        let params: Vec<String> = msg.params.iter().map(|p| p.to_string()).collect();
        let prefix = msg.prefix.map(|p| p.to_string());
        let command = msg.command.to_owned();

        let (general, specific) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.general.get(&command).cloned(),
                inner.specific.get(&(command.clone(), key)).cloned(),
            )
        };

        let mut futures: Vec<BoxFuture> = Vec::with_capacity(2);
        if let Some(handler) = general {
            futures.push(handler(ctx.clone(), params.clone(), prefix.clone()));
        }
        if let Some(handler) = specific {
            futures.push(handler(ctx, params, prefix));
        }

        if futures.is_empty() {
            log::warn!("received unknown message type {command:?}");
            return;
        }

        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Counter(Arc<AtomicUsize>);

    fn counting_handler(counter: Counter) -> Handler<Counter> {
        Arc::new(move |ctx: Counter, _params, _prefix| {
            Box::pin(async move {
                ctx.0.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn general_handler_runs_for_matching_command() {
        let dispatcher: Dispatcher<Counter, u32> = Dispatcher::new();
        let counter = Counter(Arc::new(AtomicUsize::new(0)));
        dispatcher.bind("PING", counting_handler(counter.clone()));

        dispatcher.handle_message(counter.clone(), 1, "PING\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_removes_the_binding() {
        let dispatcher: Dispatcher<Counter, u32> = Dispatcher::new();
        let counter = Counter(Arc::new(AtomicUsize::new(0)));
        dispatcher.bind("PING", counting_handler(counter.clone()));
        dispatcher.unbind("PING", None);

        dispatcher.handle_message(counter.clone(), 1, "PING\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn once_delivers_to_at_most_one_frame() {
        let dispatcher: Dispatcher<Counter, u32> = Dispatcher::new();
        let counter = Counter(Arc::new(AtomicUsize::new(0)));
        dispatcher.bind_once("PING", None, counting_handler(counter.clone()));

        dispatcher.handle_message(counter.clone(), 1, "PING\r\n").await;
        dispatcher.handle_message(counter.clone(), 1, "PING\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn specific_binding_only_fires_for_its_connection() {
        let dispatcher: Dispatcher<Counter, u32> = Dispatcher::new();
        let counter = Counter(Arc::new(AtomicUsize::new(0)));
        dispatcher.bind_for("PONG", 1, counting_handler(counter.clone()));

        dispatcher.handle_message(counter.clone(), 2, "PONG\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        dispatcher.handle_message(counter.clone(), 1, "PONG\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn general_and_specific_both_run_for_same_message() {
        let dispatcher: Dispatcher<Counter, u32> = Dispatcher::new();
        let counter = Counter(Arc::new(AtomicUsize::new(0)));
        dispatcher.bind("PRIVMSG", counting_handler(counter.clone()));
        dispatcher.bind_for("PRIVMSG", 1, counting_handler(counter.clone()));

        dispatcher.handle_message(counter.clone(), 1, "PRIVMSG #global :hi\r\n").await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
