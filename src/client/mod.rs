//! The client: connect, registration handshake, the prompt-driven input
//! loop, and the `PRIVMSG #global` default routing.

pub mod config;
pub mod handlers;
pub mod view;

use std::io;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use irc_tokens::serialize;

use crate::connection::Connection;
use crate::dispatch::Dispatcher;
use crate::error::ConnectionError;
use config::ClientConfig;
use view::View;

/// A callback installed by a prompt flow, tried in LIFO order by
/// [`Client::update`] before falling back to default input routing.
/// Returns `true` once it has consumed the input.
pub type InputCallback = Box<dyn FnMut(&str) -> bool + Send>;

/// Session state: the transport, the client's own identity, the view
/// collaborator, and the LIFO stack of one-shot input callbacks installed by
/// prompt flows.
pub struct ClientState {
    pub connection: Connection,
    pub nickname: String,
    pub username: String,
    pub local_hostname: String,
    pub real_name: String,
    pub view: Arc<dyn View>,
    callbacks: Vec<(u64, InputCallback)>,
    next_callback_id: u64,
}

/// What a client handler gets: a handle to the shared state and a handle to
/// the dispatcher, so e.g. `listen_for_names` can bind and unbind
/// `RPL_NAMEREPLY` from within a handler.
///
/// The dispatcher's connection key is `()`: a client drives exactly one
/// connection, so there is nothing to scope specific bindings by beyond
/// "this client".
#[derive(Clone)]
pub struct ClientCtx {
    pub state: Arc<Mutex<ClientState>>,
    pub dispatcher: Dispatcher<ClientCtx, ()>,
}

#[derive(Clone)]
pub struct Client {
    state: Arc<Mutex<ClientState>>,
    dispatcher: Dispatcher<ClientCtx, ()>,
}

impl Client {
    /// Builds a client around an already-established connection. Use
    /// [`Client::dial`] to resolve, connect and wrap a fresh socket in one
    /// step; this constructor exists for tests that hand in a pre-built
    /// connection (e.g. one half of an in-memory TCP pair).
    pub fn new(connection: Connection, view: Arc<dyn View>) -> Self {
        let state = Arc::new(Mutex::new(ClientState {
            connection,
            nickname: String::new(),
            username: config::default_username(),
            local_hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            real_name: String::new(),
            view,
            callbacks: Vec::new(),
            next_callback_id: 0,
        }));
        let dispatcher = Dispatcher::new();
        handlers::register_client_handlers(&dispatcher);
        Client { state, dispatcher }
    }

    /// Resolves `(host, port)`, opens a non-blocking connection, reports
    /// progress and failure through the view, and on success starts the
    /// per-connection process loop and issues the registration handshake.
    pub async fn dial(config: ClientConfig, view: Arc<dyn View>) -> io::Result<Self> {
        view.add_msg("SYSTEM", &format!("Connecting to server {}:{}...", config.host, config.port));

        let connection = match Connection::connect((config.host.as_str(), config.port)).await {
            Ok(connection) => connection,
            Err(e) => {
                view.add_msg("SYSTEM", &format!("Unable to connect to server {}:{}", config.host, config.port));
                view.add_msg("SYSTEM", "Press <ENTER> to exit...");
                return Err(e);
            }
        };

        view.add_msg("SYSTEM", "Connected!");
        let client = Client::new(connection, view);
        tokio::spawn(client.clone().process_loop());
        client.register_with_server().await;
        Ok(client)
    }

    fn ctx(&self) -> ClientCtx {
        ClientCtx { state: Arc::clone(&self.state), dispatcher: self.dispatcher.clone() }
    }

    /// Reads frames off the connection, dispatches them, and flushes
    /// pending output, once every [`crate::server::config::TICK_INTERVAL`].
    /// Shaped identically to the server's process loop, but over a single
    /// connection instead of many.
    async fn process_loop(self) {
        let mut ticker = tokio::time::interval(crate::server::config::TICK_INTERVAL);
        loop {
            ticker.tick().await;

            let mut ready = Vec::new();
            let eof = {
                let mut state = self.state.lock().await;
                match state.connection.poll_messages() {
                    Ok(()) => {
                        while let Some(line) = state.connection.next_message() {
                            ready.push(line);
                        }
                        false
                    }
                    Err(ConnectionError::Eof) => true,
                    Err(e) => {
                        log::warn!("connection read error: {e}");
                        false
                    }
                }
            };

            for line in ready {
                let ctx = self.ctx();
                self.dispatcher.handle_message(ctx, (), &line).await;
            }

            if eof {
                let mut state = self.state.lock().await;
                let _ = state.connection.shutdown().await;
                state.view.add_msg("SYSTEM", "Connection closed.");
                state.view.add_msg("SYSTEM", "Press <ENTER> to exit");
                return;
            }

            let mut state = self.state.lock().await;
            if let Err(e) = state.connection.flush() {
                log::warn!("flush error: {e}");
            }
        }
    }

    /// Serializes `command params...` with no prefix and queues it.
    /// Logged and dropped if the connection rejects it (oversized frame).
    pub async fn send(&self, command: &str, params: &[&str]) {
        let Ok(line) = serialize(command, params, None) else {
            log::warn!("dropped unserializable outgoing {command} message");
            return;
        };
        let mut state = self.state.lock().await;
        if let Err(e) = state.connection.enqueue(line) {
            log::warn!("dropped outgoing {command}: {e}");
        }
    }

    /// Sends `NICK`/`USER` using the client's current identity, then awaits
    /// either the server's echo (success) or one of the nickname error
    /// replies, reporting either outcome through the view. The one-shot
    /// bindings are armed *before* anything is sent so the reply can never
    /// race ahead of its listener.
    pub async fn register_with_server(&self) {
        let outcome_rx = handlers::arm_nick_outcome(&self.ctx());

        let (nickname, username, local_hostname, real_name, dialed_host) = {
            let state = self.state.lock().await;
            (
                state.nickname.clone(),
                state.username.clone(),
                state.local_hostname.clone(),
                state.real_name.clone(),
                state.connection.host.clone(),
            )
        };
        self.send("NICK", &[nickname.as_str()]).await;
        self.send(
            "USER",
            &[username.as_str(), local_hostname.as_str(), dialed_host.as_str(), real_name.as_str()],
        )
        .await;

        if let handlers::NickOutcome::Rejected(reason) = outcome_rx.await.unwrap_or(
            handlers::NickOutcome::Rejected("connection closed before registering".to_owned()),
        ) {
            let state = self.state.lock().await;
            state.view.add_msg("SYSTEM", &format!("Registration failed: {reason}"));
        }
    }

    /// Installs `callback` at the front of the LIFO stack — the next
    /// [`Client::update`] call tries it first.
    async fn add_update_callback(&self, callback: InputCallback) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_callback_id;
        state.next_callback_id += 1;
        state.callbacks.insert(0, (id, callback));
        id
    }

    async fn remove_update_callback(&self, id: u64) {
        let mut state = self.state.lock().await;
        state.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }

    /// One line of user input. Tries the callback stack in LIFO order first;
    /// if none consumes it, a leading `/` sends the remainder as a raw
    /// pre-serialized line, otherwise the text is shown locally and sent as
    /// `PRIVMSG #global <text>`.
    pub async fn update(&self, text: &str) {
        let consumed = {
            let mut state = self.state.lock().await;
            state.callbacks.iter_mut().any(|(_, callback)| callback(text))
        };
        if consumed {
            return;
        }

        if let Some(raw) = text.strip_prefix('/') {
            let mut state = self.state.lock().await;
            if let Err(e) = state.connection.enqueue(raw) {
                log::warn!("dropped raw outgoing line: {e}");
            }
            return;
        }

        {
            let state = self.state.lock().await;
            state.view.add_msg(&state.nickname, text);
        }
        self.send("PRIVMSG", &["#global", text]).await;
    }

    /// Prompts for, and waits on, the user's real name, then their
    /// nickname, and announces that registration information is complete.
    /// Each prompt installs a one-shot callback backed by a `oneshot`
    /// channel rather than a closure kept alive over shared mutable state.
    pub async fn prompt_user_info(&self) {
        let real_name = self.prompt("Please enter your real name:").await;
        let nickname = self.prompt("Please enter your nickname:").await;

        let mut state = self.state.lock().await;
        state.real_name = real_name;
        state.nickname = nickname;
        let welcome = format!("Welcome {}!", state.real_name);
        state.view.add_msg("SYSTEM", &welcome);
    }

    async fn prompt(&self, question: &str) -> String {
        {
            let state = self.state.lock().await;
            state.view.add_msg("SYSTEM", question);
        }
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        let id = self
            .add_update_callback(Box::new(move |text: &str| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(text.to_owned());
                    true
                } else {
                    false
                }
            }))
            .await;
        let answer = rx.await.unwrap_or_default();
        self.remove_update_callback(id).await;
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use view::test_support::RecordingView;

    async fn paired_client() -> (Client, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connection, accepted) = tokio::join!(Connection::connect(addr), listener.accept());
        let (server_side, _) = accepted.unwrap();
        let view = Arc::new(RecordingView::default());
        (Client::new(connection.unwrap(), view), server_side)
    }

    #[tokio::test]
    async fn update_sends_privmsg_global_by_default() {
        let (client, mut server_side) = paired_client().await;
        client.update("hello there").await;
        {
            let mut state = client.state.lock().await;
            state.connection.flush().unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 256];
        let n = server_side.try_read(&mut buf).unwrap();
        let received = String::from_utf8_lossy(&buf[..n]);
        assert!(received.contains("PRIVMSG #global :hello there"));
    }

    #[tokio::test]
    async fn update_with_slash_sends_raw_line() {
        let (client, mut server_side) = paired_client().await;
        client.update("/JOIN #general").await;
        {
            let mut state = client.state.lock().await;
            state.connection.flush().unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 256];
        let n = server_side.try_read(&mut buf).unwrap();
        assert_eq!(String::from_utf8_lossy(&buf[..n]), "JOIN #general\r\n");
    }

    #[tokio::test]
    async fn prompt_resolves_from_the_next_update_call() {
        let (client, _server_side) = paired_client().await;
        let prompted = {
            let client = client.clone();
            tokio::spawn(async move { client.prompt("real name?").await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        client.update("Ada Lovelace").await;

        assert_eq!(prompted.await.unwrap(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn update_tries_callbacks_lifo_before_default_routing() {
        let (client, _server_side) = paired_client().await;
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        client
            .add_update_callback(Box::new(move |_| {
                first.lock().unwrap().push("first");
                false
            }))
            .await;
        let second = Arc::clone(&order);
        client
            .add_update_callback(Box::new(move |text| {
                second.lock().unwrap().push("second");
                text == "consume me"
            }))
            .await;

        client.update("consume me").await;
        assert_eq!(*order.lock().unwrap(), vec!["second"]);
    }
}
