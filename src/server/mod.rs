//! The server: accept loop, process loop, shared state, broadcast/send.

pub mod channel;
pub mod config;
pub mod handlers;
pub mod nick;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;

use irc_tokens::serialize;

use crate::connection::Connection;
use crate::dispatch::Dispatcher;
use crate::error::ConnectionError;
use channel::Channel;
use config::ServerConfig;

/// Per-connection session state, server side: the I/O transport plus the
/// registration and membership attributes a connection accumulates as it
/// completes `NICK`/`USER` and joins channels.
pub struct Session {
    pub connection: Connection,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub real_name: Option<String>,
    pub registered: bool,
    pub channels: std::collections::HashSet<String>,
    pub ping_outstanding: bool,
}

impl Session {
    fn new(connection: Connection) -> Self {
        Session {
            connection,
            nickname: None,
            username: None,
            real_name: None,
            registered: false,
            channels: std::collections::HashSet::new(),
            ping_outstanding: false,
        }
    }
}

/// Everything handlers and the process loop share: live sessions, the
/// nickname uniqueness registry, and channel membership.
pub struct ServerState {
    pub domain: String,
    pub sessions: HashMap<SocketAddr, Session>,
    pub nicknames: nick::Registry,
    pub channels: HashMap<String, Channel>,
}

/// What a handler gets: a handle to the shared state, a handle to the
/// dispatcher (so e.g. `ping` can arm a one-shot `PONG` binding), and the
/// address identifying which connection the message arrived on.
#[derive(Clone)]
pub struct ServerCtx {
    pub state: Arc<Mutex<ServerState>>,
    pub dispatcher: Dispatcher<ServerCtx, SocketAddr>,
    pub addr: SocketAddr,
}

pub struct Server {
    ip: std::net::IpAddr,
    port: u16,
    state: Arc<Mutex<ServerState>>,
    dispatcher: Dispatcher<ServerCtx, SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(Mutex::new(ServerState {
            domain: config.domain,
            sessions: HashMap::new(),
            nicknames: nick::Registry::new(),
            channels: HashMap::new(),
        }));
        let dispatcher = Dispatcher::new();
        handlers::register_server_handlers(&dispatcher);
        Server { ip: config.ip, port: config.port, state, dispatcher }
    }

    pub async fn run(self) -> io::Result<()> {
        let listener = TcpListener::bind((self.ip, self.port)).await?;
        self.serve(listener).await
    }

    /// Binds immediately and returns the bound server together with the
    /// address it ended up on, so callers that asked for an ephemeral port
    /// (port `0`) can learn which one they got before serving. Tests use
    /// this to connect clients without racing the listener.
    pub async fn bind(self) -> io::Result<(BoundServer, SocketAddr)> {
        let listener = TcpListener::bind((self.ip, self.port)).await?;
        let addr = listener.local_addr()?;
        Ok((BoundServer { state: self.state, dispatcher: self.dispatcher, listener }, addr))
    }

    async fn serve(self, listener: TcpListener) -> io::Result<()> {
        BoundServer { state: self.state, dispatcher: self.dispatcher, listener }.serve().await
    }
}

/// A [`Server`] that has already bound its listening socket.
pub struct BoundServer {
    state: Arc<Mutex<ServerState>>,
    dispatcher: Dispatcher<ServerCtx, SocketAddr>,
    listener: TcpListener,
}

impl BoundServer {
    pub async fn serve(self) -> io::Result<()> {
        log::info!("listening on {}", self.listener.local_addr()?);
        let listener = self.listener;

        let accept_state = Arc::clone(&self.state);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        let connection = Connection::accept(stream, peer_addr).await;
                        accept_state.lock().await.sessions.insert(peer_addr, Session::new(connection));
                        log::debug!("accepted connection from {peer_addr}");
                    }
                    Err(e) => log::warn!("accept failed: {e}"),
                }
            }
        });

        let result = tokio::select! {
            result = process_loop(Arc::clone(&self.state), self.dispatcher.clone()) => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("received interrupt, shutting down");
                Ok(())
            }
        };
        accept_task.abort();

        let mut state = self.state.lock().await;
        for (_, mut session) in state.sessions.drain() {
            let _ = session.connection.shutdown().await;
        }
        result
    }
}

async fn process_loop(
    state: Arc<Mutex<ServerState>>,
    dispatcher: Dispatcher<ServerCtx, SocketAddr>,
) -> io::Result<()> {
    let mut ticker = tokio::time::interval(config::TICK_INTERVAL);
    loop {
        ticker.tick().await;

        let mut ready = Vec::new();
        let mut eof = Vec::new();
        let mut due_for_ping = Vec::new();
        {
            let mut guard = state.lock().await;
            let addrs: Vec<SocketAddr> = guard.sessions.keys().copied().collect();
            for addr in addrs {
                let session = guard.sessions.get_mut(&addr).expect("addr taken from live snapshot");
                match session.connection.poll_messages() {
                    Ok(()) => {
                        while let Some(line) = session.connection.next_message() {
                            ready.push((addr, line));
                        }
                        if !session.ping_outstanding
                            && session.connection.idle_seconds() >= config::PING_INTERVAL.as_secs()
                        {
                            due_for_ping.push(addr);
                        }
                    }
                    Err(ConnectionError::Eof) => eof.push(addr),
                    Err(e) => log::warn!("connection {addr} read error: {e}"),
                }
            }
        }

        let invocations = ready.into_iter().map(|(addr, line)| {
            let ctx = ServerCtx { state: Arc::clone(&state), dispatcher: dispatcher.clone(), addr };
            dispatcher.handle_message(ctx, addr, line)
        });
        futures::future::join_all(invocations).await;

        for addr in due_for_ping {
            let ctx = ServerCtx { state: Arc::clone(&state), dispatcher: dispatcher.clone(), addr };
            tokio::spawn(handlers::ping(ctx, addr));
        }

        for addr in eof {
            remove_connection(&state, addr, None).await;
        }

        let mut guard = state.lock().await;
        for session in guard.sessions.values_mut() {
            if let Err(e) = session.connection.flush() {
                log::warn!("flush error: {e}");
            }
        }
    }
}

/// Removes `addr`'s session: drops it from the nickname registry and every
/// channel it was a member of, then shuts down its connection.
pub async fn remove_connection(state: &Arc<Mutex<ServerState>>, addr: SocketAddr, msg: Option<String>) {
    let mut removed = {
        let mut guard = state.lock().await;
        let Some(mut session) = guard.sessions.remove(&addr) else { return };
        if let Some(nick) = &session.nickname {
            guard.nicknames.remove(nick);
        }
        for channel_name in std::mem::take(&mut session.channels) {
            if let Some(channel) = guard.channels.get_mut(&channel_name) {
                channel.part(addr);
                if channel.is_empty() {
                    guard.channels.remove(&channel_name);
                }
            }
        }
        session
    };
    log::debug!("removing connection {addr}: {}", msg.as_deref().unwrap_or("disconnected"));
    let _ = removed.connection.shutdown().await;
}

/// Serializes one message and enqueues it on `to` if set, or on every
/// session except `exclude` otherwise.
pub fn send(
    state: &mut ServerState,
    command: &str,
    params: &[&str],
    prefix: Option<&str>,
    exclude: Option<SocketAddr>,
    to: Option<SocketAddr>,
) {
    let prefix_owned = prefix.map(str::to_owned).unwrap_or_else(|| state.domain.clone());
    let Ok(line) = serialize(command, params, Some(&prefix_owned)) else {
        log::warn!("dropped unserializable outgoing {command} message");
        return;
    };

    match to {
        Some(addr) => {
            if let Some(session) = state.sessions.get_mut(&addr) {
                if let Err(e) = session.connection.enqueue(line) {
                    log::warn!("dropped outgoing {command} to {addr}: {e}");
                }
            }
        }
        None => {
            for (addr, session) in state.sessions.iter_mut() {
                if Some(*addr) == exclude {
                    continue;
                }
                if let Err(e) = session.connection.enqueue(&line) {
                    log::warn!("dropped outgoing {command} to {addr}: {e}");
                }
            }
        }
    }
}

pub fn send_to(state: &mut ServerState, addr: SocketAddr, command: &str, params: &[&str], prefix: Option<&str>) {
    send(state, command, params, prefix, None, Some(addr));
}
