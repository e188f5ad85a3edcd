//! The five server-recognized commands (`NICK`, `USER`, `PRIVMSG`, `QUIT`,
//! `JOIN`) plus the `PONG` liveness handler `ping` arms per connection.
//!
//! Numeric replies follow the standard `<code> <target-nick-or-"*"> ...
//! [:trailing]` shape, with the requesting connection's own (possibly still
//! unset) nickname as the target.

use std::net::SocketAddr;
use std::sync::Arc;

use irc_tokens::{rpl, Buffer, ReplyBuffer};

use crate::dispatch::{handler, Dispatcher};
use crate::server::channel::Channel;
use crate::server::config::{self, AUTOJOIN_CHANNEL};
use crate::server::{remove_connection, send, ServerCtx, ServerState};

pub fn register_server_handlers(dispatcher: &Dispatcher<ServerCtx, SocketAddr>) {
    dispatcher.bind("NICK", handler(cmd_nick));
    dispatcher.bind("USER", handler(cmd_user));
    dispatcher.bind("PRIVMSG", handler(cmd_privmsg));
    dispatcher.bind("QUIT", handler(cmd_quit));
    dispatcher.bind("JOIN", handler(cmd_join));
}

fn target_nick(state: &ServerState, addr: SocketAddr) -> String {
    state.sessions.get(&addr).and_then(|s| s.nickname.clone()).unwrap_or_else(|| "*".to_owned())
}

async fn cmd_nick(ctx: ServerCtx, params: Vec<String>, _prefix: Option<String>) {
    let mut state = ctx.state.lock().await;
    let domain = state.domain.clone();
    let nick_for_reply = target_nick(&state, ctx.addr);

    let Some(requested) = params.first().cloned() else {
        reply(&mut state, ctx.addr, &domain, &nick_for_reply, |r| {
            r.reply(rpl::ERR_NONICKNAMEGIVEN).trailing_param("No nickname given");
        });
        return;
    };

    if !super::nick::is_valid(&requested) {
        reply(&mut state, ctx.addr, &domain, &nick_for_reply, |r| {
            r.reply(rpl::ERR_ERRONEUSNICKNAME).param(&requested).trailing_param("Erroneous nickname");
        });
        return;
    }

    if state.nicknames.contains(&requested) {
        let had_prior_nick = state.sessions.get(&ctx.addr).is_some_and(|s| s.nickname.is_some());
        let (code, text) = if had_prior_nick {
            (rpl::ERR_NICKNAMEINUSE, "Nickname is already in use")
        } else {
            (rpl::ERR_NICKCOLLISION, "Nickname collision KILL")
        };
        reply(&mut state, ctx.addr, &domain, &nick_for_reply, |r| {
            r.reply(code).param(&requested).trailing_param(text);
        });
        return;
    }

    let previous = state.sessions.get(&ctx.addr).and_then(|s| s.nickname.clone());
    if let Some(old) = &previous {
        state.nicknames.remove(old);
    }
    state.nicknames.insert(&requested);
    if let Some(session) = state.sessions.get_mut(&ctx.addr) {
        session.nickname = Some(requested.clone());
    }

    if let Some(old) = previous {
        send(&mut state, "NICK", &[requested.as_str()], Some(&old), None, None);
    }
}

async fn cmd_user(ctx: ServerCtx, params: Vec<String>, _prefix: Option<String>) {
    let mut state = ctx.state.lock().await;
    let domain = state.domain.clone();
    let nick_for_reply = target_nick(&state, ctx.addr);

    if state.sessions.get(&ctx.addr).is_some_and(|s| s.registered) {
        reply(&mut state, ctx.addr, &domain, &nick_for_reply, |r| {
            r.reply(rpl::ERR_ALREADYREGISTERED).trailing_param("You may not reregister");
        });
        return;
    }

    if params.len() != 4 {
        reply(&mut state, ctx.addr, &domain, &nick_for_reply, |r| {
            r.reply(rpl::ERR_NEEDMOREPARAMS).param("USER").trailing_param("Not enough parameters");
        });
        return;
    }

    let username = params[0].clone();
    let host_name = params[1].clone();
    let real_name = params[3].clone();

    if state.sessions.get(&ctx.addr).is_some_and(|s| s.nickname.is_none()) {
        let anon = state.nicknames.next_anonymous();
        state.nicknames.insert(&anon);
        if let Some(session) = state.sessions.get_mut(&ctx.addr) {
            session.nickname = Some(anon);
        }
    }

    if let Some(session) = state.sessions.get_mut(&ctx.addr) {
        session.username = Some(username);
        session.real_name = Some(real_name);
        session.connection.host = host_name;
        session.registered = true;
    }

    add_to_channel(&mut state, ctx.addr, AUTOJOIN_CHANNEL);
}

async fn cmd_join(ctx: ServerCtx, params: Vec<String>, _prefix: Option<String>) {
    let Some(channel_name) = params.first().cloned() else { return };
    if !(channel_name.starts_with('#') || channel_name.starts_with('&')) {
        return;
    }
    let mut state = ctx.state.lock().await;
    if !state.sessions.get(&ctx.addr).is_some_and(|s| s.registered) {
        return;
    }
    add_to_channel(&mut state, ctx.addr, &channel_name);
}

async fn cmd_privmsg(ctx: ServerCtx, params: Vec<String>, _prefix: Option<String>) {
    let mut state = ctx.state.lock().await;
    let domain = state.domain.clone();
    let Some(session) = state.sessions.get(&ctx.addr) else { return };
    if !session.registered {
        return;
    }
    let sender_nick = session.nickname.clone().unwrap_or_else(|| "*".to_owned());

    let Some(receivers) = params.first().cloned() else { return };
    let body = params.get(1).cloned().unwrap_or_default();

    if body.is_empty() {
        reply(&mut state, ctx.addr, &domain, &sender_nick, |r| {
            r.reply(rpl::ERR_NOTEXTTOSEND).trailing_param("No text to send");
        });
        return;
    }

    for target in receivers.split(',') {
        if !(target.starts_with('#') || target.starts_with('&')) {
            continue;
        }
        let Some(channel) = state.channels.get(target) else { continue };
        let recipients: Vec<SocketAddr> =
            channel.members().copied().filter(|addr| *addr != ctx.addr).collect();
        for recipient in recipients {
            if let Some(recipient_session) = state.sessions.get_mut(&recipient) {
                let mut buf = Buffer::new();
                buf.message(Some(&sender_nick), "PRIVMSG").param(target).trailing_param(&body);
                if let Err(e) = recipient_session.connection.enqueue(buf.build()) {
                    log::warn!("dropped PRIVMSG to {recipient} on {target}: {e}");
                }
            }
        }
    }
}

async fn cmd_quit(ctx: ServerCtx, params: Vec<String>, _prefix: Option<String>) {
    let msg = params.first().cloned();
    remove_connection(&ctx.state, ctx.addr, msg).await;
}

/// Joins `addr` into `channel_name`, notifies existing members, and sends
/// the joiner a batched `RPL_NAMEREPLY`/`RPL_ENDOFNAMES`.
fn add_to_channel(state: &mut ServerState, addr: SocketAddr, channel_name: &str) {
    let Some(nickname) = state.sessions.get(&addr).and_then(|s| s.nickname.clone()) else {
        return;
    };

    state.channels.entry(channel_name.to_owned()).or_insert_with(Channel::new).join(addr);
    if let Some(session) = state.sessions.get_mut(&addr) {
        session.channels.insert(channel_name.to_owned());
    }

    let members: Vec<SocketAddr> =
        state.channels[channel_name].members().copied().collect();
    for member in &members {
        if let Some(session) = state.sessions.get_mut(member) {
            let mut buf = Buffer::new();
            buf.message(Some(&nickname), "JOIN").param(channel_name);
            if let Err(e) = session.connection.enqueue(buf.build()) {
                log::warn!("dropped JOIN notification to {member}: {e}");
            }
        }
    }

    let mut nicknames: Vec<String> = members
        .iter()
        .filter_map(|member| state.sessions.get(member).and_then(|s| s.nickname.clone()))
        .collect();
    nicknames.sort();
    let batches = Channel::names_batches(channel_name, &nicknames);

    let domain = state.domain.clone();
    if let Some(session) = state.sessions.get_mut(&addr) {
        let mut reply = ReplyBuffer::new(&domain, &nickname);
        for batch in &batches {
            reply.reply(rpl::RPL_NAMEREPLY).param(channel_name).trailing_param(batch.join(" "));
        }
        reply.reply(rpl::RPL_ENDOFNAMES).param(channel_name).trailing_param("End of /NAMES list.");
        session.connection.enqueue_batch(reply.build());
    }
}

fn reply(
    state: &mut ServerState,
    addr: SocketAddr,
    domain: &str,
    nick: &str,
    build: impl FnOnce(&mut ReplyBuffer),
) {
    if let Some(session) = state.sessions.get_mut(&addr) {
        let mut buf = ReplyBuffer::new(domain, nick);
        build(&mut buf);
        session.connection.enqueue_batch(buf.build());
    }
}

/// Sends `PING`, arms a one-shot `PONG` binding scoped to `addr`, and either
/// clears the outstanding-ping flag or drops the connection if
/// [`config::PONG_TIMEOUT`] elapses first. Runs as its own task so the
/// 5-second wait never blocks the process loop's tick.
pub async fn ping(ctx: ServerCtx, addr: SocketAddr) {
    {
        let mut state = ctx.state.lock().await;
        let domain = state.domain.clone();
        let Some(session) = state.sessions.get_mut(&addr) else { return };
        session.ping_outstanding = true;
        let mut buf = Buffer::new();
        buf.message(Some(&domain), "PING").param(&domain);
        session.connection.enqueue_batch(buf.build());
        let _ = session.connection.flush();
    }

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    let wake = Arc::clone(&tx);
    ctx.dispatcher.bind_once(
        "PONG",
        Some(addr),
        handler(move |_ctx: ServerCtx, _params: Vec<String>, _prefix: Option<String>| {
            let wake = Arc::clone(&wake);
            async move {
                if let Some(tx) = wake.lock().expect("ping oneshot mutex poisoned").take() {
                    let _ = tx.send(());
                }
            }
        }),
    );

    match tokio::time::timeout(config::PONG_TIMEOUT, rx).await {
        Ok(_) => {
            if let Some(session) = ctx.state.lock().await.sessions.get_mut(&addr) {
                session.ping_outstanding = false;
            }
        }
        Err(_) => {
            remove_connection(&ctx.state, addr, Some("ping timeout".to_owned())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;
    use crate::connection::Connection;
    use crate::server::{nick, Session};

    /// Builds a one-session `ServerState` (and the client end of its
    /// connection) around a real loopback pair, registered under `nick`.
    async fn registered_session(name: &str) -> (ServerCtx, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, client) = tokio::join!(listener.accept(), tokio::net::TcpStream::connect(addr));
        let (stream, peer_addr) = accepted.unwrap();
        let connection = Connection::accept(stream, peer_addr).await;

        let mut session = Session::new(connection);
        session.nickname = Some(name.to_owned());
        session.registered = true;

        let mut nicknames = nick::Registry::new();
        nicknames.insert(name);

        let mut sessions = HashMap::new();
        sessions.insert(peer_addr, session);

        let state = Arc::new(Mutex::new(ServerState {
            domain: "test.invalid".to_owned(),
            sessions,
            nicknames,
            channels: HashMap::new(),
        }));
        let dispatcher = Dispatcher::new();
        register_server_handlers(&dispatcher);
        (ServerCtx { state, dispatcher, addr: peer_addr }, client.unwrap())
    }

    /// Scenario 5: no `PONG` within `PONG_TIMEOUT` drops the connection.
    #[tokio::test(start_paused = true)]
    async fn ping_without_pong_drops_the_connection() {
        let (ctx, _client) = registered_session("Drew").await;
        let addr = ctx.addr;

        let pinging = tokio::spawn(ping(ctx.clone(), addr));
        tokio::task::yield_now().await;
        tokio::time::advance(config::PONG_TIMEOUT + std::time::Duration::from_millis(1)).await;
        pinging.await.unwrap();

        assert!(!ctx.state.lock().await.sessions.contains_key(&addr));
    }

    /// A `PONG` arriving before the timeout clears `ping_outstanding` and
    /// keeps the connection alive.
    #[tokio::test(start_paused = true)]
    async fn ping_followed_by_pong_keeps_the_connection() {
        let (ctx, _client) = registered_session("Drew").await;
        let addr = ctx.addr;

        let pinging = tokio::spawn(ping(ctx.clone(), addr));
        tokio::task::yield_now().await;
        ctx.dispatcher.handle_message(ctx.clone(), addr, "PONG test.invalid\r\n").await;
        pinging.await.unwrap();

        let state = ctx.state.lock().await;
        let session = state.sessions.get(&addr).expect("connection not dropped");
        assert!(!session.ping_outstanding);
    }
}
