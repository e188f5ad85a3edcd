//! Handlers for everything the server sends the client: chat fan-out
//! (`PRIVMSG`/`JOIN`/`QUIT`/`NICK`), the `PING` keepalive, the `NAMES`
//! collection sequence, and system notices for the numeric error replies.
//!
//! All bindings are installed explicitly by [`register_client_handlers`]
//! at startup, rather than as a side effect of importing this module.

use std::sync::{Arc, Mutex};

use irc_tokens::{rpl, serialize};
use tokio::sync::oneshot;

use crate::dispatch::{handler, Dispatcher};
use super::ClientCtx;

pub fn register_client_handlers(dispatcher: &Dispatcher<ClientCtx, ()>) {
    dispatcher.bind("PING", handler(cmd_ping));
    dispatcher.bind("NICK", handler(cmd_nick));
    dispatcher.bind("PRIVMSG", handler(cmd_privmsg));
    dispatcher.bind("QUIT", handler(cmd_quit));
    dispatcher.bind("JOIN", handler(cmd_join));

    dispatcher.bind(rpl::ERR_NICKCOLLISION, handler(err_nick_collision));
    dispatcher.bind(rpl::ERR_NICKNAMEINUSE, handler(err_nick_in_use));
    dispatcher.bind(rpl::ERR_ERRONEUSNICKNAME, handler(err_erroneous_nickname));
    dispatcher.bind(rpl::ERR_NEEDMOREPARAMS, handler(err_need_more_params));
    dispatcher.bind(rpl::ERR_ALREADYREGISTERED, handler(err_already_registered));
}

async fn cmd_ping(ctx: ClientCtx, _params: Vec<String>, _prefix: Option<String>) {
    let Ok(line) = serialize::<&str>("PONG", &[], None) else { return };
    let mut state = ctx.state.lock().await;
    if let Err(e) = state.connection.enqueue(line) {
        log::warn!("dropped outgoing PONG: {e}");
    }
}

async fn cmd_nick(ctx: ClientCtx, params: Vec<String>, prefix: Option<String>) {
    let Some(new_nick) = params.first() else { return };
    let mut state = ctx.state.lock().await;
    if prefix.as_deref() == Some(state.nickname.as_str()) {
        state.nickname = new_nick.clone();
    } else {
        let who = prefix.unwrap_or_default();
        let line = format!("*changed their nickname to {new_nick}*");
        state.view.add_msg(&who, &line);
    }
}

async fn cmd_privmsg(ctx: ClientCtx, params: Vec<String>, prefix: Option<String>) {
    let Some(body) = params.get(1) else { return };
    let state = ctx.state.lock().await;
    state.view.add_msg(&prefix.unwrap_or_default(), body);
}

async fn cmd_quit(ctx: ClientCtx, params: Vec<String>, prefix: Option<String>) {
    let reason = params.first().cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg(&prefix.unwrap_or_default(), &format!("*left the chat: {reason}*"));
}

async fn cmd_join(ctx: ClientCtx, params: Vec<String>, prefix: Option<String>) {
    let Some(channel) = params.first().cloned() else { return };
    let joiner = prefix.unwrap_or_default();

    let is_own_join = {
        let state = ctx.state.lock().await;
        state.view.add_msg(&channel, &format!("{joiner} has joined the chat!"));
        joiner == state.nickname
    };
    if is_own_join {
        listen_for_names(ctx, channel);
    }
}

// All five replies carry the recipient's own nick as params[0] (added by the
// server's `ReplyBuffer::reply`), so the payload these handlers care about
// starts at params[1].

async fn err_nick_collision(ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>) {
    let nick = params.get(1).cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg("SYSTEM", &format!("Nickname taken: {nick}"));
    state.view.add_msg("SYSTEM", "You have been assigned an anonymous nickname");
    state.view.add_msg("SYSTEM", "Type '/NICK ' followed by your nickname to choose a new one");
}

async fn err_nick_in_use(ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>) {
    let nick = params.get(1).cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg("SYSTEM", &format!("Unable to set nickname. Nickname taken: {nick}"));
    state.view.add_msg("SYSTEM", "Type '/NICK ' followed by a nickname to try again");
}

async fn err_erroneous_nickname(ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>) {
    let nick = params.get(1).cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg("SYSTEM", &format!("Unable to set nickname. Invalid nickname: {nick}"));
    state.view.add_msg("SYSTEM", "Nicknames must respect the following rules:");
    state.view.add_msg("SYSTEM", "   1. Between 1 and 9 characters long");
    state.view.add_msg("SYSTEM", "   2. Start with a letter");
    state.view.add_msg(
        "SYSTEM",
        r"   3. Contain only letters, numbers, and the following special characters: -[]\|`^{}",
    );
    state.view.add_msg("SYSTEM", "Type '/NICK ' followed by a nickname to try again");
}

async fn err_need_more_params(ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>) {
    let cmd = params.get(1).cloned().unwrap_or_default();
    let msg = params.get(2).cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg("SYSTEM", &format!("Error in cmd {cmd}: {msg}"));
}

async fn err_already_registered(ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>) {
    let msg = params.get(1).cloned().unwrap_or_default();
    let state = ctx.state.lock().await;
    state.view.add_msg("SYSTEM", &format!("Error: {msg}"));
}

/// Binds a `RPL_NAMEREPLY` collector and a one-shot `RPL_ENDOFNAMES`
/// finisher that deregisters the collector and displays the accumulated
/// member list.
fn listen_for_names(ctx: ClientCtx, channel: String) {
    let names = Arc::new(Mutex::new(Vec::<String>::new()));

    let collecting = Arc::clone(&names);
    dispatcher_bind_names_collector(&ctx.dispatcher, collecting);

    let finish_channel = channel.clone();
    let finish_names = Arc::clone(&names);
    ctx.dispatcher.bind_once(
        rpl::RPL_ENDOFNAMES,
        None,
        handler(move |ctx: ClientCtx, _params: Vec<String>, _prefix: Option<String>| {
            let channel = finish_channel.clone();
            let names = Arc::clone(&finish_names);
            async move {
                ctx.dispatcher.unbind(rpl::RPL_NAMEREPLY, None);
                let state = ctx.state.lock().await;
                state.view.add_msg(&channel, "Members: ");
                for name in names.lock().unwrap().iter() {
                    state.view.add_msg(&channel, &format!("    {name}"));
                }
            }
        }),
    );
}

fn dispatcher_bind_names_collector(dispatcher: &Dispatcher<ClientCtx, ()>, names: Arc<Mutex<Vec<String>>>) {
    dispatcher.bind(
        rpl::RPL_NAMEREPLY,
        handler(move |_ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>| {
            let names = Arc::clone(&names);
            async move {
                // params: [<our nick>, <channel>, <space-joined batch>]
                if let Some(batch) = params.get(2) {
                    names.lock().unwrap().extend(batch.split(' ').map(str::to_owned));
                }
            }
        }),
    );
}

/// The outcome of awaiting a `NICK` registration attempt: either the
/// server's echoed `NICK` (success) or one of the three rejection replies.
#[derive(Debug, Clone)]
pub enum NickOutcome {
    Accepted,
    Rejected(String),
}

/// Arms one-shot bindings for the server's `NICK` echo and for
/// `ERR_NICKNAMEINUSE`/`ERR_NICKCOLLISION`/`ERR_ERRONEUSNICKNAME`, returning
/// a receiver that resolves with whichever fires first. Must be called
/// *before* `NICK`/`USER` are sent, so the reply can never race ahead of the
/// listener that reports it.
pub fn arm_nick_outcome(ctx: &ClientCtx) -> oneshot::Receiver<NickOutcome> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let accept_tx = Arc::clone(&tx);
    ctx.dispatcher.bind_once(
        "NICK",
        Some(()),
        handler(move |_ctx: ClientCtx, _params: Vec<String>, _prefix: Option<String>| {
            let tx = Arc::clone(&accept_tx);
            async move { resolve(&tx, NickOutcome::Accepted) }
        }),
    );

    for code in [rpl::ERR_NICKNAMEINUSE, rpl::ERR_NICKCOLLISION, rpl::ERR_ERRONEUSNICKNAME] {
        let reject_tx = Arc::clone(&tx);
        ctx.dispatcher.bind_once(
            code,
            Some(()),
            handler(move |_ctx: ClientCtx, params: Vec<String>, _prefix: Option<String>| {
                let tx = Arc::clone(&reject_tx);
                let reason = params.get(1).cloned().unwrap_or_default();
                async move { resolve(&tx, NickOutcome::Rejected(reason)) }
            }),
        );
    }

    rx
}

fn resolve(tx: &Arc<Mutex<Option<oneshot::Sender<NickOutcome>>>>, outcome: NickOutcome) {
    if let Some(tx) = tx.lock().unwrap().take() {
        let _ = tx.send(outcome);
    }
}
