//! End-to-end scenarios, run against a real server bound to an ephemeral
//! loopback port. Ping/pong liveness is covered as a direct, paused-clock
//! unit test alongside `ping` itself, since it hinges on a real 65-second
//! wait otherwise.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use ircd::server::config::ServerConfig;
use ircd::server::Server;

async fn start_server() -> SocketAddr {
    let config = ServerConfig {
        ip: "127.0.0.1".parse().unwrap(),
        port: 0,
        domain: "test.invalid".to_owned(),
    };
    let (bound, addr) = Server::new(config).bind().await.expect("bind");
    tokio::spawn(bound.serve());
    addr
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect")
}

async fn send(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.expect("write");
}

/// Waits for the process loop's next couple of ticks, then reads whatever
/// arrived. One read is enough here: everything a single incoming frame
/// provokes (e.g. `JOIN` + `NAMES` + `ENDOFNAMES`) is queued and flushed
/// within the same tick, so it lands in one `TcpStream::read`.
async fn read_settled(stream: &mut TcpStream) -> String {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut buf = vec![0u8; 8192];
    match tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).into_owned(),
        _ => String::new(),
    }
}

async fn register(stream: &mut TcpStream, nick: &str) -> String {
    send(stream, &format!("NICK {nick}\r\nUSER {} host serv :{nick}\r\n", nick.to_lowercase())).await;
    read_settled(stream).await
}

#[tokio::test]
async fn registration_autojoins_global_and_sends_names() {
    let addr = start_server().await;
    let mut drew = connect(addr).await;

    let reply = register(&mut drew, "Drew").await;

    assert!(reply.contains(":Drew JOIN #global"), "missing JOIN echo: {reply:?}");
    assert!(reply.contains("353 Drew #global :Drew"), "missing NAMES reply: {reply:?}");
    assert!(reply.contains("366 Drew #global"), "missing end-of-names: {reply:?}");
}

#[tokio::test]
async fn privmsg_reaches_the_other_member_only() {
    let addr = start_server().await;
    let mut wiz = connect(addr).await;
    let mut angel = connect(addr).await;
    register(&mut wiz, "Wiz").await;
    register(&mut angel, "Angel").await;

    send(&mut wiz, "PRIVMSG #global :Hello\r\n").await;
    let to_angel = read_settled(&mut angel).await;
    let to_wiz = read_settled(&mut wiz).await;

    assert!(to_angel.contains(":Wiz PRIVMSG #global :Hello"), "Angel missed the message: {to_angel:?}");
    assert!(!to_wiz.contains("PRIVMSG #global :Hello"), "Wiz should not see its own message echoed back");
}

#[tokio::test]
async fn nick_collision_without_prior_nickname() {
    let addr = start_server().await;
    let mut wiz = connect(addr).await;
    register(&mut wiz, "Wiz").await;

    let mut second = connect(addr).await;
    send(&mut second, "NICK Wiz\r\n").await;
    let reply = read_settled(&mut second).await;

    assert!(reply.contains("436"), "expected ERR_NICKCOLLISION: {reply:?}");
    assert!(reply.contains("Nickname collision KILL"), "unexpected reply text: {reply:?}");
}

#[tokio::test]
async fn nick_change_is_broadcast() {
    let addr = start_server().await;
    let mut wiz = connect(addr).await;
    let mut angel = connect(addr).await;
    register(&mut wiz, "Wiz").await;
    register(&mut angel, "Angel").await;

    send(&mut wiz, "NICK WiZ2\r\n").await;
    let to_wiz = read_settled(&mut wiz).await;
    let to_angel = read_settled(&mut angel).await;

    assert!(to_wiz.contains(":Wiz NICK WiZ2"), "sender did not see its own rename: {to_wiz:?}");
    assert!(to_angel.contains(":Wiz NICK WiZ2"), "observer missed the rename broadcast: {to_angel:?}");
}

#[test]
fn parses_a_prefixed_privmsg_frame_with_trailing_question_mark() {
    let msg = irc_tokens::parse(":Angel PRIVMSG Wiz :Hello are you receiving this message ?\r\n");
    assert_eq!(msg.prefix, Some("Angel"));
    assert_eq!(msg.command, "PRIVMSG");
    assert_eq!(msg.params, vec!["Wiz", "Hello are you receiving this message ?"]);
}
