//! Server CLI arguments and the runtime configuration they produce.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;

/// A small IRC server.
#[derive(Debug, Parser)]
#[command(name = "server")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 6667)]
    pub port: u16,
}

/// Seconds of inbound silence before a connection is pinged.
pub const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Seconds to wait for a `PONG` before dropping an unresponsive connection.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-loop cadence.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// The one channel every registered client is auto-joined to.
pub const AUTOJOIN_CHANNEL: &str = "#global";

pub struct ServerConfig {
    pub ip: IpAddr,
    pub port: u16,
    /// The server's own identity, used as the default message prefix
    /// (`host:port`) and as the domain half of numeric replies.
    pub domain: String,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        let domain = format!("{}:{}", args.ip, args.port);
        ServerConfig { ip: args.ip, port: args.port, domain }
    }
}
