//! Client CLI arguments and the runtime configuration they produce.

use clap::Parser;

/// A small IRC client.
#[derive(Debug, Parser)]
#[command(name = "client")]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to connect on.
    #[arg(long, default_value_t = 6667)]
    pub port: u16,
}

pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        ClientConfig { host: args.host, port: args.port }
    }
}

/// Resolves the client's default username: `$USER`, falling back to
/// `$USERNAME` (Windows' analogue).
pub fn default_username() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_default()
}
