//! The server binary: parses CLI flags, initializes logging, and runs the
//! accept/process loop until interrupted.

use std::process::ExitCode;

use clap::Parser;

use ircd::server::config::{ServerArgs, ServerConfig};
use ircd::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    ircd::logging::init();

    let config = ServerConfig::from(ServerArgs::parse());
    let domain = config.domain.clone();
    let server = Server::new(config);

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("server on {domain} exited: {e}");
            ExitCode::from(e.raw_os_error().and_then(|code| u8::try_from(code).ok()).unwrap_or(1))
        }
    }
}
