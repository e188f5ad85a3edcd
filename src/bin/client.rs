//! The client binary: connects, prompts for the user's identity over the
//! same input stream chat uses, then forwards each stdin line to
//! [`Client::update`] until stdin closes.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncBufReadExt;

use ircd::client::config::{ClientArgs, ClientConfig};
use ircd::client::view::ConsoleView;
use ircd::client::Client;

#[tokio::main]
async fn main() -> ExitCode {
    ircd::logging::init();

    let config = ClientConfig::from(ClientArgs::parse());
    let view = Arc::new(ConsoleView::new());

    let client = match Client::dial(config, view).await {
        Ok(client) => client,
        Err(e) => {
            return ExitCode::from(e.raw_os_error().and_then(|code| u8::try_from(code).ok()).unwrap_or(1));
        }
    };

    tokio::spawn({
        let client = client.clone();
        async move { client.prompt_user_info().await }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => client.update(&line).await,
            Ok(None) => break,
            Err(e) => {
                log::warn!("stdin read error: {e}");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}
