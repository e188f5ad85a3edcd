//! Logging setup, shared by the server and client binaries.

/// Initializes `env_logger` with `RUST_LOG` (defaulting to `info`) as the
/// sole configuration source — no config file, no persistent state beyond
/// the CLI flags.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
