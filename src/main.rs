//! netdir: a line-based directory server
//!
//! Clients connect over TCP and drive a shared directory tree with simple
//! text commands:
//! - `ls`, `cd`, `cat` to browse
//! - `touch`, `mkdir`, `copy`, `rm` to change the tree
//! - `nick` to set the name shown in the prompt
//!
//! Features:
//! - Single-threaded readiness loop (epoll/kqueue via mio)
//! - Independent working directory and name per connection
//! - Configuration via CLI arguments or TOML file

mod config;
mod fs;
mod protocol;
mod runtime;
mod session;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        root = %config.root.display(),
        max_connections = config.max_connections,
        max_line_length = config.max_line_length,
        "Starting netdir server"
    );

    runtime::run(config)?;
    Ok(())
}
