//! Connection multiplexer.
//!
//! A single mio poll loop owns the listener and every client connection:
//! - `Connection`: per-client buffers and session
//! - `ConnectionRegistry`: slab of live connections, keyed by poll token
//! - `process_lines`: decoder → interpreter pipeline for one connection

mod connection;
mod event_loop;
mod request;

pub(crate) use event_loop::Server;

use crate::config::Config;
use crate::fs::LocalFs;
use crate::protocol::Interpreter;
use std::io;
use std::path::{Path, PathBuf};

/// Prepare the served root and run the server until polling fails.
pub fn run(config: Config) -> io::Result<()> {
    let root = prepare_root(&config.root)?;
    let interpreter = Interpreter::new(LocalFs, root);
    let server = Server::bind(&config, interpreter)?;
    server.run()
}

/// Create the root directory if needed and return its absolute path.
fn prepare_root(root: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    root.canonicalize()
}
