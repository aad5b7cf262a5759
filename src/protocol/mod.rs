//! Line-based directory protocol.
//!
//! Clients send newline-terminated plain text commands; the server answers
//! with `\r\n`-terminated lines and, after every command except `exit`, a
//! working-directory banner and a name prompt.
//!
//! ## Protocol Format
//!
//! ```text
//! Server:  Hello user!\r\n
//!          Enter --help for support info\r\n
//! Client:  mkdir demo\r\n
//! Server:  Working directory: ~server/\r\n
//!          User:
//! Client:  cd demo\r\n
//! Server:  Working directory: ~server/demo/\r\n
//!          User:
//! Client:  exit\r\n
//! (connection closed)
//! ```
//!
//! Commands: `--help`, `ls`, `nick`, `touch`, `mkdir`, `cat`, `rm`, `copy`,
//! `cd`, `exit`. Anything else is ignored apart from the prompt.

pub mod handler;
pub mod parser;

pub use handler::{greeting, Interpreter, Outcome};
pub use parser::{next_line, Command, DecodeError};
