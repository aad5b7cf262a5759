//! Line decoder and command parser.

use bytes::BytesMut;
use thiserror::Error;

/// Parsed client command.
///
/// Arguments the verb takes are optional here; handlers decide what a missing
/// one means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `--help`
    Help,
    /// `ls`
    List,
    /// `nick [name]`
    Nick(Option<String>),
    /// `touch [filename]`
    Touch(Option<String>),
    /// `mkdir [dirname]`
    Mkdir(Option<String>),
    /// `cat [filename]`
    Cat(Option<String>),
    /// `rm [name]`
    Remove(Option<String>),
    /// `copy [name] [destPath]`
    Copy {
        name: Option<String>,
        dest: Option<String>,
    },
    /// `cd [target]`
    Cd(Option<String>),
    /// `exit`
    Exit,
    /// Blank line.
    Empty,
    /// Any other verb.
    Unknown(String),
}

impl Command {
    /// Split a decoded line on whitespace and match the verb exactly.
    ///
    /// Surplus arguments are ignored.
    pub fn parse(line: &str) -> Command {
        let mut parts = line.split_whitespace();
        let verb = match parts.next() {
            Some(verb) => verb,
            None => return Command::Empty,
        };
        let mut arg = || parts.next().map(str::to_owned);

        match verb {
            "--help" => Command::Help,
            "ls" => Command::List,
            "nick" => Command::Nick(arg()),
            "touch" => Command::Touch(arg()),
            "mkdir" => Command::Mkdir(arg()),
            "cat" => Command::Cat(arg()),
            "rm" => Command::Remove(arg()),
            "copy" => {
                let name = arg();
                let dest = arg();
                Command::Copy { name, dest }
            }
            "cd" => Command::Cd(arg()),
            "exit" => Command::Exit,
            other => Command::Unknown(other.to_owned()),
        }
    }
}

/// Reasons a connection's input cannot be turned into lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// Take the next complete line out of `buffer`.
///
/// A line ends at `\n`; every `\r` and `\n` inside it is dropped. Returns
/// `Ok(None)` when only a partial line is buffered, leaving it in place for
/// the next read.
pub fn next_line(
    buffer: &mut BytesMut,
    max_line_length: usize,
) -> Result<Option<String>, DecodeError> {
    let line_end = match find_lf(buffer) {
        Some(pos) => pos,
        None => {
            if buffer.len() > max_line_length {
                return Err(DecodeError::LineTooLong {
                    limit: max_line_length,
                });
            }
            return Ok(None);
        }
    };

    let raw = buffer.split_to(line_end + 1);
    let line: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n')
        .collect();

    if line.len() > max_line_length {
        return Err(DecodeError::LineTooLong {
            limit: max_line_length,
        });
    }

    String::from_utf8(line)
        .map(Some)
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Find \n in buffer.
fn find_lf(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}
