//! Request dispatch for the event loop.
//!
//! Drains complete lines from a connection's inbound accumulator, runs each
//! through the interpreter and queues the reply plus prompt on the same
//! connection's output. Execution pauses once the output holds `max_output`
//! bytes; the remaining lines stay buffered until the peer catches up.

use crate::fs::FileSystem;
use crate::protocol::{next_line, Command, DecodeError, Interpreter, Outcome};
use crate::session::Session;
use bytes::BytesMut;

/// Result of processing a connection's buffered input.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// No line executed: none is complete yet, or the output is full.
    NeedData,
    /// Processed this many lines; replies are queued in the output buffer.
    Response { commands: usize },
    /// Client sent `exit`; lines after it are not executed.
    Quit,
    /// Input cannot be decoded, connection should be closed.
    Error(DecodeError),
}

/// Execute every complete line in `input` for `session`.
pub fn process_lines<F: FileSystem>(
    input: &mut BytesMut,
    output: &mut BytesMut,
    session: &mut Session,
    interpreter: &mut Interpreter<F>,
    max_line_length: usize,
    max_output: usize,
) -> ProcessResult {
    let mut commands = 0;

    while output.len() < max_output {
        let line = match next_line(input, max_line_length) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return ProcessResult::Error(e),
        };

        let command = Command::parse(&line);
        if interpreter.execute(&command, session, output) == Outcome::Exit {
            return ProcessResult::Quit;
        }
        session.write_prompt(interpreter.root_label(), output);
        commands += 1;
    }

    if commands == 0 {
        ProcessResult::NeedData
    } else {
        ProcessResult::Response { commands }
    }
}
