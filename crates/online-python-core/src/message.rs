//! Messages exchanged with the remote interpreter.

use std::fmt;

use crate::InputFile;

/// Message from the relay to the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Upload one file.
    Upload(InputFile),
    /// Start the uploaded entry point with these arguments.
    Run { args: Vec<String> },
    /// One line of standard input, without its terminator.
    StdinLine(String),
    /// Ask the remote side to kill the running program.
    Kill,
}

impl Outbound {
    /// Short name of the message kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Upload(_) => "upload",
            Self::Run { .. } => "run",
            Self::StdinLine(_) => "stdin",
            Self::Kill => "kill",
        }
    }
}

/// Message from the remote side to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Chunk of the remote program's standard output.
    Output(String),
    /// Chunk of the remote program's standard error.
    Error(String),
    /// The remote program is waiting for a line of input.
    InputRequest(String),
    /// The remote program finished. `code` is absent when the remote side
    /// did not report one.
    Exit { message: String, code: Option<i32> },
    /// The remote side tore the session down.
    Killed,
    /// Anything the adapter could not classify.
    Unrecognized(String),
}

impl Inbound {
    /// Whether this message ends the session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exit { .. } | Self::Killed)
    }
}

/// Direction of a raw frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("<<"),
            Self::Outbound => f.write_str(">>"),
        }
    }
}
