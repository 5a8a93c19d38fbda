pub mod command;
pub mod echo;
pub mod executable;
pub mod ping;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::frame::Frame;

use command::Command as Command_;
use echo::Echo;
use ping::Ping;

#[derive(Debug, PartialEq)]
pub enum Command {
    Command(Command_),
    Echo(Echo),
    Ping(Ping),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Command(_) => "COMMAND",
            Command::Echo(_) => "ECHO",
            Command::Ping(_) => "PING",
        }
    }
}

impl Executable for Command {
    fn exec(self) -> Result<Option<Frame>, CommandError> {
        match self {
            Command::Command(cmd) => cmd.exec(),
            Command::Echo(cmd) => cmd.exec(),
            Command::Ping(cmd) => cmd.exec(),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandError::InvalidFrame {
                    expected: "array",
                    actual: frame,
                })
            }
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser.parse_command_name()?;

        match &command_name.to_ascii_lowercase()[..] {
            "command" => Command_::try_from(parser).map(Command::Command),
            "echo" => Echo::try_from(parser).map(Command::Echo),
            "ping" => Ping::try_from(parser).map(Command::Ping),
            _ => Err(CommandError::UnknownCommand {
                command: command_name,
            }),
        }
    }
}

/// Interprets `frame` as a command invocation and runs it. `Ok(None)` means the command
/// deliberately produces no reply.
pub fn dispatch(frame: Frame) -> Result<Option<Frame>, CommandError> {
    let cmd = Command::try_from(frame)?;
    debug!(command = cmd.name(), "executing command");
    cmd.exec()
}

pub struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandError> {
        let command_name = self.parts.next().ok_or(CommandError::EmptyRequest)?;

        match command_name {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandError::InvalidUTF8String),
            frame => Err(CommandError::InvalidFrame {
                expected: "command name string",
                actual: frame,
            }),
        }
    }

    /// Number of arguments not consumed yet.
    fn remaining(&self) -> usize {
        self.parts.len()
    }

    /// Next argument as raw bytes. Both `Simple` and `Bulk` frames are strings; errors are stored as
    /// strings too but are considered a separate type.
    fn next_bytes(&mut self, command: &'static str) -> Result<Bytes, CommandError> {
        let frame = self
            .parts
            .next()
            .ok_or(CommandError::WrongNumberOfArguments {
                command,
                expected: 1,
                actual: 0,
            })?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandError::InvalidArgument {
                command,
                expected: "simple or bulk string",
                actual: frame,
            }),
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame {
        expected: &'static str,
        actual: Frame,
    },
    #[error("protocol error; empty command array")]
    EmptyRequest,
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("wrong number of arguments for '{command}' command, expected {expected}, but got {actual}")]
    WrongNumberOfArguments {
        command: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid argument for '{command}' command, expected {expected}, got {actual}")]
    InvalidArgument {
        command: &'static str,
        expected: &'static str,
        actual: Frame,
    },
}

impl CommandError {
    /// Whether the request could not be read as a command at all, as opposed to a known command
    /// being called the wrong way.
    pub fn is_interpretation(&self) -> bool {
        matches!(
            self,
            CommandError::InvalidFrame { .. }
                | CommandError::EmptyRequest
                | CommandError::InvalidUTF8String(_)
        )
    }

    /// The simple error a client gets for this failure when error replies are enabled.
    pub fn reply(&self) -> Frame {
        let msg = match self {
            CommandError::UnknownCommand { command } => format!("ERR unknown command '{command}'"),
            CommandError::WrongNumberOfArguments { command, .. } => {
                format!("ERR wrong number of arguments for '{command}' command")
            }
            CommandError::InvalidFrame { .. }
            | CommandError::EmptyRequest
            | CommandError::InvalidUTF8String(_)
            | CommandError::InvalidArgument { .. } => format!("ERR {self}"),
        };

        // Simple errors are terminated by CRLF and cannot carry one.
        Frame::Error(msg.replace(['\r', '\n'], " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ping_command() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("PING"))]);

        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(cmd, Command::Ping(Ping {}));
    }

    #[test]
    fn command_name_is_case_insensitive() {
        for name in ["ping", "PING", "Ping", "pInG"] {
            let frame = Frame::Array(vec![Frame::Simple(String::from(name))]);

            assert_eq!(Command::try_from(frame).unwrap(), Command::Ping(Ping {}));
        }
    }

    #[test]
    fn parse_echo_command_with_simple_string() {
        let frame = Frame::Array(vec![
            Frame::Simple(String::from("ECHO")),
            Frame::Simple(String::from("foo")),
        ]);

        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Echo(Echo {
                message: Bytes::from("foo")
            })
        );
    }

    #[test]
    fn parse_echo_command_with_bulk_string() {
        let frame = Frame::Array(vec![
            Frame::Simple(String::from("ECHO")),
            Frame::Bulk(Bytes::from("foo-from-bytes")),
        ]);

        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Echo(Echo {
                message: Bytes::from("foo-from-bytes")
            })
        );
    }

    #[test]
    fn non_array_is_rejected() {
        let err = Command::try_from(Frame::Simple(String::from("PING"))).unwrap_err();

        assert_eq!(
            err,
            CommandError::InvalidFrame {
                expected: "array",
                actual: Frame::Simple(String::from("PING")),
            }
        );
        assert!(err.is_interpretation());
    }

    #[test]
    fn empty_array_is_rejected() {
        let err = Command::try_from(Frame::Array(vec![])).unwrap_err();

        assert_eq!(err, CommandError::EmptyRequest);
        assert!(err.is_interpretation());
    }

    #[test]
    fn non_string_command_name_is_rejected() {
        let err = Command::try_from(Frame::Array(vec![Frame::Integer(1)])).unwrap_err();

        assert!(matches!(err, CommandError::InvalidFrame { actual: Frame::Integer(1), .. }));
        assert!(err.is_interpretation());
    }

    #[test]
    fn non_utf8_command_name_is_rejected() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from_static(b"\xffPING"))]);

        let err = Command::try_from(frame).unwrap_err();

        assert!(matches!(err, CommandError::InvalidUTF8String(_)));
    }

    #[test]
    fn unknown_command() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("FLUSHALL"))]);

        let err = Command::try_from(frame).unwrap_err();

        assert_eq!(
            err,
            CommandError::UnknownCommand {
                command: String::from("FLUSHALL")
            }
        );
        assert!(!err.is_interpretation());
        assert_eq!(
            err.reply(),
            Frame::Error(String::from("ERR unknown command 'FLUSHALL'"))
        );
    }

    #[test]
    fn dispatch_ping() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("ping"))]);

        assert_eq!(
            dispatch(frame),
            Ok(Some(Frame::Simple(String::from("PONG"))))
        );
    }

    #[test]
    fn dispatch_command_has_no_reply() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("COMMAND")),
            Frame::Bulk(Bytes::from("DOCS")),
        ]);

        assert_eq!(dispatch(frame), Ok(None));
    }

    #[test]
    fn reply_never_contains_crlf() {
        let err = CommandError::InvalidArgument {
            command: "echo",
            expected: "simple or bulk string",
            actual: Frame::Array(vec![Frame::Bulk(Bytes::from("a\r\nb"))]),
        };

        let Frame::Error(msg) = err.reply() else {
            panic!("expected a simple error");
        };
        assert!(!msg.contains('\r'));
        assert!(!msg.contains('\n'));
        assert!(msg.starts_with("ERR invalid argument for 'echo' command"));
    }
}
