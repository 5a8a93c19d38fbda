use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;

/// Placeholder for the `COMMAND` introspection family. Clients such as redis-cli send it on
/// connect; it is accepted and left unanswered.
///
/// Ref: <https://redis.io/docs/latest/commands/command>
#[derive(Debug, PartialEq)]
pub struct Command {}

impl Executable for Command {
    fn exec(self) -> Result<Option<Frame>, CommandError> {
        Ok(None)
    }
}

impl TryFrom<&mut CommandParser> for Command {
    type Error = CommandError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self {})
    }
}
