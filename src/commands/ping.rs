use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;

/// Returns PONG. Arguments, if any, are ignored.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping {}

impl Executable for Ping {
    fn exec(self) -> Result<Option<Frame>, CommandError> {
        Ok(Some(Frame::Simple(String::from("PONG"))))
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = CommandError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self {})
    }
}
