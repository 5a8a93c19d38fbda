use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;

const NAME: &str = "echo";

/// Returns `message` as a bulk string.
///
/// Ref: <https://redis.io/docs/latest/commands/echo>
#[derive(Debug, PartialEq)]
pub struct Echo {
    pub message: Bytes,
}

impl Executable for Echo {
    fn exec(self) -> Result<Option<Frame>, CommandError> {
        Ok(Some(Frame::Bulk(self.message)))
    }
}

impl TryFrom<&mut CommandParser> for Echo {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let args = parser.remaining();
        if args != 1 {
            return Err(CommandError::WrongNumberOfArguments {
                command: NAME,
                expected: 1,
                actual: args,
            });
        }

        let message = parser.next_bytes(NAME)?;

        Ok(Self { message })
    }
}
