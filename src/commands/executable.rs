use crate::commands::CommandError;
use crate::frame::Frame;

pub trait Executable {
    /// Runs the command. `Ok(None)` means nothing is written back to the client.
    fn exec(self) -> Result<Option<Frame>, CommandError>;
}
