//! Hardware link port — the exclusive, blocking connection to the board.
//!
//! Exactly one worker owns the link; every command and every event poll
//! goes through it in order.

use rocwire_domain::command::{Command, Reply};
use rocwire_domain::event::RawEvent;

/// Boxed error raised by a link implementation.
pub type LinkError = Box<dyn std::error::Error + Send + Sync>;

/// A synchronous connection to a control board.
///
/// Implementations may block. They are moved onto the dispatcher's worker
/// thread and never touched from anywhere else.
pub trait HardwareLink: Send + 'static {
    /// Execute one command and return the board's reply.
    ///
    /// # Errors
    ///
    /// Returns the link's own error when the board could not be reached or
    /// rejected the command.
    fn execute(&mut self, command: &Command) -> Result<Reply, LinkError>;

    /// Drain the events the board queued since the last poll.
    ///
    /// # Errors
    ///
    /// Returns the link's own error when the board could not be reached.
    fn poll_events(&mut self) -> Result<Vec<RawEvent>, LinkError>;
}
