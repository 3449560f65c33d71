//! Virtual board error types.

use rocwire_domain::command::Module;

/// Errors raised by the simulated board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VirtualBoardError {
    /// A failure queued with [`VirtualBoard::fail_next`](crate::VirtualBoard::fail_next).
    #[error("injected failure: {0}")]
    Injected(String),

    /// A write targeted a register the board treats as read-only.
    #[error("register {address:#06x} of {module:?} is read-only")]
    ReadOnly { module: Module, address: u16 },
}
