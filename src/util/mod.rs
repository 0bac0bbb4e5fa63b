//! Small helpers shared across modules.

pub mod command;
pub mod wait;

pub use command::run_command;
pub use wait::{poll_immediate, Attempt};
