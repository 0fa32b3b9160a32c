//! Subcommand implementations.

pub mod reset;
pub mod status;
pub mod watch;
