//! Client side of the plugin.
//!
//! - Connects to the host over Socket.IO and serves input lines
//! - Or runs an offline REPL that prints the events it would send

pub mod repl;
pub mod socket;

pub use repl::run_repl;
pub use socket::{run, ConnectOptions};
