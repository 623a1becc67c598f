// src/exec/mod.rs

//! Command execution across the control volume.
//!
//! - [`dispatcher`] is the supervisor side: queue a command, accept the
//!   runner's connection, stream framed output, resolve the exit status.
//! - [`runner`] is the executor side's polling loop.
//! - [`command_runner`] runs one queue entry with its output wired to the
//!   per-command socket.

pub mod command_runner;
pub mod dispatcher;
pub mod runner;

pub use dispatcher::{CapturedOutput, DispatchEvent, Dispatcher};
pub use runner::Runner;
