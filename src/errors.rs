// src/errors.rs

//! Crate-wide error type for the supervisor side.
//!
//! The runner side treats every unexpected failure as fatal and uses plain
//! `anyhow` with context instead (see [`crate::exec::runner`]).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid inputs: {0}")]
    Inputs(String),

    #[error("{0}")]
    StateMismatch(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("command '{0}' was already dispatched in this run")]
    DuplicateCommand(String),

    #[error("failed to listen on {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish command '{name}': {source}")]
    Publish {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection for '{name}': {source}")]
    Accept {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read status {path:?}: {source}")]
    StatusRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse status for '{name}': {content:?}")]
    MalformedStatus { name: String, content: String },

    #[error("timed out after {after:?} waiting for {waiting_for} of '{name}'")]
    Timeout {
        name: String,
        waiting_for: &'static str,
        after: Duration,
    },

    #[error("non-zero status: {code}")]
    StepFailed { name: String, code: u8 },

    #[error("unexpected client error status code from log endpoint ({endpoint}): {status}")]
    LogRejected { endpoint: String, status: u16 },

    #[error("log endpoint protocol error: {0}")]
    LogProtocol(String),

    #[error("interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DeployerError>;
