// src/types.rs

//! Value types shared by both sides of the control channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control::SENTINEL;
use crate::errors::{DeployerError, Result};

const SHELL: &str = "/bin/sh";
const STATUS_SUFFIX: &str = ".status";

/// One named unit of work.
///
/// The name doubles as the queue-entry name, the socket name and the status
/// artifact stem, so it is validated to be a plain file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
    shell: bool,
}

impl Command {
    /// A command exec'd directly: `args[0]` is the program.
    pub fn exec(name: impl Into<String>, args: Vec<String>) -> Result<Self> {
        Self::new(name.into(), args, false)
    }

    /// A command whose single token is a shell expression run via `/bin/sh -c`.
    pub fn shell(name: impl Into<String>, expression: impl Into<String>) -> Result<Self> {
        Self::new(name.into(), vec![expression.into()], true)
    }

    fn new(name: String, args: Vec<String>, shell: bool) -> Result<Self> {
        validate_name(&name)?;
        if args.first().is_none_or(|program| program.is_empty()) {
            return Err(DeployerError::InvalidCommand(format!(
                "command '{name}' has no program"
            )));
        }
        Ok(Self { name, args, shell })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shell(&self) -> bool {
        self.shell
    }

    /// The argument vector the runner executes.
    pub fn argv(&self) -> Vec<String> {
        if self.shell {
            vec![SHELL.to_string(), "-c".to_string(), self.args[0].clone()]
        } else {
            self.args.clone()
        }
    }

    /// The queue-entry body: a JSON array of argument tokens.
    pub fn to_descriptor(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&Descriptor(self.argv()))?)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') || name.contains('\0') {
        Some("name must be a plain file name")
    } else if name.starts_with('.') {
        Some("name must not start with '.'")
    } else if name == SENTINEL {
        Some("name is reserved")
    } else if name.ends_with(STATUS_SUFFIX) {
        Some("name must not end with '.status'")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(DeployerError::InvalidCommand(format!("{problem}: {name:?}"))),
        None => Ok(()),
    }
}

/// Wire form of a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(pub Vec<String>);

/// Exit code of a finished command, as carried by the status artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Parse the contents of a status artifact. Surrounding whitespace is
    /// tolerated; anything else outside `0..=255` is not.
    pub fn parse(content: &str) -> Option<Self> {
        content.trim().parse::<u8>().ok().map(ExitCode)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
