// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Settings as read from a TOML file, before validation.
///
/// ```toml
/// [control]
/// root = "/control"
/// workdir = "terraform"
///
/// [runner]
/// poll_interval_ms = 100
///
/// [dispatcher]
/// status_poll_interval_ms = 1000
/// accept_timeout_ms = 600000
///
/// [relay]
/// initial_backoff_ms = 100
/// max_backoff_ms = 5000
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    #[serde(default)]
    pub control: ControlSection,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub dispatcher: DispatcherSection,

    #[serde(default)]
    pub relay: RelaySection,

    #[serde(default)]
    pub terraform: TerraformSection,
}

/// Validated settings. Only obtainable through `Settings::try_from(raw)` or
/// `Settings::default()`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub control: ControlSection,
    pub runner: RunnerSection,
    pub dispatcher: DispatcherSection,
    pub relay: RelaySection,
    pub terraform: TerraformSection,
}

impl Settings {
    pub(crate) fn new_unchecked(raw: RawSettings) -> Self {
        Self {
            control: raw.control,
            runner: raw.runner,
            dispatcher: raw.dispatcher,
            relay: raw.relay,
            terraform: raw.terraform,
        }
    }

    /// Same settings rooted at a different control volume.
    pub fn with_control_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.control.root = root.into();
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new_unchecked(RawSettings::default())
    }
}

/// `[control]` section: where the shared volume lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSection {
    #[serde(default = "default_control_root")]
    pub root: PathBuf,

    /// Directory inside `release/` that commands run in.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

fn default_control_root() -> PathBuf {
    PathBuf::from("/control")
}

fn default_workdir() -> PathBuf {
    PathBuf::from("terraform")
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            root: default_control_root(),
            workdir: default_workdir(),
        }
    }
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    #[serde(default = "default_runner_poll_ms")]
    pub poll_interval_ms: u64,

    /// Executable installed into the volume as `run`.
    ///
    /// Defaults to the currently running binary, which carries the `run`
    /// subcommand.
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

fn default_runner_poll_ms() -> u64 {
    100
}

impl RunnerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_runner_poll_ms(),
            binary: None,
        }
    }
}

/// `[dispatcher]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherSection {
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_interval_ms: u64,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Give up waiting for the runner to connect after this long.
    /// Unset means wait forever.
    #[serde(default)]
    pub accept_timeout_ms: Option<u64>,

    /// Give up waiting for the status artifact after this long.
    /// Unset means wait forever.
    #[serde(default)]
    pub status_timeout_ms: Option<u64>,
}

fn default_status_poll_ms() -> u64 {
    1000
}

fn default_read_buffer_size() -> usize {
    5 * 1024
}

impl DispatcherSection {
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn accept_timeout(&self) -> Option<Duration> {
        self.accept_timeout_ms.map(Duration::from_millis)
    }

    pub fn status_timeout(&self) -> Option<Duration> {
        self.status_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            status_poll_interval_ms: default_status_poll_ms(),
            read_buffer_size: default_read_buffer_size(),
            accept_timeout_ms: None,
            status_timeout_ms: None,
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout for the HTTP client. A timed out request counts as
    /// a transport failure and is retried.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl RelaySection {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// `[terraform]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformSection {
    /// Program name or path resolved by the runner.
    #[serde(default = "default_terraform_binary")]
    pub binary: String,
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

impl Default for TerraformSection {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
        }
    }
}
