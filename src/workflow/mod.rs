// src/workflow/mod.rs

//! The deployment itself: the ordered Terraform steps, run through the
//! dispatcher, with output forwarded by the log relay.
//!
//! - `terraform.rs`: argument vectors for each step.
//! - `collaborators.rs`: release and state boundaries.

pub mod collaborators;
pub mod terraform;

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{Inputs, Operation, Settings};
use crate::control::ControlVolume;
use crate::errors::{DeployerError, Result};
use crate::exec::{DispatchEvent, Dispatcher};
use crate::exec::dispatcher::closed_without_outcome;
use crate::relay::{LogRelay, LogTransport};
use crate::types::Command;

pub use collaborators::{ArchiveRelease, FixedState, LocalRelease, ReleaseSource, StateProbe};

/// One deployment run against a control volume.
pub struct Deployer<T: LogTransport> {
    inputs: Inputs,
    terraform: String,
    dispatcher: Dispatcher,
    relay: LogRelay<T>,
    release: Box<dyn ReleaseSource>,
    state: Box<dyn StateProbe>,
    runner_binary: Option<PathBuf>,
    issued: usize,
}

impl<T: LogTransport> Deployer<T> {
    pub fn new(
        inputs: Inputs,
        settings: &Settings,
        transport: T,
        release: Box<dyn ReleaseSource>,
        state: Box<dyn StateProbe>,
    ) -> Self {
        let volume = ControlVolume::new(&settings.control.root, &settings.control.workdir);
        let relay = LogRelay::new(transport, inputs.log_url.clone(), &settings.relay);
        Self {
            terraform: settings.terraform.binary.clone(),
            dispatcher: Dispatcher::new(volume, settings.dispatcher.clone()),
            relay,
            release,
            state,
            runner_binary: settings.runner.binary.clone(),
            inputs,
            issued: 0,
        }
    }

    /// Install this executable instead of the running one as the runner.
    pub fn with_runner_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.runner_binary = Some(path.into());
        self
    }

    pub fn volume(&self) -> &ControlVolume {
        self.dispatcher.volume()
    }

    /// Run every step, then tell the runner to stop whatever the result.
    pub async fn run(&mut self) -> Result<()> {
        self.prepare_volume()?;

        let result = self.run_steps().await;

        if let Err(e) = self.volume().mark_complete() {
            warn!(error = %e, "failed to mark done");
        }
        result
    }

    fn prepare_volume(&self) -> Result<()> {
        let volume = self.volume();
        volume
            .reset()
            .with_context(|| format!("failed to reset control volume {:?}", volume.root()))?;

        let binary = match &self.runner_binary {
            Some(path) => path.clone(),
            None => std::env::current_exe().context("failed to locate runner executable")?,
        };
        volume
            .install_runner(&binary)
            .with_context(|| format!("failed to install runner from {binary:?}"))?;
        info!(runner = ?volume.runner_path(), "control volume ready");
        Ok(())
    }

    async fn run_steps(&mut self) -> Result<()> {
        let release_dir = self.volume().release_dir();
        self.release
            .fetch(&self.inputs, &release_dir)
            .await
            .context("failed to download terraform release")?;

        self.terraform_init().await?;
        self.write_tfvars()?;

        let terraform = self.terraform.clone();
        match self.inputs.operation {
            Operation::Init => {}
            Operation::Plan => {
                let args = terraform::plan_args(&terraform, None);
                self.stream_command("terraform-plan", args).await?;
            }
            Operation::Apply => {
                let args = terraform::plan_args(&terraform, Some(terraform::PLAN_FILE));
                self.stream_command("terraform-plan", args).await?;
                let args = terraform::apply_args(&terraform, terraform::PLAN_FILE);
                self.stream_command("terraform-apply", args).await?;
            }
        }

        self.relay.finish(vec!["done".to_string()]).await
    }

    async fn terraform_init(&mut self) -> Result<()> {
        let exists = self
            .state
            .state_exists(&self.inputs)
            .await
            .context("failed to check terraform state")?;
        let location = self.inputs.state_location();
        match exists {
            Some(true) if self.inputs.new_state => {
                return Err(DeployerError::StateMismatch(format!(
                    "expected to create new terraform state, but state already exists ({location})"
                )));
            }
            Some(false) if !self.inputs.new_state => {
                return Err(DeployerError::StateMismatch(format!(
                    "expected to use existing terraform state, but state does not exist ({location})"
                )));
            }
            Some(_) => {}
            None => info!(%location, "state existence unknown; skipping check"),
        }

        let args = terraform::init_args(&self.terraform, &self.inputs);
        self.stream_command("terraform-init", args).await?;

        let expr = terraform::select_workspace_expr(&self.terraform, &self.inputs.workspace);
        let name = self.next_name("select-workspace");
        let command = Command::shell(name, expr)?;
        self.stream(command).await
    }

    fn write_tfvars(&self) -> Result<()> {
        let path = self.volume().workdir().join(terraform::TFVARS_FILE);
        let json = serde_json::to_vec(&self.inputs.tf_vars)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write tfvars to {path:?}"))?;
        Ok(())
    }

    /// Names are prefixed with their issue order so the runner's name order
    /// matches it.
    fn next_name(&mut self, step: &str) -> String {
        self.issued += 1;
        format!("{:02}-{step}", self.issued)
    }

    async fn stream_command(&mut self, step: &str, args: Vec<String>) -> Result<()> {
        let name = self.next_name(step);
        let command = Command::exec(name, args)?;
        self.stream(command).await
    }

    /// Dispatch `command` and relay its output as it arrives.
    async fn stream(&mut self, command: Command) -> Result<()> {
        info!(command = %command.name(), "running command: {command}");

        let mut events = self.dispatcher.dispatch(&command).await?;
        while let Some(event) = events.recv().await {
            match event {
                DispatchEvent::Lines(group) => self.relay.relay_lines(&group).await?,
                DispatchEvent::Finished(Ok(code)) if code.is_success() => return Ok(()),
                DispatchEvent::Finished(Ok(code)) => {
                    let failure = DeployerError::StepFailed {
                        name: command.name().to_string(),
                        code: code.0,
                    };
                    return Err(self.relay.relay_failure(failure).await);
                }
                DispatchEvent::Finished(Err(e)) => {
                    return Err(self.relay.relay_failure(e).await);
                }
            }
        }
        Err(closed_without_outcome(command.name()))
    }
}
