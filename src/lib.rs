// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod exec;
pub mod framer;
pub mod logging;
pub mod relay;
pub mod types;
pub mod workflow;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::{CliArgs, CliCommand, DeployArgs};
use crate::config::{Inputs, Settings};
use crate::control::ControlVolume;
use crate::errors::DeployerError;
use crate::exec::Runner;
use crate::relay::HttpTransport;
use crate::workflow::{ArchiveRelease, Deployer, FixedState, LocalRelease, ReleaseSource};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = config::resolve(args.config.as_deref())?;

    match args.command {
        CliCommand::Deploy(deploy) => run_deploy(deploy, &settings).await?,
        CliCommand::Run => run_runner(&settings).await?,
    }
    Ok(())
}

/// Supervisor side: run the deployment workflow.
///
/// Ctrl-C still queues the sentinel so the runner does not poll forever.
pub async fn run_deploy(args: DeployArgs, settings: &Settings) -> errors::Result<()> {
    let inputs = Inputs::parse(&args.params)?;
    let transport = HttpTransport::new(settings.relay.request_timeout())?;

    let mut deployer = Deployer::new(
        inputs,
        settings,
        transport,
        release_source(&args)?,
        Box::new(FixedState(args.state_exists)),
    );
    let volume = deployer.volume().clone();

    tokio::select! {
        result = deployer.run() => {
            if result.is_ok() {
                info!("deployment finished");
            }
            result
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupted; telling the runner to stop");
            if let Err(e) = volume.mark_complete() {
                warn!(error = %e, "failed to mark done");
            }
            Err(DeployerError::Interrupted)
        }
    }
}

fn release_source(args: &DeployArgs) -> errors::Result<Box<dyn ReleaseSource>> {
    match (&args.release_archive, &args.release_dir) {
        (Some(archive), _) => Ok(Box::new(ArchiveRelease::new(archive))),
        (None, Some(dir)) => Ok(Box::new(LocalRelease::new(dir))),
        (None, None) => Err(DeployerError::Inputs(
            "one of --release-dir or --release-archive is required".to_string(),
        )),
    }
}

/// Executor side: poll the queue until the sentinel appears.
pub async fn run_runner(settings: &Settings) -> Result<()> {
    let volume = ControlVolume::new(&settings.control.root, &settings.control.workdir);
    Runner::new(volume, settings.runner.poll_interval()).run().await
}
