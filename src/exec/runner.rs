// src/exec/runner.rs

//! Runner side of the control channel: the queue polling loop.

use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::control::{ControlVolume, SENTINEL};
use crate::exec::command_runner::run_entry;

/// Polls the queue and executes entries one at a time, in name order.
///
/// Every error returned from [`Runner::run`] is fatal: the queue entry that
/// caused it has already been consumed and is not retried.
#[derive(Debug, Clone)]
pub struct Runner {
    volume: ControlVolume,
    poll_interval: Duration,
}

impl Runner {
    pub fn new(volume: ControlVolume, poll_interval: Duration) -> Self {
        Self {
            volume,
            poll_interval,
        }
    }

    /// Run until the sentinel entry is observed.
    pub async fn run(&self) -> Result<()> {
        info!(root = ?self.volume.root(), "runner started");

        loop {
            sleep(self.poll_interval).await;

            let entries = match self.volume.queue_entries() {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("queue directory not present yet");
                    continue;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        queue = ?self.volume.commands_dir(),
                        "failed to list queue; retrying"
                    );
                    continue;
                }
            };

            for name in entries {
                if name == SENTINEL {
                    info!("sentinel observed; runner stopping");
                    return Ok(());
                }
                run_entry(&self.volume, &name).await?;
            }
        }
    }
}
