// src/exec/dispatcher.rs

//! Supervisor side of the control channel.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::DispatcherSection;
use crate::control::ControlVolume;
use crate::errors::{DeployerError, Result};
use crate::framer::{LineGroup, LineStream};
use crate::types::{Command, ExitCode};

/// One item of a dispatched command's output stream.
///
/// A stream is any number of `Lines` followed by exactly one `Finished`.
#[derive(Debug)]
pub enum DispatchEvent {
    Lines(LineGroup),
    /// `Ok` carries the runner's exit code (zero or not); `Err` is a hard
    /// channel fault.
    Finished(Result<ExitCode>),
}

/// Output of a command run through [`Dispatcher::capture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Every line followed by `\n`, byte for byte.
    pub output: Vec<u8>,
    pub code: ExitCode,
}

/// Publishes commands into the queue and collects their output.
///
/// One command is in flight at a time; callers drain the returned stream
/// before dispatching the next command.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    volume: ControlVolume,
    settings: DispatcherSection,
}

impl Dispatcher {
    pub fn new(volume: ControlVolume, settings: DispatcherSection) -> Self {
        Self { volume, settings }
    }

    pub fn volume(&self) -> &ControlVolume {
        &self.volume
    }

    /// Queue `command` and wait for the runner to connect.
    ///
    /// Errors returned here mean the channel was never established. Once
    /// this returns, every outcome arrives through the stream.
    pub async fn dispatch(&self, command: &Command) -> Result<mpsc::Receiver<DispatchEvent>> {
        let name = command.name().to_string();

        if self.volume.status_path(&name).exists() {
            return Err(DeployerError::DuplicateCommand(name));
        }

        let socket_path = self.volume.socket_path(&name);
        let listener = UnixListener::bind(&socket_path).map_err(|source| DeployerError::Bind {
            path: socket_path.clone(),
            source,
        })?;
        let listener = BoundSocket {
            listener,
            path: socket_path,
        };

        let descriptor = command.to_descriptor()?;
        self.volume
            .publish_entry(&name, &descriptor)
            .map_err(|source| DeployerError::Publish {
                name: name.clone(),
                source,
            })?;
        debug!(command = %name, "queued command; waiting for runner to connect");

        let conn = self.accept(&listener, &name).await?;
        info!(command = %name, "runner connected");

        let (tx, rx) = mpsc::channel::<DispatchEvent>(32);
        let status_path = self.volume.status_path(&name);
        let settings = self.settings.clone();
        tokio::spawn(async move {
            drain(name, conn, listener, status_path, settings, tx).await;
        });

        Ok(rx)
    }

    /// Run `command` to completion and return its accumulated output.
    ///
    /// A non-zero exit is part of the result, not an error.
    pub async fn capture(&self, command: &Command) -> Result<CapturedOutput> {
        let mut events = self.dispatch(command).await?;
        let mut output = Vec::new();

        while let Some(event) = events.recv().await {
            match event {
                DispatchEvent::Lines(group) => {
                    for line in group.lines {
                        output.extend_from_slice(&line);
                        output.push(b'\n');
                    }
                }
                DispatchEvent::Finished(result) => {
                    return Ok(CapturedOutput {
                        output,
                        code: result?,
                    });
                }
            }
        }

        Err(closed_without_outcome(command.name()))
    }

    async fn accept(&self, socket: &BoundSocket, name: &str) -> Result<UnixStream> {
        let accepted = match self.settings.accept_timeout() {
            None => socket.listener.accept().await,
            Some(limit) => timeout(limit, socket.listener.accept())
                .await
                .map_err(|_| DeployerError::Timeout {
                    name: name.to_string(),
                    waiting_for: "runner connection",
                    after: limit,
                })?,
        };
        let (stream, _addr) = accepted.map_err(|source| DeployerError::Accept {
            name: name.to_string(),
            source,
        })?;
        Ok(stream)
    }
}

pub(crate) fn closed_without_outcome(name: &str) -> DeployerError {
    DeployerError::Other(anyhow!(
        "output stream for '{name}' closed without an outcome"
    ))
}

/// Listener whose socket file is removed when it goes away.
struct BoundSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl Drop for BoundSocket {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = ?self.path, error = %e, "failed to remove output socket");
            }
        }
    }
}

/// Forward framed output, then resolve the status artifact.
///
/// Owns the connection and the listener; both are closed (and the socket file
/// removed) before the outcome is sent.
async fn drain(
    name: String,
    conn: UnixStream,
    listener: BoundSocket,
    status_path: PathBuf,
    settings: DispatcherSection,
    tx: mpsc::Sender<DispatchEvent>,
) {
    let drained = forward_output(&name, conn, &settings, &tx).await;
    drop(listener);

    let outcome = match drained {
        Drained::ReceiverGone => {
            debug!(command = %name, "output receiver dropped; draining stopped");
            return;
        }
        Drained::Failed(e) => Err(e),
        Drained::Eof => resolve_status(&name, &status_path, &settings).await,
    };

    match &outcome {
        Ok(code) => debug!(command = %name, exit_code = code.0, "command finished"),
        Err(e) => warn!(command = %name, error = %e, "command outcome unavailable"),
    }
    let _ = tx.send(DispatchEvent::Finished(outcome)).await;
}

enum Drained {
    Eof,
    Failed(DeployerError),
    ReceiverGone,
}

async fn forward_output(
    name: &str,
    conn: UnixStream,
    settings: &DispatcherSection,
    tx: &mpsc::Sender<DispatchEvent>,
) -> Drained {
    let mut stream = LineStream::new(conn, settings.read_buffer_size);

    while let Some(group) = stream.next_group().await {
        match group {
            Ok(group) => {
                if tx.send(DispatchEvent::Lines(group)).await.is_err() {
                    return Drained::ReceiverGone;
                }
            }
            Err(source) => {
                return Drained::Failed(DeployerError::Read {
                    name: name.to_string(),
                    source,
                });
            }
        }
    }
    Drained::Eof
}

async fn resolve_status(
    name: &str,
    path: &Path,
    settings: &DispatcherSection,
) -> Result<ExitCode> {
    let interval = settings.status_poll_interval();
    match settings.status_timeout() {
        None => wait_for_file(path, interval).await?,
        Some(limit) => timeout(limit, wait_for_file(path, interval))
            .await
            .map_err(|_| DeployerError::Timeout {
                name: name.to_string(),
                waiting_for: "status artifact",
                after: limit,
            })??,
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DeployerError::StatusRead {
            path: path.to_path_buf(),
            source,
        })?;

    ExitCode::parse(&content).ok_or_else(|| DeployerError::MalformedStatus {
        name: name.to_string(),
        content,
    })
}

async fn wait_for_file(path: &Path, interval: Duration) -> Result<()> {
    loop {
        match tokio::fs::metadata(path).await {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => sleep(interval).await,
            Err(source) => {
                return Err(DeployerError::StatusRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}
