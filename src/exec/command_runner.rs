// src/exec/command_runner.rs

//! Execution of a single queue entry.

use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use tokio::net::UnixStream;
use tokio::process::Command;
use tracing::info;

use crate::control::ControlVolume;
use crate::types::Descriptor;

/// Consume the queue entry `name`, run it with its output wired to the
/// matching socket, and publish the exit code.
///
/// Returns the exit code. A non-zero exit is not an error; everything else
/// that goes wrong is.
pub async fn run_entry(volume: &ControlVolume, name: &str) -> Result<u8> {
    let entry = volume.queue_entry(name);
    let body = tokio::fs::read(&entry)
        .await
        .with_context(|| format!("reading command '{name}'"))?;
    let Descriptor(argv) = serde_json::from_slice(&body)
        .with_context(|| format!("decoding command '{name}'"))?;

    // Consumed before connecting: a crash past this point loses the command.
    tokio::fs::remove_file(&entry)
        .await
        .with_context(|| format!("removing command '{name}'"))?;

    let Some((program, args)) = argv.split_first() else {
        bail!("command '{name}' has an empty argument list");
    };

    let workdir = volume.workdir();
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(&workdir).stdin(Stdio::null());

    let socket = volume.socket_path(name);
    let conn = UnixStream::connect(&socket)
        .await
        .with_context(|| format!("connecting to {socket:?}"))?;
    info!(command = %name, socket = ?socket, "connected to output socket");

    let (stdout, stderr) = socket_as_stdio(conn)
        .with_context(|| format!("preparing output socket for '{name}'"))?;
    cmd.stdout(stdout).stderr(stderr);

    info!(command = %name, program = %program, workdir = ?workdir, "starting command");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("starting command '{name}'"))?;
    // Release our copies of the socket so the supervisor sees end-of-stream
    // as soon as the child exits.
    drop(cmd);

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for command '{name}'"))?;
    let code = exit_code(status);
    info!(command = %name, exit_code = code, "command exited");

    volume
        .write_status(name, code)
        .with_context(|| format!("writing status for '{name}'"))?;

    Ok(code)
}

/// Both standard streams of the child write to the same blocking socket.
fn socket_as_stdio(conn: UnixStream) -> std::io::Result<(Stdio, Stdio)> {
    let conn = conn.into_std()?;
    conn.set_nonblocking(false)?;
    let stdout = OwnedFd::from(conn);
    let stderr = stdout.try_clone()?;
    Ok((Stdio::from(stdout), Stdio::from(stderr)))
}

/// Exit code in `0..=255`; death by signal reports `128 + signal`.
fn exit_code(status: ExitStatus) -> u8 {
    match (status.code(), status.signal()) {
        (Some(code), _) => (code & 0xff) as u8,
        (None, Some(signal)) => (128 + signal).clamp(0, 255) as u8,
        (None, None) => u8::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_exits_map_above_128() {
        // Raw wait status: terminated by SIGKILL (9).
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        // Raw wait status: exited with 37.
        assert_eq!(exit_code(ExitStatus::from_raw(37 << 8)), 37);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
    }
}
