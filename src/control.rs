// src/control.rs

//! Layout and lifecycle of the shared control volume.
//!
//! ```text
//! <root>/commands/<name>        queue entry (JSON argv), deleted by the runner
//! <root>/commands/done          sentinel: the runner stops polling
//! <root>/output/<name>          unix socket, supervisor listens
//! <root>/output/<name>.status   exit code, written by the runner
//! <root>/release/<workdir>/     unpacked release, commands run here
//! <root>/run                    runner executable
//! <root>/done                   completion marker
//! ```
//!
//! Hand-off is by file presence only. Every file another process may observe
//! is written under a temporary name and renamed into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Reserved queue-entry name that tells the runner to stop.
pub const SENTINEL: &str = "done";

const COMMANDS_DIR: &str = "commands";
const OUTPUT_DIR: &str = "output";
const RELEASE_DIR: &str = "release";
const RUNNER_FILE: &str = "run";
const COMPLETION_MARKER: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlVolume {
    root: PathBuf,
    workdir: PathBuf,
}

impl ControlVolume {
    /// `workdir` is relative to the release directory.
    pub fn new(root: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: workdir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.root.join(COMMANDS_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn release_dir(&self) -> PathBuf {
        self.root.join(RELEASE_DIR)
    }

    /// Working directory for every command.
    pub fn workdir(&self) -> PathBuf {
        self.release_dir().join(&self.workdir)
    }

    pub fn runner_path(&self) -> PathBuf {
        self.root.join(RUNNER_FILE)
    }

    pub fn completion_marker(&self) -> PathBuf {
        self.root.join(COMPLETION_MARKER)
    }

    pub fn queue_entry(&self, name: &str) -> PathBuf {
        self.commands_dir().join(name)
    }

    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    pub fn status_path(&self, name: &str) -> PathBuf {
        self.output_dir().join(format!("{name}.status"))
    }

    /// Wipe every region and recreate the empty layout.
    pub fn reset(&self) -> io::Result<()> {
        for dir in [self.commands_dir(), self.output_dir(), self.release_dir()] {
            remove_dir_if_present(&dir)?;
        }
        for file in [self.runner_path(), self.completion_marker()] {
            remove_file_if_present(&file)?;
        }
        fs::create_dir_all(self.commands_dir())?;
        fs::create_dir_all(self.output_dir())?;
        fs::create_dir_all(self.release_dir())?;
        Ok(())
    }

    /// Copy the runner executable into the volume and mark it executable.
    pub fn install_runner(&self, source: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let target = self.runner_path();
        fs::copy(source, &target)?;
        let mut perms = fs::metadata(&target)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(&target, perms)
    }

    /// Make a queue entry visible to the runner, fully written.
    pub fn publish_entry(&self, name: &str, body: &[u8]) -> io::Result<()> {
        // Staged outside `commands/` so the runner never lists it half-written.
        let staging = self.root.join(format!(".{name}.pending"));
        write_then_rename(&staging, &self.queue_entry(name), body)
    }

    /// Queue the sentinel and create the completion marker.
    pub fn mark_complete(&self) -> io::Result<()> {
        self.publish_entry(SENTINEL, b"")?;
        fs::File::create(self.completion_marker())?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.completion_marker().exists()
    }

    /// Queue entry names in lexicographic order.
    pub fn queue_entries(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.commands_dir())? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    pub fn write_status(&self, name: &str, code: u8) -> io::Result<()> {
        let staging = self.output_dir().join(format!(".{name}.status.pending"));
        write_then_rename(&staging, &self.status_path(name), code.to_string().as_bytes())
    }
}

fn write_then_rename(staging: &Path, target: &Path, body: &[u8]) -> io::Result<()> {
    fs::write(staging, body)?;
    fs::rename(staging, target)
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn volume() -> (TempDir, ControlVolume) {
        let dir = TempDir::new().unwrap();
        let volume = ControlVolume::new(dir.path(), "terraform");
        volume.reset().unwrap();
        (dir, volume)
    }

    #[test]
    fn reset_wipes_previous_run() {
        let (_dir, volume) = volume();
        volume.publish_entry("old", b"[]").unwrap();
        volume.write_status("old", 1).unwrap();
        volume.mark_complete().unwrap();

        volume.reset().unwrap();

        assert!(volume.queue_entries().unwrap().is_empty());
        assert!(!volume.status_path("old").exists());
        assert!(!volume.is_complete());
        assert!(volume.release_dir().is_dir());
    }

    #[test]
    fn queue_entries_are_sorted_and_staging_is_invisible() {
        let (_dir, volume) = volume();
        volume.publish_entry("b", b"[]").unwrap();
        volume.publish_entry("a", b"[]").unwrap();
        volume.publish_entry("c", b"[]").unwrap();

        assert_eq!(volume.queue_entries().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(fs::read(volume.queue_entry("a")).unwrap(), b"[]");
    }

    #[test]
    fn mark_complete_queues_sentinel_and_marker() {
        let (_dir, volume) = volume();
        volume.mark_complete().unwrap();
        assert!(volume.is_complete());
        assert_eq!(volume.queue_entries().unwrap(), vec![SENTINEL]);
    }

    #[test]
    fn status_is_written_as_decimal() {
        let (_dir, volume) = volume();
        volume.write_status("x", 37).unwrap();
        assert_eq!(fs::read_to_string(volume.status_path("x")).unwrap(), "37");
    }

    #[test]
    fn installed_runner_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, volume) = volume();
        let source = dir.path().join("bin");
        fs::write(&source, b"#!/bin/sh\n").unwrap();
        volume.install_runner(&source).unwrap();

        let mode = fs::metadata(volume.runner_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
