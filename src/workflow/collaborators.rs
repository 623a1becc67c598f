// src/workflow/collaborators.rs

//! Boundaries to the outside world the workflow depends on but the control
//! channel never inspects.

use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, bail};
use tracing::debug;

use crate::config::Inputs;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Puts the unpacked release payload into `dest` (the volume's `release/`).
pub trait ReleaseSource: Send + Sync {
    fn fetch<'a>(&'a self, inputs: &'a Inputs, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Tells whether Terraform state already exists for the inputs.
///
/// `None` means unknown, which skips the new/existing state check.
pub trait StateProbe: Send + Sync {
    fn state_exists<'a>(&'a self, inputs: &'a Inputs) -> BoxFuture<'a, anyhow::Result<Option<bool>>>;
}

/// Release already unpacked into a local directory; copied into place.
#[derive(Debug, Clone)]
pub struct LocalRelease {
    source: PathBuf,
}

impl LocalRelease {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ReleaseSource for LocalRelease {
    fn fetch<'a>(&'a self, inputs: &'a Inputs, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
        let source = self.source.clone();
        let dest = dest.to_path_buf();
        debug!(release_key = %inputs.release_key, ?source, "copying local release");
        Box::pin(async move {
            tokio::task::spawn_blocking(move || copy_tree(&source, &dest))
                .await
                .context("release copy task panicked")?
                .context("copying release")
        })
    }
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Release shipped as a zip archive; unpacked into place.
#[derive(Debug, Clone)]
pub struct ArchiveRelease {
    archive: PathBuf,
}

impl ArchiveRelease {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
        }
    }
}

impl ReleaseSource for ArchiveRelease {
    fn fetch<'a>(&'a self, inputs: &'a Inputs, dest: &'a Path) -> BoxFuture<'a, anyhow::Result<()>> {
        let archive = self.archive.clone();
        let dest = dest.to_path_buf();
        debug!(release_key = %inputs.release_key, ?archive, "unpacking release archive");
        Box::pin(async move {
            tokio::task::spawn_blocking(move || unzip(&archive, &dest))
                .await
                .context("release unpack task panicked")?
        })
    }
}

/// Extract every entry of `archive` under `dest`, keeping unix mode bits.
fn unzip(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(archive).with_context(|| format!("opening {archive:?}"))?;
    let mut zip = zip::ZipArchive::new(file).with_context(|| format!("reading {archive:?}"))?;

    for index in 0..zip.len() {
        let mut item = zip.by_index(index)?;
        let Some(relative) = item.enclosed_name() else {
            bail!("archive entry {:?} points outside the release", item.name());
        };
        let target = dest.join(relative);

        if item.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&target)
                .with_context(|| format!("creating {target:?}"))?;
            io::copy(&mut item, &mut out)?;
        }

        if let Some(mode) = item.unix_mode() {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    Ok(())
}

/// State existence known up front (or not at all).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedState(pub Option<bool>);

impl StateProbe for FixedState {
    fn state_exists<'a>(&'a self, _inputs: &'a Inputs) -> BoxFuture<'a, anyhow::Result<Option<bool>>> {
        let known = self.0;
        Box::pin(async move { Ok(known) })
    }
}
