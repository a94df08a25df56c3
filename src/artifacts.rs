//! Backup-then-replace writes for generated artifacts.
//!
//! Content is fully written to a temp file next to the destination before the
//! destination is touched; the previous version (if any) is copied to
//! `<path>.bak.<run-stamp>` and the temp file is renamed into place. A backup
//! name that already exists on disk is never overwritten: a numeric suffix
//! (`.1`, `.2`, ...) is added instead.
use crate::stack::ArtifactOutcome;
use anyhow::{anyhow, Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes rendered artifacts for one run, sharing one backup suffix.
#[derive(Debug)]
pub struct ArtifactWriter {
    run_stamp: String,
    /// Backups taken by this writer, keyed by destination.
    backups: RefCell<HashMap<PathBuf, PathBuf>>,
}

impl ArtifactWriter {
    pub fn new(run_stamp: &str) -> Self {
        Self {
            run_stamp: run_stamp.to_string(),
            backups: RefCell::new(HashMap::new()),
        }
    }

    /// First unused `<path>.bak.<stamp>[.<n>]` name.
    fn free_backup_path(&self, path: &Path) -> PathBuf {
        let mut base = path.as_os_str().to_os_string();
        base.push(format!(".bak.{}", self.run_stamp));
        let mut candidate = PathBuf::from(&base);
        let mut n = 1u32;
        while candidate.symlink_metadata().is_ok() {
            let mut numbered = base.clone();
            numbered.push(format!(".{n}"));
            candidate = PathBuf::from(numbered);
            n += 1;
        }
        candidate
    }

    /// Replace `path` with `content`, backing up any previous version first.
    ///
    /// A second write of the same path through this writer keeps the first
    /// backup, which holds the pre-run content.
    pub fn write_artifact(&self, path: &Path, content: &str, mode: u32) -> Result<ArtifactOutcome> {
        let staged = stage(path, content.as_bytes(), mode)?;

        let outcome = if path.exists() {
            let existing = self.backups.borrow().get(path).cloned();
            let backup = match existing {
                Some(backup) => backup,
                None => {
                    let backup = self.free_backup_path(path);
                    fs::copy(path, &backup).with_context(|| {
                        format!("back up {} to {}", path.display(), backup.display())
                    })?;
                    self.backups
                        .borrow_mut()
                        .insert(path.to_path_buf(), backup.clone());
                    backup
                }
            };
            ArtifactOutcome::Replaced { backup }
        } else {
            ArtifactOutcome::Created
        };

        staged
            .persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("publish {}", path.display()))?;
        match &outcome {
            ArtifactOutcome::Created => tracing::info!(path = %path.display(), "artifact created"),
            ArtifactOutcome::Replaced { backup } => tracing::info!(
                path = %path.display(),
                backup = %backup.display(),
                "artifact replaced"
            ),
        }
        Ok(outcome)
    }
}

/// Write `bytes` to `path` via temp file and rename, with `mode` applied
/// before the file becomes visible.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let staged = stage(path, bytes, mode)?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

fn stage(path: &Path, bytes: &[u8], mode: u32) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    staged
        .as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .with_context(|| format!("set mode on staged {}", path.display()))?;
    staged
        .write_all(bytes)
        .with_context(|| format!("write staged {}", path.display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("sync staged {}", path.display()))?;
    Ok(staged)
}
