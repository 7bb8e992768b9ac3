use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;

use anyhow::{Context, Result};
use bx_domain::ProjectPaths;
use fs4::FileExt;

/// Exclusive advisory lock on `.bx/project.lock`, held for the lifetime of
/// one mutating command.
#[derive(Debug)]
pub(crate) struct ProjectLock {
    _file: File,
}

impl ProjectLock {
    /// `Ok(None)` when another process holds the lock.
    pub(crate) fn try_acquire(paths: &ProjectPaths) -> Result<Option<Self>> {
        let path = &paths.lock_guard;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            #[cfg(windows)]
            Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
