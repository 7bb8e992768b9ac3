//! Project discovery and the fixed layout under a project root.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::lockfile::LOCKFILE_NAME;
use crate::manifest::MANIFEST_FILE;

pub const MISSING_PROJECT_MESSAGE: &str = "No bx project found.";
pub const MISSING_PROJECT_HINT: &str = "Run `bx init` in your project directory first.";

/// Paths of every file `bx` owns inside a project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub lockfile: PathBuf,
    pub state_dir: PathBuf,
    pub state_file: PathBuf,
    pub lock_guard: PathBuf,
    pub profile: PathBuf,
    pub virtenv: PathBuf,
    pub wrappers_bin: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".bx");
        let virtenv = state_dir.join("virtenv");
        Self {
            manifest: root.join(MANIFEST_FILE),
            lockfile: root.join(LOCKFILE_NAME),
            state_file: state_dir.join("state.json"),
            lock_guard: state_dir.join("project.lock"),
            profile: state_dir.join("nix").join("profile"),
            wrappers_bin: virtenv.join(".wrappers").join("bin"),
            virtenv,
            state_dir,
            root,
        }
    }

    /// State directory for one plugin.
    pub fn plugin_dir(&self, plugin: &str) -> PathBuf {
        self.virtenv.join(plugin)
    }
}

pub fn discover_project_root() -> Result<Option<PathBuf>> {
    let dir = env::current_dir().context("unable to determine project root")?;
    Ok(discover_project_root_from(&dir))
}

/// Walks up from `start` to the first directory holding `bx.toml`.
pub fn discover_project_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MANIFEST_FILE).is_file())
        .map(Path::to_path_buf)
}

pub fn current_project_root() -> Result<PathBuf> {
    discover_project_root()?
        .ok_or_else(|| anyhow!("{MISSING_PROJECT_MESSAGE} {MISSING_PROJECT_HINT}"))
}
