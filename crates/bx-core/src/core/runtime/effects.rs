use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bx_domain::{LockedPackage, PackageReference, ProjectPaths};

use super::process::{run_command, run_command_exact_env, RunOutput};
use crate::config::Config;
use crate::core::plugin::BuiltinPlugins;
use crate::core::store::{NixProfileStore, ProfileItem};

/// The mutable package store a project's profile lives in.
///
/// Every call is a blocking external operation. Implementations never retry.
pub trait PackageStore: Send + Sync {
    /// Items currently in the profile. A profile that does not exist yet is
    /// empty, not an error.
    fn list(&self, profile: &Path) -> Result<Vec<ProfileItem>>;
    fn install(&self, profile: &Path, installable: &str) -> Result<()>;
    /// Removes `item` from the profile. `item` must come from the most recent
    /// `list` of the same profile.
    fn remove_by_index(&self, profile: &Path, item: &ProfileItem) -> Result<()>;
    /// Pins `reference`; `Ok(None)` when the store knows no such package.
    fn resolve(&self, reference: &PackageReference) -> Result<Option<LockedPackage>>;
    /// Fetches the source of `installable` ahead of installing it.
    fn prefetch(&self, installable: &str) -> Result<()>;
}

/// Plugin hooks the engine calls around package changes.
pub trait PluginNotifier: Send + Sync {
    /// Called after any install or removal; failures fail the command.
    fn on_packages_changed(&self, paths: &ProjectPaths, declared: &[PackageReference])
        -> Result<()>;
    /// Drops plugin state for packages leaving the project.
    fn remove(&self, paths: &ProjectPaths, packages: &[PackageReference]) -> Result<()>;
    /// Readme to show once `package` has been added, if it has a plugin.
    fn print_readme(&self, package: &PackageReference) -> Option<String>;
}

pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput>;
    /// Runs with exactly `envs` as the child environment.
    fn run_exact_env(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn read_link(&self, path: &Path) -> Result<PathBuf>;
}

pub trait Effects: Send + Sync {
    fn fs(&self) -> &dyn FileSystem;
    fn store(&self) -> &dyn PackageStore;
    fn plugins(&self) -> &dyn PluginNotifier;
    fn processes(&self) -> &dyn ProcessRunner;
}

pub struct SystemEffects {
    fs: Arc<SystemFileSystem>,
    store: Arc<NixProfileStore>,
    plugins: Arc<BuiltinPlugins>,
    processes: Arc<SystemProcessRunner>,
}

impl SystemEffects {
    pub fn new(config: &Config) -> Self {
        let processes = Arc::new(SystemProcessRunner);
        Self {
            fs: Arc::new(SystemFileSystem),
            store: Arc::new(NixProfileStore::new(
                config.tools().nix.clone(),
                config.store().platform.clone(),
                processes.clone(),
            )),
            plugins: Arc::new(BuiltinPlugins),
            processes,
        }
    }
}

impl Effects for SystemEffects {
    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    fn store(&self) -> &dyn PackageStore {
        self.store.as_ref()
    }

    fn plugins(&self) -> &dyn PluginNotifier {
        self.plugins.as_ref()
    }

    fn processes(&self) -> &dyn ProcessRunner {
        self.processes.as_ref()
    }
}

pub(crate) struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput> {
        run_command(program, args, envs, cwd)
    }

    fn run_exact_env(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        cwd: &Path,
    ) -> Result<RunOutput> {
        run_command_exact_env(program, args, envs, cwd)
    }
}

pub(crate) struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        bx_domain::fs::write_atomic(path, contents)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).with_context(|| format!("removing file {}", path.display()))
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        std::fs::read_link(path).with_context(|| format!("reading link {}", path.display()))
    }
}

pub type SharedEffects = Arc<dyn Effects>;
