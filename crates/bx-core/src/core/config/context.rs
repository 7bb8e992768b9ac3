use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use bx_domain::{current_project_root, ProjectPaths};

use crate::config::{Config, GlobalOptions};
use crate::effects::{self, Effects, SharedEffects, SystemEffects};
use crate::CommandGroup;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

/// Per-process profile bookkeeping that must happen at most once.
#[derive(Debug, Default)]
pub struct ProfileSession {
    legacy_reset_checked: AtomicBool,
}

impl ProfileSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time it is called and false afterwards.
    pub fn claim_legacy_reset_check(&self) -> bool {
        !self.legacy_reset_checked.swap(true, Ordering::SeqCst)
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    project_root: OnceLock<PathBuf>,
    effects: SharedEffects,
    session: ProfileSession,
}

impl<'a> CommandContext<'a> {
    /// Context backed by the real system: Nix, the filesystem and the
    /// built-in plugins.
    pub fn new(global: &'a GlobalOptions) -> Self {
        let config = Config::from_env();
        let effects: SharedEffects = Arc::new(SystemEffects::new(&config));
        Self::with_effects(global, config, effects)
    }

    pub fn with_effects(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            project_root: OnceLock::new(),
            effects,
            session: ProfileSession::new(),
        }
    }

    /// Pins the project root instead of discovering it from the working
    /// directory.
    pub fn at_root(self, root: impl Into<PathBuf>) -> Self {
        let _ = self.project_root.set(root.into());
        self
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn fs(&self) -> &dyn effects::FileSystem {
        self.effects.fs()
    }

    pub fn store(&self) -> &dyn effects::PackageStore {
        self.effects.store()
    }

    pub fn plugins(&self) -> &dyn effects::PluginNotifier {
        self.effects.plugins()
    }

    pub fn processes(&self) -> &dyn effects::ProcessRunner {
        self.effects.processes()
    }

    pub fn session(&self) -> &ProfileSession {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &str {
        &self.config.store().platform
    }

    /// Resolves the current project's root directory.
    pub fn project_root(&self) -> Result<PathBuf> {
        if let Some(path) = self.project_root.get() {
            Ok(path.clone())
        } else {
            let path = current_project_root()?;
            let _ = self.project_root.set(path.clone());
            Ok(path)
        }
    }

    pub fn project_paths(&self) -> Result<ProjectPaths> {
        Ok(ProjectPaths::new(self.project_root()?))
    }
}
