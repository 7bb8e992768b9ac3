//! In-memory effects shared by unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use bx_domain::{LockedPackage, PackageError, PackageReference, ProjectPaths};
use tempfile::TempDir;

use crate::config::settings::EnvSnapshot;
use crate::config::{Config, GlobalOptions};
use crate::core::runtime::effects::{SystemFileSystem, SystemProcessRunner};
use crate::core::store::ProfileItem;
use crate::effects::{
    Effects, FileSystem, PackageStore, PluginNotifier, ProcessRunner, SharedEffects,
};
use crate::CommandContext;

pub(crate) const PLATFORM: &str = "x86_64-linux";
const NIXPKGS: &str = "github:NixOS/nixpkgs/0123456789abcdef";

#[derive(Default)]
struct StoreState {
    known: BTreeMap<String, String>,
    profile: Vec<ProfileItem>,
    calls: Vec<String>,
    fail_install: BTreeSet<String>,
    fail_prefetch: bool,
    generation: u32,
}

/// A package store whose profile is a vector. Removing an item shifts the
/// indices of everything after it, like an indexed `nix profile list`.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `name` resolvable at `version`.
    pub(crate) fn with_package(self, name: &str, version: &str) -> Self {
        self.state()
            .known
            .insert(name.to_string(), version.to_string());
        self
    }

    pub(crate) fn fail_install_of(&self, name: &str) {
        self.state().fail_install.insert(name.to_string());
    }

    pub(crate) fn clear_install_failures(&self) {
        self.state().fail_install.clear();
    }

    pub(crate) fn fail_prefetch(&self) {
        self.state().fail_prefetch = true;
    }

    /// Puts `name` into the profile without going through `install`.
    pub(crate) fn seed_installed(&self, name: &str) {
        let mut state = self.state();
        let version = state.known.get(name).cloned().unwrap_or_else(|| "0".into());
        let index = state.profile.len();
        state.profile.push(item_for(index, name, &version));
    }

    pub(crate) fn installed(&self) -> Vec<String> {
        self.state()
            .profile
            .iter()
            .map(|item| item.display_name().to_string())
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn bump_generation(state: &mut StoreState, profile: &Path) -> Result<()> {
        state.generation += 1;
        link_generation(profile, state.generation)
    }
}

fn store_path(name: &str, version: &str) -> String {
    format!("/nix/store/{:0>32}-{name}-{version}", name.len())
}

fn item_for(index: usize, name: &str, version: &str) -> ProfileItem {
    ProfileItem {
        index,
        selector: index.to_string(),
        name: String::new(),
        attr_path: format!("legacyPackages.{PLATFORM}.{name}"),
        original_url: NIXPKGS.to_string(),
        url: NIXPKGS.to_string(),
        store_paths: vec![store_path(name, version)],
    }
}

#[cfg(unix)]
fn link_generation(profile: &Path, generation: u32) -> Result<()> {
    if let Some(parent) = profile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::symlink_metadata(profile).is_ok() {
        std::fs::remove_file(profile)?;
    }
    std::os::unix::fs::symlink(format!("profile-{generation}-link"), profile)?;
    Ok(())
}

#[cfg(not(unix))]
fn link_generation(_profile: &Path, _generation: u32) -> Result<()> {
    Ok(())
}

impl PackageStore for FakeStore {
    fn list(&self, _profile: &Path) -> Result<Vec<ProfileItem>> {
        let mut state = self.state();
        state.calls.push("list".into());
        Ok(state.profile.clone())
    }

    fn install(&self, profile: &Path, installable: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("install {installable}"));
        let name = installable.rsplit('#').next().unwrap_or(installable).to_string();
        if state.fail_install.contains(&name) {
            return Err(PackageError::external(
                "nix",
                1,
                &format!("error: build of '{name}' failed"),
            )
            .into());
        }
        let Some(version) = state.known.get(&name).cloned() else {
            bail!("unknown installable {installable}");
        };
        let index = state.profile.len();
        state.profile.push(item_for(index, &name, &version));
        Self::bump_generation(&mut state, profile)
    }

    fn remove_by_index(&self, profile: &Path, item: &ProfileItem) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("remove {}", item.selector));
        match state.profile.get(item.index) {
            Some(current) if current.store_paths == item.store_paths => {}
            _ => bail!("stale profile index {}", item.index),
        }
        state.profile.remove(item.index);
        for (index, entry) in state.profile.iter_mut().enumerate() {
            entry.index = index;
            entry.selector = index.to_string();
        }
        Self::bump_generation(&mut state, profile)
    }

    fn resolve(&self, reference: &PackageReference) -> Result<Option<LockedPackage>> {
        let mut state = self.state();
        state.calls.push(format!("resolve {}", reference.raw()));
        let Some(version) = state.known.get(reference.canonical_name()).cloned() else {
            return Ok(None);
        };
        if !reference.accepts_version(&version) {
            return Ok(None);
        }
        let name = reference.canonical_name();
        Ok(Some(LockedPackage {
            resolved: format!("{NIXPKGS}#{name}"),
            version: version.clone(),
            store_paths: BTreeMap::from([(PLATFORM.to_string(), store_path(name, &version))]),
            ..LockedPackage::default()
        }))
    }

    fn prefetch(&self, installable: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("prefetch {installable}"));
        if state.fail_prefetch {
            bail!("unable to fetch {installable}");
        }
        Ok(())
    }
}

/// Records plugin hooks; optionally fails on change notifications.
#[derive(Default)]
pub(crate) struct RecordingPlugins {
    events: Mutex<Vec<String>>,
    fail_on_change: Mutex<bool>,
}

impl RecordingPlugins {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn fail_on_change(&self) {
        *self
            .fail_on_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn record(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl PluginNotifier for RecordingPlugins {
    fn on_packages_changed(
        &self,
        _paths: &ProjectPaths,
        declared: &[PackageReference],
    ) -> Result<()> {
        let names: Vec<&str> = declared.iter().map(PackageReference::raw).collect();
        self.record(format!("changed {}", names.join(",")));
        if *self
            .fail_on_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            bail!("plugin hook failed");
        }
        Ok(())
    }

    fn remove(&self, _paths: &ProjectPaths, packages: &[PackageReference]) -> Result<()> {
        let names: Vec<&str> = packages.iter().map(PackageReference::raw).collect();
        self.record(format!("remove {}", names.join(",")));
        Ok(())
    }

    fn print_readme(&self, package: &PackageReference) -> Option<String> {
        (package.canonical_name() == "redis").then(|| "redis readme".to_string())
    }
}

pub(crate) struct TestEffects {
    fs: SystemFileSystem,
    pub(crate) store: Arc<FakeStore>,
    pub(crate) plugins: Arc<RecordingPlugins>,
    processes: SystemProcessRunner,
}

impl Effects for TestEffects {
    fn fs(&self) -> &dyn FileSystem {
        &self.fs
    }

    fn store(&self) -> &dyn PackageStore {
        self.store.as_ref()
    }

    fn plugins(&self) -> &dyn PluginNotifier {
        self.plugins.as_ref()
    }

    fn processes(&self) -> &dyn ProcessRunner {
        &self.processes
    }
}

/// A scratch project directory wired to a [`FakeStore`].
pub(crate) struct TestProject {
    _dir: TempDir,
    pub(crate) paths: ProjectPaths,
    pub(crate) store: Arc<FakeStore>,
    pub(crate) plugins: Arc<RecordingPlugins>,
    pub(crate) effects: Arc<TestEffects>,
    global: GlobalOptions,
}

impl TestProject {
    /// Project whose `bx.toml` declares `packages`. The store knows
    /// `hello`, `jq`, `ripgrep` and `redis`.
    pub(crate) fn new(packages: &[&str]) -> Result<Self> {
        let store = FakeStore::new()
            .with_package("hello", "2.12.1")
            .with_package("jq", "1.7.1")
            .with_package("ripgrep", "14.1.0")
            .with_package("redis", "7.2.4");
        Self::with_store(store, packages)
    }

    pub(crate) fn with_store(store: FakeStore, packages: &[&str]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        write_manifest(&paths, packages)?;
        let store = Arc::new(store);
        let plugins = Arc::new(RecordingPlugins::default());
        let effects = Arc::new(TestEffects {
            fs: SystemFileSystem,
            store: store.clone(),
            plugins: plugins.clone(),
            processes: SystemProcessRunner,
        });
        Ok(Self {
            _dir: dir,
            paths,
            store,
            plugins,
            effects,
            global: GlobalOptions::default(),
        })
    }

    pub(crate) fn config(prefetch: bool) -> Config {
        let prefetch = if prefetch { "1" } else { "0" };
        Config::from_snapshot(&EnvSnapshot::testing(&[
            ("BX_PLATFORM", PLATFORM),
            ("BX_PREFETCH", prefetch),
            ("BX_NIX_BIN", "nix"),
            ("BX_MUTAGEN_BIN", "mutagen"),
        ]))
    }

    pub(crate) fn context(&self) -> CommandContext<'_> {
        self.context_with(Self::config(false))
    }

    pub(crate) fn context_with(&self, config: Config) -> CommandContext<'_> {
        let effects: SharedEffects = self.effects.clone();
        CommandContext::with_effects(&self.global, config, effects).at_root(&self.paths.root)
    }

    pub(crate) fn manifest(&self) -> Result<Vec<String>> {
        Ok(bx_domain::ManifestEditor::open(&self.paths.manifest)?
            .packages()
            .to_vec())
    }
}

fn write_manifest(paths: &ProjectPaths, packages: &[&str]) -> Result<()> {
    let mut editor = bx_domain::ManifestEditor::new(&paths.manifest);
    for package in packages {
        editor.push(*package);
    }
    editor.save()
}
