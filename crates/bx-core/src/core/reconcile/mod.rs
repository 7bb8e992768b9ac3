//! Converges a project's profile onto its declared package list.

mod local_state;

use anyhow::Result;
use bx_domain::{
    effective_packages, manifest_fingerprint, save_lockfile, Lockfile, PackageReference,
    ProjectPaths, ResolvedIdentity,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::{CommandContext, ProfileSession};
use crate::core::store::{
    installable_for, profile_signature, reset_legacy_profile, ProfileItem, StoreResolver,
};
use crate::core::tooling::{install_header, install_step_line};
use crate::effects::Effects;
use crate::progress::ProgressReporter;
use crate::timings::TimingGuard;

pub(crate) use local_state::{LocalStateCache, StateInputs};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMode {
    /// Add missing packages; never remove.
    Install,
    /// Remove packages no longer declared; never install.
    Uninstall,
    /// Both.
    Ensure,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Nothing had changed since the last converged run.
    pub up_to_date: bool,
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    pub prefetched: Vec<String>,
    pub prefetch_failures: Vec<String>,
    pub lock_pruned: Vec<String>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.installed.is_empty() || !self.removed.is_empty()
    }
}

/// Dry-run view of what a reconciliation would do.
#[derive(Clone, Debug, Default, Serialize)]
pub(crate) struct ProfilePlan {
    pub(crate) pending: Vec<String>,
    pub(crate) extras: Vec<String>,
}

pub struct Reconciler<'a> {
    effects: &'a dyn Effects,
    paths: &'a ProjectPaths,
    platform: &'a str,
    prefetch: bool,
    session: &'a ProfileSession,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: &'a CommandContext<'_>, paths: &'a ProjectPaths) -> Self {
        Self {
            effects: ctx.effects(),
            paths,
            platform: ctx.platform(),
            prefetch: ctx.config().store().prefetch,
            session: ctx.session(),
        }
    }

    pub fn from_parts(
        effects: &'a dyn Effects,
        paths: &'a ProjectPaths,
        platform: &'a str,
        prefetch: bool,
        session: &'a ProfileSession,
    ) -> Self {
        Self {
            effects,
            paths,
            platform,
            prefetch,
            session,
        }
    }

    fn inputs(&self, declared: &[String], lockfile: &Lockfile) -> StateInputs {
        StateInputs {
            manifest_hash: manifest_fingerprint(declared),
            lockfile_hash: lockfile.content_fingerprint(),
            profile_signature: profile_signature(self.effects.fs(), &self.paths.profile),
            platform: self.platform.to_string(),
        }
    }

    /// Brings the profile in line with `declared`, then persists the
    /// lockfile. Nothing is persisted if any install or removal fails;
    /// whatever already happened to the profile stays.
    ///
    /// The state cache is recorded only once the profile is known to match
    /// `declared` in both directions. [`InstallMode::Install`] and
    /// [`InstallMode::Uninstall`] re-list the profile to confirm that.
    pub fn run(
        &self,
        mode: InstallMode,
        declared: &[String],
        lockfile: &mut Lockfile,
    ) -> Result<ReconcileReport> {
        let _timing = TimingGuard::new("reconcile");
        let cache = LocalStateCache::new(self.effects.fs(), &self.paths.state_file);
        if cache.is_up_to_date(&self.inputs(declared, lockfile)) {
            debug!("profile matches state cache");
            return Ok(ReconcileReport {
                up_to_date: true,
                ..ReconcileReport::default()
            });
        }
        if mode == InstallMode::Ensure {
            info!("Ensuring packages are installed.");
        }

        let store = self.effects.store();
        let profile = self.paths.profile.as_path();
        reset_legacy_profile(self.effects.fs(), profile, self.session)?;

        let effective = effective_packages(declared);
        let unpinned: Vec<PackageReference> = effective
            .iter()
            .filter(|reference| !lockfile.packages.contains_key(reference.raw()))
            .cloned()
            .collect();
        if !unpinned.is_empty() {
            lockfile.add(&StoreResolver(store), &unpinned)?;
        }

        let mut report = ReconcileReport::default();
        if self.prefetch && mode != InstallMode::Uninstall {
            self.prefetch_sources(&effective, lockfile, &mut report);
        }

        if mode != InstallMode::Uninstall {
            let listing = store.list(profile)?;
            let pending = pending_packages(&effective, &listing, lockfile, self.platform);
            if !pending.is_empty() {
                let names: Vec<String> = pending.iter().map(|r| r.raw().to_string()).collect();
                info!("{}", install_header(&names));
                let progress = ProgressReporter::bar("installing packages", pending.len());
                for (step, reference) in pending.iter().enumerate() {
                    info!("{}", install_step_line(step + 1, pending.len(), reference.raw()));
                    store.install(profile, &installable_for(reference, lockfile))?;
                    report.installed.push(reference.raw().to_string());
                    progress.increment();
                }
                progress.finish(format!("installed {} package(s)", report.installed.len()));
            }
        }

        if mode != InstallMode::Install {
            let listing = store.list(profile)?;
            for item in extra_items(&effective, &listing, lockfile, self.platform) {
                info!("Removing {} from the profile.", item.display_name());
                store.remove_by_index(profile, item)?;
                report.removed.push(item.display_name().to_string());
            }
        }

        report.lock_pruned = lockfile.tidy(declared);
        lockfile.stamp(declared);
        save_lockfile(&self.paths.lockfile, lockfile)?;

        if report.changed() {
            self.effects
                .plugins()
                .on_packages_changed(self.paths, &effective)?;
        }

        let converged = match mode {
            InstallMode::Ensure => true,
            InstallMode::Install | InstallMode::Uninstall => {
                let listing = store.list(profile)?;
                pending_packages(&effective, &listing, lockfile, self.platform).is_empty()
                    && extra_items(&effective, &listing, lockfile, self.platform).is_empty()
            }
        };
        if converged {
            cache.update(&self.inputs(declared, lockfile))?;
        } else {
            debug!(?mode, "profile still differs from the declared set; state cache not updated");
        }
        Ok(report)
    }

    fn prefetch_sources(
        &self,
        effective: &[PackageReference],
        lockfile: &Lockfile,
        report: &mut ReconcileReport,
    ) {
        for reference in effective {
            if lockfile.store_path(reference, self.platform).is_some() {
                continue;
            }
            let installable = installable_for(reference, lockfile);
            debug!(%installable, "prefetching source");
            match self.effects.store().prefetch(&installable) {
                Ok(()) => report.prefetched.push(reference.raw().to_string()),
                Err(err) => {
                    warn!(package = %reference, %err, "prefetch failed");
                    report.prefetch_failures.push(reference.raw().to_string());
                }
            }
        }
    }

    /// Computes pending and extra packages from one listing without
    /// changing anything.
    pub(crate) fn plan(&self, declared: &[String], lockfile: &Lockfile) -> Result<ProfilePlan> {
        let effective = effective_packages(declared);
        let listing = self.effects.store().list(&self.paths.profile)?;
        Ok(ProfilePlan {
            pending: pending_packages(&effective, &listing, lockfile, self.platform)
                .into_iter()
                .map(|reference| reference.raw().to_string())
                .collect(),
            extras: extra_items(&effective, &listing, lockfile, self.platform)
                .into_iter()
                .map(|item| item.display_name().to_string())
                .collect(),
        })
    }
}

/// Declared packages, in declaration order, that nothing in `listing`
/// provides.
fn pending_packages<'r>(
    effective: &'r [PackageReference],
    listing: &[ProfileItem],
    lockfile: &Lockfile,
    platform: &str,
) -> Vec<&'r PackageReference> {
    effective
        .iter()
        .filter(|reference| {
            let identity = reference.identity(lockfile, platform);
            !listing.iter().any(|item| item.provides(&identity))
        })
        .collect()
}

/// Profile items no declared package accounts for, highest index first so
/// each removal leaves the remaining indices valid.
fn extra_items<'l>(
    effective: &[PackageReference],
    listing: &'l [ProfileItem],
    lockfile: &Lockfile,
    platform: &str,
) -> Vec<&'l ProfileItem> {
    let identities: Vec<ResolvedIdentity> = effective
        .iter()
        .map(|reference| reference.identity(lockfile, platform))
        .collect();
    let mut extras: Vec<&ProfileItem> = listing
        .iter()
        .filter(|item| !identities.iter().any(|identity| item.provides(identity)))
        .collect();
    extras.sort_by(|a, b| b.index.cmp(&a.index));
    extras
}

#[cfg(test)]
mod tests;
