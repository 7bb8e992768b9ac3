use anyhow::{Context, Result};
use bx_domain::{
    effective_packages, find_by_canonical_name, load_lockfile_optional, Lockfile,
    ManifestEditor, PackageError, PackageReference, ProjectPaths,
};
use serde_json::json;
use tracing::{info, warn};

use crate::core::reconcile::{InstallMode, ReconcileReport, Reconciler};
use crate::core::store::reset_legacy_profile;
use crate::core::tooling::{missing_manifest_outcome, project_busy_outcome};
use crate::progress::ProgressReporter;
use crate::{CommandContext, ExecutionOutcome};

use super::ProjectLock;

#[derive(Clone, Debug)]
pub struct ProjectAddRequest {
    pub packages: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ProjectRemoveRequest {
    pub packages: Vec<String>,
}

/// Declares `request.packages` in `bx.toml` and installs them.
///
/// Every new package is validated against the store before anything is
/// touched. A package sharing its canonical name with a declared one
/// replaces it.
///
/// # Errors
/// Returns [`PackageError::NotFound`] for an unknown package and
/// propagates store and filesystem failures.
pub fn project_add(ctx: &CommandContext, request: &ProjectAddRequest) -> Result<ExecutionOutcome> {
    let requested = clean_inputs(&request.packages);
    if requested.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "provide at least one package",
            json!({ "hint": "run `bx add <name>` or `bx add <name>@<version>`" }),
        ));
    }

    let paths = ctx.project_paths()?;
    if !paths.manifest.exists() {
        return Ok(missing_manifest_outcome(&paths.root));
    }
    let Some(_lock) = ProjectLock::try_acquire(&paths)? else {
        return Ok(project_busy_outcome(&paths.root));
    };

    let mut editor = ManifestEditor::open(&paths.manifest)?;
    let mut lockfile = load_lockfile_optional(&paths.lockfile)?.unwrap_or_default();

    let mut added: Vec<PackageReference> = Vec::new();
    let mut replaced: Vec<String> = Vec::new();
    let mut unchanged: Vec<String> = Vec::new();
    for raw in &requested {
        let reference = PackageReference::parse(raw);
        let versioned = reference.versioned();
        if editor.contains(&versioned) {
            unchanged.push(versioned);
            continue;
        }
        if let Some(existing) =
            find_by_canonical_name(editor.packages(), reference.canonical_name())?
        {
            editor.remove(&existing);
            if let Some(pos) = added.iter().position(|r| r.raw() == existing) {
                added.remove(pos);
            } else {
                replaced.push(existing);
            }
        }
        editor.push(versioned.clone());
        added.push(PackageReference::parse(&versioned));
    }

    validate_and_pin(ctx, &added, &mut lockfile)?;

    let retired: Vec<PackageReference> =
        replaced.iter().map(|raw| PackageReference::parse(raw)).collect();
    let retired_items = retire_packages(ctx, &paths, &retired, &lockfile)?;
    lockfile.remove(&retired);

    let declared = editor.packages().to_vec();
    let report = Reconciler::new(ctx, &paths)
        .run(InstallMode::Install, &declared, &mut lockfile)
        .context("There was an error installing nix packages")?;
    editor.save()?;
    notify_retired(ctx, &paths, &retired_items, &report, &declared)?;

    let readmes: Vec<_> = added
        .iter()
        .filter_map(|reference| {
            ctx.plugins().print_readme(reference).map(|readme| {
                info!("{readme}");
                json!({ "package": reference.raw(), "readme": readme })
            })
        })
        .collect();

    let added_raw: Vec<&str> = added.iter().map(PackageReference::raw).collect();
    let message = if added_raw.is_empty() {
        "packages already declared".to_string()
    } else {
        format!("added {}", added_raw.join(", "))
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "manifest": paths.manifest.display().to_string(),
            "lockfile": paths.lockfile.display().to_string(),
            "added": added_raw,
            "replaced": replaced,
            "unchanged": unchanged,
            "installed": report.installed,
            "prefetch_failures": report.prefetch_failures,
            "readmes": readmes,
        }),
    ))
}

/// Drops `request.packages` (by exact or canonical name) from `bx.toml`,
/// their plugin state, and the profile.
///
/// Names that are not declared are reported in one warning; the rest are
/// still removed.
///
/// # Errors
/// Returns [`PackageError::AmbiguousMatch`] when a name matches more than
/// one declared package and propagates store and filesystem failures.
pub fn project_remove(
    ctx: &CommandContext,
    request: &ProjectRemoveRequest,
) -> Result<ExecutionOutcome> {
    let requested = clean_inputs(&request.packages);
    if requested.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "provide at least one package to remove",
            json!({ "hint": "run `bx rm <name>`" }),
        ));
    }

    let paths = ctx.project_paths()?;
    if !paths.manifest.exists() {
        return Ok(missing_manifest_outcome(&paths.root));
    }
    let Some(_lock) = ProjectLock::try_acquire(&paths)? else {
        return Ok(project_busy_outcome(&paths.root));
    };

    let mut editor = ManifestEditor::open(&paths.manifest)?;
    let mut lockfile = load_lockfile_optional(&paths.lockfile)?.unwrap_or_default();

    let mut uninstall: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for name in &requested {
        match find_by_canonical_name(editor.packages(), name)? {
            Some(found) => {
                editor.remove(&found);
                uninstall.push(found);
            }
            None => missing.push(name.clone()),
        }
    }
    if !missing.is_empty() {
        warn!(
            "the following packages were not found in your {}: {}",
            bx_domain::MANIFEST_FILE,
            missing.join(", ")
        );
    }

    let refs: Vec<PackageReference> =
        uninstall.iter().map(|raw| PackageReference::parse(raw)).collect();
    let removed_from_profile = retire_packages(ctx, &paths, &refs, &lockfile)?;
    lockfile.remove(&refs);

    let declared = editor.packages().to_vec();
    let report =
        Reconciler::new(ctx, &paths).run(InstallMode::Uninstall, &declared, &mut lockfile)?;
    editor.save()?;
    notify_retired(ctx, &paths, &removed_from_profile, &report, &declared)?;

    let message = if uninstall.is_empty() {
        "no packages removed".to_string()
    } else {
        format!("removed {}", uninstall.join(", "))
    };
    let mut removed_items = removed_from_profile;
    removed_items.extend(report.removed);
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "manifest": paths.manifest.display().to_string(),
            "removed": uninstall,
            "missing": missing,
            "profile_removed": removed_items,
        }),
    ))
}

/// Trims, drops empties, and de-duplicates while keeping first-seen order.
fn clean_inputs(raw: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for value in raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !cleaned.iter().any(|seen| seen == value) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

/// Confirms every new package exists and pins the ones not already locked.
/// Nothing has been written when this fails.
fn validate_and_pin(
    ctx: &CommandContext,
    added: &[PackageReference],
    lockfile: &mut Lockfile,
) -> Result<()> {
    if added.is_empty() {
        return Ok(());
    }
    let spinner = ProgressReporter::spinner("resolving packages");
    for reference in added {
        match ctx.store().resolve(reference)? {
            Some(locked) => {
                lockfile
                    .packages
                    .entry(reference.raw().to_string())
                    .or_insert(locked);
            }
            None => {
                return Err(PackageError::NotFound {
                    reference: reference.raw().to_string(),
                }
                .into())
            }
        }
    }
    spinner.finish(format!("resolved {} package(s)", added.len()));
    Ok(())
}

/// Drops plugin state for `refs` and takes them out of the profile one at a
/// time. Each removal re-lists the profile so the index it uses belongs to
/// the current snapshot.
fn retire_packages(
    ctx: &CommandContext,
    paths: &ProjectPaths,
    refs: &[PackageReference],
    lockfile: &Lockfile,
) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    if refs.is_empty() {
        return Ok(removed);
    }
    ctx.plugins().remove(paths, refs)?;
    let store = ctx.store();
    reset_legacy_profile(ctx.fs(), &paths.profile, ctx.session())?;
    for reference in refs {
        let identity = reference.identity(lockfile, ctx.platform());
        let listing = store.list(&paths.profile)?;
        match listing.iter().find(|item| item.provides(&identity)) {
            Some(item) => {
                info!("Removing {} from the profile.", reference.raw());
                store.remove_by_index(&paths.profile, item)?;
                removed.push(item.display_name().to_string());
            }
            None => warn!("Package {} not found in profile. Skipping.", reference.raw()),
        }
    }
    Ok(removed)
}

/// Profile removals done by [`retire_packages`] happen outside the
/// reconciler, so its own change notification does not cover them.
fn notify_retired(
    ctx: &CommandContext,
    paths: &ProjectPaths,
    retired: &[String],
    report: &ReconcileReport,
    declared: &[String],
) -> Result<()> {
    if retired.is_empty() || report.changed() {
        return Ok(());
    }
    ctx.plugins()
        .on_packages_changed(paths, &effective_packages(declared))
}
