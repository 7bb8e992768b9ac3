use anyhow::Result;
use bx_domain::{load_lockfile_optional, ManifestEditor, ProjectStateKind, ProjectStateReport};
use serde_json::json;

use crate::core::reconcile::Reconciler;
use crate::core::tooling::missing_manifest_outcome;
use crate::{CommandContext, CommandStatus, ExecutionOutcome};

/// Reports whether `bx.toml`, `bx.lock`, and the profile agree. Reads only;
/// nothing is installed, removed, or written.
///
/// # Errors
/// Returns an error if the manifest or lockfile cannot be parsed or the
/// profile cannot be listed.
pub fn project_status(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let paths = ctx.project_paths()?;
    if !paths.manifest.exists() {
        return Ok(missing_manifest_outcome(&paths.root));
    }
    let editor = ManifestEditor::open(&paths.manifest)?;
    let declared = editor.packages().to_vec();
    let lock = load_lockfile_optional(&paths.lockfile)?;
    let lock_exists = lock.is_some();
    let lockfile = lock.unwrap_or_default();
    let lock_clean = lockfile.is_up_to_date(&declared);
    let plan = Reconciler::new(ctx, &paths).plan(&declared, &lockfile)?;

    let report = ProjectStateReport::new(
        true,
        lock_exists,
        lock_clean,
        declared.is_empty(),
        plan.pending,
        plan.extras,
    );
    let (status, message, hint) = match report.canonical {
        ProjectStateKind::Consistent => (CommandStatus::Ok, "profile matches bx.toml", None),
        ProjectStateKind::InitializedEmpty => (CommandStatus::Ok, "no packages declared", None),
        ProjectStateKind::NeedsLock => (
            CommandStatus::UserError,
            "bx.lock is out of date",
            Some("run `bx install` to refresh the lockfile"),
        ),
        ProjectStateKind::NeedsProfile => (
            CommandStatus::UserError,
            "profile is out of date",
            Some("run `bx install` to converge the profile"),
        ),
        ProjectStateKind::Uninitialized => (
            CommandStatus::UserError,
            "no bx.toml",
            Some("run `bx init` to create it"),
        ),
    };
    let mut details = json!({
        "state": report.canonical.as_str(),
        "flags": report.flags_json(),
        "project_root": paths.root.display().to_string(),
        "packages": declared,
        "pending": report.pending,
        "extras": report.extras,
    });
    if let Some(hint) = hint {
        details["hint"] = json!(hint);
    }
    Ok(ExecutionOutcome {
        status,
        message: message.to_string(),
        details,
    })
}
