use anyhow::Result;
use bx_domain::{load_lockfile_optional, ManifestEditor};
use serde_json::json;

use crate::core::reconcile::{InstallMode, Reconciler};
use crate::core::tooling::{missing_manifest_outcome, project_busy_outcome};
use crate::{CommandContext, ExecutionOutcome};

use super::ProjectLock;

/// Installs what `bx.toml` declares and removes everything else from the
/// profile.
///
/// # Errors
/// Propagates resolution, store, plugin, and filesystem failures. A failed
/// install leaves the lockfile and state cache untouched.
pub fn project_install(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let paths = ctx.project_paths()?;
    if !paths.manifest.exists() {
        return Ok(missing_manifest_outcome(&paths.root));
    }
    let Some(_lock) = ProjectLock::try_acquire(&paths)? else {
        return Ok(project_busy_outcome(&paths.root));
    };

    let editor = ManifestEditor::open(&paths.manifest)?;
    let mut lockfile = load_lockfile_optional(&paths.lockfile)?.unwrap_or_default();
    let declared = editor.packages().to_vec();
    let report =
        Reconciler::new(ctx, &paths).run(InstallMode::Ensure, &declared, &mut lockfile)?;

    let message = if report.up_to_date {
        "packages already up to date".to_string()
    } else if report.changed() {
        format!(
            "installed {} package(s), removed {}",
            report.installed.len(),
            report.removed.len()
        )
    } else {
        "profile matches bx.toml".to_string()
    };
    let mut details = serde_json::to_value(&report)?;
    details["lockfile"] = json!(paths.lockfile.display().to_string());
    details["packages"] = json!(declared);
    Ok(ExecutionOutcome::success(message, details))
}
