use std::path::Path;

use serde_json::json;

use crate::ExecutionOutcome;

pub(crate) fn missing_manifest_outcome(root: &Path) -> ExecutionOutcome {
    let manifest = root.join(bx_domain::MANIFEST_FILE);
    ExecutionOutcome::user_error(
        format!("{} not found in {}", bx_domain::MANIFEST_FILE, root.display()),
        json!({
            "reason": "missing_manifest",
            "hint": "run `bx init` to create it",
            "manifest": manifest.display().to_string(),
        }),
    )
}

pub(crate) fn project_busy_outcome(root: &Path) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        "another bx command is already running in this project",
        json!({
            "reason": "project_locked",
            "hint": "wait for it to finish and retry",
            "project_root": root.display().to_string(),
        }),
    )
}

pub(crate) fn install_step_line(current: usize, total: usize, package: &str) -> String {
    format!("[{current}/{total}] {package}")
}

pub(crate) fn install_header(packages: &[String]) -> String {
    if let [single] = packages {
        format!("Installing package: {single}.")
    } else {
        format!(
            "Installing {} packages: {}.",
            packages.len(),
            packages.join(", ")
        )
    }
}
