use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bx_domain::{ManifestEditor, ProjectPaths};
use serde_json::json;

use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug, Default)]
pub struct ProjectInitRequest {
    /// Directory to initialize; the working directory when unset.
    pub root: Option<PathBuf>,
}

/// Creates an empty `bx.toml`.
///
/// # Errors
/// Returns an error if the working directory cannot be read or the
/// manifest cannot be written.
pub fn project_init(
    _ctx: &CommandContext,
    request: &ProjectInitRequest,
) -> Result<ExecutionOutcome> {
    let root = match &request.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("unable to determine current directory")?,
    };
    let paths = ProjectPaths::new(&root);
    if paths.manifest.exists() {
        return Ok(ExecutionOutcome::user_error(
            format!("{} already exists", bx_domain::MANIFEST_FILE),
            json!({
                "reason": "already_initialized",
                "manifest": paths.manifest.display().to_string(),
                "hint": "run `bx add <name>` to declare packages",
            }),
        ));
    }
    let mut editor = ManifestEditor::new(&paths.manifest);
    editor.save()?;
    Ok(ExecutionOutcome::success(
        format!("initialized {}", paths.manifest.display()),
        json!({
            "project_root": root.display().to_string(),
            "manifest": paths.manifest.display().to_string(),
        }),
    ))
}
