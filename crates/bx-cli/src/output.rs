use atty::Stream;
use bx_core::{diag_commands, CommandGroup, CommandInfo, CommandStatus, ExecutionOutcome};
use color_eyre::Result;
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn exit_code(status: &CommandStatus) -> i32 {
    match status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    }
}

pub fn emit_output(
    opts: &OutputOptions,
    info: CommandInfo,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = exit_code(&outcome.status);

    if opts.json {
        let payload = bx_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if let CommandStatus::Ok = outcome.status {
        if opts.quiet {
            return Ok(code);
        }
        let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
        let message = bx_core::format_status_message(info, &outcome.message);
        println!("{}", style.status(&outcome.status, &message));
        if let Some(missing) = string_list(&outcome.details, "missing").filter(|m| !m.is_empty())
        {
            let line = format!("not declared: {}", missing.join(", "));
            println!("{}", style.warning(&line));
        }
        for (package, readme) in readmes(&outcome.details) {
            println!();
            println!("{}", style.heading(&package));
            println!("{readme}");
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Tip: {hint}")));
        }
    } else {
        let style = Style::new(opts.no_color, atty::is(Stream::Stderr));
        let header = format!("{}  {}", error_code(info), outcome.message);
        eprintln!("{}", style.error_header(&header));
        eprintln!();
        eprintln!("Why:");
        for reason in collect_why_bullets(&outcome.details, &outcome.message) {
            eprintln!("  • {reason}");
        }
        let fixes = collect_fix_bullets(&outcome.details);
        if !fixes.is_empty() {
            eprintln!();
            eprintln!("Fix:");
            for fix in fixes {
                eprintln!("{}", style.fix_bullet(&format!("  • {fix}")));
            }
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn string_list(details: &Value, key: &str) -> Option<Vec<String>> {
    let values = details.get(key)?.as_array()?;
    Some(
        values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

fn readmes(details: &Value) -> Vec<(String, String)> {
    details
        .get("readmes")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let package = entry.get("package")?.as_str()?;
                    let readme = entry.get("readme")?.as_str()?;
                    Some((package.to_string(), readme.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn error_code(info: CommandInfo) -> &'static str {
    match info.group {
        CommandGroup::Init => diag_commands::INIT,
        CommandGroup::Add => diag_commands::ADD,
        CommandGroup::Remove => diag_commands::REMOVE,
        CommandGroup::Install => diag_commands::INSTALL,
        CommandGroup::Status => diag_commands::STATUS,
        CommandGroup::Sync => diag_commands::SYNC,
    }
}

fn collect_why_bullets(details: &Value, fallback: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    if let Some(reason) = details.get("reason").and_then(Value::as_str) {
        push_unique(
            &mut bullets,
            reason_display(reason).unwrap_or(reason).to_string(),
        );
    }
    if let Some(pending) = string_list(details, "pending").filter(|p| !p.is_empty()) {
        push_unique(&mut bullets, format!("Not installed: {}", pending.join(", ")));
    }
    if let Some(extras) = string_list(details, "extras").filter(|e| !e.is_empty()) {
        push_unique(&mut bullets, format!("Not declared: {}", extras.join(", ")));
    }
    if let Some(issues) = details.get("issues").and_then(Value::as_array) {
        for issue in issues.iter().filter_map(Value::as_str) {
            push_unique(&mut bullets, issue.to_string());
        }
    }
    if bullets.is_empty() {
        bullets.push(fallback.to_string());
    }
    bullets
}

fn collect_fix_bullets(details: &Value) -> Vec<String> {
    let mut fixes = Vec::new();
    if let Some(hint) = hint_from_details(details) {
        push_unique(&mut fixes, hint.to_string());
    }
    if fixes.is_empty() {
        fixes.push("Re-run with --help for usage or -vv for more detail.".to_string());
    }
    fixes
}

fn push_unique(vec: &mut Vec<String>, text: String) {
    if text.trim().is_empty() {
        return;
    }
    if !vec.iter().any(|existing| existing == &text) {
        vec.push(text);
    }
}

fn reason_display(code: &str) -> Option<&'static str> {
    match code {
        "package_not_found" => Some("The package (or the requested version) is not in nixpkgs."),
        "ambiguous_package" => Some("More than one declared package matches that name."),
        "resolution_failed" => Some("A declared package could not be pinned to a revision."),
        "external_process_failed" => Some("A nix command exited with an error."),
        "project_locked" => Some("Another bx command is modifying this project."),
        "missing_manifest" | "missing_project" => Some("No bx.toml was found."),
        "already_initialized" => Some("This directory already has a bx.toml."),
        _ => None,
    }
}
