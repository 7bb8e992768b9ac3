use std::collections::BTreeMap;

use bx_core::{
    is_missing_project_error, missing_project_outcome, progress::ProgressReporter, CommandContext,
    CommandGroup, CommandInfo, ExecutionOutcome, PackageError, ProjectAddRequest,
    ProjectInitRequest, ProjectRemoveRequest, SessionSpec, SyncRequest, UserError,
};
use color_eyre::Result;
use serde_json::json;

use crate::cli::{split_endpoint, CommandGroupCli, SyncCommand, SyncCreateArgs};

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Init => {
            let info = CommandInfo::new(CommandGroup::Init, "init");
            let request = ProjectInitRequest::default();
            core_call(info, || bx_core::project_init(ctx, &request))
        }
        CommandGroupCli::Add(args) => {
            let info = CommandInfo::new(CommandGroup::Add, "add");
            let request = ProjectAddRequest {
                packages: args.packages.clone(),
            };
            core_call(info, || bx_core::project_add(ctx, &request))
        }
        CommandGroupCli::Rm(args) => {
            let info = CommandInfo::new(CommandGroup::Remove, "rm");
            let request = ProjectRemoveRequest {
                packages: args.packages.clone(),
            };
            core_call(info, || bx_core::project_remove(ctx, &request))
        }
        CommandGroupCli::Install => {
            let info = CommandInfo::new(CommandGroup::Install, "install");
            core_call(info, || bx_core::project_install(ctx))
        }
        CommandGroupCli::Status => {
            let info = CommandInfo::new(CommandGroup::Status, "status");
            core_call(info, || bx_core::project_status(ctx))
        }
        CommandGroupCli::Sync(command) => {
            let info = CommandInfo::new(CommandGroup::Sync, sync_name(command));
            let request = sync_request_from_args(command);
            core_call(info, || bx_core::sync_command(ctx, &request))
        }
    }
}

fn sync_name(command: &SyncCommand) -> &'static str {
    match command {
        SyncCommand::Create(_) => "create",
        SyncCommand::List(_) => "list",
        SyncCommand::Pause(_) => "pause",
        SyncCommand::Resume(_) => "resume",
        SyncCommand::Flush(_) => "flush",
        SyncCommand::Reset(_) => "reset",
        SyncCommand::Terminate(_) => "terminate",
    }
}

fn sync_request_from_args(command: &SyncCommand) -> SyncRequest {
    match command {
        SyncCommand::Create(args) => SyncRequest::Create(session_spec_from_args(args)),
        SyncCommand::List(args) => SyncRequest::List {
            names: args.names.clone(),
        },
        SyncCommand::Pause(args) => SyncRequest::Pause {
            names: args.names.clone(),
        },
        SyncCommand::Resume(args) => SyncRequest::Resume {
            names: args.names.clone(),
        },
        SyncCommand::Flush(args) => SyncRequest::Flush {
            names: args.names.clone(),
        },
        SyncCommand::Reset(args) => SyncRequest::Reset {
            names: args.names.clone(),
        },
        SyncCommand::Terminate(args) => SyncRequest::Terminate {
            labels: args.labels.iter().cloned().collect(),
            names: args.names.clone(),
        },
    }
}

fn session_spec_from_args(args: &SyncCreateArgs) -> SessionSpec {
    let (alpha_address, alpha_path) = split_endpoint(&args.alpha);
    let (beta_address, beta_path) = split_endpoint(&args.beta);
    SessionSpec {
        alpha_address,
        alpha_path,
        beta_address,
        beta_path,
        name: args.name.clone(),
        paused: args.paused,
        labels: args.labels.iter().cloned().collect::<BTreeMap<_, _>>(),
        sync_mode: args.sync_mode.into(),
        ignore_vcs: args.ignore_vcs,
        env: BTreeMap::new(),
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    let group = info.group.to_string();
    let name = info.name;
    let label = if name.starts_with(&group) {
        name.to_string()
    } else {
        format!("{group} {name}")
    };
    let _spinner = ProgressReporter::spinner(format!("Running {label}"));
    match action() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => Ok((info, outcome_from_error(&err))),
    }
}

fn outcome_from_error(err: &anyhow::Error) -> ExecutionOutcome {
    if is_missing_project_error(err) {
        return missing_project_outcome();
    }
    if let Some(user) = err.downcast_ref::<UserError>() {
        return ExecutionOutcome::user_error(user.message().to_string(), user.details().clone());
    }
    if let Some(package) = err.downcast_ref::<PackageError>() {
        return package_error_outcome(err, package);
    }
    let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "reason": "internal_error",
            "error": err.to_string(),
            "issues": issues,
            "hint": "Re-run with `-vv` for more detail, or open an issue if this persists.",
        }),
    )
}

fn package_error_outcome(err: &anyhow::Error, package: &PackageError) -> ExecutionOutcome {
    let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
    match package {
        PackageError::NotFound { reference } => ExecutionOutcome::user_error(
            package.to_string(),
            json!({
                "reason": package.reason(),
                "package": reference,
                "hint": "check the name and version with `nix search nixpkgs <name>`",
            }),
        ),
        PackageError::Resolution { reference, .. } => ExecutionOutcome::user_error(
            package.to_string(),
            json!({
                "reason": package.reason(),
                "package": reference,
                "hint": "pin a version that exists, or remove the package with `bx rm`",
            }),
        ),
        PackageError::AmbiguousMatch { name, matches } => {
            let example = matches.first().map_or(name.as_str(), String::as_str);
            ExecutionOutcome::user_error(
                package.to_string(),
                json!({
                    "reason": package.reason(),
                    "package": name,
                    "matches": matches,
                    "hint": format!("name the exact package, for example `{example}`"),
                }),
            )
        }
        PackageError::ExternalProcess { program, code, .. } => ExecutionOutcome::failure(
            err.to_string(),
            json!({
                "reason": package.reason(),
                "program": program,
                "code": code,
                "issues": issues,
                "hint": "the output above comes from nix; fix the reported problem and re-run",
            }),
        ),
    }
}
