#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::config::context;
pub(crate) use crate::core::runtime::{effects, process};
pub(crate) use crate::core::tooling::{diagnostics, outcome, timings};
pub use crate::core::tooling::progress;

pub use crate::core::config::context::{CommandContext, CommandInfo, ProfileSession};
pub use crate::core::config::{Config, GlobalOptions};
pub use crate::core::runtime::effects::{
    Effects, FileSystem, PackageStore, PluginNotifier, ProcessRunner, SharedEffects,
    SystemEffects,
};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::runtime::CommandGroup;
pub use crate::core::tooling::diagnostics::commands as diag_commands;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome, UserError};

pub use crate::core::plugin::BuiltinPlugins;
pub use crate::core::project::{
    project_add, project_init, project_install, project_remove, project_status,
    ProjectAddRequest, ProjectInitRequest, ProjectRemoveRequest,
};
pub use crate::core::reconcile::{InstallMode, ReconcileReport, Reconciler};
pub use crate::core::store::{NixProfileStore, ProfileItem};
pub use crate::core::sync::mutagen::{Endpoint, MutagenClient, Session, SessionSpec, SyncMode};
pub use crate::core::sync::{sync_command, SyncRequest};

pub use crate::core::runtime::{
    format_status_message, is_missing_project_error, missing_project_outcome, to_json_response,
};
pub use bx_domain::{PackageError, MISSING_PROJECT_HINT, MISSING_PROJECT_MESSAGE};
