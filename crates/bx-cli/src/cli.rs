use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use bx_core::SyncMode;

pub const BX_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const BX_BEFORE_HELP: &str = concat!(
    "bx ",
    env!("CARGO_PKG_VERSION"),
    " – Declarative per-project package sets\n\n",
    "\x1b[1;36mCore workflow\x1b[0m\n",
    "  init             Start a bx project; writes an empty bx.toml.\n",
    "  add / rm         Declare or drop packages; bx.lock and the profile follow.\n",
    "  install          Converge the profile onto bx.toml (run after clone or drift).\n",
    "  status           Check whether bx.toml, bx.lock, and the profile still agree.\n\n",
    "\x1b[1;36mRemote\x1b[0m\n",
    "  sync             Manage mutagen file-sync sessions.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = BX_BEFORE_HELP,
    help_template = BX_HELP_TEMPLATE
)]
pub struct BxCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Start a bx project: writes an empty bx.toml.")]
    Init,
    #[command(
        about = "Declare packages and install them into the project profile.",
        override_usage = "bx add <PACKAGE[@VERSION]> [PACKAGE ...]"
    )]
    Add(PackageArgs),
    #[command(
        about = "Drop packages from bx.toml and the project profile.",
        visible_alias = "remove",
        override_usage = "bx rm <NAME> [NAME ...]"
    )]
    Rm(PackageArgs),
    #[command(about = "Install declared packages and remove everything else from the profile.")]
    Install,
    #[command(about = "Report whether bx.toml, bx.lock, and the profile agree (read-only).")]
    Status,
    /// Manage mutagen file-sync sessions.
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    #[arg(value_name = "PACKAGE", required = true)]
    pub packages: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    #[command(about = "Create a sync session between two endpoints.")]
    Create(SyncCreateArgs),
    #[command(about = "List sync sessions (all, or the named ones).")]
    List(SessionNames),
    #[command(about = "Pause sync sessions.")]
    Pause(SessionNames),
    #[command(about = "Resume paused sync sessions.")]
    Resume(SessionNames),
    #[command(about = "Wait for a full synchronization cycle.")]
    Flush(SessionNames),
    #[command(about = "Reset the synchronization history of sessions.")]
    Reset(SessionNames),
    #[command(about = "Terminate sync sessions, by name or by label.")]
    Terminate(SyncTerminateArgs),
}

#[derive(Args, Debug)]
pub struct SessionNames {
    #[arg(value_name = "SESSION")]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SyncCreateArgs {
    #[arg(value_name = "ALPHA", help = "Local path, or [user@]host:path")]
    pub alpha: String,
    #[arg(value_name = "BETA", help = "Local path, or [user@]host:path")]
    pub beta: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, help = "Create the session paused")]
    pub paused: bool,
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
    #[arg(long, value_enum, default_value_t = SyncModeArg::TwoWayResolved)]
    pub sync_mode: SyncModeArg,
    #[arg(long, help = "Skip version-control directories")]
    pub ignore_vcs: bool,
}

#[derive(Args, Debug)]
pub struct SyncTerminateArgs {
    #[arg(value_name = "SESSION")]
    pub names: Vec<String>,
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SyncModeArg {
    TwoWaySafe,
    TwoWayResolved,
    OneWaySafe,
    OneWayReplica,
}

impl From<SyncModeArg> for SyncMode {
    fn from(arg: SyncModeArg) -> Self {
        match arg {
            SyncModeArg::TwoWaySafe => SyncMode::TwoWaySafe,
            SyncModeArg::TwoWayResolved => SyncMode::TwoWayResolved,
            SyncModeArg::OneWaySafe => SyncMode::OneWaySafe,
            SyncModeArg::OneWayReplica => SyncMode::OneWayReplica,
        }
    }
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

/// Splits `[user@]host:path` into its address and path. Anything without a
/// host part, including Windows drive paths, is a local path.
pub fn split_endpoint(raw: &str) -> (Option<String>, String) {
    match raw.split_once(':') {
        Some((address, path)) if address.len() > 1 && !address.contains('/') => {
            (Some(address.to_string()), path.to_string())
        }
        _ => (None, raw.to_string()),
    }
}
