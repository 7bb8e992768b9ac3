pub(crate) mod effects;
mod errors;
pub(crate) mod process;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use errors::{
    format_status_message, is_missing_project_error, missing_project_outcome, to_json_response,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandGroup {
    Init,
    Add,
    Remove,
    Install,
    Status,
    Sync,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandGroup::Init => "init",
            CommandGroup::Add => "add",
            CommandGroup::Remove => "rm",
            CommandGroup::Install => "install",
            CommandGroup::Status => "status",
            CommandGroup::Sync => "sync",
        };
        f.write_str(name)
    }
}
