use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;

use super::mutagen::{MutagenClient, SessionSpec};
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub enum SyncRequest {
    Create(SessionSpec),
    List {
        names: Vec<String>,
    },
    Pause {
        names: Vec<String>,
    },
    Resume {
        names: Vec<String>,
    },
    Flush {
        names: Vec<String>,
    },
    Reset {
        names: Vec<String>,
    },
    Terminate {
        labels: BTreeMap<String, String>,
        names: Vec<String>,
    },
}

/// Runs one mutagen session operation with the configured binary.
pub fn sync_command(ctx: &CommandContext, request: &SyncRequest) -> Result<ExecutionOutcome> {
    let client = MutagenClient::new(ctx.config().tools().mutagen.clone(), ctx.processes());
    let no_env = BTreeMap::new();
    let outcome = match request {
        SyncRequest::Create(spec) => {
            client.create(spec)?;
            ExecutionOutcome::success(
                match spec.name.as_deref() {
                    Some(name) => format!("created sync session {name}"),
                    None => "created sync session".to_string(),
                },
                json!({
                    "alpha": spec.alpha_path,
                    "beta": spec.beta_path,
                    "sync_mode": spec.sync_mode,
                    "paused": spec.paused,
                }),
            )
        }
        SyncRequest::List { names } => {
            let sessions = client.list(&no_env, names)?;
            ExecutionOutcome::success(
                format!("{} sync session(s)", sessions.len()),
                json!({ "sessions": sessions }),
            )
        }
        SyncRequest::Pause { names } => {
            client.pause(names)?;
            changed("paused", names)
        }
        SyncRequest::Resume { names } => {
            client.resume(&no_env, names)?;
            changed("resumed", names)
        }
        SyncRequest::Flush { names } => {
            client.flush(names)?;
            changed("flushed", names)
        }
        SyncRequest::Reset { names } => {
            client.reset(&no_env, names)?;
            changed("reset", names)
        }
        SyncRequest::Terminate { labels, names } => {
            client.terminate(&no_env, labels, names)?;
            changed("terminated", names)
        }
    };
    Ok(outcome)
}

fn changed(verb: &str, names: &[String]) -> ExecutionOutcome {
    let message = if names.is_empty() {
        format!("{verb} sync sessions")
    } else {
        format!("{verb} {}", names.join(", "))
    };
    ExecutionOutcome::success(message, json!({ "sessions": names }))
}
