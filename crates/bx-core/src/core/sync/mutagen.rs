use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bx_domain::PackageError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::effects::ProcessRunner;

const PROMPTER_VAR: &str = "MUTAGEN_PROMPTER";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    TwoWaySafe,
    #[default]
    TwoWayResolved,
    OneWaySafe,
    OneWayReplica,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::TwoWaySafe => "two-way-safe",
            SyncMode::TwoWayResolved => "two-way-resolved",
            SyncMode::OneWaySafe => "one-way-safe",
            SyncMode::OneWayReplica => "one-way-replica",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to create one sync session.
#[derive(Clone, Debug, Default)]
pub struct SessionSpec {
    pub alpha_address: Option<String>,
    pub alpha_path: String,
    pub beta_address: Option<String>,
    pub beta_path: String,
    pub name: Option<String>,
    pub paused: bool,
    pub labels: BTreeMap<String, String>,
    pub sync_mode: SyncMode,
    pub ignore_vcs: bool,
    /// Overlaid on the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl SessionSpec {
    pub fn validate(&self) -> Result<()> {
        if self.alpha_path.trim().is_empty() {
            bail!("alpha path is required");
        }
        if self.beta_path.trim().is_empty() {
            bail!("beta path is required");
        }
        if let Some(key) = self.labels.keys().find(|key| key.trim().is_empty()) {
            bail!("invalid empty label key (value {:?})", self.labels[key]);
        }
        Ok(())
    }

    fn endpoint(address: Option<&str>, path: &str) -> String {
        match address.filter(|address| !address.is_empty()) {
            Some(address) => format!("{address}:{path}"),
            None => path.to_string(),
        }
    }

    fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "sync".to_string(),
            "create".to_string(),
            Self::endpoint(self.alpha_address.as_deref(), &self.alpha_path),
            Self::endpoint(self.beta_address.as_deref(), &self.beta_path),
        ];
        if let Some(name) = self.name.as_deref().filter(|name| !name.is_empty()) {
            args.push("--name".into());
            args.push(name.to_string());
        }
        if self.paused {
            args.push("--paused".into());
        }
        for (key, value) in &self.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}"));
        }
        args.push("--sync-mode".into());
        args.push(self.sync_mode.as_str().into());
        if self.ignore_vcs {
            args.push("--ignore-vcs".into());
        }
        args
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    pub protocol: String,
    pub host: String,
    pub path: String,
    pub connected: bool,
}

/// A session as reported by `mutagen sync list --template '{{json .}}'`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub identifier: String,
    pub name: String,
    pub alpha: Endpoint,
    pub beta: Endpoint,
    pub mode: String,
    pub labels: BTreeMap<String, String>,
    pub paused: bool,
    pub status: String,
    pub last_error: String,
    pub successful_cycles: u64,
}

/// `mutagen sync list` exits non-zero when none of the named sessions
/// exist. Mutagen offers no structured signal for this, so the message text
/// is the only way to tell it apart from a real failure.
fn is_no_sessions_output(output: &str) -> bool {
    output.contains("unable to locate requested sessions")
}

/// The child environment: `base` without `MUTAGEN_PROMPTER` (mutagen would
/// treat the invocation as a prompter callback), then `overrides` on top.
pub(crate) fn session_env(
    base: impl IntoIterator<Item = (String, String)>,
    overrides: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut env: BTreeMap<String, String> = base
        .into_iter()
        .filter(|(key, _)| key != PROMPTER_VAR)
        .collect();
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env.into_iter().collect()
}

pub struct MutagenClient<'a> {
    bin: PathBuf,
    runner: &'a dyn ProcessRunner,
    base_env: Vec<(String, String)>,
}

impl<'a> MutagenClient<'a> {
    pub fn new(bin: impl Into<PathBuf>, runner: &'a dyn ProcessRunner) -> Self {
        Self::with_base_env(bin, runner, std::env::vars().collect())
    }

    pub(crate) fn with_base_env(
        bin: impl Into<PathBuf>,
        runner: &'a dyn ProcessRunner,
        base_env: Vec<(String, String)>,
    ) -> Self {
        Self {
            bin: bin.into(),
            runner,
            base_env,
        }
    }

    fn exec(&self, args: &[String], env: &BTreeMap<String, String>) -> Result<String> {
        let env = session_env(self.base_env.iter().cloned(), env);
        debug!(
            args = ?args,
            mutagen_env = ?env.iter().filter(|(key, _)| key.starts_with("MUTAGEN")).collect::<Vec<_>>(),
            "running mutagen"
        );
        let program = self.bin.to_string_lossy();
        let output = self
            .runner
            .run_exact_env(&program, args, &env, Path::new("."))?;
        let combined = output.combined();
        if output.success() {
            Ok(combined)
        } else {
            Err(PackageError::external("mutagen", output.code, &combined).into())
        }
    }

    fn verb(verb: &str, names: &[String]) -> Vec<String> {
        let mut args = vec!["sync".to_string(), verb.to_string()];
        args.extend(names.iter().cloned());
        args
    }

    pub fn create(&self, spec: &SessionSpec) -> Result<()> {
        spec.validate()?;
        self.exec(&spec.create_args(), &spec.env)?;
        Ok(())
    }

    pub fn list(&self, env: &BTreeMap<String, String>, names: &[String]) -> Result<Vec<Session>> {
        let mut args = vec![
            "sync".to_string(),
            "list".to_string(),
            "--template".to_string(),
            "{{json .}}".to_string(),
        ];
        args.extend(names.iter().cloned());
        let output = match self.exec(&args, env) {
            Ok(output) => output,
            Err(err) => {
                let no_sessions = matches!(
                    err.downcast_ref::<PackageError>(),
                    Some(PackageError::ExternalProcess { message, .. }) if is_no_sessions_output(message)
                );
                if no_sessions {
                    return Ok(Vec::new());
                }
                return Err(err);
            }
        };
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(output.trim()).context("invalid `mutagen sync list` output")
    }

    pub fn pause(&self, names: &[String]) -> Result<()> {
        self.exec(&Self::verb("pause", names), &BTreeMap::new())
            .map(drop)
    }

    pub fn resume(&self, env: &BTreeMap<String, String>, names: &[String]) -> Result<()> {
        self.exec(&Self::verb("resume", names), env).map(drop)
    }

    pub fn flush(&self, names: &[String]) -> Result<()> {
        self.exec(&Self::verb("flush", names), &BTreeMap::new())
            .map(drop)
    }

    pub fn reset(&self, env: &BTreeMap<String, String>, names: &[String]) -> Result<()> {
        self.exec(&Self::verb("reset", names), env).map(drop)
    }

    pub fn terminate(
        &self,
        env: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
        names: &[String],
    ) -> Result<()> {
        let mut args = vec!["sync".to_string(), "terminate".to_string()];
        for (key, value) in labels {
            args.push("--label-selector".into());
            args.push(format!("{key}={value}"));
        }
        args.extend(names.iter().cloned());
        self.exec(&args, env).map(drop)
    }
}
