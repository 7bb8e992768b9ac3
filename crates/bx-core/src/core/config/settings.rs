use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::flag_value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub(crate) fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) tools: ToolsConfig,
    pub(crate) store: StoreConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        Self {
            tools: ToolsConfig {
                nix: snapshot
                    .non_empty("BX_NIX_BIN")
                    .map(PathBuf::from)
                    .or_else(|| which::which("nix").ok())
                    .unwrap_or_else(|| PathBuf::from("nix")),
                mutagen: snapshot
                    .non_empty("BX_MUTAGEN_BIN")
                    .map(PathBuf::from)
                    .or_else(|| which::which("mutagen").ok())
                    .unwrap_or_else(cached_mutagen_path),
            },
            store: StoreConfig {
                platform: snapshot
                    .non_empty("BX_PLATFORM")
                    .map_or_else(host_platform, ToOwned::to_owned),
                prefetch: snapshot.var("BX_PREFETCH").is_none_or(flag_value),
            },
        }
    }

    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    pub fn store(&self) -> &StoreConfig {
        &self.store
    }
}

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub nix: PathBuf,
    pub mutagen: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Nix system string, e.g. `x86_64-linux`.
    pub platform: String,
    pub prefetch: bool,
}

fn cached_mutagen_path() -> PathBuf {
    dirs_next::cache_dir().map_or_else(
        || PathBuf::from("mutagen"),
        |dir| dir.join("bx").join("mutagen").join("bin").join("mutagen"),
    )
}

pub(crate) fn host_platform() -> String {
    let os = match env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{os}", env::consts::ARCH)
}
