use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use bx_domain::{LockedPackage, PackageError, PackageReference};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use super::{parse_profile_listing, ProfileItem};
use crate::effects::{PackageStore, ProcessRunner};
use crate::process::RunOutput;

const EXPERIMENTAL_FEATURES: [&str; 2] = ["--extra-experimental-features", "nix-command flakes"];
const NIXPKGS: &str = "nixpkgs";
const EVAL_APPLY: &str = r#"p: { version = p.version or ""; outPath = p.outPath; }"#;

/// A [`PackageStore`] driving `nix profile` and friends.
pub struct NixProfileStore {
    nix: PathBuf,
    platform: String,
    runner: Arc<dyn ProcessRunner>,
    nixpkgs: OnceLock<FlakePin>,
}

/// The locked revision every unpinned package resolves against.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FlakePin {
    url: String,
    last_modified: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlakeMetadata {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    resolved_url: Option<String>,
    #[serde(default)]
    last_modified: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvalResult {
    #[serde(default)]
    version: String,
    out_path: String,
}

impl NixProfileStore {
    pub fn new(nix: PathBuf, platform: String, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            nix,
            platform,
            runner,
            nixpkgs: OnceLock::new(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<RunOutput> {
        let mut argv: Vec<String> = EXPERIMENTAL_FEATURES.iter().map(ToString::to_string).collect();
        argv.extend(args.iter().map(ToString::to_string));
        let program = self.nix.to_string_lossy();
        self.runner.run(&program, &argv, &[], Path::new("."))
    }

    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(PackageError::external("nix", output.code, &output.combined()).into())
        }
    }

    fn nixpkgs_pin(&self) -> Result<FlakePin> {
        if let Some(pin) = self.nixpkgs.get() {
            return Ok(pin.clone());
        }
        let raw = self.run_checked(&["flake", "metadata", "--json", NIXPKGS])?;
        let metadata: FlakeMetadata =
            serde_json::from_str(&raw).context("invalid `nix flake metadata` output")?;
        let url = metadata
            .url
            .or(metadata.resolved_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow::anyhow!("`nix flake metadata {NIXPKGS}` reported no url"))?;
        let pin = FlakePin {
            url,
            last_modified: metadata.last_modified,
        };
        debug!(url = %pin.url, "pinned nixpkgs");
        Ok(self.nixpkgs.get_or_init(|| pin).clone())
    }

    fn evaluate(&self, installable: &str) -> Result<Option<EvalResult>> {
        let output = self.run(&["eval", "--json", installable, "--apply", EVAL_APPLY])?;
        if output.success() {
            let result = serde_json::from_str(&output.stdout)
                .with_context(|| format!("invalid `nix eval` output for {installable}"))?;
            return Ok(Some(result));
        }
        let combined = output.combined();
        if is_missing_attribute(&combined) {
            debug!(installable, "package not found in flake");
            return Ok(None);
        }
        Err(PackageError::external("nix", output.code, &combined).into())
    }
}

fn is_missing_attribute(output: &str) -> bool {
    output.contains("does not provide attribute")
        || (output.contains("attribute '") && output.contains("' missing"))
}

/// The flake part of an installable, without the `#attr` fragment.
fn flake_ref(installable: &str) -> &str {
    installable
        .split_once('#')
        .map_or(installable, |(flake, _)| flake)
}

/// Hash part of `/nix/store/<hash>-<name>`.
fn store_hash(out_path: &str) -> String {
    let file = out_path.rsplit('/').next().unwrap_or(out_path);
    file.split_once('-')
        .map_or(file, |(hash, _)| hash)
        .to_string()
}

fn format_timestamp(seconds: Option<i64>) -> Result<String> {
    let Some(seconds) = seconds else {
        return Ok(String::new());
    };
    let stamp = OffsetDateTime::from_unix_timestamp(seconds)
        .with_context(|| format!("invalid timestamp {seconds}"))?;
    stamp
        .format(&Rfc3339)
        .context("failed to format timestamp")
}

impl PackageStore for NixProfileStore {
    fn list(&self, profile: &Path) -> Result<Vec<ProfileItem>> {
        if profile.symlink_metadata().is_err() {
            return Ok(Vec::new());
        }
        let profile = profile.to_string_lossy();
        let raw = self.run_checked(&["profile", "list", "--json", "--profile", &profile])?;
        parse_profile_listing(&raw)
    }

    fn install(&self, profile: &Path, installable: &str) -> Result<()> {
        if let Some(parent) = profile.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let profile = profile.to_string_lossy();
        self.run_checked(&["profile", "install", "--profile", &profile, installable])?;
        Ok(())
    }

    fn remove_by_index(&self, profile: &Path, item: &ProfileItem) -> Result<()> {
        let profile = profile.to_string_lossy();
        self.run_checked(&["profile", "remove", "--profile", &profile, &item.selector])?;
        Ok(())
    }

    fn resolve(&self, reference: &PackageReference) -> Result<Option<LockedPackage>> {
        let (installable, last_modified) = if reference.is_flake() {
            (reference.raw().to_string(), None)
        } else {
            let pin = self.nixpkgs_pin()?;
            (
                format!("{}#{}", pin.url, reference.canonical_name()),
                pin.last_modified,
            )
        };
        let Some(result) = self.evaluate(&installable)? else {
            return Ok(None);
        };
        if !reference.accepts_version(&result.version) {
            debug!(
                package = %reference,
                available = %result.version,
                "requested version not available"
            );
            return Ok(None);
        }
        let mut store_paths = BTreeMap::new();
        store_paths.insert(self.platform.clone(), result.out_path.clone());
        Ok(Some(LockedPackage {
            resolved: installable,
            version: result.version,
            content_hash: store_hash(&result.out_path),
            store_paths,
            last_modified: format_timestamp(last_modified)?,
        }))
    }

    fn prefetch(&self, installable: &str) -> Result<()> {
        self.run_checked(&["flake", "prefetch", flake_ref(installable)])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Replies to nix invocations by matching on the first argument after
    /// the feature flags.
    #[derive(Default)]
    struct ScriptedNix {
        calls: Mutex<Vec<Vec<String>>>,
        replies: Vec<(&'static str, RunOutput)>,
    }

    impl ScriptedNix {
        fn reply(mut self, verb: &'static str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.replies.push((
                verb,
                RunOutput {
                    code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            ));
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for ScriptedNix {
        fn run(
            &self,
            _program: &str,
            args: &[String],
            _envs: &[(String, String)],
            _cwd: &Path,
        ) -> Result<RunOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            let verb = format!("{} {}", args[2], args[3]);
            Ok(self
                .replies
                .iter()
                .find(|(prefix, _)| verb.starts_with(prefix))
                .map(|(_, output)| output.clone())
                .unwrap_or_default())
        }

        fn run_exact_env(
            &self,
            program: &str,
            args: &[String],
            envs: &[(String, String)],
            cwd: &Path,
        ) -> Result<RunOutput> {
            self.run(program, args, envs, cwd)
        }
    }

    fn store(runner: Arc<ScriptedNix>) -> NixProfileStore {
        NixProfileStore::new(PathBuf::from("nix"), "x86_64-linux".into(), runner)
    }

    const METADATA: &str =
        r#"{"url": "github:NixOS/nixpkgs/abc", "lastModified": 1704164645}"#;

    #[test]
    fn resolve_pins_against_locked_nixpkgs() -> Result<()> {
        let runner = Arc::new(
            ScriptedNix::default()
                .reply("flake metadata", 0, METADATA, "")
                .reply(
                    "eval --json",
                    0,
                    r#"{"version": "2.12.1", "outPath": "/nix/store/aaa-hello-2.12.1"}"#,
                    "",
                ),
        );
        let store = store(runner.clone());
        let locked = store
            .resolve(&PackageReference::parse("hello@2.12"))?
            .expect("resolved");
        assert_eq!(locked.resolved, "github:NixOS/nixpkgs/abc#hello");
        assert_eq!(locked.version, "2.12.1");
        assert_eq!(locked.content_hash, "aaa");
        assert_eq!(locked.last_modified, "2024-01-02T03:04:05Z");
        assert_eq!(
            locked.store_paths.get("x86_64-linux").map(String::as_str),
            Some("/nix/store/aaa-hello-2.12.1")
        );

        store.resolve(&PackageReference::parse("hello"))?;
        let metadata_calls = runner
            .calls()
            .iter()
            .filter(|args| args[2] == "flake" && args[3] == "metadata")
            .count();
        assert_eq!(metadata_calls, 1);
        Ok(())
    }

    #[test]
    fn resolve_rejects_unavailable_version() -> Result<()> {
        let runner = Arc::new(
            ScriptedNix::default()
                .reply("flake metadata", 0, METADATA, "")
                .reply(
                    "eval --json",
                    0,
                    r#"{"version": "2.12.1", "outPath": "/nix/store/aaa-hello-2.12.1"}"#,
                    "",
                ),
        );
        let store = store(runner);
        assert!(store.resolve(&PackageReference::parse("hello@2.10"))?.is_none());
        assert!(store.resolve(&PackageReference::parse("hello@2.1"))?.is_none());
        assert!(store.resolve(&PackageReference::parse("hello@2"))?.is_some());
        Ok(())
    }

    #[test]
    fn missing_attribute_is_not_found() -> Result<()> {
        let runner = Arc::new(
            ScriptedNix::default()
                .reply("flake metadata", 0, METADATA, "")
                .reply(
                    "eval --json",
                    1,
                    "",
                    "error: flake 'github:NixOS/nixpkgs/abc' does not provide attribute 'packages.x86_64-linux.nope'",
                ),
        );
        assert!(store(runner).resolve(&PackageReference::parse("nope"))?.is_none());
        Ok(())
    }

    #[test]
    fn failing_command_carries_trimmed_output() {
        let runner = Arc::new(ScriptedNix::default().reply(
            "profile install",
            1,
            "",
            "\nerror: cannot connect to daemon\n",
        ));
        let err = store(runner)
            .install(Path::new("/tmp/bx-test-profile"), "nixpkgs#hello")
            .unwrap_err();
        assert_eq!(err.to_string(), "error: cannot connect to daemon");
        assert!(err.downcast_ref::<PackageError>().is_some());
    }

    #[test]
    fn missing_profile_lists_empty_without_calling_nix() -> Result<()> {
        let runner = Arc::new(ScriptedNix::default());
        let dir = tempfile::tempdir()?;
        let items = store(runner.clone()).list(&dir.path().join("profile"))?;
        assert!(items.is_empty());
        assert!(runner.calls().is_empty());
        Ok(())
    }

    #[test]
    fn removal_and_prefetch_arguments() -> Result<()> {
        let runner = Arc::new(ScriptedNix::default());
        let store = store(runner.clone());
        let item = ProfileItem {
            index: 3,
            selector: "3".into(),
            ..ProfileItem::default()
        };
        store.remove_by_index(Path::new("/p"), &item)?;
        store.prefetch("github:NixOS/nixpkgs/abc#hello")?;
        let calls = runner.calls();
        assert_eq!(
            calls[0],
            vec![
                "--extra-experimental-features",
                "nix-command flakes",
                "profile",
                "remove",
                "--profile",
                "/p",
                "3"
            ]
        );
        assert_eq!(calls[1][2..], ["flake", "prefetch", "github:NixOS/nixpkgs/abc"]);
        Ok(())
    }

    #[test]
    fn store_hash_is_first_name_segment() {
        assert_eq!(store_hash("/nix/store/aaa-hello-2.12.1"), "aaa");
        assert_eq!(store_hash("plain"), "plain");
    }
}
