#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use serde_json::Value;
use tempfile::TempDir;
use toml_edit::DocumentMut;

/// Stands in for `nix`. Knows three packages, keeps the profile as a
/// `name version flake` file next to the profile link, and bumps a
/// generation link on every change like `nix profile` does.
const FAKE_NIX: &str = r#"#!/bin/sh
shift 2
echo "$*" >> "$FAKE_NIX_LOG"

known() {
    case "$1" in
        hello) echo "2.12.1" ;;
        jq) echo "1.7.1" ;;
        ripgrep) echo "14.1.0" ;;
        redis) echo "7.2.4" ;;
        *) return 1 ;;
    esac
}

bump() {
    gen_file="$1.gen"
    gen=$(( $(cat "$gen_file" 2>/dev/null || echo 0) + 1 ))
    echo "$gen" > "$gen_file"
    mkdir -p "$(dirname "$1")/profile-$gen-link"
    ln -sfn "profile-$gen-link" "$1"
}

case "$1 $2" in
    "flake metadata")
        echo '{"url":"github:NixOS/nixpkgs/0123456789abcdef","lastModified":1704164645}'
        ;;
    "eval --json")
        name="${3##*#}"
        if ! version=$(known "$name"); then
            echo "error: flake 'github:NixOS/nixpkgs/0123456789abcdef' does not provide attribute 'packages.x86_64-linux.$name'" >&2
            exit 1
        fi
        printf '{"version":"%s","outPath":"/nix/store/fakehash-%s-%s"}\n' "$version" "$name" "$version"
        ;;
    "profile list")
        state="$5.elements"
        printf '{"elements":{'
        sep=""
        if [ -f "$state" ]; then
            while read -r name version flake; do
                printf '%s"%s":{"attrPath":"legacyPackages.x86_64-linux.%s","originalUrl":"%s","url":"%s","storePaths":["/nix/store/fakehash-%s-%s"]}' \
                    "$sep" "$name" "$name" "$flake" "$flake" "$name" "$version"
                sep=","
            done < "$state"
        fi
        printf '},"version":3}\n'
        ;;
    "profile install")
        profile="$4"
        name="${5##*#}"
        flake="${5%%#*}"
        if [ "$name" = "$FAKE_NIX_FAIL" ]; then
            echo "error: build of '$name' failed" >&2
            exit 1
        fi
        if ! version=$(known "$name"); then
            echo "error: cannot find flake attribute '$5'" >&2
            exit 1
        fi
        echo "$name $version $flake" >> "$profile.elements"
        bump "$profile"
        ;;
    "profile remove")
        profile="$4"
        grep -v "^$5 " "$profile.elements" > "$profile.elements.tmp" || true
        mv "$profile.elements.tmp" "$profile.elements"
        bump "$profile"
        ;;
    "flake prefetch")
        ;;
    *)
        echo "fake nix: unsupported command: $*" >&2
        exit 1
        ;;
esac
"#;

/// Stands in for `mutagen`: logs its arguments and reports one session.
const FAKE_MUTAGEN: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_MUTAGEN_LOG"
case "$1 $2" in
    "sync list")
        case "$*" in
            *missing*)
                echo "Error: unable to locate requested sessions" >&2
                exit 1
                ;;
        esac
        echo '[{"identifier":"sync_1","name":"web","alpha":{"protocol":"local","path":"/src","connected":true},"beta":{"protocol":"ssh","host":"box","path":"/srv","connected":true},"mode":"two-way-resolved","labels":{"team":"infra"},"paused":false,"status":"watching","successfulCycles":3}]'
        ;;
esac
"#;

/// A scratch directory holding a project dir plus the fake tools and
/// their call logs.
pub struct Sandbox {
    _temp: TempDir,
    pub project: PathBuf,
    tools: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("bx-cli")
            .tempdir()
            .expect("tempdir");
        let project = temp.path().join("project");
        let tools = temp.path().join("tools");
        fs::create_dir_all(&project).expect("project dir");
        fs::create_dir_all(&tools).expect("tools dir");
        write_executable(&tools.join("nix"), FAKE_NIX);
        write_executable(&tools.join("mutagen"), FAKE_MUTAGEN);
        Self {
            _temp: temp,
            project,
            tools,
        }
    }

    /// `bx` running in the project with the fake tools and without
    /// spinners or ANSI colors.
    pub fn bx(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("bx");
        cmd.current_dir(&self.project)
            .env("BX_NIX_BIN", self.tools.join("nix"))
            .env("BX_MUTAGEN_BIN", self.tools.join("mutagen"))
            .env("BX_PLATFORM", "x86_64-linux")
            .env("BX_PREFETCH", "0")
            .env("BX_PROGRESS", "0")
            .env("NO_COLOR", "1")
            .env("FAKE_NIX_LOG", self.nix_log_path())
            .env("FAKE_MUTAGEN_LOG", self.tools.join("mutagen.log"))
            .env_remove("FAKE_NIX_FAIL");
        cmd
    }

    pub fn init(&self) {
        self.bx().arg("init").assert().success();
    }

    fn nix_log_path(&self) -> PathBuf {
        self.tools.join("nix.log")
    }

    /// Every nix invocation so far, minus the feature flags.
    pub fn nix_calls(&self) -> Vec<String> {
        read_lines(&self.nix_log_path())
    }

    pub fn clear_nix_calls(&self) {
        let _ = fs::remove_file(self.nix_log_path());
    }

    pub fn mutagen_calls(&self) -> Vec<String> {
        read_lines(&self.tools.join("mutagen.log"))
    }

    /// Names currently in the fake profile, in install order.
    pub fn profile_packages(&self) -> Vec<String> {
        read_lines(&self.project.join(".bx/nix/profile.elements"))
            .into_iter()
            .filter_map(|line| line.split_whitespace().next().map(str::to_string))
            .collect()
    }

    pub fn manifest_packages(&self) -> Vec<String> {
        let doc = read_toml(&self.project.join("bx.toml"));
        doc["packages"]
            .as_array()
            .expect("packages array")
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect()
    }

    pub fn lock(&self) -> DocumentMut {
        read_toml(&self.project.join("bx.lock"))
    }

    pub fn write_manifest(&self, packages: &[&str]) {
        let list: Vec<String> = packages.iter().map(|p| format!("\"{p}\"")).collect();
        fs::write(
            self.project.join("bx.toml"),
            format!("packages = [{}]\n", list.join(", ")),
        )
        .expect("write bx.toml");
    }
}

fn write_executable(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn read_toml(path: &Path) -> DocumentMut {
    fs::read_to_string(path)
        .expect("read toml")
        .parse()
        .expect("valid toml")
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
