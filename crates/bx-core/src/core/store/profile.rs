use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::context::ProfileSession;
use crate::effects::FileSystem;

/// Profiles written by pre-flakes Nix carry a `manifest.nix` that
/// `nix profile` refuses to manage. The first caller in a process removes
/// such a profile link so it can be recreated.
pub(crate) fn reset_legacy_profile(
    fs: &dyn FileSystem,
    profile: &Path,
    session: &ProfileSession,
) -> Result<bool> {
    if !session.claim_legacy_reset_check() {
        return Ok(false);
    }
    if !profile.join("manifest.nix").exists() {
        return Ok(false);
    }
    warn!(profile = %profile.display(), "resetting legacy nix profile");
    fs.remove_file(profile)?;
    Ok(true)
}

/// Identifies the current profile generation: the target of the profile
/// link, or empty when there is no profile yet.
pub(crate) fn profile_signature(fs: &dyn FileSystem, profile: &Path) -> String {
    match fs.read_link(profile) {
        Ok(target) => target.display().to_string(),
        Err(err) => {
            debug!(profile = %profile.display(), %err, "no profile generation");
            String::new()
        }
    }
}

pub(crate) fn profile_bin_dir(profile: &Path) -> PathBuf {
    profile.join("bin")
}
