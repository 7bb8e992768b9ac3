use std::collections::BTreeMap;

use anyhow::Result;

use crate::package::PackageReference;

pub const LOCK_VERSION: i64 = 1;
pub const LOCKFILE_NAME: &str = "bx.lock";

/// Pinned identity of one declared package.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockedPackage {
    /// Fully pinned installable, e.g. `github:NixOS/nixpkgs/<rev>#hello`.
    pub resolved: String,
    pub version: String,
    /// Nix system string to output path.
    pub store_paths: BTreeMap<String, String>,
    pub content_hash: String,
    pub last_modified: String,
}

/// In-memory lockfile keyed by the raw reference written in `bx.toml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lockfile {
    pub version: i64,
    pub manifest_fingerprint: Option<String>,
    pub packages: BTreeMap<String, LockedPackage>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            version: LOCK_VERSION,
            manifest_fingerprint: None,
            packages: BTreeMap::new(),
        }
    }
}

/// Authority able to pin a reference to an exact store identity.
///
/// `Ok(None)` means the authority answered and the package does not exist;
/// `Err` is reserved for the authority itself failing.
pub trait PackageResolver {
    fn resolve(&self, reference: &PackageReference) -> Result<Option<LockedPackage>>;
}
