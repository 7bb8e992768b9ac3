use std::fmt;

use indexmap::IndexMap;

use crate::errors::PackageError;
use crate::lockfile::Lockfile;

pub const LATEST: &str = "latest";

/// A user-supplied package string split into its identity parts.
///
/// `hello`, `hello@latest` and `hello@2.12.1` share the canonical name
/// `hello`. Flake installables (`github:owner/repo#attr`, `./local#pkg`) are
/// kept whole and never carry a version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageReference {
    raw: String,
    name: String,
    version: Option<String>,
    flake: bool,
}

impl PackageReference {
    /// Parses `raw`. Never fails: anything that does not look like
    /// `name@version` is treated as a bare canonical name.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_flake_installable(trimmed) {
            return Self {
                raw: trimmed.to_string(),
                name: trimmed.to_string(),
                version: None,
                flake: true,
            };
        }
        let (name, version) = match trimmed.rfind('@') {
            Some(idx) if idx > 0 => {
                let version = trimmed[idx + 1..].trim();
                let version = (!version.is_empty()).then(|| version.to_string());
                (trimmed[..idx].to_string(), version)
            }
            _ => (trimmed.to_string(), None),
        };
        Self {
            raw: trimmed.to_string(),
            name,
            version,
            flake: false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn canonical_name(&self) -> &str {
        &self.name
    }

    /// Explicit version, if one was written.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_flake(&self) -> bool {
        self.flake
    }

    /// True when the reference asks for whatever the store currently calls
    /// the newest release.
    pub fn is_latest(&self) -> bool {
        matches!(self.version.as_deref(), None | Some(LATEST))
    }

    /// Whether a store release called `available` satisfies this reference.
    /// A requested version matches whole dot-separated components only, so
    /// `2.1` accepts `2.1` and `2.1.3` but not `2.12.1`.
    pub fn accepts_version(&self, available: &str) -> bool {
        match self.version.as_deref() {
            None | Some(LATEST) => true,
            Some(wanted) => {
                available == wanted
                    || available
                        .strip_prefix(wanted)
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        }
    }

    /// Canonical form with an explicit version (`@latest` when omitted).
    pub fn versioned(&self) -> String {
        if self.flake {
            return self.raw.clone();
        }
        format!(
            "{}@{}",
            self.name,
            self.version.as_deref().unwrap_or(LATEST)
        )
    }

    /// Resolves this reference to the identity the store will report,
    /// looking through the lockfile for pinned store paths.
    pub fn identity(&self, lockfile: &Lockfile, platform: &str) -> ResolvedIdentity {
        let locked = lockfile.entry_for(self);
        ResolvedIdentity {
            store_path: locked.and_then(|entry| entry.store_paths.get(platform).cloned()),
            installable: locked
                .map(|entry| entry.resolved.clone())
                .filter(|resolved| !resolved.is_empty())
                .or_else(|| self.flake.then(|| self.raw.clone())),
            name: self.name.clone(),
            version: if self.is_latest() {
                None
            } else {
                self.version.clone()
            },
        }
    }

    /// Two references are equal when they resolve to the same store
    /// identity, not when their raw strings match.
    pub fn equals(&self, other: &Self, lockfile: &Lockfile, platform: &str) -> bool {
        self.identity(lockfile, platform)
            .same_as(&other.identity(lockfile, platform))
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_flake_installable(raw: &str) -> bool {
    raw.contains(':')
        || raw.contains('#')
        || raw.starts_with('/')
        || raw.starts_with("./")
        || raw.starts_with("../")
}

/// What a reference points at once pins are taken into account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub store_path: Option<String>,
    pub installable: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

impl ResolvedIdentity {
    /// Compares the strongest identity both sides carry: store path, then
    /// installable, then canonical name plus requested version.
    pub fn same_as(&self, other: &Self) -> bool {
        if let (Some(left), Some(right)) = (&self.store_path, &other.store_path) {
            return left == right;
        }
        if let (Some(left), Some(right)) = (&self.installable, &other.installable) {
            return left == right;
        }
        if self.name != other.name {
            return false;
        }
        match (&self.version, &other.version) {
            (Some(left), Some(right)) => left == right,
            _ => true,
        }
    }
}

/// Collapses declarations that share a canonical name. The later
/// declaration wins but keeps the position of the first one, so
/// `[a@1, b@2, a@2]` becomes `[a@2, b@2]`.
pub fn effective_packages<S: AsRef<str>>(declared: &[S]) -> Vec<PackageReference> {
    let mut by_name: IndexMap<String, PackageReference> = IndexMap::new();
    for raw in declared {
        let reference = PackageReference::parse(raw.as_ref());
        if reference.raw().is_empty() {
            continue;
        }
        by_name.insert(reference.canonical_name().to_string(), reference);
    }
    by_name.into_values().collect()
}

/// Finds the declared entry matching `name` either exactly or by canonical
/// name. More than one distinct match is an error rather than a guess.
pub fn find_by_canonical_name<S: AsRef<str>>(
    declared: &[S],
    name: &str,
) -> Result<Option<String>, PackageError> {
    let query = name.trim();
    let mut matches: Vec<String> = Vec::new();
    for raw in declared {
        let reference = PackageReference::parse(raw.as_ref());
        if (reference.raw() == query || reference.canonical_name() == query)
            && !matches.iter().any(|existing| existing == reference.raw())
        {
            matches.push(reference.raw().to_string());
        }
    }
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(PackageError::AmbiguousMatch {
            name: query.to_string(),
            matches,
        }),
    }
}
