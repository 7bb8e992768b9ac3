use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectStateKind {
    Uninitialized,
    InitializedEmpty,
    NeedsLock,
    NeedsProfile,
    Consistent,
}

impl ProjectStateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStateKind::Uninitialized => "uninitialized",
            ProjectStateKind::InitializedEmpty => "initialized-empty",
            ProjectStateKind::NeedsLock => "needs-lock",
            ProjectStateKind::NeedsProfile => "needs-profile",
            ProjectStateKind::Consistent => "consistent",
        }
    }
}

fn canonical_state(
    manifest_exists: bool,
    lock_clean: bool,
    profile_clean: bool,
    packages_empty: bool,
) -> ProjectStateKind {
    if !manifest_exists {
        ProjectStateKind::Uninitialized
    } else if !lock_clean {
        ProjectStateKind::NeedsLock
    } else if !profile_clean {
        ProjectStateKind::NeedsProfile
    } else if packages_empty {
        ProjectStateKind::InitializedEmpty
    } else {
        ProjectStateKind::Consistent
    }
}

/// Read-only classification of a project from its manifest, lockfile and
/// profile.
#[derive(Clone, Debug)]
pub struct ProjectStateReport {
    pub manifest_exists: bool,
    pub lock_exists: bool,
    pub lock_clean: bool,
    pub profile_clean: bool,
    pub packages_empty: bool,
    pub canonical: ProjectStateKind,
    pub pending: Vec<String>,
    pub extras: Vec<String>,
}

impl ProjectStateReport {
    pub fn new(
        manifest_exists: bool,
        lock_exists: bool,
        lock_clean: bool,
        packages_empty: bool,
        pending: Vec<String>,
        extras: Vec<String>,
    ) -> Self {
        let profile_clean = pending.is_empty() && extras.is_empty();
        let canonical = canonical_state(manifest_exists, lock_clean, profile_clean, packages_empty);
        Self {
            manifest_exists,
            lock_exists,
            lock_clean,
            profile_clean,
            packages_empty,
            canonical,
            pending,
            extras,
        }
    }

    pub fn is_consistent(&self) -> bool {
        matches!(
            self.canonical,
            ProjectStateKind::Consistent | ProjectStateKind::InitializedEmpty
        )
    }

    pub fn flags_json(&self) -> Value {
        json!({
            "manifest_exists": self.manifest_exists,
            "lock_exists": self.lock_exists,
            "lock_clean": self.lock_clean,
            "profile_clean": self.profile_clean,
            "packages_empty": self.packages_empty,
            "consistent": self.is_consistent(),
        })
    }
}
