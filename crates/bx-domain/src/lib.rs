#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod errors;
pub mod fs;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod project;
pub mod state;

pub use errors::PackageError;
pub use lockfile::{
    load_lockfile, load_lockfile_optional, parse_lockfile, render_lockfile, save_lockfile,
    LockedPackage, Lockfile, PackageResolver, LOCKFILE_NAME, LOCK_VERSION,
};
pub use manifest::{manifest_fingerprint, ManifestEditor, MANIFEST_FILE};
pub use package::{
    effective_packages, find_by_canonical_name, PackageReference, ResolvedIdentity,
};
pub use project::{
    current_project_root, discover_project_root, discover_project_root_from, ProjectPaths,
    MISSING_PROJECT_HINT, MISSING_PROJECT_MESSAGE,
};
pub use state::{ProjectStateKind, ProjectStateReport};
