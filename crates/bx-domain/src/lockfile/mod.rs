pub(crate) mod io;
pub(crate) mod ops;
pub(crate) mod types;

pub use io::{load_lockfile, load_lockfile_optional, parse_lockfile, render_lockfile, save_lockfile};
pub use types::{LockedPackage, Lockfile, PackageResolver, LOCKFILE_NAME, LOCK_VERSION};
