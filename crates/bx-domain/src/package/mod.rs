//! Package references as users write them in `bx.toml`.

mod reference;

pub use reference::{
    effective_packages, find_by_canonical_name, PackageReference, ResolvedIdentity,
};
