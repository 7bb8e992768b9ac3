//! The Nix profile backing a project, and how its listing is read.

mod nix;
mod profile;

use anyhow::{Context, Result};
use bx_domain::{LockedPackage, Lockfile, PackageReference, PackageResolver, ResolvedIdentity};
use serde::Deserialize;
use serde_json::Value;

use crate::effects::PackageStore;

pub use nix::NixProfileStore;
pub(crate) use profile::{profile_bin_dir, profile_signature, reset_legacy_profile};

/// Lets lockfile operations resolve through a [`PackageStore`].
pub(crate) struct StoreResolver<'a>(pub(crate) &'a dyn PackageStore);

impl PackageResolver for StoreResolver<'_> {
    fn resolve(&self, reference: &PackageReference) -> Result<Option<LockedPackage>> {
        self.0.resolve(reference)
    }
}

/// What to hand `nix profile install` for `reference`: the pinned
/// installable from the lockfile when there is one.
pub(crate) fn installable_for(reference: &PackageReference, lockfile: &Lockfile) -> String {
    match lockfile.entry_for(reference) {
        Some(entry) if !entry.resolved.is_empty() => entry.resolved.clone(),
        _ if reference.is_flake() => reference.raw().to_string(),
        _ => format!("nixpkgs#{}", reference.canonical_name()),
    }
}

/// One element of a profile listing.
///
/// `index` is the element's position in the listing it came from and is
/// only meaningful for that snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileItem {
    pub index: usize,
    /// Argument `nix profile remove` accepts for this element.
    pub selector: String,
    pub name: String,
    pub attr_path: String,
    pub original_url: String,
    pub url: String,
    pub store_paths: Vec<String>,
}

impl ProfileItem {
    /// Name the element is known by: the listing key when there is one,
    /// otherwise the last segment of its attribute path.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.attr_path
            .rsplit('.')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(&self.attr_path)
    }

    /// True when this element is what `identity` points at, comparing the
    /// strongest identity both sides carry.
    pub fn provides(&self, identity: &ResolvedIdentity) -> bool {
        if let Some(path) = &identity.store_path {
            if !self.store_paths.is_empty() {
                return self.store_paths.iter().any(|candidate| candidate == path);
            }
        }
        if let Some(installable) = &identity.installable {
            if !self.attr_path.is_empty() {
                return self.matches_installable(installable);
            }
        }
        self.display_name() == identity.name
    }

    fn matches_installable(&self, installable: &str) -> bool {
        let (flake, fragment) = installable.split_once('#').unwrap_or((installable, ""));
        let same_flake = flake == self.url || flake == self.original_url;
        if !same_flake {
            return false;
        }
        fragment.is_empty()
            || self.attr_path == fragment
            || self.attr_path.ends_with(&format!(".{fragment}"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    #[serde(default)]
    attr_path: Option<String>,
    #[serde(default)]
    original_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    store_paths: Vec<String>,
}

impl RawElement {
    fn into_item(self, index: usize, selector: String, name: String) -> ProfileItem {
        ProfileItem {
            index,
            selector,
            name,
            attr_path: self.attr_path.unwrap_or_default(),
            original_url: self.original_url.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            store_paths: self.store_paths,
        }
    }
}

/// Parses `nix profile list --json`. Older Nix reports `elements` as an
/// array addressed by index; newer Nix reports a map addressed by name.
pub(crate) fn parse_profile_listing(raw: &str) -> Result<Vec<ProfileItem>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Value = serde_json::from_str(raw).context("invalid `nix profile list` output")?;
    let elements = doc.get("elements").cloned().unwrap_or(Value::Null);
    let mut items = Vec::new();
    match elements {
        Value::Array(entries) => {
            for (index, entry) in entries.into_iter().enumerate() {
                let element: RawElement =
                    serde_json::from_value(entry).context("invalid profile element")?;
                items.push(element.into_item(index, index.to_string(), String::new()));
            }
        }
        Value::Object(entries) => {
            for (index, (name, entry)) in entries.into_iter().enumerate() {
                let element: RawElement =
                    serde_json::from_value(entry).context("invalid profile element")?;
                items.push(element.into_item(index, name.clone(), name));
            }
        }
        Value::Null => {}
        other => anyhow::bail!("unexpected profile elements: {other}"),
    }
    Ok(items)
}
