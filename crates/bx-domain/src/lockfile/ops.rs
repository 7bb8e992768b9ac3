use std::collections::BTreeSet;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::PackageError;
use crate::manifest::manifest_fingerprint;
use crate::package::{effective_packages, PackageReference};

use super::io::render_lockfile;
use super::types::{LockedPackage, Lockfile, PackageResolver};

impl Lockfile {
    /// Entry for `reference`, matching the raw key first and then the
    /// versioned form so `hello` and `hello@latest` share a pin.
    pub fn entry_for(&self, reference: &PackageReference) -> Option<&LockedPackage> {
        self.packages
            .get(reference.raw())
            .or_else(|| self.packages.get(&reference.versioned()))
    }

    pub fn contains(&self, reference: &PackageReference) -> bool {
        self.entry_for(reference).is_some()
    }

    pub fn store_path(&self, reference: &PackageReference, platform: &str) -> Option<&str> {
        self.entry_for(reference)
            .and_then(|entry| entry.store_paths.get(platform))
            .map(String::as_str)
    }

    /// True when the lockfile was written for exactly this declared list
    /// and pins every package that takes effect from it.
    pub fn is_up_to_date(&self, declared: &[String]) -> bool {
        let expected = manifest_fingerprint(declared);
        if self.manifest_fingerprint.as_deref() != Some(expected.as_str()) {
            return false;
        }
        effective_packages(declared)
            .iter()
            .all(|reference| self.packages.contains_key(reference.raw()))
    }

    /// Pins every reference not already present. Stops at the first
    /// reference the resolver reports as unknown.
    pub fn add(&mut self, resolver: &dyn PackageResolver, refs: &[PackageReference]) -> Result<()> {
        for reference in refs {
            if self.packages.contains_key(reference.raw()) {
                continue;
            }
            debug!(package = %reference, "resolving lock entry");
            match resolver.resolve(reference)? {
                Some(locked) => {
                    self.packages.insert(reference.raw().to_string(), locked);
                }
                None => {
                    return Err(PackageError::Resolution {
                        reference: reference.raw().to_string(),
                        reason: "no matching package in the package store".into(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, refs: &[PackageReference]) {
        for reference in refs {
            self.packages.remove(reference.raw());
        }
    }

    /// Drops entries for anything not in effect, including declarations
    /// shadowed by a later one with the same canonical name. Returns the
    /// dropped keys.
    pub fn tidy(&mut self, declared: &[String]) -> Vec<String> {
        let effective = effective_packages(declared);
        let keep: BTreeSet<&str> = effective.iter().map(PackageReference::raw).collect();
        let stale: Vec<String> = self
            .packages
            .keys()
            .filter(|key| !keep.contains(key.as_str()))
            .cloned()
            .collect();
        for key in &stale {
            self.packages.remove(key);
        }
        stale
    }

    /// Records the fingerprint of the declared list this lockfile now
    /// matches.
    pub fn stamp(&mut self, declared: &[String]) {
        self.manifest_fingerprint = Some(manifest_fingerprint(declared));
    }

    /// Hash of the rendered document, as it would be written to disk.
    pub fn content_fingerprint(&self) -> String {
        let rendered = render_lockfile(self);
        hex::encode(Sha256::digest(rendered.as_bytes()))
    }
}
