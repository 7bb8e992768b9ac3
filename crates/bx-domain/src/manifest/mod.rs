//! `bx.toml` reading and editing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use toml_edit::{Array, DocumentMut, Item, Value as TomlValue};

use crate::fs::write_atomic;

pub const MANIFEST_FILE: &str = "bx.toml";

/// Order-sensitive digest of the declared package list.
///
/// Declaration order is install priority, so reordering counts as a change.
pub fn manifest_fingerprint(packages: &[String]) -> String {
    let mut hasher = Sha256::new();
    for package in packages {
        hasher.update(package.trim().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Edits the `packages` array of a manifest while keeping the rest of the
/// document (comments, other keys) as written.
///
/// Edits stay in memory until [`ManifestEditor::save`].
#[derive(Debug)]
pub struct ManifestEditor {
    path: PathBuf,
    doc: DocumentMut,
    packages: Vec<String>,
}

impl ManifestEditor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            bail!("{} not found", path.display());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let packages = read_packages(&doc)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(Self {
            path,
            doc,
            packages,
        })
    }

    /// Starts an empty manifest at `path`; nothing is written until `save`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            doc: DocumentMut::new(),
            packages: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.packages.iter().any(|existing| existing == raw)
    }

    pub fn push(&mut self, raw: impl Into<String>) {
        self.packages.push(raw.into());
    }

    /// Removes every entry equal to `raw`. Returns whether anything changed.
    pub fn remove(&mut self, raw: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|existing| existing != raw);
        before != self.packages.len()
    }

    pub fn save(&mut self) -> Result<()> {
        let mut array = Array::new();
        for package in &self.packages {
            let mut value = TomlValue::from(package.as_str());
            value.decor_mut().set_prefix("\n    ");
            array.push_formatted(value);
        }
        array.set_trailing_comma(!self.packages.is_empty());
        array.set_trailing(if self.packages.is_empty() { "" } else { "\n" });
        self.doc
            .insert("packages", Item::Value(TomlValue::Array(array)));
        write_atomic(&self.path, self.doc.to_string().as_bytes())
    }
}

fn read_packages(doc: &DocumentMut) -> Result<Vec<String>> {
    let Some(item) = doc.get("packages") else {
        return Ok(Vec::new());
    };
    let Some(array) = item.as_array() else {
        bail!("`packages` must be an array of strings");
    };
    array
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(|raw| raw.trim().to_string())
                .context("`packages` entries must be strings")
        })
        .collect()
}
