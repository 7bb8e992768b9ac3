use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml_edit::{DocumentMut, Item, Table, Value as TomlValue};

use crate::fs::write_atomic;

use super::types::{LockedPackage, Lockfile, LOCK_VERSION};

pub fn load_lockfile(path: &Path) -> Result<Lockfile> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let doc: DocumentMut = contents
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parse_lock_document(&doc))
}

pub fn parse_lockfile(contents: &str) -> Result<Lockfile> {
    let doc: DocumentMut = contents.parse().context("failed to parse lockfile")?;
    Ok(parse_lock_document(&doc))
}

pub fn load_lockfile_optional(path: &Path) -> Result<Option<Lockfile>> {
    if path.exists() {
        Ok(Some(load_lockfile(path)?))
    } else {
        Ok(None)
    }
}

pub fn save_lockfile(path: &Path, lockfile: &Lockfile) -> Result<()> {
    write_atomic(path, render_lockfile(lockfile).as_bytes())
}

/// Renders the lockfile. Keys come out of `BTreeMap`s, so the output is a
/// pure function of the contents.
pub fn render_lockfile(lockfile: &Lockfile) -> String {
    let mut doc = DocumentMut::new();
    doc.insert("version", Item::Value(TomlValue::from(LOCK_VERSION)));

    let mut metadata = Table::new();
    if let Some(fingerprint) = &lockfile.manifest_fingerprint {
        metadata.insert(
            "manifest_fingerprint",
            Item::Value(TomlValue::from(fingerprint.as_str())),
        );
    }
    doc.insert("metadata", Item::Table(metadata));

    let mut packages = Table::new();
    packages.set_implicit(true);
    for (key, entry) in &lockfile.packages {
        packages.insert(key, Item::Table(render_entry(entry)));
    }
    doc.insert("packages", Item::Table(packages));
    doc.to_string()
}

fn render_entry(entry: &LockedPackage) -> Table {
    let mut table = Table::new();
    table.insert(
        "resolved",
        Item::Value(TomlValue::from(entry.resolved.as_str())),
    );
    table.insert("version", Item::Value(TomlValue::from(entry.version.as_str())));
    if !entry.content_hash.is_empty() {
        table.insert(
            "content_hash",
            Item::Value(TomlValue::from(entry.content_hash.as_str())),
        );
    }
    if !entry.last_modified.is_empty() {
        table.insert(
            "last_modified",
            Item::Value(TomlValue::from(entry.last_modified.as_str())),
        );
    }
    if !entry.store_paths.is_empty() {
        let mut paths = Table::new();
        for (system, path) in &entry.store_paths {
            paths.insert(system, Item::Value(TomlValue::from(path.as_str())));
        }
        table.insert("store_paths", Item::Table(paths));
    }
    table
}

fn parse_lock_document(doc: &DocumentMut) -> Lockfile {
    let version = doc
        .get("version")
        .and_then(Item::as_integer)
        .unwrap_or(LOCK_VERSION);
    let manifest_fingerprint = doc
        .get("metadata")
        .and_then(Item::as_table)
        .and_then(|table| table.get("manifest_fingerprint"))
        .and_then(Item::as_str)
        .map(str::to_string);
    let mut lockfile = Lockfile {
        version,
        manifest_fingerprint,
        ..Lockfile::default()
    };
    if let Some(packages) = doc.get("packages").and_then(Item::as_table) {
        for (key, item) in packages {
            if let Some(table) = item.as_table() {
                lockfile
                    .packages
                    .insert(key.to_string(), parse_entry(table));
            }
        }
    }
    lockfile
}

fn parse_entry(table: &Table) -> LockedPackage {
    let text = |key: &str| {
        table
            .get(key)
            .and_then(Item::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let store_paths = table
        .get("store_paths")
        .and_then(Item::as_table)
        .map(|paths| {
            paths
                .iter()
                .filter_map(|(system, path)| {
                    path.as_str()
                        .map(|path| (system.to_string(), path.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    LockedPackage {
        resolved: text("resolved"),
        version: text("version"),
        store_paths,
        content_hash: text("content_hash"),
        last_modified: text("last_modified"),
    }
}
