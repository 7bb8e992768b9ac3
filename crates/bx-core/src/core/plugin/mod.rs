//! Built-in plugins: per-package state directories, readmes, and the
//! wrapper launchers generated from the profile's `bin/`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use bx_domain::fs::write_atomic;
use bx_domain::{PackageReference, ProjectPaths};
use tracing::{debug, info};

use crate::core::store::profile_bin_dir;
use crate::effects::PluginNotifier;

struct PluginSpec {
    name: &'static str,
    readme: &'static str,
}

const PLUGINS: &[PluginSpec] = &[
    PluginSpec {
        name: "mariadb",
        readme: "mariadb keeps its data under .bx/virtenv/mariadb. \
                 Run `mysql_install_db --datadir=.bx/virtenv/mariadb/data` once, \
                 then start the server with `mysqld_safe`.",
    },
    PluginSpec {
        name: "nginx",
        readme: "nginx reads its configuration from .bx/virtenv/nginx. \
                 Start it with `nginx -p .bx/virtenv/nginx -c nginx.conf`.",
    },
    PluginSpec {
        name: "php",
        readme: "php looks for extra ini files in .bx/virtenv/php. \
                 Set PHPRC to that directory to pick them up.",
    },
    PluginSpec {
        name: "postgresql",
        readme: "postgresql keeps its cluster under .bx/virtenv/postgresql. \
                 Run `initdb -D .bx/virtenv/postgresql/data` once, \
                 then `pg_ctl -D .bx/virtenv/postgresql/data start`.",
    },
    PluginSpec {
        name: "redis",
        readme: "redis keeps its dump under .bx/virtenv/redis. \
                 Start it with `redis-server --dir .bx/virtenv/redis`.",
    },
];

fn plugin_for(reference: &PackageReference) -> Option<&'static PluginSpec> {
    PLUGINS
        .iter()
        .find(|plugin| plugin.name == reference.canonical_name())
}

/// The plugin set shipped with `bx`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPlugins;

impl PluginNotifier for BuiltinPlugins {
    fn on_packages_changed(
        &self,
        paths: &ProjectPaths,
        declared: &[PackageReference],
    ) -> Result<()> {
        for plugin in declared.iter().filter_map(plugin_for) {
            let dir = paths.plugin_dir(plugin.name);
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let written = regenerate_wrappers(&profile_bin_dir(&paths.profile), &paths.wrappers_bin)?;
        debug!(count = written, "regenerated wrappers");
        let pruned = remove_invalid_symlinks(&paths.virtenv)?;
        if pruned > 0 {
            debug!(count = pruned, "pruned dangling symlinks");
        }
        Ok(())
    }

    fn remove(&self, paths: &ProjectPaths, packages: &[PackageReference]) -> Result<()> {
        for plugin in packages.iter().filter_map(plugin_for) {
            let dir = paths.plugin_dir(plugin.name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => info!(plugin = plugin.name, "removed plugin state"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {}", dir.display()))
                }
            }
        }
        Ok(())
    }

    fn print_readme(&self, package: &PackageReference) -> Option<String> {
        plugin_for(package).map(|plugin| plugin.readme.to_string())
    }
}

/// Rewrites `wrappers` to hold one launcher per executable in `bin`.
fn regenerate_wrappers(bin: &Path, wrappers: &Path) -> Result<usize> {
    match fs::remove_dir_all(wrappers) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to clear {}", wrappers.display()))
        }
    }
    fs::create_dir_all(wrappers)
        .with_context(|| format!("failed to create {}", wrappers.display()))?;
    let entries = match fs::read_dir(bin) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", bin.display())),
    };
    let mut written = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", bin.display()))?;
        let name = entry.file_name();
        let target = bin.join(&name);
        let wrapper = wrappers.join(&name);
        let script = format!("#!/bin/sh\nexec \"{}\" \"$@\"\n", target.display());
        write_atomic(&wrapper, script.as_bytes())?;
        make_executable(&wrapper)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Deletes symlinks under `root` whose target no longer exists.
fn remove_invalid_symlinks(root: &Path) -> Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", root.display())),
    };
    let mut removed = 0;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", root.display()))?
            .path();
        let meta = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to inspect {}", path.display()))?;
        if meta.file_type().is_symlink() {
            if fs::metadata(&path).is_err() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
                removed += 1;
            }
        } else if meta.is_dir() {
            removed += remove_invalid_symlinks(&path)?;
        }
    }
    Ok(removed)
}
