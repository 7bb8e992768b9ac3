//! Configuration, settings, and per-command context assembly.

pub mod context;
pub mod settings;

pub use settings::*;

/// Interprets an env-var style boolean: anything but empty, `0`, `false`,
/// `no` or `off` is on.
pub(crate) fn flag_value(raw: &str) -> bool {
    let value = raw.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}
