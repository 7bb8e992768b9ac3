use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::effects::FileSystem;

/// Hashes of everything a converged profile was derived from, plus the
/// platform it was converged for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StateInputs {
    #[serde(default)]
    pub(crate) manifest_hash: String,
    #[serde(default)]
    pub(crate) lockfile_hash: String,
    #[serde(default)]
    pub(crate) profile_signature: String,
    #[serde(default)]
    pub(crate) platform: String,
}

/// `.bx/state.json`. Deleting it only costs one full reconciliation.
pub(crate) struct LocalStateCache<'a> {
    fs: &'a dyn FileSystem,
    path: &'a Path,
}

impl<'a> LocalStateCache<'a> {
    pub(crate) fn new(fs: &'a dyn FileSystem, path: &'a Path) -> Self {
        Self { fs, path }
    }

    fn load(&self) -> Option<StateInputs> {
        let contents = self.fs.read_to_string(self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(err) => {
                debug!(path = %self.path.display(), %err, "ignoring unreadable state cache");
                None
            }
        }
    }

    pub(crate) fn is_up_to_date(&self, inputs: &StateInputs) -> bool {
        self.load().as_ref() == Some(inputs)
    }

    pub(crate) fn update(&self, inputs: &StateInputs) -> Result<()> {
        let mut contents = serde_json::to_string_pretty(inputs)?;
        contents.push('\n');
        self.fs.write(self.path, contents.as_bytes())
    }
}
