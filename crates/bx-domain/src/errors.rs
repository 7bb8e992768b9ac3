//! Failure taxonomy shared by the reconciliation engine and its callers.

/// Errors raised while validating, resolving, or applying package changes.
///
/// These travel inside `anyhow::Error` and are recovered with
/// `downcast_ref` at the command boundary.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// A declared package failed existence validation before any mutation.
    #[error("package {reference} not found")]
    NotFound { reference: String },

    /// The package store could not resolve a name or version.
    #[error("unable to resolve {reference}: {reason}")]
    Resolution { reference: String, reason: String },

    /// An external process exited non-zero. `message` is the trimmed
    /// combined output of the process, kept verbatim.
    #[error("{message}")]
    ExternalProcess {
        program: String,
        code: i32,
        message: String,
    },

    /// A by-name lookup matched more than one declared package.
    #[error("found multiple packages with name {name}: {}. Please specify a version", .matches.join(", "))]
    AmbiguousMatch { name: String, matches: Vec<String> },
}

impl PackageError {
    /// Builds an [`PackageError::ExternalProcess`] from captured output.
    pub fn external(program: impl Into<String>, code: i32, output: &str) -> Self {
        let program = program.into();
        let trimmed = output.trim();
        let message = if trimmed.is_empty() {
            format!("{program} exited with status {code}")
        } else {
            trimmed.to_string()
        };
        Self::ExternalProcess {
            program,
            code,
            message,
        }
    }

    /// Stable reason code used in JSON envelopes.
    pub fn reason(&self) -> &'static str {
        match self {
            PackageError::NotFound { .. } => "package_not_found",
            PackageError::Resolution { .. } => "resolution_failed",
            PackageError::ExternalProcess { .. } => "external_process_failed",
            PackageError::AmbiguousMatch { .. } => "ambiguous_package",
        }
    }
}
