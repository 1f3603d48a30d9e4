//! Error handling for Fabrikate
//!
//! All fallible operations in the crate return [`anyhow::Result`] with context
//! attached at each layer; the strongly-typed failure cases live in
//! [`FabrikateError`] so callers can match on the failure mode (via
//! `downcast_ref`) instead of string-matching error messages.
//!
//! Subprocess failures ([`FabrikateError::Fetch`], [`FabrikateError::Hook`])
//! carry the exact command line and the captured output verbatim so the user
//! sees what `git`, `helm`, or their hook script actually printed.

use std::path::PathBuf;
use thiserror::Error;

/// The strongly-typed error cases for Fabrikate operations.
#[derive(Error, Debug)]
pub enum FabrikateError {
    /// Component or config file missing, malformed, or ambiguous
    /// (both `component.yaml` and `component.json` present).
    #[error("failed to load component in path {}: {reason}", .path.display())]
    Load {
        /// Directory the component was expected in
        path: PathBuf,
        /// Why loading failed
        reason: String,
    },

    /// Deep-merge or config descent hit a non-mapping value where a mapping
    /// was required.
    #[error("config merge conflict at '{key}': cannot descend into non-mapping value")]
    Merge {
        /// Dotted path of the conflicting key
        key: String,
    },

    /// A `git` or `helm` subprocess exited non-zero.
    #[error("fetch failed: `{command}` exited with {}", .exit_code.map_or_else(|| "signal".to_string(), |code| format!("code {code}")))]
    Fetch {
        /// The command line that was run
        command: String,
        /// Combined stdout + stderr of the subprocess
        output: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
    },

    /// A user-defined lifecycle hook command exited non-zero.
    #[error("hook command failed: `{command}`")]
    Hook {
        /// The shell command that failed
        command: String,
        /// Combined stdout + stderr of the command
        output: String,
    },

    /// Unknown component type, unsupported method, bad URL, or a rejected
    /// config mutation.
    #[error("{reason}")]
    Validation {
        /// Description of what failed validation
        reason: String,
    },

    /// `set --no-new-config-keys` addressed a key that does not exist yet.
    #[error("unknown config key '{key}': new configuration was specified and --no-new-config-keys is on")]
    UnknownConfigKey {
        /// The dotted path that was rejected
        key: String,
    },

    /// Internal invariant violation in the clone cache.
    #[error("clone cache invariant violated: {reason}")]
    Cache {
        /// Description of the violated invariant
        reason: String,
    },

    /// Filesystem or network I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FabrikateError {
    /// Builds a [`FabrikateError::Fetch`] from a finished subprocess.
    pub fn from_output(command: String, output: &std::process::Output) -> Self {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Self::Fetch {
            command,
            output: combined,
            exit_code: output.status.code(),
        }
    }
}
