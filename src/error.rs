//! Error types for resource validation and convergence.
//!
//! Two kinds, matching the two halves of the resource lifecycle:
//! [`ValidationError`] from `check`/`parse` (the caller must not proceed to
//! `process`) and [`ExecutionError`] from `process` (a failed convergence
//! attempt). Nothing here is retried: a failed `process` leaves the system in
//! whatever intermediate state the failing operation produced.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors raised while validating or resolving a declared resource.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field was left empty.
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),

    /// A field is present but its value cannot be used.
    #[error("`{field}` is invalid: {reason}")]
    InvalidField {
        /// Field name as declared by the caller.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Declared working directory does not exist.
    #[error("working directory {} does not exist", .0.display())]
    MissingWorkingDir(PathBuf),

    /// Declared working directory exists but is not a directory.
    #[error("working directory {} is not a directory", .0.display())]
    WorkingDirNotDirectory(PathBuf),

    /// Declared user has no account on this host.
    #[error("user `{0}` does not exist")]
    UnknownUser(String),

    /// Declared group does not exist on this host.
    #[error("group `{0}` does not exist")]
    UnknownGroup(String),

    /// Managing the filesystem root is never allowed.
    #[error("file path must not be the filesystem root")]
    RootPath,
}

/// Errors raised while converging a resource onto the host.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The main command ran and exited non-zero (or was killed by a signal).
    #[error("command `{command}` failed: {status}")]
    CommandFailed {
        /// The command as declared.
        command: String,
        /// Exit status reported by the OS.
        status: ExitStatus,
    },

    /// The shell for the main command could not be started at all.
    #[error("cannot start shell for `{command}`: {source}")]
    SpawnFailed {
        /// The command as declared.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A path exists on disk but with a different type than declared.
    #[error("{} already exists but is not a {expected}", .path.display())]
    TypeMismatch {
        /// The managed path.
        path: PathBuf,
        /// The declared kind ("directory", "file", "symlink").
        expected: &'static str,
    },

    /// The managed path's parent exists and is not a directory.
    #[error("parent directory {} exists but is not a directory", .0.display())]
    ParentNotDirectory(PathBuf),

    /// A filesystem operation failed.
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        /// Failing operation: `create`, `chown`, `chmod`, `symlink`,
        /// `remove`, `write`.
        op: &'static str,
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// `process` ran before `parse` resolved the declared input. The
    /// lifecycle is check, parse, process, in that order.
    #[error("resource was processed before parse")]
    NotParsed,

    /// The structured-config collaborator reported a failure.
    #[error("config tree {op} failed: {source}")]
    Tree {
        /// Failing collaborator operation: `register-lens`, `load`, `get`,
        /// `set`, `save`.
        op: &'static str,
        /// Diagnostic from the collaborator.
        #[source]
        source: anyhow::Error,
    },
}

impl ExecutionError {
    /// Create an IO error with operation and path context.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create a collaborator error with operation context.
    pub fn tree(op: &'static str, source: anyhow::Error) -> Self {
        Self::Tree { op, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_the_field() {
        let err = ValidationError::EmptyField("command");
        assert_eq!(err.to_string(), "required field `command` is empty");

        let err = ValidationError::InvalidField {
            field: "mode",
            reason: "not an octal number: 9z9".to_string(),
        };
        assert!(err.to_string().contains("mode"));
        assert!(err.to_string().contains("9z9"));
    }

    #[test]
    fn execution_io_display_names_operation_and_path() {
        let err = ExecutionError::io(
            "chmod",
            "/tmp/managed",
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        let display = err.to_string();
        assert!(display.contains("chmod"));
        assert!(display.contains("/tmp/managed"));
    }

    #[test]
    fn type_mismatch_display_names_expected_kind() {
        let err = ExecutionError::TypeMismatch {
            path: PathBuf::from("/tmp/x"),
            expected: "directory",
        };
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn tree_error_carries_the_diagnostic() {
        let err = ExecutionError::tree("save", anyhow::anyhow!("no writable lens"));
        let display = err.to_string();
        assert!(display.contains("save"));
        assert!(display.contains("no writable lens"));
    }
}
