//! Path expansion for declared resources.
//!
//! Manifest authors write paths the way they would in a shell (`~/app.conf`,
//! `$HOME/bin`); resources expand them once, up front, and work with concrete
//! paths from there on.

use std::borrow::Cow;
use std::path::PathBuf;

/// Expand `~` and environment variables in a path string.
///
/// This is the canonical path expansion function for steward. All resources
/// use this instead of calling shellexpand directly. Unresolvable variables
/// leave the input unchanged rather than failing: a missing variable in a
/// declared path will surface as a missing file, with the literal text in
/// the error.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_pass_through() {
        assert_eq!(expand("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand("~/managed.conf");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("managed.conf"));
    }

    #[test]
    fn env_vars_expand() {
        // HOME is set in any environment cargo test runs in.
        let home = std::env::var("HOME").unwrap();
        assert_eq!(expand("$HOME/x"), PathBuf::from(format!("{home}/x")));
    }

    #[test]
    fn unknown_vars_leave_input_unchanged() {
        let expanded = expand("/opt/$STEWARD_NO_SUCH_VAR/x");
        assert_eq!(expanded, PathBuf::from("/opt/$STEWARD_NO_SUCH_VAR/x"));
    }
}
