//! Managed file resource - existence, type, content, ownership, mode.
//!
//! Converges one path to a declared shape: a directory, a regular file with
//! optional managed content, or a symlink. Every reconciliation step reads
//! current state first and only issues the syscall when it differs, so
//! re-applying a convergent resource produces no metadata churn and no
//! audit noise.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use super::Resource;
use crate::account;
use crate::error::{ExecutionError, ValidationError};
use crate::logger::Log;
use crate::paths;

/// The shape a managed path must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Directory,
    File,
    Symlink,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Symlink => "symlink",
        }
    }

    /// Mode applied when the caller declares none.
    fn default_mode(self) -> u32 {
        match self {
            Self::Directory => 0o755,
            Self::File => 0o644,
            Self::Symlink => 0o777,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-declared fields of a file resource.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    /// Managed path.
    pub path: String,
    /// Declared shape of the path.
    pub kind: FileKind,
    /// Owning user name. Applied only when `group` is also declared.
    pub owner: Option<String>,
    /// Owning group name. Applied only when `owner` is also declared.
    pub group: Option<String>,
    /// Octal mode string, e.g. `"0644"`. Kind-specific default when unset.
    pub mode: Option<String>,
    /// Managed content for regular files.
    #[serde(default)]
    pub content: String,
    /// When content is declared empty, keep whatever the file already holds
    /// instead of truncating it.
    #[serde(default)]
    pub keep_content: bool,
    /// Symlink target.
    pub target: Option<String>,
}

/// Values resolved by `parse` from the declared fields.
#[derive(Debug, Clone)]
struct ResolvedFile {
    path: PathBuf,
    mode: u32,
    /// `(uid, gid)` when both owner and group are declared.
    owner: Option<(u32, u32)>,
}

/// A managed file, directory, or symlink.
#[derive(Debug)]
pub struct ManagedFile {
    spec: FileSpec,
    log: Log,
    resolved: Option<ResolvedFile>,
}

impl ManagedFile {
    pub fn new(spec: FileSpec, log: Log) -> Self {
        Self {
            spec,
            log,
            resolved: None,
        }
    }

    /// Inspect the path without following symlinks.
    ///
    /// Returns whether it exists; an existing path of the wrong type is
    /// fatal rather than clobbered.
    fn inspect(&self, resolved: &ResolvedFile) -> Result<bool, ExecutionError> {
        let meta = match fs::symlink_metadata(&resolved.path) {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };

        let file_type = meta.file_type();
        let matches = match self.spec.kind {
            FileKind::Directory => file_type.is_dir(),
            FileKind::File => file_type.is_file(),
            FileKind::Symlink => file_type.is_symlink(),
        };
        if !matches {
            self.log.error(format!(
                "Path already exists but is not a {}.",
                self.spec.kind,
            ));
            return Err(ExecutionError::TypeMismatch {
                path: resolved.path.clone(),
                expected: self.spec.kind.as_str(),
            });
        }
        Ok(true)
    }

    /// Make sure the parent directory exists, creating it recursively with
    /// the resolved mode when absent.
    fn ensure_parent(&self, resolved: &ResolvedFile) -> Result<(), ExecutionError> {
        let Some(parent) = resolved.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        match fs::metadata(parent) {
            Ok(meta) if meta.is_dir() => {
                self.log.debug("Parent directory already exists, skip creating.");
                Ok(())
            }
            Ok(_) => {
                self.log.error(format!(
                    "Parent directory {} exists but is not a directory.",
                    parent.display(),
                ));
                Err(ExecutionError::ParentNotDirectory(parent.to_path_buf()))
            }
            Err(_) => {
                let mut builder = fs::DirBuilder::new();
                builder.recursive(true).mode(resolved.mode);
                builder.create(parent).map_err(|source| {
                    self.log
                        .error(format!("Failed to create parent directory: {source}"));
                    ExecutionError::io("create", parent, source)
                })?;
                self.log
                    .info(format!("Created parent directory {}.", parent.display()));
                Ok(())
            }
        }
    }

    fn converge_directory(
        &self,
        resolved: &ResolvedFile,
        present: bool,
    ) -> Result<(), ExecutionError> {
        if present {
            self.log.debug("Directory already exists, skip creating.");
        } else {
            let mut builder = fs::DirBuilder::new();
            builder.mode(resolved.mode);
            builder.create(&resolved.path).map_err(|source| {
                self.log.error(format!("Failed to create directory: {source}"));
                ExecutionError::io("create", &resolved.path, source)
            })?;
            self.log.info("Created directory.");
        }

        self.reconcile_owner(resolved)?;
        self.reconcile_mode(resolved)
    }

    fn converge_file(&self, resolved: &ResolvedFile, present: bool) -> Result<(), ExecutionError> {
        let skip_write;
        if present {
            self.log.debug("File already exists, skip creating.");
            // Empty declared content only overwrites when the caller did not
            // ask to keep what is there.
            skip_write = self.spec.content.is_empty() && self.spec.keep_content;
        } else {
            fs::File::create(&resolved.path).map_err(|source| {
                self.log.error(format!("Failed to create file: {source}"));
                ExecutionError::io("create", &resolved.path, source)
            })?;
            self.log.info("Created file.");
            skip_write = self.spec.content.is_empty();
        }

        if !skip_write {
            self.write_content(resolved)?;
        }

        self.reconcile_owner(resolved)?;
        self.reconcile_mode(resolved)
    }

    fn converge_symlink(&self, resolved: &ResolvedFile, present: bool) -> Result<(), ExecutionError> {
        let target = self.spec.target.clone().unwrap_or_default();

        if present {
            let current = fs::read_link(&resolved.path).unwrap_or_default();
            if current == Path::new(&target) {
                self.log
                    .debug("Symlink with correct target already exists, skip creating.");
                return Ok(());
            }
            fs::remove_file(&resolved.path).map_err(|source| {
                self.log.error(format!("Failed to remove old symlink: {source}"));
                ExecutionError::io("remove", &resolved.path, source)
            })?;
        }

        std::os::unix::fs::symlink(&target, &resolved.path).map_err(|source| {
            self.log.error(format!("Failed to create symlink: {source}"));
            ExecutionError::io("symlink", &resolved.path, source)
        })?;
        self.log.info("Created symlink.");
        Ok(())
    }

    /// Write declared content, unless the file already holds it.
    ///
    /// An unreadable file counts as holding nothing, which forces the write.
    fn write_content(&self, resolved: &ResolvedFile) -> Result<(), ExecutionError> {
        let current = fs::read(&resolved.path).unwrap_or_default();
        if current == self.spec.content.as_bytes() {
            self.log.debug("File content is correct, skip writing content.");
            return Ok(());
        }

        fs::write(&resolved.path, &self.spec.content).map_err(|source| {
            self.log.error(format!("Failed to write content: {source}"));
            ExecutionError::io("write", &resolved.path, source)
        })?;
        self.log.info("Wrote declared content.");
        Ok(())
    }

    /// Chown only when current owner or group differ from declared.
    fn reconcile_owner(&self, resolved: &ResolvedFile) -> Result<(), ExecutionError> {
        let Some((uid, gid)) = resolved.owner else {
            return Ok(());
        };

        if let Ok(meta) = fs::metadata(&resolved.path) {
            if meta.uid() == uid && meta.gid() == gid {
                self.log.debug("Ownership is correct, skip changing ownership.");
                return Ok(());
            }
        }

        std::os::unix::fs::chown(&resolved.path, Some(uid), Some(gid)).map_err(|source| {
            self.log.error(format!("Failed to change ownership: {source}"));
            ExecutionError::io("chown", &resolved.path, source)
        })?;
        self.log.info("Changed ownership.");
        Ok(())
    }

    /// Chmod only when the current mode bits differ from resolved.
    fn reconcile_mode(&self, resolved: &ResolvedFile) -> Result<(), ExecutionError> {
        let meta = fs::metadata(&resolved.path)
            .map_err(|source| ExecutionError::io("chmod", &resolved.path, source))?;
        if meta.permissions().mode() & 0o7777 == resolved.mode & 0o7777 {
            self.log.debug("Permissions are correct, skip changing permissions.");
            return Ok(());
        }

        fs::set_permissions(&resolved.path, fs::Permissions::from_mode(resolved.mode)).map_err(
            |source| {
                self.log.error(format!("Failed to change permissions: {source}"));
                ExecutionError::io("chmod", &resolved.path, source)
            },
        )?;
        self.log.info("Changed permissions.");
        Ok(())
    }
}

impl Resource for ManagedFile {
    fn brief(&self) -> String {
        let mut brief = format!(
            "\nPath: \t\t{}\nKind: \t\t{}",
            self.spec.path, self.spec.kind,
        );
        if let Some(owner) = &self.spec.owner {
            brief.push_str(&format!("\nOwner: \t\t{owner}"));
        }
        if let Some(group) = &self.spec.group {
            brief.push_str(&format!("\nGroup: \t\t{group}"));
        }
        if let Some(mode) = &self.spec.mode {
            brief.push_str(&format!("\nMode: \t\t{mode}"));
        }
        if let Some(target) = &self.spec.target {
            brief.push_str(&format!("\nTarget: \t{target}"));
        }
        brief
    }

    fn check(&self) -> Result<(), ValidationError> {
        if self.spec.path.is_empty() {
            self.log.error("File path is empty.");
            return Err(ValidationError::EmptyField("path"));
        }
        if self.spec.path == "/" {
            self.log.error("File path is the filesystem root.");
            return Err(ValidationError::RootPath);
        }

        // A target-less symlink passes validation; creation fails later at
        // symlink(2) if a link must actually be made.
        if self.spec.kind == FileKind::Symlink
            && self.spec.target.as_deref().unwrap_or_default().is_empty()
        {
            self.log.warn("Symlink target is empty.");
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<(), ValidationError> {
        let mode = match &self.spec.mode {
            None => self.spec.kind.default_mode(),
            Some(mode) => u32::from_str_radix(mode, 8).map_err(|_| {
                self.log.error("File mode is invalid.");
                ValidationError::InvalidField {
                    field: "mode",
                    reason: format!("not an octal number: {mode}"),
                }
            })?,
        };

        let owner = match (&self.spec.owner, &self.spec.group) {
            (Some(owner), Some(group)) => {
                let uid = account::user_id(owner).ok_or_else(|| {
                    self.log.error("User does not exist.");
                    ValidationError::UnknownUser(owner.clone())
                })?;
                let gid = account::group_id(group).ok_or_else(|| {
                    self.log.error("Group does not exist.");
                    ValidationError::UnknownGroup(group.clone())
                })?;
                Some((uid, gid))
            }
            _ => None,
        };

        self.resolved = Some(ResolvedFile {
            path: paths::expand(&self.spec.path),
            mode,
            owner,
        });
        Ok(())
    }

    fn process(&mut self) -> Result<(), ExecutionError> {
        let resolved = self.resolved.clone().ok_or(ExecutionError::NotParsed)?;

        let present = self.inspect(&resolved)?;
        self.ensure_parent(&resolved)?;

        match self.spec.kind {
            FileKind::Directory => self.converge_directory(&resolved, present),
            FileKind::File => self.converge_file(&resolved, present),
            // Ownership and mode do not apply to symlinks; their apparent
            // mode is not meaningful here.
            FileKind::Symlink => self.converge_symlink(&resolved, present),
        }
    }
}
