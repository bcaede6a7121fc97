//! Structured-config option resource - one value inside one file.
//!
//! Sets a single addressable option in a structured config file without
//! rewriting or reformatting the rest of the file. The file is interpreted
//! through a named lens by the [`ConfigTree`] collaborator; this resource
//! contributes the orchestration: register exactly one lens/inclusion pair,
//! load only that registration, compare before writing, persist only on
//! change.

use serde::Deserialize;
use std::fmt;

use super::Resource;
use crate::error::{ExecutionError, ValidationError};
use crate::logger::Log;
use crate::tree::{Augtool, ConfigTree};

/// Root of the tree's file-backed nodes.
const FILES_ROOT: &str = "/files";

/// Suffix turning a lens name into its module file name.
const LENS_SUFFIX: &str = ".lns";

/// Caller-declared fields of a config-option resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigOptionSpec {
    /// Config file to edit.
    pub file: String,
    /// Lens name interpreting the file, e.g. `Sshd`.
    pub lens: String,
    /// Option path relative to the file, e.g. `PermitRootLogin`.
    pub option_path: String,
    /// Desired value. The tree tolerates empty values, but an empty value
    /// here is indistinguishable from a forgotten field, so it is rejected.
    pub value: String,
}

/// Values resolved by `parse` from the declared fields.
#[derive(Debug, Clone)]
struct ResolvedOption {
    /// Fully-qualified node path: files root + file + relative option path.
    full_path: String,
    /// Inclusion pattern scoping the lens to the one target file.
    incl: String,
    /// Lens module file name.
    lens_file: String,
}

/// A single option inside a structured config file.
pub struct ConfigOption {
    spec: ConfigOptionSpec,
    log: Log,
    tree: Box<dyn ConfigTree>,
    resolved: Option<ResolvedOption>,
}

impl ConfigOption {
    /// A resource converging through the system `augtool` tree.
    pub fn new(spec: ConfigOptionSpec, log: Log) -> Self {
        Self::with_tree(spec, log, Box::new(Augtool::new()))
    }

    /// A resource converging through a caller-supplied tree.
    pub fn with_tree(spec: ConfigOptionSpec, log: Log, tree: Box<dyn ConfigTree>) -> Self {
        Self {
            spec,
            log,
            tree,
            resolved: None,
        }
    }
}

impl fmt::Debug for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOption")
            .field("spec", &self.spec)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl Resource for ConfigOption {
    fn brief(&self) -> String {
        format!(
            "\nFile: \t\t{}\nLens: \t\t{}\nOption path: \t{}\nOption value: \t{}",
            self.spec.file, self.spec.lens, self.spec.option_path, self.spec.value,
        )
    }

    fn check(&self) -> Result<(), ValidationError> {
        if self.spec.file.is_empty() {
            self.log.error("Config file path is empty.");
            return Err(ValidationError::EmptyField("file"));
        }
        if self.spec.lens.is_empty() {
            self.log.error("Lens name is empty.");
            return Err(ValidationError::EmptyField("lens"));
        }
        if self.spec.option_path.is_empty() {
            self.log.error("Option path is empty.");
            return Err(ValidationError::EmptyField("option_path"));
        }
        if self.spec.value.is_empty() {
            self.log.error("Option value is empty.");
            return Err(ValidationError::EmptyField("value"));
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<(), ValidationError> {
        self.resolved = Some(ResolvedOption {
            full_path: format!(
                "{FILES_ROOT}{}/{}",
                self.spec.file, self.spec.option_path,
            ),
            incl: self.spec.file.clone(),
            lens_file: format!("{}{LENS_SUFFIX}", self.spec.lens),
        });
        Ok(())
    }

    fn process(&mut self) -> Result<(), ExecutionError> {
        let resolved = self.resolved.clone().ok_or(ExecutionError::NotParsed)?;

        self.tree
            .register_lens(&self.spec.lens, &resolved.lens_file, &resolved.incl)
            .map_err(|source| {
                self.log.error(format!("Failed to register lens: {source}"));
                ExecutionError::tree("register-lens", source)
            })?;
        self.tree.load().map_err(|source| {
            self.log.error(format!("Failed to load lens: {source}"));
            ExecutionError::tree("load", source)
        })?;

        let current = self.tree.get(&resolved.full_path).map_err(|source| {
            self.log.error(format!("Failed to read option value: {source}"));
            ExecutionError::tree("get", source)
        })?;
        if current.as_deref() == Some(self.spec.value.as_str()) {
            self.log.debug("Config option value is correct, skip setting.");
            if let Err(err) = self.tree.close() {
                self.log.debug(format!("Tree close failed: {err}"));
            }
            return Ok(());
        }

        self.tree
            .set(&resolved.full_path, &self.spec.value)
            .map_err(|source| {
                self.log.error(format!("Failed to set option value: {source}"));
                ExecutionError::tree("set", source)
            })?;
        self.tree.save().map_err(|source| {
            self.log.error(format!("Failed to save config option: {source}"));
            ExecutionError::tree("save", source)
        })?;
        if let Err(err) = self.tree.close() {
            self.log.debug(format!("Tree close failed: {err}"));
        }

        self.log.info(format!(
            "Set {}@{} to '{}'.",
            self.spec.option_path, self.spec.file, self.spec.value,
        ));
        Ok(())
    }
}
