//! Resource contract and the declared-resource union.
//!
//! Every unit of desired machine state is modeled as a Resource with a
//! four-stage lifecycle:
//! - `brief`: human-readable summary of the configured intent, for logs
//! - `check`: structural validation of the caller-supplied fields
//! - `parse`: resolve defaults and string representations into usable values
//! - `process`: converge the host, applying only the delta
//!
//! A resource is constructed once per run, flows through
//! check → parse → process exactly once, and is discarded. Idempotence of
//! `process` is the central correctness property: re-applying a convergent
//! resource performs no further side effect.

use serde::Deserialize;

use crate::error::{ExecutionError, ValidationError};
use crate::logger::Log;
use std::fmt;

/// Core trait for all resources in steward.
pub trait Resource: Send + fmt::Debug {
    /// One-paragraph summary of the configured intent.
    ///
    /// Pure and safe to call at any lifecycle stage.
    fn brief(&self) -> String;

    /// Validate the caller-supplied fields.
    ///
    /// Checks required fields, enumerated values, and the existence of
    /// referenced OS entities (working directory, accounts). Mutates
    /// nothing and applies nothing.
    fn check(&self) -> Result<(), ValidationError>;

    /// Resolve defaults and user-facing representations into internal
    /// values used by `process`.
    ///
    /// Populates only derived data; declared fields are never touched.
    /// Idempotent: calling twice resolves to the same values.
    fn parse(&mut self) -> Result<(), ValidationError>;

    /// Converge current state to declared state.
    ///
    /// The only stage permitted observable side effects. Safe to call
    /// repeatedly: once convergent, further calls perform no writes.
    fn process(&mut self) -> Result<(), ExecutionError>;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// A decoded resource description, field-for-field as the caller wrote it.
///
/// The closed union over the three resource kinds. Dispatch happens by
/// pattern-match or through [`ResourceSpec::into_resource`], never by type
/// inspection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// A conditionally-executed shell command.
    Command(CommandSpec),
    /// A managed file, directory, or symlink.
    File(FileSpec),
    /// A single option inside a structured config file.
    ConfigOption(ConfigOptionSpec),
}

impl ResourceSpec {
    /// Attach a log handle and produce the runnable resource.
    pub fn into_resource(self, log: Log) -> BoxedResource {
        match self {
            Self::Command(spec) => Box::new(ShellCommand::new(spec, log)),
            Self::File(spec) => Box::new(ManagedFile::new(spec, log)),
            Self::ConfigOption(spec) => Box::new(ConfigOption::new(spec, log)),
        }
    }
}

// Re-export submodules
pub mod command;
pub mod config_option;
pub mod file;

pub use command::{CommandOutcome, CommandSpec, ShellCommand};
pub use config_option::{ConfigOption, ConfigOptionSpec};
pub use file::{FileKind, FileSpec, ManagedFile};
