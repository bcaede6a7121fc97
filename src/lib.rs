//! # Steward
//!
//! The resource convergence core of a host-configuration agent.
//!
//! Given a declarative description of desired machine state, steward decides
//! whether the host already matches and, if not, converges it with the
//! minimum necessary side effect. Manifest loading, scheduling, and CLI
//! entry are the embedding agent's business; this crate is the part that
//! touches the host.
//!
//! ## Core Concepts
//!
//! - **Resource**: one unit of desired state with a four-stage lifecycle
//!   (brief / check / parse / process)
//! - **ResourceSpec**: the decoded, caller-supplied description, a closed
//!   union over the three resource kinds
//! - **Convergence**: `process` compares current state to declared state
//!   and applies only the delta; once convergent, re-applying performs no
//!   further side effect
//!
//! ## Example
//!
//! ```ignore
//! use steward::{Log, Resource, ResourceSpec};
//!
//! let spec: ResourceSpec = serde_json::from_str(
//!     r#"{
//!         "type": "file",
//!         "path": "/etc/motd",
//!         "kind": "file",
//!         "mode": "0644",
//!         "content": "managed by steward\n"
//!     }"#,
//! )?;
//!
//! let mut resource = spec.into_resource(Log::standard());
//! log::info!("{}", resource.brief());
//! resource.check()?;
//! resource.parse()?;
//! resource.process()?;
//! ```
//!
//! ## Injected collaborators
//!
//! The crate has no hard dependency on a logger backend or a config-file
//! parser; both arrive through traits:
//!
//! - [`LogSink`]: leveled log sink, injected per resource at construction.
//!   [`StdLog`] forwards to the `log` facade; [`MemoryLog`] captures for
//!   tests.
//! - [`ConfigTree`]: lens-aware view over structured config files.
//!   [`Augtool`] drives the system `augtool` binary; [`MemoryTree`] is the
//!   in-memory double.
//!
//! This keeps isolated unit tests possible for every skip-vs-act decision:
//! each decision point emits exactly one log line.

pub mod account;
pub mod error;
pub mod logger;
pub mod paths;
pub mod resource;
pub mod tree;

// Re-export main types at crate root
pub use error::{ExecutionError, ValidationError};
pub use logger::{Level, Log, LogSink, MemoryLog, StdLog};
pub use resource::{
    BoxedResource, CommandOutcome, CommandSpec, ConfigOption, ConfigOptionSpec, FileKind,
    FileSpec, ManagedFile, Resource, ResourceSpec, ShellCommand,
};
pub use tree::{Augtool, ConfigTree, MemoryTree};
