//! Shell command resource - gated execution under a target user.
//!
//! The command only runs when its declared conditions allow it: `run_if`
//! must exit zero and `skip_if` must exit non-zero. Conditions are evaluated
//! silently; the main command streams its output line by line into the
//! injected log as it arrives, so long-running commands surface progress in
//! real time instead of a silent hang followed by a dump.

use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use super::Resource;
use crate::account;
use crate::error::{ExecutionError, ValidationError};
use crate::logger::Log;
use crate::paths;

/// Caller-declared fields of a command resource.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    /// Shell command line to run.
    pub command: String,
    /// Directory to run in. Must exist.
    pub working_dir: Option<String>,
    /// Value for the child's `PATH`; the parent's `PATH` when unset.
    pub path_env: Option<String>,
    /// Account to run as; the agent's own account when unset.
    pub run_as_user: Option<String>,
    /// Gate: run the main command only if this exits zero.
    pub run_if: Option<String>,
    /// Gate: skip the main command if this exits zero.
    pub skip_if: Option<String>,
}

/// Shell interpreting command lines.
const DEFAULT_SHELL: &str = "/bin/sh";

/// Binary switching to the target account. Absolute paths: a declared
/// `path_env` replaces the child's `PATH` before program lookup.
const SU: &str = "/bin/su";

/// Values resolved by `parse` from the declared fields.
#[derive(Debug, Clone)]
struct ResolvedCommand {
    user: String,
    uid: u32,
    working_dir: Option<PathBuf>,
}

/// Terminal state of a processed command resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A condition gated the main command off; nothing ran.
    Skipped,
    /// The main command ran and exited zero.
    Executed,
}

/// A conditionally-executed shell command.
#[derive(Debug)]
pub struct ShellCommand {
    spec: CommandSpec,
    log: Log,
    resolved: Option<ResolvedCommand>,
    outcome: Option<CommandOutcome>,
}

impl ShellCommand {
    pub fn new(spec: CommandSpec, log: Log) -> Self {
        Self {
            spec,
            log,
            resolved: None,
            outcome: None,
        }
    }

    /// Terminal state after `process`, `None` before.
    pub fn outcome(&self) -> Option<CommandOutcome> {
        self.outcome
    }

    /// Compose the shell invocation for one command line.
    ///
    /// Commands run through `su <user> -c` when the target account differs
    /// from the agent's own, and plain `sh -c` otherwise.
    fn shell(&self, resolved: &ResolvedCommand, line: &str) -> Command {
        let mut cmd = if resolved.uid == account::effective_uid() {
            let mut cmd = Command::new(DEFAULT_SHELL);
            cmd.arg("-c").arg(line);
            cmd
        } else {
            let mut cmd = Command::new(SU);
            cmd.arg(&resolved.user).arg("-c").arg(line);
            cmd
        };

        if let Some(dir) = &resolved.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(path) = &self.spec.path_env {
            cmd.env("PATH", path);
        }
        cmd
    }

    /// Evaluate a condition command silently. True means exit status zero;
    /// a condition that cannot start counts as false.
    fn condition_holds(&self, resolved: &ResolvedCommand, line: &str) -> bool {
        let mut cmd = self.shell(resolved, line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.status() {
            Ok(status) => status.success(),
            Err(err) => {
                self.log
                    .debug(format!("Condition `{line}` could not start ({err}), treating as false."));
                false
            }
        }
    }

    /// Run the main command, forwarding output lines as they arrive.
    fn run_streaming(&self, resolved: &ResolvedCommand) -> Result<(), ExecutionError> {
        let mut cmd = self.shell(resolved, &self.spec.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| {
            self.log.error(format!("Cannot start shell: {source}"));
            ExecutionError::SpawnFailed {
                command: self.spec.command.clone(),
                source,
            }
        })?;
        self.log.info("Running command...");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes independently. A child that fills one pipe while
        // the other sits idle must not be able to stall the parent.
        thread::scope(|scope| {
            if let Some(pipe) = stdout {
                let log = self.log.clone();
                scope.spawn(move || forward_lines(pipe, &log));
            }
            if let Some(pipe) = stderr {
                let log = self.log.clone();
                scope.spawn(move || forward_lines(pipe, &log));
            }
        });

        let status = child.wait().map_err(|source| ExecutionError::SpawnFailed {
            command: self.spec.command.clone(),
            source,
        })?;

        if status.success() {
            self.log.info("Command finished successfully.");
            Ok(())
        } else {
            self.log.error(format!("Command failed: {status}"));
            Err(ExecutionError::CommandFailed {
                command: self.spec.command.clone(),
                status,
            })
        }
    }
}

/// Forward pipe output to the log, one line per entry, as it arrives.
fn forward_lines(pipe: impl Read, log: &Log) {
    let reader = BufReader::new(pipe);
    for line in reader.lines() {
        match line {
            Ok(line) => log.debug(line),
            Err(_) => break,
        }
    }
}

impl Resource for ShellCommand {
    fn brief(&self) -> String {
        let mut brief = format!("\nCommand: \t{}", self.spec.command);
        if let Some(dir) = &self.spec.working_dir {
            brief.push_str(&format!("\nWorking dir: \t{dir}"));
        }
        if let Some(user) = &self.spec.run_as_user {
            brief.push_str(&format!("\nUser: \t\t{user}"));
        }
        if let Some(run_if) = &self.spec.run_if {
            brief.push_str(&format!("\nRun if: \t{run_if}"));
        }
        if let Some(skip_if) = &self.spec.skip_if {
            brief.push_str(&format!("\nSkip if: \t{skip_if}"));
        }
        brief
    }

    fn check(&self) -> Result<(), ValidationError> {
        if self.spec.command.is_empty() {
            self.log.error("Command is empty.");
            return Err(ValidationError::EmptyField("command"));
        }

        if let Some(dir) = &self.spec.working_dir {
            let dir = paths::expand(dir);
            match std::fs::metadata(&dir) {
                Err(_) => {
                    self.log.error("Working directory does not exist.");
                    return Err(ValidationError::MissingWorkingDir(dir));
                }
                Ok(meta) if !meta.is_dir() => {
                    self.log.error("Working directory is not a directory.");
                    return Err(ValidationError::WorkingDirNotDirectory(dir));
                }
                Ok(_) => {}
            }
        }

        if let Some(user) = &self.spec.run_as_user {
            if account::user_id(user).is_none() {
                self.log.error("User does not exist.");
                return Err(ValidationError::UnknownUser(user.clone()));
            }
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<(), ValidationError> {
        let user = match &self.spec.run_as_user {
            Some(user) => user.clone(),
            None => account::effective_user_name().unwrap_or_else(|| "root".to_string()),
        };
        let uid =
            account::user_id(&user).ok_or_else(|| ValidationError::UnknownUser(user.clone()))?;

        self.resolved = Some(ResolvedCommand {
            user,
            uid,
            working_dir: self.spec.working_dir.as_deref().map(paths::expand),
        });
        Ok(())
    }

    fn process(&mut self) -> Result<(), ExecutionError> {
        let resolved = self.resolved.clone().ok_or(ExecutionError::NotParsed)?;

        if let Some(condition) = &self.spec.run_if {
            if !self.condition_holds(&resolved, condition) {
                self.log.debug("`run_if` returned false, skip running command.");
                self.outcome = Some(CommandOutcome::Skipped);
                return Ok(());
            }
        }
        if let Some(condition) = &self.spec.skip_if {
            if self.condition_holds(&resolved, condition) {
                self.log.debug("`skip_if` returned true, skip running command.");
                self.outcome = Some(CommandOutcome::Skipped);
                return Ok(());
            }
        }

        self.run_streaming(&resolved)?;
        self.outcome = Some(CommandOutcome::Executed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{Level, MemoryLog};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn spec(command: &str) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            working_dir: None,
            path_env: None,
            run_as_user: None,
            run_if: None,
            skip_if: None,
        }
    }

    fn resource(spec: CommandSpec) -> (ShellCommand, Arc<MemoryLog>) {
        let sink = MemoryLog::new();
        (ShellCommand::new(spec, Log::new(sink.clone())), sink)
    }

    #[test]
    fn brief_lists_only_declared_fields() {
        let mut declared = spec("echo hi");
        declared.run_if = Some("test -f /etc/hostname".to_string());
        let (resource, _) = resource(declared);

        let brief = resource.brief();
        assert!(brief.contains("echo hi"));
        assert!(brief.contains("Run if"));
        assert!(!brief.contains("Skip if"));
        assert!(!brief.contains("Working dir"));
    }

    #[test]
    fn check_rejects_empty_command() {
        let (resource, _) = resource(spec(""));
        assert!(matches!(
            resource.check(),
            Err(ValidationError::EmptyField("command")),
        ));
    }

    #[test]
    fn check_rejects_missing_working_dir() {
        let mut declared = spec("true");
        declared.working_dir = Some("/steward-no-such-dir".to_string());
        let (resource, _) = resource(declared);
        assert!(matches!(
            resource.check(),
            Err(ValidationError::MissingWorkingDir(_)),
        ));
    }

    #[test]
    fn check_rejects_file_as_working_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "x").unwrap();

        let mut declared = spec("true");
        declared.working_dir = Some(file.to_string_lossy().into_owned());
        let (resource, _) = resource(declared);
        assert!(matches!(
            resource.check(),
            Err(ValidationError::WorkingDirNotDirectory(_)),
        ));
    }

    #[test]
    fn check_rejects_unknown_user() {
        let mut declared = spec("true");
        declared.run_as_user = Some("steward-no-such-account".to_string());
        let (resource, _) = resource(declared);
        assert!(matches!(
            resource.check(),
            Err(ValidationError::UnknownUser(_)),
        ));
    }

    #[test]
    fn parse_defaults_to_the_agents_own_account() {
        let (mut resource, _) = resource(spec("true"));
        resource.parse().unwrap();

        let resolved = resource.resolved.as_ref().unwrap();
        assert_eq!(resolved.uid, account::effective_uid());

        // Idempotent: a second parse resolves to the same values.
        let first = resolved.clone();
        resource.parse().unwrap();
        assert_eq!(resource.resolved.as_ref().unwrap().uid, first.uid);
        assert_eq!(resource.resolved.as_ref().unwrap().user, first.user);
    }

    #[test]
    fn process_before_parse_is_an_error() {
        let (mut resource, _) = resource(spec("true"));
        assert!(matches!(
            resource.process(),
            Err(ExecutionError::NotParsed),
        ));
    }

    #[test]
    fn run_if_false_gates_the_command_off() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");

        let mut declared = spec(&format!("touch {}", marker.display()));
        declared.run_if = Some("false".to_string());
        let (mut resource, sink) = resource(declared);

        resource.parse().unwrap();
        resource.process().unwrap();

        assert_eq!(resource.outcome(), Some(CommandOutcome::Skipped));
        assert!(!marker.exists());
        assert!(sink.contains("`run_if` returned false"));
    }

    #[test]
    fn skip_if_true_gates_the_command_off() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");

        let mut declared = spec(&format!("touch {}", marker.display()));
        declared.skip_if = Some("true".to_string());
        let (mut resource, sink) = resource(declared);

        resource.parse().unwrap();
        resource.process().unwrap();

        assert_eq!(resource.outcome(), Some(CommandOutcome::Skipped));
        assert!(!marker.exists());
        assert!(sink.contains("`skip_if` returned true"));
    }

    #[test]
    fn passing_conditions_let_the_command_run() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");

        let mut declared = spec(&format!("touch {}", marker.display()));
        declared.run_if = Some("true".to_string());
        declared.skip_if = Some("false".to_string());
        let (mut resource, _) = resource(declared);

        resource.parse().unwrap();
        resource.process().unwrap();

        assert_eq!(resource.outcome(), Some(CommandOutcome::Executed));
        assert!(marker.exists());
    }

    #[test]
    fn output_streams_into_the_log_line_by_line() {
        let (mut resource, sink) = resource(spec("echo one; echo two; echo oops >&2"));
        resource.parse().unwrap();
        resource.process().unwrap();

        assert!(sink.contains("one"));
        assert!(sink.contains("two"));
        assert!(sink.contains("oops"));
        // One entry per line, not one buffered dump.
        let lines: Vec<_> = sink
            .entries()
            .into_iter()
            .filter(|(level, _)| *level == Level::Debug)
            .collect();
        assert!(lines.len() >= 3);
    }

    #[test]
    fn nonzero_exit_is_a_command_failure() {
        let (mut resource, sink) = resource(spec("exit 3"));
        resource.parse().unwrap();

        match resource.process() {
            Err(ExecutionError::CommandFailed { command, status }) => {
                assert_eq!(command, "exit 3");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
        assert_eq!(resource.outcome(), None);
        assert!(sink.contains("Command failed"));
    }

    #[test]
    fn declared_path_env_reaches_the_child() {
        let mut declared = spec("echo \"$PATH\"");
        declared.path_env = Some("/steward/custom/bin".to_string());
        let (mut resource, sink) = resource(declared);

        resource.parse().unwrap();
        resource.process().unwrap();
        assert!(sink.contains("/steward/custom/bin"));
    }

    #[test]
    fn working_dir_applies_to_the_child() {
        let dir = tempdir().unwrap();
        let mut declared = spec("touch created-here");
        declared.working_dir = Some(dir.path().to_string_lossy().into_owned());
        let (mut resource, _) = resource(declared);

        resource.parse().unwrap();
        resource.process().unwrap();
        assert!(dir.path().join("created-here").exists());
    }
}
