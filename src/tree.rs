//! Structured-config collaborator seam.
//!
//! The config-option resource edits one addressable value inside a config
//! file through a lens-aware tree view of the filesystem. The tree itself is
//! an external collaborator behind the [`ConfigTree`] trait, so the crate
//! carries no hard dependency on any particular implementation and tests can
//! substitute an in-memory tree.
//!
//! [`Augtool`] is the production implementation. It drives the system
//! `augtool` binary in batch mode (commands on stdin), the same way other
//! backends in this family drive their system CLIs. Each invocation replays
//! the lens registration prelude, so a tree session is two short-lived
//! processes at most: one read pass for the compare, one write pass for
//! set-and-save.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// A tree-structured, lens-aware view over configuration files.
///
/// The contract mirrors the orchestration the config-option resource needs:
/// register exactly one lens/inclusion pair, load only that registration,
/// read, write, persist. Implementations report failures with their own
/// diagnostics; the resource wraps them with the failing operation name.
pub trait ConfigTree: Send {
    /// Scope `lens` (loaded from `lens_file`) to the files matching `incl`.
    fn register_lens(&mut self, lens: &str, lens_file: &str, incl: &str) -> Result<()>;

    /// Load the registered inclusions into the tree.
    fn load(&mut self) -> Result<()>;

    /// Read the value at `path`, `None` if the node is absent or empty.
    fn get(&mut self, path: &str) -> Result<Option<String>>;

    /// Set the value at `path`, creating the node if needed.
    fn set(&mut self, path: &str, value: &str) -> Result<()>;

    /// Persist modified files back to disk.
    fn save(&mut self) -> Result<()>;

    /// Release the tree. Implementations with no session state may ignore it.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Production tree backed by the system `augtool` binary.
///
/// Runs `augtool --noautoload --root <root>` in batch mode. Registration and
/// pending writes are buffered and replayed as a command script per run, so
/// the read pass and the write pass each see an identical tree.
pub struct Augtool {
    binary: String,
    root: PathBuf,
    prelude: Vec<String>,
    pending: Vec<String>,
    loaded: bool,
}

impl Augtool {
    /// A tree rooted at `/`, driving the `augtool` found on `PATH`.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// A tree rooted at `root`. Used by tests to operate on a scratch tree.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            binary: "augtool".to_string(),
            root: root.into(),
            prelude: Vec::new(),
            pending: Vec::new(),
            loaded: false,
        }
    }

    /// The command script for a read of `path`: prelude, load, get.
    fn read_script(&self, path: &str) -> Vec<String> {
        let mut script = self.prelude.clone();
        script.push("load".to_string());
        script.push(format!("get {path}"));
        script
    }

    /// The command script for persisting pending writes.
    fn write_script(&self) -> Vec<String> {
        let mut script = self.prelude.clone();
        script.push("load".to_string());
        script.extend(self.pending.iter().cloned());
        script.push("save".to_string());
        script
    }

    /// Feed a command script to one `augtool` process and collect stdout.
    fn run(&self, script: &[String]) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .arg("--noautoload")
            .arg("--root")
            .arg(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.binary))?;

        let mut input = script.join("\n");
        input.push('\n');
        child
            .stdin
            .take()
            .context("augtool stdin unavailable")?
            .write_all(input.as_bytes())
            .context("failed to write augtool command script")?;

        let output = child
            .wait_with_output()
            .context("failed to collect augtool output")?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "augtool exited with {}: {}",
                output.status,
                stderr.trim().lines().last().unwrap_or("no diagnostic"),
            );
        }
        if let Some(diag) = first_error_line(&stdout) {
            bail!("augtool reported: {diag}");
        }

        Ok(stdout)
    }
}

impl Default for Augtool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree for Augtool {
    fn register_lens(&mut self, lens: &str, lens_file: &str, incl: &str) -> Result<()> {
        self.prelude
            .push(format!("set /augeas/load/{lens}/lens {lens_file}"));
        self.prelude
            .push(format!("set /augeas/load/{lens}/incl {incl}"));
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        if self.prelude.is_empty() {
            bail!("no lens registered before load");
        }
        self.loaded = true;
        Ok(())
    }

    fn get(&mut self, path: &str) -> Result<Option<String>> {
        if !self.loaded {
            bail!("tree not loaded");
        }
        let stdout = self.run(&self.read_script(path))?;
        Ok(parse_get(path, &stdout))
    }

    fn set(&mut self, path: &str, value: &str) -> Result<()> {
        if !self.loaded {
            bail!("tree not loaded");
        }
        self.pending.push(format!("set {path} '{value}'"));
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let script = self.write_script();
        self.run(&script)?;
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.prelude.clear();
        self.pending.clear();
        self.loaded = false;
        Ok(())
    }
}

/// Extract the value from `augtool`'s `get` output.
///
/// `augtool` prints `PATH = VALUE` for a node with a value and a
/// parenthesized marker (`(none)`, `(o)`) for absent or valueless nodes;
/// anything that is not a `=` line counts as no value.
fn parse_get(path: &str, output: &str) -> Option<String> {
    for line in output.lines().rev() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(path) else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(value) = rest.strip_prefix('=') {
            return Some(value.trim().to_string());
        }
        return None;
    }
    None
}

/// First `error:`-prefixed line in `augtool` output, if any.
fn first_error_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("error:"))
}

/// In-memory tree for tests and embedding harnesses.
///
/// Stores node values in a map and counts the operations performed, so a
/// test can assert that a convergent resource issued no `set` and no `save`.
#[derive(Debug, Default)]
pub struct MemoryTree {
    entries: HashMap<String, String>,
    registered: Vec<(String, String, String)>,
    loaded: bool,
    set_count: usize,
    save_count: usize,
    /// When set, every operation after registration fails with this message.
    fail_with: Option<String>,
}

impl MemoryTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree pre-seeded with `(path, value)` nodes.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Make every subsequent operation fail, for error-path tests.
    pub fn fail_with(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Current value at `path`.
    pub fn value(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Lens registrations seen, as `(lens, lens_file, incl)`.
    pub fn registered(&self) -> &[(String, String, String)] {
        &self.registered
    }

    /// Number of `set` operations performed.
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// Number of `save` operations performed.
    pub fn save_count(&self) -> usize {
        self.save_count
    }

    fn check_failure(&self) -> Result<()> {
        match &self.fail_with {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }
}

impl ConfigTree for MemoryTree {
    fn register_lens(&mut self, lens: &str, lens_file: &str, incl: &str) -> Result<()> {
        self.registered
            .push((lens.to_string(), lens_file.to_string(), incl.to_string()));
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.check_failure()?;
        if self.registered.is_empty() {
            bail!("no lens registered before load");
        }
        self.loaded = true;
        Ok(())
    }

    fn get(&mut self, path: &str) -> Result<Option<String>> {
        self.check_failure()?;
        if !self.loaded {
            bail!("tree not loaded");
        }
        Ok(self.entries.get(path).cloned())
    }

    fn set(&mut self, path: &str, value: &str) -> Result<()> {
        self.check_failure()?;
        if !self.loaded {
            bail!("tree not loaded");
        }
        self.set_count += 1;
        self.entries.insert(path.to_string(), value.to_string());
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.check_failure()?;
        self.save_count += 1;
        Ok(())
    }
}

/// Shared handle so a test can keep inspecting a [`MemoryTree`] after
/// handing it to a resource.
impl ConfigTree for Arc<Mutex<MemoryTree>> {
    fn register_lens(&mut self, lens: &str, lens_file: &str, incl: &str) -> Result<()> {
        lock(self).register_lens(lens, lens_file, incl)
    }

    fn load(&mut self) -> Result<()> {
        lock(self).load()
    }

    fn get(&mut self, path: &str) -> Result<Option<String>> {
        lock(self).get(path)
    }

    fn set(&mut self, path: &str, value: &str) -> Result<()> {
        lock(self).set(path, value)
    }

    fn save(&mut self) -> Result<()> {
        lock(self).save()
    }
}

fn lock(tree: &Arc<Mutex<MemoryTree>>) -> std::sync::MutexGuard<'_, MemoryTree> {
    match tree.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_extracts_value() {
        let out = "/files/etc/ssh/sshd_config/PermitRootLogin = no\n";
        assert_eq!(
            parse_get("/files/etc/ssh/sshd_config/PermitRootLogin", out),
            Some("no".to_string()),
        );
    }

    #[test]
    fn parse_get_absent_node_is_none() {
        let out = "/files/etc/ssh/sshd_config/PermitRootLogin (none)\n";
        assert_eq!(parse_get("/files/etc/ssh/sshd_config/PermitRootLogin", out), None);
    }

    #[test]
    fn parse_get_ignores_unrelated_lines() {
        let out = "something else\n/files/a/b = 42\n";
        assert_eq!(parse_get("/files/a/b", out), Some("42".to_string()));
    }

    #[test]
    fn first_error_line_finds_diagnostics() {
        let out = "ok\nerror: Failed to save\n";
        assert_eq!(first_error_line(out), Some("error: Failed to save"));
        assert_eq!(first_error_line("all good\n"), None);
    }

    #[test]
    fn read_script_registers_then_loads_then_gets() {
        let mut tree = Augtool::with_root("/tmp/root");
        tree.register_lens("Sshd", "Sshd.lns", "/etc/ssh/sshd_config")
            .unwrap();
        let script = tree.read_script("/files/etc/ssh/sshd_config/Port");
        assert_eq!(
            script,
            vec![
                "set /augeas/load/Sshd/lens Sshd.lns".to_string(),
                "set /augeas/load/Sshd/incl /etc/ssh/sshd_config".to_string(),
                "load".to_string(),
                "get /files/etc/ssh/sshd_config/Port".to_string(),
            ],
        );
    }

    #[test]
    fn write_script_replays_prelude_before_sets() {
        let mut tree = Augtool::with_root("/tmp/root");
        tree.register_lens("Sshd", "Sshd.lns", "/etc/ssh/sshd_config")
            .unwrap();
        tree.load().unwrap();
        tree.set("/files/etc/ssh/sshd_config/Port", "2222").unwrap();
        let script = tree.write_script();
        assert_eq!(script[2], "load");
        assert_eq!(script[3], "set /files/etc/ssh/sshd_config/Port '2222'");
        assert_eq!(script[4], "save");
    }

    #[test]
    fn augtool_refuses_load_without_registration() {
        let mut tree = Augtool::new();
        assert!(tree.load().is_err());
    }

    #[test]
    fn save_without_pending_writes_runs_nothing() {
        // No augtool binary needed: save with no pending sets is a no-op.
        let mut tree = Augtool::with_root("/nonexistent");
        assert!(tree.save().is_ok());
    }

    #[test]
    fn memory_tree_enforces_the_orchestration_order() {
        let mut tree = MemoryTree::new();
        assert!(tree.get("/files/x").is_err());

        tree.register_lens("Hosts", "Hosts.lns", "/etc/hosts").unwrap();
        tree.load().unwrap();
        assert_eq!(tree.get("/files/x").unwrap(), None);

        tree.set("/files/x", "1").unwrap();
        tree.save().unwrap();
        assert_eq!(tree.value("/files/x"), Some("1"));
        assert_eq!(tree.set_count(), 1);
        assert_eq!(tree.save_count(), 1);
    }

    #[test]
    fn memory_tree_failure_mode_propagates() {
        let mut tree = MemoryTree::new().fail_with("backend unavailable");
        tree.register_lens("Hosts", "Hosts.lns", "/etc/hosts").unwrap();
        let err = tree.load().unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
    }
}
