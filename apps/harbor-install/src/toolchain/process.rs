//! External process execution.
//!
//! Every external command the installer runs (`git`, `cargo`, the rustup
//! installer, the installed `harbor --version`) goes through the
//! [`ProcessRunner`] trait. [`SystemRunner`] is the real implementation
//! over `tokio::process::Command`; tests substitute a scripted fake.
//!
//! Children are spawned with `kill_on_drop`, so abandoning a run (for
//! example on Ctrl-C) also stops a half-finished `git clone` or `cargo build`.
//!
//! A runner never modifies the installer's own environment. When an
//! [`Invocation`] asks for a directory to be prepended to `PATH`, only the
//! child process sees it.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// A single command to execute.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    prepend_path: Option<PathBuf>,
}

impl Invocation {
    /// Starts an invocation of `program` (a bare name or an absolute path).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            prepend_path: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Runs the child in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Prepends `dir` to the child's `PATH`.
    #[must_use]
    pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prepend_path = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    #[must_use]
    pub fn path_prefix(&self) -> Option<&Path> {
        self.prepend_path.as_deref()
    }

    /// Renders the command line for messages, e.g. `git clone --depth 1 ...`.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful exit with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed exit with the given code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Last non-empty line of stderr, falling back to stdout.
    #[must_use]
    pub fn last_diagnostic_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout].into_iter().find_map(|stream| {
            stream
                .lines()
                .map(str::trim)
                .rev()
                .find(|line| !line.is_empty())
        })
    }
}

/// Locates and runs external programs.
#[async_trait(?Send)]
pub trait ProcessRunner {
    /// Returns the absolute path of `program` if it is on the search path.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Runs the invocation to completion and captures its output.
    ///
    /// A non-zero exit is not an error; inspect [`CommandOutput::success`].
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`ProcessRunner`] backed by `which` and `tokio::process::Command`.
pub struct SystemRunner {
    search_path: OsString,
}

impl SystemRunner {
    /// Creates a runner that searches and extends the given `PATH` value.
    #[must_use]
    pub fn new(search_path: OsString) -> Self {
        Self { search_path }
    }

    fn child_path(&self, prefix: &Path) -> Result<OsString> {
        let entries = std::iter::once(prefix.to_path_buf()).chain(
            std::env::split_paths(&self.search_path).filter(|p| !p.as_os_str().is_empty()),
        );
        std::env::join_paths(entries)
            .with_context(|| format!("Cannot add {} to PATH", prefix.display()))
    }
}

#[async_trait(?Send)]
impl ProcessRunner for SystemRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which_in(program, Some(&self.search_path), ".").ok()
    }

    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments()).kill_on_drop(true);

        if let Some(dir) = invocation.working_dir() {
            cmd.current_dir(dir);
        }
        if let Some(prefix) = invocation.path_prefix() {
            cmd.env("PATH", self.child_path(prefix)?);
        }

        debug!(command = %invocation.display(), "running");
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", invocation.display()))?;

        let result = CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            command = %invocation.display(),
            status = ?result.status_code,
            "finished"
        );
        Ok(result)
    }
}
