//! Dependency probing.
//!
//! The only hard requirement, a working HTTP transport, is established by
//! [`HttpFetcher::new`](crate::toolchain::download::HttpFetcher::new), which
//! fails with `NoDownloadTool`. This module looks for the optional programs:
//!
//! - `node` - runs the JavaScript the Harbor compiler emits. Missing is an
//!   advisory only; the compiler itself installs and runs without it.
//! - `git` - lets the source build clone a shallow checkout. Missing means
//!   the source build falls back to snapshot archives.

use std::path::PathBuf;

use crate::toolchain::process::ProcessRunner;

/// Runtime needed to execute compiled Harbor programs.
pub const RUNTIME_PROGRAM: &str = "node";

/// Version control tool used for source checkouts.
pub const GIT_PROGRAM: &str = "git";

/// Outcome of probing for optional programs.
#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    pub runtime: Option<PathBuf>,
    pub git: Option<PathBuf>,
}

impl DependencyReport {
    /// Looks up each optional program on the search path.
    #[must_use]
    pub fn probe(runner: &dyn ProcessRunner) -> Self {
        Self {
            runtime: runner.locate(RUNTIME_PROGRAM),
            git: runner.locate(GIT_PROGRAM),
        }
    }

    /// Returns the advisory for a missing runtime, if any.
    #[must_use]
    pub fn runtime_advisory(&self) -> Option<String> {
        if self.runtime.is_some() {
            return None;
        }
        Some(format!(
            "Node.js ({RUNTIME_PROGRAM}) was not found. Harbor compiles to JavaScript; \
             install Node.js to run compiled programs."
        ))
    }

    /// Prints one status line per program.
    pub fn print(&self) {
        for (name, found) in [(RUNTIME_PROGRAM, &self.runtime), (GIT_PROGRAM, &self.git)] {
            match found {
                Some(path) => println!("  [OK] {name}: {}", path.display()),
                None => println!("  [WARN] {name}: not found"),
            }
        }
        if let Some(advisory) = self.runtime_advisory() {
            eprintln!("Warning: {advisory}");
        }
    }
}
