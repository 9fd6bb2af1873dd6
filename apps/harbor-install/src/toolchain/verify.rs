//! Post-install smoke test.
//!
//! Runs the installed artifact with `--version`, with the install directory
//! prepended to the child's `PATH`. A failure here never fails the install:
//! the compiler may simply need the Node.js runtime that the dependency
//! probe warned about.

use std::path::Path;

use tracing::debug;

use crate::toolchain::process::{Invocation, ProcessRunner};

/// Outcome of the smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The artifact ran and reported this version line (e.g. `Harbor v2.0.0`).
    Confirmed(String),
    /// The artifact could not be run or reported nothing.
    Unconfirmed(String),
}

impl Verification {
    /// Prints the outcome; an unconfirmed result becomes a warning.
    pub fn print(&self) {
        match self {
            Self::Confirmed(version) => println!("Verified: {version}"),
            Self::Unconfirmed(reason) => eprintln!(
                "Warning: could not verify the installation ({reason}). \
                 The binary was installed, but it may need Node.js to run."
            ),
        }
    }
}

/// Runs `artifact --version`.
#[must_use]
pub async fn verify_installation(
    artifact: &Path,
    install_dir: &Path,
    runner: &dyn ProcessRunner,
) -> Verification {
    let invocation = Invocation::new(artifact)
        .arg("--version")
        .prepend_path(install_dir);

    let output = match runner.run(&invocation).await {
        Ok(output) => output,
        Err(e) => return Verification::Unconfirmed(format!("{e:#}")),
    };

    if !output.success() {
        debug!(status = ?output.status_code, stderr = %output.stderr, "version query failed");
        return Verification::Unconfirmed(format!(
            "{} exited with status {}",
            invocation.display(),
            output
                .status_code
                .map_or_else(|| "unknown".to_string(), |c| c.to_string())
        ));
    }

    match output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => Verification::Confirmed(line.to_string()),
        None => Verification::Unconfirmed(format!("{} printed nothing", invocation.display())),
    }
}
