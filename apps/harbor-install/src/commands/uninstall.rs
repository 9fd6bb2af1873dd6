//! Uninstall command for harbor-install.
//!
//! Removes the installed `harbor` binary and prunes the install directory
//! when it is left empty. Shell profiles are not edited: the PATH block may
//! sit next to user customizations, so the user is told to remove it.
//!
//! ## Usage
//!
//! ```bash
//! harbor-install --uninstall
//! harbor-install --uninstall --install-dir /opt/harbor
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::commands::install::InstallArgs;
use crate::errors::InstallerError;
use crate::toolchain::request::{BINARY_NAME, default_install_dir};
use crate::toolchain::shell::manual_path_instruction;
use crate::toolchain::{HostEnv, PlatformInfo};

/// What an uninstall removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UninstallReport {
    /// The artifact, if it existed.
    pub removed_artifact: Option<PathBuf>,
    /// Directories removed because they were left empty.
    pub removed_dirs: Vec<PathBuf>,
}

/// Executes the uninstall command.
///
/// # Errors
///
/// Returns an error if the platform is not supported, no install directory
/// can be determined, or the artifact exists but cannot be removed.
pub fn execute(args: &InstallArgs) -> Result<()> {
    let host = HostEnv::capture();
    let install_dir = match &args.install_dir {
        Some(dir) => dir.clone(),
        None => default_install_dir(&host)?,
    };
    let platform = PlatformInfo::detect()?;

    println!("Uninstalling Harbor from {}...", install_dir.display());
    let report = run_uninstall(&install_dir, &platform.binary_file_name(BINARY_NAME))?;

    if report.removed_artifact.is_some() {
        println!("Harbor uninstalled successfully.");
    }
    println!();
    println!(
        "Shell profiles were not modified. If you added {} to PATH, remove the \
         '# Harbor compiler' block from your shell profile, i.e. the line:\n  {}",
        install_dir.display(),
        manual_path_instruction(&install_dir)
    );
    Ok(())
}

/// Removes `install_dir/file_name`, then the install directory and its
/// parent if they end up empty.
///
/// A missing artifact is a warning, not an error.
///
/// # Errors
///
/// Returns an error if the artifact exists but cannot be removed.
pub fn run_uninstall(install_dir: &Path, file_name: &str) -> Result<UninstallReport> {
    let mut report = UninstallReport::default();
    let artifact = install_dir.join(file_name);

    if artifact.exists() {
        std::fs::remove_file(&artifact).map_err(|e| {
            InstallerError::io_error(format!("cannot remove {}", artifact.display()), e)
        })?;
        println!("Removed {}", artifact.display());
        report.removed_artifact = Some(artifact);
    } else {
        eprintln!(
            "Warning: {} does not exist; nothing to remove.",
            artifact.display()
        );
    }

    if remove_if_empty(install_dir) {
        println!("Removed {}", install_dir.display());
        report.removed_dirs.push(install_dir.to_path_buf());

        if let Some(parent) = install_dir.parent()
            && remove_if_empty(parent)
        {
            println!("Removed {}", parent.display());
            report.removed_dirs.push(parent.to_path_buf());
        }
    }

    Ok(report)
}

/// Removes `dir` if it is an empty directory. Failures are only logged.
fn remove_if_empty(dir: &Path) -> bool {
    let is_empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if !is_empty {
        return false;
    }
    match std::fs::remove_dir(dir) {
        Ok(()) => true,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "could not remove empty directory");
            false
        }
    }
}
