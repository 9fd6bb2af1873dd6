//! Run configuration for the Harbor installer.
//!
//! Two immutable values are built once at startup and passed explicitly to
//! every stage:
//!
//! - [`InstallRequest`] - what the user asked for (version, destination,
//!   repository, whether to touch shell profiles).
//! - [`HostEnv`] - the parts of the process environment later stages depend
//!   on (`SHELL`, home directory, `PATH`, `CARGO_HOME`).
//!
//! No stage reads the process environment on its own.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::errors::InstallerError;
use crate::toolchain::release::Repository;

/// Name of the installed compiler binary (without platform extension).
pub const BINARY_NAME: &str = "harbor";

/// Sentinel accepted as a requested version meaning "newest release".
pub const LATEST: &str = "latest";

/// Directory under the home directory that holds the default install dir.
const DEFAULT_HOME_DIR: &str = ".harbor";

/// Immutable description of one installer run.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// `latest` or an explicit version, with or without a leading `v`.
    pub requested_version: String,
    /// Destination directory of the artifact.
    pub install_dir: PathBuf,
    /// Suppresses all shell profile changes.
    pub skip_path_modification: bool,
    /// GitHub repository that publishes releases and sources.
    pub repository: Repository,
}

impl InstallRequest {
    /// Builds a request, filling in the default install directory when none
    /// was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository slug is malformed or no install
    /// directory was given and the home directory is unknown.
    pub fn new(
        requested_version: Option<String>,
        install_dir: Option<PathBuf>,
        skip_path_modification: bool,
        repository: &str,
        host: &HostEnv,
    ) -> Result<Self> {
        let install_dir = match install_dir {
            Some(dir) => dir,
            None => default_install_dir(host)?,
        };

        Ok(Self {
            requested_version: requested_version.unwrap_or_else(|| LATEST.to_string()),
            install_dir,
            skip_path_modification,
            repository: Repository::parse(repository)?,
        })
    }
}

/// Returns `~/.harbor/bin`.
///
/// # Errors
///
/// Returns an error if the home directory could not be determined.
pub fn default_install_dir(host: &HostEnv) -> Result<PathBuf> {
    let home = host.home.as_ref().ok_or_else(|| {
        InstallerError::invalid_arguments(
            "cannot determine home directory; pass --install-dir explicitly",
        )
    })?;
    Ok(home.join(DEFAULT_HOME_DIR).join("bin"))
}

/// Snapshot of the process environment taken once at startup.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    /// Value of `$SHELL`, e.g. `/bin/zsh`.
    pub shell: Option<String>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
    /// Value of `$PATH`.
    pub path: OsString,
    /// `$CARGO_HOME`, or `~/.cargo` when unset.
    pub cargo_home: Option<PathBuf>,
}

impl HostEnv {
    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        let home = dirs::home_dir();
        let cargo_home = std::env::var_os("CARGO_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| home.as_ref().map(|h| h.join(".cargo")));

        Self {
            shell: std::env::var("SHELL").ok().filter(|s| !s.is_empty()),
            home,
            path: std::env::var_os("PATH").unwrap_or_default(),
            cargo_home,
        }
    }

    /// Returns whether `dir` is one of the entries of the captured `PATH`.
    #[must_use]
    pub fn path_contains(&self, dir: &Path) -> bool {
        std::env::split_paths(&self.path).any(|entry| entry == dir)
    }
}
