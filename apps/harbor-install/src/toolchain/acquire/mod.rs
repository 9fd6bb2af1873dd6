//! Acquisition pipeline.
//!
//! Produces the installed `harbor` binary through the cheapest strategy that
//! works. Strategies run strictly in order and the pipeline stops at the
//! first success:
//!
//! 1. [`BinaryStrategy`] - prebuilt executable from the release assets
//! 2. [`ArchiveStrategy`] - packaged `.tar.gz` / `.zip` release bundle
//! 3. [`SourceStrategy`] - clone or snapshot the sources and `cargo build`
//!
//! Failures of every strategy but the last are logged at debug level and
//! otherwise swallowed. A failure of the last one ends the run.
//!
//! Each attempt owns a scratch directory that is removed when the attempt
//! returns, whatever the outcome. The only thing an attempt leaves behind is
//! the artifact it moved into the install directory.

mod binary;
mod bundle;
mod source;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;

pub use binary::BinaryStrategy;
pub use bundle::ArchiveStrategy;
pub use source::SourceStrategy;

use crate::errors::InstallerError;
use crate::toolchain::archive::set_executable;
use crate::toolchain::download::Fetcher;
use crate::toolchain::platform::{Os, PlatformInfo};
use crate::toolchain::probe::DependencyReport;
use crate::toolchain::process::ProcessRunner;
use crate::toolchain::request::{BINARY_NAME, HostEnv, InstallRequest};

/// Everything a strategy may read. Strategies share no mutable state.
pub struct AcquireContext<'a> {
    pub request: &'a InstallRequest,
    pub platform: &'a PlatformInfo,
    /// Resolved version, without a leading `v`.
    pub version: &'a str,
    pub host: &'a HostEnv,
    pub deps: &'a DependencyReport,
    pub fetcher: &'a dyn Fetcher,
    pub runner: &'a dyn ProcessRunner,
}

impl AcquireContext<'_> {
    /// File name of the artifact on this platform (`harbor` / `harbor.exe`).
    #[must_use]
    pub fn binary_file_name(&self) -> String {
        self.platform.binary_file_name(BINARY_NAME)
    }

    /// Creates the scratch directory of one attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn scratch(&self) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix("harbor-install-")
            .tempdir()
            .map_err(|e| InstallerError::io_error("cannot create scratch directory", e).into())
    }

    /// Moves a verified binary into the install directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the install directory cannot be written.
    pub fn install(&self, binary: &Path) -> Result<PathBuf> {
        install_artifact(binary, &self.request.install_dir, &self.binary_file_name())
    }
}

/// Result of one strategy attempt.
#[derive(Debug)]
pub enum AcquisitionOutcome {
    /// The artifact now exists at this path.
    Success(PathBuf),
    /// The attempt failed and cleaned up after itself.
    Failure(anyhow::Error),
}

impl From<Result<PathBuf>> for AcquisitionOutcome {
    fn from(result: Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Self::Success(path),
            Err(e) => Self::Failure(e),
        }
    }
}

/// One way of obtaining the artifact.
#[async_trait(?Send)]
pub trait AcquisitionStrategy {
    /// Short label used in progress output and the install summary.
    fn name(&self) -> &'static str;

    async fn attempt(&self, ctx: &AcquireContext<'_>) -> AcquisitionOutcome;
}

/// A successful acquisition.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub artifact: PathBuf,
    /// Name of the strategy that produced the artifact.
    pub method: &'static str,
}

/// Ordered list of strategies.
pub struct Pipeline {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BinaryStrategy),
            Box::new(ArchiveStrategy),
            Box::new(SourceStrategy),
        ])
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn AcquisitionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs the strategies in order until one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::AcquisitionExhausted`], wrapping the last
    /// strategy's error, when no strategy succeeds.
    pub async fn acquire(&self, ctx: &AcquireContext<'_>) -> Result<Acquired> {
        let total = self.strategies.len();
        let mut last_failure = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            println!("[{}/{total}] Trying {}...", index + 1, strategy.name());

            match strategy.attempt(ctx).await {
                AcquisitionOutcome::Success(artifact) => {
                    debug!(method = strategy.name(), artifact = %artifact.display(), "acquired");
                    return Ok(Acquired {
                        artifact,
                        method: strategy.name(),
                    });
                }
                AcquisitionOutcome::Failure(e) => {
                    let cause = format!("{e:#}");
                    debug!(method = strategy.name(), error = %cause, "strategy failed");
                    last_failure = Some(e);
                }
            }
        }

        let exhausted = InstallerError::acquisition_exhausted(ctx.version);
        Err(match last_failure {
            Some(e) => e.context(exhausted),
            None => exhausted.into(),
        })
    }
}

/// Copies `source` into `install_dir/file_name` and marks it executable.
///
/// The copy goes to a sibling temporary name first and is renamed over the
/// destination, so an existing artifact is either fully replaced or left
/// untouched.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the copy fails.
pub fn install_artifact(source: &Path, install_dir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(install_dir).map_err(|e| {
        InstallerError::io_error(format!("cannot create {}", install_dir.display()), e)
    })?;

    let destination = install_dir.join(file_name);
    let staging = install_dir.join(format!(".{file_name}.partial"));

    let staged = std::fs::copy(source, &staging)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), staging.display()))
        .and_then(|_| set_executable(&staging))
        .and_then(|()| {
            std::fs::rename(&staging, &destination).with_context(|| {
                format!("Failed to move {} into place", destination.display())
            })
        });

    if let Err(e) = staged {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }

    Ok(destination)
}

/// Returns whether `bytes` start with the executable signature of `os`.
#[must_use]
pub fn has_executable_signature(bytes: &[u8], os: Os) -> bool {
    const ELF: &[u8] = b"\x7fELF";
    const MACH_O: &[&[u8]] = &[
        b"\xfe\xed\xfa\xce",
        b"\xfe\xed\xfa\xcf",
        b"\xce\xfa\xed\xfe",
        b"\xcf\xfa\xed\xfe",
        b"\xca\xfe\xba\xbe",
    ];
    const PE: &[u8] = b"MZ";

    match os {
        Os::Linux => bytes.len() >= 4 && bytes.starts_with(ELF),
        Os::Macos => bytes.len() >= 4 && MACH_O.iter().any(|magic| bytes.starts_with(magic)),
        Os::Windows => bytes.len() >= 4 && bytes.starts_with(PE),
    }
}

/// Reads the first four bytes of a file.
fn read_signature(path: &Path) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut magic)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(magic)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the strategy tests.

    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    use anyhow::Result;

    use crate::toolchain::platform::PlatformInfo;
    use crate::toolchain::probe::DependencyReport;
    use crate::toolchain::process::{CommandOutput, Invocation};
    use crate::toolchain::request::{HostEnv, InstallRequest};

    /// A fake 64-bit ELF header followed by padding.
    pub const ELF_BINARY: &[u8] = b"\x7fELF\x02\x01\x01\x00harbor";

    pub const HTML_PAGE: &[u8] = b"<!DOCTYPE html><html><body>Not Found</body></html>";

    pub fn linux() -> PlatformInfo {
        PlatformInfo::from_raw("Linux", "x86_64").unwrap()
    }

    pub fn request(install_dir: &Path) -> InstallRequest {
        InstallRequest::new(
            Some("2.0.0".to_string()),
            Some(install_dir.to_path_buf()),
            false,
            "harbor-lang/harbor",
            &HostEnv::default(),
        )
        .unwrap()
    }

    pub fn host(home: &Path) -> HostEnv {
        HostEnv {
            shell: Some("/bin/bash".to_string()),
            home: Some(home.to_path_buf()),
            path: OsString::from("/usr/bin:/bin"),
            cargo_home: Some(home.join(".cargo")),
        }
    }

    pub fn deps_with_git() -> DependencyReport {
        DependencyReport {
            runtime: Some(PathBuf::from("/usr/bin/node")),
            git: Some(PathBuf::from("/usr/bin/git")),
        }
    }

    /// `git` handler writing a minimal checkout into the clone target.
    pub fn fake_clone(inv: &Invocation) -> Result<CommandOutput> {
        let target = PathBuf::from(inv.arguments().last().unwrap());
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("Cargo.toml"), "[package]\nname = \"harbor\"\n")?;
        Ok(CommandOutput::ok(""))
    }

    /// `cargo` handler: answers `--version`, otherwise drops an ELF
    /// `target/release/harbor` into the working directory.
    pub fn fake_cargo(inv: &Invocation) -> Result<CommandOutput> {
        if inv.arguments().first().is_some_and(|a| a == "--version") {
            return Ok(CommandOutput::ok("cargo 1.91.0\n"));
        }
        let release = inv.working_dir().unwrap().join("target").join("release");
        std::fs::create_dir_all(&release)?;
        std::fs::write(release.join("harbor"), ELF_BINARY)?;
        Ok(CommandOutput::ok(""))
    }
}
