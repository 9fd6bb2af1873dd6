//! Error types for the Harbor installer.
//!
//! `InstallerError` names every condition that terminates a run. Stages
//! propagate `anyhow::Result` and attach one of these variants at the point
//! where a failure becomes fatal. Advisory conditions (missing runtime,
//! release index fallback, failed verification) never become an
//! `InstallerError`.

use thiserror::Error;

/// Fatal conditions of an install or uninstall run.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Kernel name or machine architecture is not in the lookup table.
    #[error("unsupported platform: {kernel} on {machine}")]
    UnsupportedPlatform {
        /// Raw kernel name (e.g. `Linux`, `Darwin`).
        kernel: String,
        /// Raw machine architecture (e.g. `x86_64`, `arm64`).
        machine: String,
    },

    /// No usable HTTP transport could be initialised.
    #[error("no download tool available: {message}")]
    NoDownloadTool {
        /// Why the transport could not be created.
        message: String,
    },

    /// Invalid command line arguments or configuration values.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of what was invalid.
        message: String,
    },

    /// Network error during download.
    #[error("download error: {message}")]
    DownloadError {
        /// Description of the download error.
        message: String,
    },

    /// Error reading or writing files.
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Cargo is still missing after running the rustup bootstrap.
    #[error("toolchain bootstrap failed: {message}")]
    ToolchainBootstrapFailed {
        /// Description of the bootstrap failure.
        message: String,
    },

    /// None of the source retrieval methods produced a checkout.
    #[error("could not obtain sources for v{version}")]
    SourceFetchFailed {
        /// The version whose sources were requested.
        version: String,
    },

    /// `cargo build --release` failed or produced no binary.
    #[error("source build failed: {message}")]
    SourceBuildFailed {
        /// Description of the build failure.
        message: String,
    },

    /// Every acquisition tier failed.
    #[error("all acquisition methods failed for harbor v{version}")]
    AcquisitionExhausted {
        /// The version that could not be acquired.
        version: String,
    },

    /// The run was stopped by SIGINT/SIGTERM or Ctrl-C.
    #[error("interrupted")]
    Interrupted,
}

impl InstallerError {
    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(kernel: impl Into<String>, machine: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            kernel: kernel.into(),
            machine: machine.into(),
        }
    }

    /// Creates a new `NoDownloadTool` error.
    #[must_use]
    pub fn no_download_tool(message: impl Into<String>) -> Self {
        Self::NoDownloadTool {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidArguments` error.
    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates a new `DownloadError`.
    #[must_use]
    pub fn download_error(message: impl Into<String>) -> Self {
        Self::DownloadError {
            message: message.into(),
        }
    }

    /// Creates a new `IoError` from an I/O error with context.
    #[must_use]
    pub fn io_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoError {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `ToolchainBootstrapFailed` error.
    #[must_use]
    pub fn toolchain_bootstrap_failed(message: impl Into<String>) -> Self {
        Self::ToolchainBootstrapFailed {
            message: message.into(),
        }
    }

    /// Creates a new `SourceFetchFailed` error.
    #[must_use]
    pub fn source_fetch_failed(version: impl Into<String>) -> Self {
        Self::SourceFetchFailed {
            version: version.into(),
        }
    }

    /// Creates a new `SourceBuildFailed` error.
    #[must_use]
    pub fn source_build_failed(message: impl Into<String>) -> Self {
        Self::SourceBuildFailed {
            message: message.into(),
        }
    }

    /// Creates a new `AcquisitionExhausted` error.
    #[must_use]
    pub fn acquisition_exhausted(version: impl Into<String>) -> Self {
        Self::AcquisitionExhausted {
            version: version.into(),
        }
    }
}
