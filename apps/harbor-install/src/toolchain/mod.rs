//! Installation machinery for the Harbor compiler.
//!
//! ## Module Structure
//!
//! - [`request`] - Run configuration and captured host environment
//! - [`platform`] - OS and architecture detection
//! - [`probe`] - Optional dependency checks (Node.js, git)
//! - [`release`] - Release URLs and version resolution
//! - [`download`] - HTTP transport with progress tracking
//! - [`archive`] - ZIP and tar.gz archive extraction utilities
//! - [`process`] - External command execution
//! - [`acquire`] - Binary, archive and source-build acquisition pipeline
//! - [`bootstrap`] - Rust toolchain bootstrap for source builds
//! - [`shell`] - Shell profile PATH registration
//! - [`verify`] - Post-install smoke test

pub mod acquire;
pub mod archive;
pub mod bootstrap;
pub mod download;
pub mod platform;
pub mod probe;
pub mod process;
pub mod release;
pub mod request;
pub mod shell;
pub mod verify;

pub use download::HttpFetcher;
pub use platform::PlatformInfo;
pub use process::SystemRunner;
pub use request::{HostEnv, InstallRequest};
