#![warn(clippy::pedantic)]

//! # Harbor Installer (harbor-install)
//!
//! The `harbor-install` command installs the Harbor compiler on the current
//! machine. It resolves the release to install, then tries, in order:
//!
//! - a prebuilt binary from the GitHub release
//! - a release archive bundling the binary
//! - a source build with cargo (bootstrapping rustup when needed)
//!
//! The install directory is then registered in a shell profile and the
//! installed binary is smoke-tested with `--version`.
//!
//! ## Examples
//!
//! Install the latest release:
//! ```bash
//! harbor-install
//! ```
//!
//! Install a pinned version into a custom directory:
//! ```bash
//! harbor-install --version-to-install 2.0.0 --install-dir /opt/harbor/bin
//! ```
//!
//! Remove the installed binary:
//! ```bash
//! harbor-install --uninstall
//! ```

mod commands;
mod errors;
mod shutdown;
mod toolchain;

use anyhow::Result;
use clap::Parser;
use commands::{install, uninstall};
use errors::InstallerError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "HARBOR_INSTALL_LOG";

/// Installer for the Harbor compiler.
#[derive(Parser)]
#[command(
    name = "harbor-install",
    author,
    version,
    about = "Installs the Harbor compiler",
    long_about = "Installs the Harbor compiler from a prebuilt release binary, a release \
    archive, or a source build, and adds it to PATH.",
    after_help = "\
ENVIRONMENT VARIABLES:
    HARBOR_VERSION          Version to install (default: latest)
    HARBOR_INSTALL_DIR      Install directory (default: ~/.harbor/bin)
    HARBOR_NO_MODIFY_PATH   Skip shell profile changes when set to 1/true
    HARBOR_REPO             GitHub repository (default: harbor-lang/harbor)
    GITHUB_TOKEN            Token for GitHub API requests
    HARBOR_INSTALL_LOG      Log filter (e.g. harbor_install=debug)"
)]
pub struct Cli {
    #[command(flatten)]
    pub install: install::InstallArgs,

    /// Remove the installed binary instead of installing.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    pub uninstall: bool,

    /// Show per-step diagnostics, including why each acquisition method failed.
    #[clap(short, long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = shutdown::until_interrupted(run(), shutdown::wait_for_interrupt()).await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints the error chain and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(InstallerError::Interrupted) = e.downcast_ref::<InstallerError>() {
        eprintln!("\nError: installation interrupted");
        return shutdown::INTERRUPTED_EXIT_CODE;
    }
    eprintln!("Error: {e:?}");
    1
}

/// Installs the global tracing subscriber.
///
/// `HARBOR_INSTALL_LOG` takes precedence; otherwise `--verbose` enables
/// debug output for this crate and everything else stays at `warn`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "harbor_install=debug" } else { "warn" })
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.uninstall {
        uninstall::execute(&cli.install)
    } else {
        install::execute(&cli.install).await
    }
}
