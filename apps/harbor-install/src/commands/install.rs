//! Install command for harbor-install.
//!
//! Downloads or builds the Harbor compiler and puts it on `PATH`.
//!
//! ## Usage
//!
//! ```bash
//! harbor-install                               # Install the latest release
//! harbor-install --version-to-install 2.0.0    # Install a specific version
//! harbor-install --install-dir /opt/harbor     # Custom destination
//! harbor-install --no-modify-path              # Leave shell profiles alone
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::toolchain::acquire::{AcquireContext, Pipeline};
use crate::toolchain::download::Fetcher;
use crate::toolchain::probe::DependencyReport;
use crate::toolchain::process::ProcessRunner;
use crate::toolchain::release::{DEFAULT_REPOSITORY, ResolvedVersion, resolve_version};
use crate::toolchain::shell::{PathStatus, configure_path};
use crate::toolchain::verify::{Verification, verify_installation};
use crate::toolchain::{HostEnv, HttpFetcher, InstallRequest, PlatformInfo, SystemRunner};

/// Installation options. Every option has an environment variable twin.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Version to install (e.g. "2.0.0" or "latest").
    #[clap(
        long = "version-to-install",
        visible_alias = "harbor-version",
        env = "HARBOR_VERSION",
        value_name = "VERSION"
    )]
    pub requested_version: Option<String>,

    /// Directory the harbor binary is installed into [default: ~/.harbor/bin].
    #[clap(long, env = "HARBOR_INSTALL_DIR", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Do not add the install directory to PATH in a shell profile.
    #[clap(
        long,
        env = "HARBOR_NO_MODIFY_PATH",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub no_modify_path: bool,

    /// GitHub repository publishing Harbor releases.
    #[clap(
        long,
        env = "HARBOR_REPO",
        default_value = DEFAULT_REPOSITORY,
        value_name = "OWNER/NAME"
    )]
    pub repo: String,

    /// Token for GitHub API requests (raises the rate limit).
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true, hide = true)]
    pub github_token: Option<String>,
}

impl InstallArgs {
    /// Builds the immutable run configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is malformed or no install
    /// directory can be determined.
    pub fn to_request(&self, host: &HostEnv) -> Result<InstallRequest> {
        InstallRequest::new(
            self.requested_version.clone(),
            self.install_dir.clone(),
            self.no_modify_path,
            &self.repo,
            host,
        )
    }
}

/// Result of a successful installation.
#[derive(Debug)]
pub struct InstallSummary {
    pub version: ResolvedVersion,
    pub artifact: PathBuf,
    /// Acquisition method that produced the artifact.
    pub method: &'static str,
    pub path_status: PathStatus,
    pub verification: Verification,
}

impl InstallSummary {
    pub fn print(&self, request: &InstallRequest) {
        println!();
        println!("Harbor v{} installed successfully.", self.version.version);
        println!("  Binary: {}", self.artifact.display());
        println!("  Method: {}", self.method);
        self.verification.print();
        println!();
        println!("{}", self.path_status.message(&request.install_dir));
    }
}

/// Executes the install command.
///
/// # Process
///
/// 1. Detect the current platform
/// 2. Set up the HTTP client and probe optional dependencies
/// 3. Resolve the version to install
/// 4. Acquire the binary (prebuilt, archive, or source build)
/// 5. Register the install directory in the shell profile
/// 6. Verify the installed binary
///
/// # Errors
///
/// Returns an error if:
/// - The platform is not supported
/// - The HTTP client cannot be created
/// - Every acquisition method fails
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let host = HostEnv::capture();
    let request = args.to_request(&host)?;
    let platform = PlatformInfo::detect()?;
    let fetcher = HttpFetcher::new(args.github_token.clone())?;
    let runner = SystemRunner::new(host.path.clone());

    let summary = run_install(&request, &platform, &host, &fetcher, &runner).await?;
    summary.print(&request);
    Ok(())
}

/// Runs the installation pipeline against the given transport and runner.
///
/// # Errors
///
/// Returns an error if every acquisition method fails.
pub async fn run_install(
    request: &InstallRequest,
    platform: &PlatformInfo,
    host: &HostEnv,
    fetcher: &dyn Fetcher,
    runner: &dyn ProcessRunner,
) -> Result<InstallSummary> {
    println!("Installing Harbor for {platform}...");

    println!("Checking dependencies...");
    let deps = DependencyReport::probe(runner);
    deps.print();

    println!("Resolving version...");
    let version = resolve_version(&request.requested_version, &request.repository, fetcher).await?;
    info!(version = %version.version, source = ?version.source, "version resolved");
    println!("Installing harbor v{} into {}", version.version, request.install_dir.display());

    let ctx = AcquireContext {
        request,
        platform,
        version: &version.version,
        host,
        deps: &deps,
        fetcher,
        runner,
    };
    let acquired = Pipeline::default().acquire(&ctx).await?;

    let path_status = configure_path(request, host, platform.os).unwrap_or_else(|e| {
        PathStatus::Failed {
            reason: format!("{e:#}"),
        }
    });

    let verification =
        verify_installation(&acquired.artifact, &request.install_dir, runner).await;

    Ok(InstallSummary {
        version,
        artifact: acquired.artifact,
        method: acquired.method,
        path_status,
        verification,
    })
}
