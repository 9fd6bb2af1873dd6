//! Rust toolchain bootstrap for the source build.
//!
//! Building Harbor from source needs `cargo`. When it is missing, the
//! official rustup installer is downloaded and run non-interactively, then
//! cargo is looked up again, this time also under `$CARGO_HOME/bin`, since
//! the installer does not touch the running process's `PATH`.
//!
//! ## Installer URLs
//!
//! ```text
//! unix:    https://sh.rustup.rs               (run with `sh`)
//! windows: https://win.rustup.rs/{arch}       (rustup-init.exe)
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::errors::InstallerError;
use crate::toolchain::download::Fetcher;
use crate::toolchain::platform::PlatformInfo;
use crate::toolchain::process::{Invocation, ProcessRunner};
use crate::toolchain::request::HostEnv;

/// Program name of the Rust build tool.
pub const CARGO_PROGRAM: &str = "cargo";

const RUSTUP_UNIX_URL: &str = "https://sh.rustup.rs";
const RUSTUP_WINDOWS_URL: &str = "https://win.rustup.rs";

/// Arguments making rustup-init non-interactive and leave profiles alone.
const RUSTUP_ARGS: &[&str] = &["-y", "--profile", "minimal", "--no-modify-path"];

/// URL of the rustup installer for `platform`.
#[must_use]
pub fn rustup_installer_url(platform: &PlatformInfo) -> String {
    if platform.is_windows() {
        format!("{RUSTUP_WINDOWS_URL}/{}", platform.arch.as_str())
    } else {
        RUSTUP_UNIX_URL.to_string()
    }
}

/// Looks for cargo on the search path, then under `$CARGO_HOME/bin`.
#[must_use]
pub fn find_cargo(
    platform: &PlatformInfo,
    host: &HostEnv,
    runner: &dyn ProcessRunner,
) -> Option<PathBuf> {
    runner.locate(CARGO_PROGRAM).or_else(|| {
        host.cargo_home
            .as_ref()
            .map(|home| {
                home.join("bin")
                    .join(platform.binary_file_name(CARGO_PROGRAM))
            })
            .filter(|candidate| candidate.is_file())
    })
}

/// Returns the path of a usable cargo, installing Rust first if needed.
///
/// # Errors
///
/// Returns [`InstallerError::ToolchainBootstrapFailed`] if the installer
/// cannot be downloaded or run, or cargo is still missing afterwards.
pub async fn ensure_cargo(
    platform: &PlatformInfo,
    host: &HostEnv,
    fetcher: &dyn Fetcher,
    runner: &dyn ProcessRunner,
) -> Result<PathBuf> {
    if let Some(cargo) = find_cargo(platform, host, runner) {
        report_version(&cargo, runner).await;
        return Ok(cargo);
    }

    println!("Cargo not found. Installing the Rust toolchain with rustup...");
    run_rustup(platform, fetcher, runner).await?;

    let cargo = find_cargo(platform, host, runner).ok_or_else(|| {
        InstallerError::toolchain_bootstrap_failed(
            "rustup finished but cargo is still not available",
        )
    })?;
    report_version(&cargo, runner).await;
    Ok(cargo)
}

async fn run_rustup(
    platform: &PlatformInfo,
    fetcher: &dyn Fetcher,
    runner: &dyn ProcessRunner,
) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix("harbor-rustup-")
        .tempdir()
        .map_err(|e| InstallerError::io_error("cannot create scratch directory", e))?;

    let url = rustup_installer_url(platform);
    let installer = scratch.path().join(if platform.is_windows() {
        "rustup-init.exe"
    } else {
        "rustup-init.sh"
    });

    fetcher.download(&url, &installer).await.map_err(|e| {
        InstallerError::toolchain_bootstrap_failed(format!(
            "could not download the rustup installer from {url}: {e:#}"
        ))
    })?;

    let invocation = installer_invocation(platform, &installer);
    let output = runner.run(&invocation).await.map_err(|e| {
        InstallerError::toolchain_bootstrap_failed(format!("could not run rustup: {e:#}"))
    })?;

    if !output.success() {
        return Err(InstallerError::toolchain_bootstrap_failed(format!(
            "rustup exited with status {}: {}",
            output
                .status_code
                .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
            output.last_diagnostic_line().unwrap_or("no output")
        ))
        .into());
    }

    debug!("rustup finished");
    Ok(())
}

fn installer_invocation(platform: &PlatformInfo, installer: &Path) -> Invocation {
    if platform.is_windows() {
        Invocation::new(installer).args(RUSTUP_ARGS)
    } else {
        Invocation::new("sh").arg(installer).args(RUSTUP_ARGS)
    }
}

/// Prints `cargo --version`; failures are ignored.
async fn report_version(cargo: &Path, runner: &dyn ProcessRunner) {
    match runner.run(&Invocation::new(cargo).arg("--version")).await {
        Ok(output) if output.success() => {
            println!("Using {}", output.stdout.trim());
        }
        Ok(output) => debug!(status = ?output.status_code, "cargo --version failed"),
        Err(e) => debug!(error = %e, "cargo --version could not run"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::download::fake::FakeFetcher;
    use crate::toolchain::process::CommandOutput;
    use crate::toolchain::process::fake::FakeRunner;

    fn linux() -> PlatformInfo {
        PlatformInfo::from_raw("Linux", "x86_64").unwrap()
    }

    fn host_with_cargo_home(cargo_home: &Path) -> HostEnv {
        HostEnv {
            cargo_home: Some(cargo_home.to_path_buf()),
            ..HostEnv::default()
        }
    }

    fn assert_bootstrap_failed(err: &anyhow::Error) {
        assert!(
            matches!(
                err.downcast_ref::<InstallerError>(),
                Some(InstallerError::ToolchainBootstrapFailed { .. })
            ),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn installer_urls_follow_platform() {
        assert_eq!(rustup_installer_url(&linux()), "https://sh.rustup.rs");
        let windows = PlatformInfo::from_raw("Windows_NT", "arm64").unwrap();
        assert_eq!(rustup_installer_url(&windows), "https://win.rustup.rs/aarch64");
    }

    #[tokio::test]
    async fn present_cargo_skips_bootstrap() {
        let fetcher = FakeFetcher::new();
        let runner = FakeRunner::new()
            .with_program("cargo", "/usr/bin/cargo")
            .on("cargo", |_| Ok(CommandOutput::ok("cargo 1.91.0\n")));

        let cargo = ensure_cargo(&linux(), &HostEnv::default(), &fetcher, &runner)
            .await
            .unwrap();

        assert_eq!(cargo, PathBuf::from("/usr/bin/cargo"));
        assert!(fetcher.requests.borrow().is_empty());
        assert_eq!(runner.program_names(), vec!["cargo"]);
    }

    #[tokio::test]
    async fn missing_cargo_is_installed_and_reprobed_in_cargo_home() {
        let temp = tempfile::tempdir().unwrap();
        let cargo_home = temp.path().join(".cargo");
        let installed_cargo = cargo_home.join("bin").join("cargo");

        let fetcher = FakeFetcher::new().route(RUSTUP_UNIX_URL, "#!/bin/sh\n");
        let target = installed_cargo.clone();
        let runner = FakeRunner::new()
            .on("sh", move |inv| {
                assert!(inv.arguments().iter().any(|a| a == "--no-modify-path"));
                std::fs::create_dir_all(target.parent().unwrap())?;
                std::fs::write(&target, b"cargo")?;
                Ok(CommandOutput::ok(""))
            })
            .on("cargo", |_| Ok(CommandOutput::ok("cargo 1.91.0\n")));

        let cargo = ensure_cargo(
            &linux(),
            &host_with_cargo_home(&cargo_home),
            &fetcher,
            &runner,
        )
        .await
        .unwrap();

        assert_eq!(cargo, installed_cargo);
        assert_eq!(runner.program_names(), vec!["sh", "cargo"]);
    }

    #[tokio::test]
    async fn cargo_still_missing_after_rustup_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().route(RUSTUP_UNIX_URL, "#!/bin/sh\n");
        let runner = FakeRunner::new().on("sh", |_| Ok(CommandOutput::ok("")));

        let err = ensure_cargo(
            &linux(),
            &host_with_cargo_home(temp.path()),
            &fetcher,
            &runner,
        )
        .await
        .unwrap_err();

        assert_bootstrap_failed(&err);
    }

    #[tokio::test]
    async fn failing_installer_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().route(RUSTUP_UNIX_URL, "#!/bin/sh\n");
        let runner =
            FakeRunner::new().on("sh", |_| Ok(CommandOutput::failed(1, "error: no network")));

        let err = ensure_cargo(
            &linux(),
            &host_with_cargo_home(temp.path()),
            &fetcher,
            &runner,
        )
        .await
        .unwrap_err();

        assert_bootstrap_failed(&err);
        assert!(format!("{err:#}").contains("error: no network"));
    }

    #[tokio::test]
    async fn unreachable_installer_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();

        let err = ensure_cargo(
            &linux(),
            &host_with_cargo_home(temp.path()),
            &FakeFetcher::new(),
            &runner,
        )
        .await
        .unwrap_err();

        assert_bootstrap_failed(&err);
        assert!(runner.program_names().is_empty());
    }
}
