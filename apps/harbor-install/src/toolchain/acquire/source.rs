//! Build-from-source strategy.
//!
//! The last resort. Makes sure cargo exists (bootstrapping Rust if needed),
//! obtains the sources, runs `cargo build --release` and installs
//! `target/release/harbor`. Sources are tried in this order, the first one
//! that yields a checkout with a `Cargo.toml` wins:
//!
//! 1. `git clone --depth 1 --branch v{version}` (needs git)
//! 2. `git clone --depth 1` of the default branch (needs git)
//! 3. snapshot archive of the `v{version}` tag
//! 4. snapshot archive of the default branch

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::debug;

use super::{AcquireContext, AcquisitionOutcome, AcquisitionStrategy};
use crate::errors::InstallerError;
use crate::toolchain::archive::extract_archive;
use crate::toolchain::bootstrap::ensure_cargo;
use crate::toolchain::process::Invocation;

/// Builds Harbor from its sources with cargo.
pub struct SourceStrategy;

/// One place the sources can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceOrigin {
    Clone { git: PathBuf, tag: Option<String> },
    Snapshot { url: String },
}

impl SourceOrigin {
    fn describe(&self) -> String {
        match self {
            Self::Clone { tag: Some(tag), .. } => format!("git clone of {tag}"),
            Self::Clone { tag: None, .. } => "git clone of the default branch".to_string(),
            Self::Snapshot { url } => format!("snapshot {url}"),
        }
    }
}

impl SourceStrategy {
    async fn acquire(ctx: &AcquireContext<'_>) -> Result<PathBuf> {
        let cargo = ensure_cargo(ctx.platform, ctx.host, ctx.fetcher, ctx.runner).await?;

        let scratch = ctx.scratch()?;
        let checkout = scratch.path().join("src");
        fetch_sources(ctx, scratch.path(), &checkout).await?;

        println!(
            "Building harbor v{} from source (this may take a few minutes)...",
            ctx.version
        );
        let built = build(ctx, &cargo, &checkout).await?;

        ctx.install(&built)
    }
}

#[async_trait(?Send)]
impl AcquisitionStrategy for SourceStrategy {
    fn name(&self) -> &'static str {
        "source build"
    }

    async fn attempt(&self, ctx: &AcquireContext<'_>) -> AcquisitionOutcome {
        Self::acquire(ctx).await.into()
    }
}

fn source_origins(ctx: &AcquireContext<'_>) -> Vec<SourceOrigin> {
    let repository = &ctx.request.repository;
    let mut origins = Vec::with_capacity(4);

    if let Some(git) = &ctx.deps.git {
        origins.push(SourceOrigin::Clone {
            git: git.clone(),
            tag: Some(format!("v{}", ctx.version)),
        });
        origins.push(SourceOrigin::Clone {
            git: git.clone(),
            tag: None,
        });
    }
    origins.push(SourceOrigin::Snapshot {
        url: repository.tag_snapshot_url(ctx.version),
    });
    origins.push(SourceOrigin::Snapshot {
        url: repository.branch_snapshot_url(),
    });

    origins
}

/// Fills `checkout` from the first origin that works.
async fn fetch_sources(ctx: &AcquireContext<'_>, scratch: &Path, checkout: &Path) -> Result<()> {
    for origin in source_origins(ctx) {
        if checkout.exists() {
            std::fs::remove_dir_all(checkout).map_err(|e| {
                InstallerError::io_error(format!("cannot clear {}", checkout.display()), e)
            })?;
        }

        println!("Fetching sources ({})...", origin.describe());
        let result = match &origin {
            SourceOrigin::Clone { git, tag } => clone(ctx, git, tag.as_deref(), checkout).await,
            SourceOrigin::Snapshot { url } => snapshot(ctx, url, scratch, checkout).await,
        };

        match result {
            Ok(()) if checkout.join("Cargo.toml").is_file() => return Ok(()),
            Ok(()) => debug!(origin = %origin.describe(), "checkout has no Cargo.toml"),
            Err(e) => {
                let cause = format!("{e:#}");
                debug!(origin = %origin.describe(), error = %cause, "source fetch failed");
            }
        }
    }

    Err(InstallerError::source_fetch_failed(ctx.version).into())
}

async fn clone(
    ctx: &AcquireContext<'_>,
    git: &Path,
    tag: Option<&str>,
    checkout: &Path,
) -> Result<()> {
    let mut invocation = Invocation::new(git).args(["clone", "--depth", "1"]);
    if let Some(tag) = tag {
        invocation = invocation.args(["--branch", tag]);
    }
    let invocation = invocation
        .arg(ctx.request.repository.git_url())
        .arg(checkout);

    let output = ctx.runner.run(&invocation).await?;
    if !output.success() {
        bail!(
            "{} failed: {}",
            invocation.display(),
            output.last_diagnostic_line().unwrap_or("no output")
        );
    }
    Ok(())
}

async fn snapshot(
    ctx: &AcquireContext<'_>,
    url: &str,
    scratch: &Path,
    checkout: &Path,
) -> Result<()> {
    let archive_path = scratch.join("source.tar.gz");
    ctx.fetcher.download(url, &archive_path).await?;
    let extracted = extract_archive(&archive_path, checkout);
    let _ = std::fs::remove_file(&archive_path);
    extracted
}

/// Runs `cargo build --release` and returns the produced binary.
async fn build(ctx: &AcquireContext<'_>, cargo: &Path, checkout: &Path) -> Result<PathBuf> {
    let mut invocation = Invocation::new(cargo)
        .args(["build", "--release"])
        .current_dir(checkout);
    if let Some(bin_dir) = cargo.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        invocation = invocation.prepend_path(bin_dir);
    }

    let output = ctx.runner.run(&invocation).await.map_err(|e| {
        InstallerError::source_build_failed(format!("could not run cargo: {e:#}"))
    })?;
    if !output.success() {
        return Err(InstallerError::source_build_failed(format!(
            "cargo build --release failed: {}",
            output.last_diagnostic_line().unwrap_or("no output")
        ))
        .into());
    }

    let built = checkout
        .join("target")
        .join("release")
        .join(ctx.binary_file_name());
    if !built.is_file() {
        return Err(InstallerError::source_build_failed(format!(
            "cargo finished but {} was not produced",
            built.display()
        ))
        .into());
    }

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::toolchain::archive::fixtures::write_git_archive;
    use crate::toolchain::download::fake::FakeFetcher;
    use crate::toolchain::probe::DependencyReport;
    use crate::toolchain::process::CommandOutput;
    use crate::toolchain::process::fake::FakeRunner;

    fn snapshot_body() -> Vec<u8> {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("snap.tar.gz");
        write_git_archive(
            &path,
            "harbor-2.0.0",
            &[
                ("Cargo.toml", b"[package]\nname = \"harbor\"\n"),
                ("src/main.rs", b"fn main() {}"),
            ],
        );
        std::fs::read(path).unwrap()
    }

    async fn attempt(
        fetcher: &FakeFetcher,
        runner: &FakeRunner,
        deps: &DependencyReport,
        install_dir: &Path,
    ) -> AcquisitionOutcome {
        let request = request(install_dir);
        let host = host(install_dir);
        let platform = linux();
        let ctx = AcquireContext {
            request: &request,
            platform: &platform,
            version: "2.0.0",
            host: &host,
            deps,
            fetcher,
            runner,
        };
        SourceStrategy.attempt(&ctx).await
    }

    fn clone_args(runner: &FakeRunner) -> Vec<String> {
        runner
            .calls
            .borrow()
            .iter()
            .filter(|inv| inv.program().ends_with("git"))
            .map(Invocation::display)
            .collect()
    }

    #[tokio::test]
    async fn tag_clone_then_build_installs_binary() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("git", fake_clone)
            .on("cargo", fake_cargo);

        let outcome =
            attempt(&FakeFetcher::new(), &runner, &deps_with_git(), &install_dir).await;

        let AcquisitionOutcome::Success(path) = outcome else {
            panic!("expected success");
        };
        assert_eq!(path, install_dir.join("harbor"));
        assert_eq!(std::fs::read(&path).unwrap(), ELF_BINARY);

        let clones = clone_args(&runner);
        assert_eq!(clones.len(), 1);
        assert!(clones[0].contains("--depth 1 --branch v2.0.0"));

        let calls = runner.calls.borrow();
        let build = calls
            .iter()
            .find(|inv| inv.arguments().first().is_some_and(|a| a == "build"))
            .unwrap();
        assert_eq!(build.path_prefix(), Some(Path::new("/opt/cargo/bin")));
    }

    #[tokio::test]
    async fn failed_tag_clone_falls_back_to_default_branch() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("git", |inv| {
                if inv.arguments().iter().any(|a| a == "--branch") {
                    Ok(CommandOutput::failed(128, "fatal: Remote branch v2.0.0 not found"))
                } else {
                    fake_clone(inv)
                }
            })
            .on("cargo", fake_cargo);

        let outcome =
            attempt(&FakeFetcher::new(), &runner, &deps_with_git(), &install_dir).await;

        assert!(matches!(outcome, AcquisitionOutcome::Success(_)));
        let clones = clone_args(&runner);
        assert_eq!(clones.len(), 2);
        assert!(!clones[1].contains("--branch"));
    }

    #[tokio::test]
    async fn without_git_uses_tag_snapshot() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let tag_url = request(&install_dir)
            .repository
            .tag_snapshot_url("2.0.0");
        let fetcher = FakeFetcher::new().route(tag_url.clone(), snapshot_body());
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("cargo", fake_cargo);
        let deps = DependencyReport::default();

        let outcome = attempt(&fetcher, &runner, &deps, &install_dir).await;

        assert!(matches!(outcome, AcquisitionOutcome::Success(_)));
        assert_eq!(*fetcher.requests.borrow(), vec![tag_url]);
        assert!(clone_args(&runner).is_empty());
    }

    #[tokio::test]
    async fn branch_snapshot_is_the_final_source() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let branch_url = request(&install_dir).repository.branch_snapshot_url();
        let fetcher = FakeFetcher::new().route(branch_url.clone(), snapshot_body());
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("git", |_| Ok(CommandOutput::failed(128, "fatal: unable to access")))
            .on("cargo", fake_cargo);

        let outcome = attempt(&fetcher, &runner, &deps_with_git(), &install_dir).await;

        assert!(matches!(outcome, AcquisitionOutcome::Success(_)));
        assert_eq!(clone_args(&runner).len(), 2);
        assert_eq!(fetcher.requests.borrow().last(), Some(&branch_url));
    }

    #[tokio::test]
    async fn no_sources_is_source_fetch_failed() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("cargo", fake_cargo);

        let outcome = attempt(
            &FakeFetcher::new(),
            &runner,
            &DependencyReport::default(),
            &install_dir,
        )
        .await;

        let AcquisitionOutcome::Failure(e) = outcome else {
            panic!("expected failure");
        };
        assert!(matches!(
            e.downcast_ref::<InstallerError>(),
            Some(InstallerError::SourceFetchFailed { version }) if version == "2.0.0"
        ));
    }

    #[tokio::test]
    async fn failing_build_is_source_build_failed() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let runner = FakeRunner::new()
            .with_program("cargo", "/opt/cargo/bin/cargo")
            .on("git", fake_clone)
            .on("cargo", |inv| {
                if inv.arguments().first().is_some_and(|a| a == "build") {
                    Ok(CommandOutput::failed(101, "error[E0425]: cannot find value"))
                } else {
                    Ok(CommandOutput::ok("cargo 1.91.0\n"))
                }
            });

        let outcome =
            attempt(&FakeFetcher::new(), &runner, &deps_with_git(), &install_dir).await;

        let AcquisitionOutcome::Failure(e) = outcome else {
            panic!("expected failure");
        };
        assert!(matches!(
            e.downcast_ref::<InstallerError>(),
            Some(InstallerError::SourceBuildFailed { .. })
        ));
        assert!(e.to_string().contains("E0425"));
        assert!(!install_dir.join("harbor").exists());
    }

    #[test]
    fn origins_skip_clones_without_git() {
        let temp = tempfile::tempdir().unwrap();
        let request = request(temp.path());
        let host = host(temp.path());
        let platform = linux();
        let fetcher = FakeFetcher::new();
        let runner = FakeRunner::new();
        let deps = DependencyReport::default();
        let ctx = AcquireContext {
            request: &request,
            platform: &platform,
            version: "2.0.0",
            host: &host,
            deps: &deps,
            fetcher: &fetcher,
            runner: &runner,
        };

        let origins = source_origins(&ctx);
        assert_eq!(origins.len(), 2);
        assert!(
            origins
                .iter()
                .all(|o| matches!(o, SourceOrigin::Snapshot { .. }))
        );
    }
}
