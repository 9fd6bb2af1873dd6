//! Prebuilt binary strategy.

use std::path::PathBuf;

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{
    AcquireContext, AcquisitionOutcome, AcquisitionStrategy, has_executable_signature,
    read_signature,
};

/// Downloads the release's prebuilt executable for the target triple.
///
/// The download is accepted only if it starts with the executable signature
/// of the target OS, so a 200 response carrying an HTML error page or a
/// truncated body never gets installed.
pub struct BinaryStrategy;

impl BinaryStrategy {
    async fn acquire(ctx: &AcquireContext<'_>) -> Result<PathBuf> {
        let url = ctx
            .request
            .repository
            .binary_url(ctx.version, ctx.platform);
        let scratch = ctx.scratch()?;
        let downloaded = scratch.path().join(ctx.binary_file_name());

        ctx.fetcher.download(&url, &downloaded).await?;

        let signature = read_signature(&downloaded)?;
        if !has_executable_signature(&signature, ctx.platform.os) {
            bail!(
                "{url} did not return a {} executable",
                ctx.platform.os.as_str()
            );
        }

        ctx.install(&downloaded)
    }
}

#[async_trait(?Send)]
impl AcquisitionStrategy for BinaryStrategy {
    fn name(&self) -> &'static str {
        "prebuilt binary"
    }

    async fn attempt(&self, ctx: &AcquireContext<'_>) -> AcquisitionOutcome {
        Self::acquire(ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::toolchain::download::fake::FakeFetcher;
    use crate::toolchain::process::fake::FakeRunner;

    async fn attempt_with(
        fetcher: &FakeFetcher,
        install_dir: &std::path::Path,
    ) -> AcquisitionOutcome {
        let request = request(install_dir);
        let host = host(install_dir);
        let deps = deps_with_git();
        let runner = FakeRunner::new();
        let platform = linux();
        let ctx = AcquireContext {
            request: &request,
            platform: &platform,
            version: "2.0.0",
            host: &host,
            deps: &deps,
            fetcher,
            runner: &runner,
        };
        BinaryStrategy.attempt(&ctx).await
    }

    fn binary_url() -> String {
        request(std::path::Path::new("/unused"))
            .repository
            .binary_url("2.0.0", &linux())
    }

    #[tokio::test]
    async fn installs_executable_download() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let fetcher = FakeFetcher::new().route(binary_url(), ELF_BINARY);

        let outcome = attempt_with(&fetcher, &install_dir).await;

        let AcquisitionOutcome::Success(path) = outcome else {
            panic!("expected success");
        };
        assert_eq!(path, install_dir.join("harbor"));
        assert_eq!(std::fs::read(&path).unwrap(), ELF_BINARY);
    }

    #[tokio::test]
    async fn html_payload_is_rejected_and_nothing_installed() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");
        let fetcher = FakeFetcher::new().route(binary_url(), HTML_PAGE);

        let outcome = attempt_with(&fetcher, &install_dir).await;

        let AcquisitionOutcome::Failure(e) = outcome else {
            panic!("expected failure");
        };
        assert!(e.to_string().contains("did not return a linux executable"));
        assert!(!install_dir.join("harbor").exists());
    }

    #[tokio::test]
    async fn missing_asset_fails() {
        let temp = tempfile::tempdir().unwrap();
        let install_dir = temp.path().join("bin");

        let outcome = attempt_with(&FakeFetcher::new(), &install_dir).await;

        assert!(matches!(outcome, AcquisitionOutcome::Failure(_)));
        assert!(!install_dir.exists());
    }
}
