//! Packaged archive strategy.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{AcquireContext, AcquisitionOutcome, AcquisitionStrategy};
use crate::toolchain::archive::{extract_archive, find_binary};

/// Downloads the release bundle (`.tar.gz`, or `.zip` on Windows), extracts
/// it and installs the `harbor` binary found anywhere inside.
pub struct ArchiveStrategy;

impl ArchiveStrategy {
    async fn acquire(ctx: &AcquireContext<'_>) -> Result<PathBuf> {
        let url = ctx
            .request
            .repository
            .archive_url(ctx.version, ctx.platform);
        let scratch = ctx.scratch()?;
        let archive_path = scratch
            .path()
            .join(format!("bundle.{}", ctx.platform.archive_extension()));
        let contents = scratch.path().join("contents");

        ctx.fetcher.download(&url, &archive_path).await?;
        extract_archive(&archive_path, &contents)?;

        let file_name = ctx.binary_file_name();
        let binary = find_binary(&contents, &file_name)
            .with_context(|| format!("{url} does not contain {file_name}"))?;

        ctx.install(&binary)
    }
}

#[async_trait(?Send)]
impl AcquisitionStrategy for ArchiveStrategy {
    fn name(&self) -> &'static str {
        "release archive"
    }

    async fn attempt(&self, ctx: &AcquireContext<'_>) -> AcquisitionOutcome {
        Self::acquire(ctx).await.into()
    }
}
