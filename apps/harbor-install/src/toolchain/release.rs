//! Release coordinates and version resolution.
//!
//! Harbor is published as GitHub releases. This module knows where every
//! remote resource lives (release index, prebuilt assets, source snapshots)
//! and turns the user's requested version into a concrete one.
//!
//! ## URL Templates
//!
//! ```text
//! index:    https://api.github.com/repos/{repo}/releases/latest
//! binary:   https://github.com/{repo}/releases/download/v{V}/harbor-v{V}-{triple}[.exe]
//! archive:  https://github.com/{repo}/releases/download/v{V}/harbor-v{V}-{triple}.{tar.gz|zip}
//! git:      https://github.com/{repo}.git
//! snapshot: https://github.com/{repo}/archive/refs/{tags/v{V}|heads/main}.tar.gz
//! ```

use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::errors::InstallerError;
use crate::toolchain::download::Fetcher;
use crate::toolchain::platform::PlatformInfo;
use crate::toolchain::request::{BINARY_NAME, LATEST};

/// Default repository publishing Harbor releases.
pub const DEFAULT_REPOSITORY: &str = "harbor-lang/harbor";

/// Version installed when the release index cannot be queried.
pub const FALLBACK_VERSION: &str = "2.0.0";

/// Default branch used when no tag-pinned source is available.
pub const DEFAULT_BRANCH: &str = "main";

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_BASE: &str = "https://github.com";

/// A GitHub `owner/name` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    owner: String,
    name: String,
}

impl Repository {
    /// Parses an `owner/name` slug.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidArguments`] when the slug is not of
    /// the form `owner/name`.
    pub fn parse(slug: &str) -> Result<Self, InstallerError> {
        let slug = slug.trim();
        match slug.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(InstallerError::invalid_arguments(format!(
                "expected repository in 'owner/repo' form, got '{slug}'"
            ))),
        }
    }

    /// Endpoint returning the most recent published release.
    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!("{GITHUB_API_BASE}/repos/{self}/releases/latest")
    }

    fn release_asset_url(&self, version: &str, file_name: &str) -> String {
        format!("{GITHUB_BASE}/{self}/releases/download/v{version}/{file_name}")
    }

    /// URL of the prebuilt binary for `platform`.
    #[must_use]
    pub fn binary_url(&self, version: &str, platform: &PlatformInfo) -> String {
        let file_name = format!(
            "{BINARY_NAME}-v{version}-{}{}",
            platform.target_triple,
            platform.executable_extension()
        );
        self.release_asset_url(version, &file_name)
    }

    /// URL of the packaged archive for `platform`.
    #[must_use]
    pub fn archive_url(&self, version: &str, platform: &PlatformInfo) -> String {
        let file_name = format!(
            "{BINARY_NAME}-v{version}-{}.{}",
            platform.target_triple,
            platform.archive_extension()
        );
        self.release_asset_url(version, &file_name)
    }

    /// Clone URL of the source repository.
    #[must_use]
    pub fn git_url(&self) -> String {
        format!("{GITHUB_BASE}/{self}.git")
    }

    /// Source snapshot of the `v{version}` tag.
    #[must_use]
    pub fn tag_snapshot_url(&self, version: &str) -> String {
        format!("{GITHUB_BASE}/{self}/archive/refs/tags/v{version}.tar.gz")
    }

    /// Source snapshot of the default branch.
    #[must_use]
    pub fn branch_snapshot_url(&self) -> String {
        format!("{GITHUB_BASE}/{self}/archive/refs/heads/{DEFAULT_BRANCH}.tar.gz")
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The subset of the GitHub release payload the resolver reads.
#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// Pinned by the user.
    Explicit,
    /// Read from the release index.
    ReleaseIndex,
    /// The index could not be used; [`FALLBACK_VERSION`] was taken.
    Fallback,
}

/// A concrete version, never empty and never `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

/// Strips one leading `v`/`V` and surrounding whitespace.
#[must_use]
pub fn normalize_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Resolves the requested version.
///
/// `latest` (case-insensitive) queries the release index; any failure there
/// falls back to [`FALLBACK_VERSION`] with a warning and never fails the run.
/// Explicit versions are only normalized, without touching the network.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidArguments`] if an explicit version is
/// empty after normalization.
pub async fn resolve_version(
    requested: &str,
    repository: &Repository,
    fetcher: &dyn Fetcher,
) -> Result<ResolvedVersion> {
    if !requested.trim().eq_ignore_ascii_case(LATEST) {
        let version = normalize_version(requested);
        if version.is_empty() {
            return Err(InstallerError::invalid_arguments(format!(
                "'{requested}' is not a version"
            ))
            .into());
        }
        return Ok(ResolvedVersion {
            version: version.to_string(),
            source: VersionSource::Explicit,
        });
    }

    match query_latest(repository, fetcher).await {
        Ok(version) => Ok(ResolvedVersion {
            version,
            source: VersionSource::ReleaseIndex,
        }),
        Err(e) => {
            debug!(error = %e, "release index query failed");
            eprintln!("{}", fallback_warning(&e));
            Ok(ResolvedVersion {
                version: FALLBACK_VERSION.to_string(),
                source: VersionSource::Fallback,
            })
        }
    }
}

/// Advisory printed when the release index yields no usable version. The
/// whole error chain is shown so a rejected tag is named as such.
fn fallback_warning(e: &anyhow::Error) -> String {
    format!(
        "Warning: could not determine the latest release ({e:#}); \
         falling back to v{FALLBACK_VERSION}"
    )
}

async fn query_latest(repository: &Repository, fetcher: &dyn Fetcher) -> Result<String> {
    let url = repository.latest_release_url();
    let body = fetcher.fetch_text(&url).await?;
    parse_latest_tag(&body)
}

/// Extracts the normalized version from a latest-release response body.
fn parse_latest_tag(body: &str) -> Result<String> {
    let release: LatestRelease =
        serde_json::from_str(body).context("Malformed release index response")?;
    let tag = release
        .tag_name
        .context("Release index response has no tag_name")?;
    let version = normalize_version(&tag);

    semver::Version::parse(version)
        .with_context(|| format!("Release tag '{tag}' is not a semantic version"))?;

    Ok(version.to_string())
}
