//! HTTP transport for the Harbor installer.
//!
//! All network access goes through the [`Fetcher`] trait so the version
//! resolver and the acquisition pipeline can be exercised against in-memory
//! fakes. [`HttpFetcher`] is the real implementation on top of `reqwest`.
//!
//! ## Behavior
//!
//! - Every URL is requested exactly once; there is no retry loop
//! - Non-2xx responses are errors
//! - Downloads stream into a `.part` file next to the destination and are
//!   renamed on success, so a failed transfer never leaves the destination
//!   behind
//! - Explicit request timeouts (30s for API queries, 300s for downloads)

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::InstallerError;

/// User-Agent header for HTTP requests. GitHub rejects requests without one.
const USER_AGENT: &str = concat!("harbor-install/", env!("CARGO_PKG_VERSION"));

/// Timeout for small JSON queries such as the release index.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// Timeout for artifact downloads.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between progress updates in milliseconds.
const CLI_PROGRESS_INTERVAL_MS: u128 = 250;

/// Network operations needed by the installer.
#[async_trait(?Send)]
pub trait Fetcher {
    /// Performs a GET request and returns the body as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Downloads `url` into `dest`, creating parent directories as needed.
    ///
    /// On failure `dest` does not exist.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// `reqwest`-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    /// Creates the HTTP client.
    ///
    /// `token` is sent as a bearer token to `api.github.com` only.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::NoDownloadTool`] if the client (including its
    /// TLS backend) cannot be initialised.
    pub fn new(token: Option<String>) -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| InstallerError::no_download_tool(e.to_string()))?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if url.starts_with("https://api.github.com/") {
            request = request.header(reqwest::header::ACCEPT, "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
        }
        request
    }

    async fn stream_to(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .get(url)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        if !response.status().is_success() {
            return Err(InstallerError::download_error(format!(
                "HTTP error {}: {url}",
                response.status()
            ))
            .into());
        }

        let total_size = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create file: {}", dest.display()))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let start_time = Instant::now();
        let mut last_update = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Failed to read chunk from {url}"))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to {}", dest.display()))?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_update).as_millis() >= CLI_PROGRESS_INTERVAL_MS {
                print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
                last_update = now;
            }
        }

        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))?;

        print_progress(downloaded, total_size, start_time.elapsed().as_secs_f64());
        println!();

        debug!(url, bytes = downloaded, "download finished");
        Ok(())
    }
}

#[async_trait(?Send)]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .get(url)
            .timeout(Duration::from_secs(QUERY_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        if !response.status().is_success() {
            return Err(InstallerError::download_error(format!(
                "HTTP error {}: {url}",
                response.status()
            ))
            .into());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let temp_path = dest.with_extension("part");

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        match self.stream_to(url, &temp_path).await {
            Ok(()) => tokio::fs::rename(&temp_path, dest).await.with_context(|| {
                format!(
                    "Failed to rename {} to {}",
                    temp_path.display(),
                    dest.display()
                )
            }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }
}

/// Prints a simple text-based progress line.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, elapsed_secs: f64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0) as u8
    } else {
        0
    };
    let speed = if elapsed_secs > 0.0 {
        downloaded as f64 / elapsed_secs
    } else {
        0.0
    };
    let speed_str = format_speed(speed);
    let downloaded_str = format_bytes(downloaded);
    let total_str = format_bytes(total);

    print!("\r  {downloaded_str}/{total_str} ({percent}%) {speed_str}     ");
    let _ = std::io::stdout().flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
fn format_speed(speed: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if speed >= MB {
        format!("{:.2} MB/s", speed / MB)
    } else if speed >= KB {
        format!("{:.2} KB/s", speed / KB)
    } else {
        format!("{speed:.0} B/s")
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory [`Fetcher`] used by the resolver and pipeline tests.

    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use super::Fetcher;

    /// Serves registered bodies; every other URL behaves like a 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        routes: HashMap<String, Vec<u8>>,
        pub requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
            self.routes.insert(url.into(), body.into());
            self
        }

        fn lookup(&self, url: &str) -> Result<&Vec<u8>> {
            self.requests.borrow_mut().push(url.to_string());
            self.routes
                .get(url)
                .ok_or_else(|| anyhow!("HTTP error 404 Not Found: {url}"))
        }
    }

    #[async_trait(?Send)]
    impl Fetcher for FakeFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            Ok(String::from_utf8_lossy(self.lookup(url)?).into_owned())
        }

        async fn download(&self, url: &str, dest: &Path) -> Result<()> {
            let body = self.lookup(url)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, body)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn format_speed_picks_unit() {
        assert_eq!(format_speed(100.0), "100 B/s");
        assert_eq!(format_speed(4096.0), "4.00 KB/s");
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0), "2.50 MB/s");
    }

    #[test]
    fn http_fetcher_builds_and_drops_blank_token() {
        let fetcher = HttpFetcher::new(Some("   ".to_string())).expect("client should build");
        assert!(fetcher.token.is_none());
    }

    #[tokio::test]
    async fn fake_fetcher_serves_routes_and_404s_the_rest() {
        let fetcher = fake::FakeFetcher::new().route("https://x/ok", "body");
        assert_eq!(fetcher.fetch_text("https://x/ok").await.unwrap(), "body");
        assert!(fetcher.fetch_text("https://x/missing").await.is_err());
        assert_eq!(fetcher.requests.borrow().len(), 2);
    }
}
