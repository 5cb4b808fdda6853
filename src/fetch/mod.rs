// src/fetch/mod.rs

pub mod links;

use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, time::sleep};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub use links::{parse_bulletin_links, BulletinLink};

/// Retry policy for HTTP requests: `max_retries` extra attempts, doubling
/// the delay each time.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl Retry {
    /// Delay before retry number `attempt` (1-based), saturating instead of
    /// overflowing for large attempt counts.
    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    async fn run<T, F, Fut>(&self, url: &Url, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match attempt_fn().await {
                Ok(t) => return Ok(t),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = self.backoff(attempts);
                    warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                    sleep(backoff).await;
                }
                Err(e) => {
                    error!(%url, error = %e, "Exhausted retries");
                    return Err(e);
                }
            }
        }
    }
}

pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("iccas/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()
        .context("building HTTP client")
}

async fn get_text_core(client: &Client, url: &Url) -> Result<String> {
    debug!("Fetching text from {}", url);
    client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .await
        .with_context(|| format!("Reading text from {}", url))
}

async fn get_bytes_core(client: &Client, url: &Url) -> Result<Vec<u8>> {
    debug!("Fetching bytes from {}", url);
    let body = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .bytes()
        .await
        .with_context(|| format!("Reading body from {}", url))?;
    Ok(body.to_vec())
}

/// Lists every dated bulletin linked from the index page.
#[instrument(level = "info", skip(client, retry), fields(url = %index_url))]
pub async fn fetch_bulletin_links(
    client: &Client,
    index_url: &Url,
    retry: Retry,
) -> Result<Vec<BulletinLink>> {
    let html = retry
        .run(index_url, || get_text_core(client, index_url))
        .await?;
    let links = parse_bulletin_links(&html, index_url);
    info!(count = links.len(), "found bulletin links");
    Ok(links)
}

/// Downloads a bulletin to `dest`, or reads it back if a previous run
/// already saved it there.
#[instrument(level = "info", skip(client, retry, dest), fields(url = %url, dest = %dest.as_ref().display()))]
pub async fn download_bulletin(
    client: &Client,
    url: &Url,
    dest: impl AsRef<Path>,
    retry: Retry,
) -> Result<(PathBuf, Vec<u8>)> {
    let dest = dest.as_ref().to_path_buf();
    if let Ok(bytes) = fs::read(&dest).await {
        if !bytes.is_empty() {
            debug!("using cached bulletin");
            return Ok((dest, bytes));
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let bytes = retry.run(url, || get_bytes_core(client, url)).await?;

    // Write under a temporary name so an interrupted download is never
    // mistaken for a cached bulletin.
    let tmp = dest.with_extension("pdf.part");
    fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &dest)
        .await
        .with_context(|| format!("moving {} into place", tmp.display()))?;
    info!(bytes = bytes.len(), "downloaded bulletin");
    Ok((dest, bytes))
}
