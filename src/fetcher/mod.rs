//! Authenticated, verified retrieval of URLs through the download cache.
//!
//! Every fetch lands in the [`DownloadCache`]. A verified fetch streams the
//! body into the cache work area while hashing it, checks the result against
//! an expected digest, and only then lets the cache publish the bytes, so a
//! failed verification never leaves content at the published path.

mod auth;
mod client;
mod digest_auth;
mod netrc;
mod retry;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::cache::{CacheEntry, CacheResult, DownloadCache, MissingEntry};
use crate::error::{InputError, IntegrityError, LiftError, Result};
use crate::fs::{EXECUTABLE_MODE, set_permissions};
use crate::model::{Digest, DigestAlgorithm, ExpectedDigest, Fingerprint, HashingReader};

pub use client::USER_AGENT;
use client::Client;
pub use retry::RetryConfig;
use retry::retry_transient;

/// Observability target for fetch operations.
pub(crate) const LOG_TARGET: &str = "scie_lift::fetch";

const DIGEST_FILE: &str = "digest.json";
const CHUNK_SIZE: usize = 64 * 1024;

/// Where the expected fingerprint of a download comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedFingerprint {
    /// A known size and fingerprint.
    Digest(Digest),
    /// A known fingerprint of unknown size.
    Fingerprint(Fingerprint),
    /// A sidecar whose first token is the fingerprint.
    Url(Url),
}

/// Options for [`Fetcher::fetch_and_verify`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Expected fingerprint; `<url>.<algorithm>` is consulted when absent.
    pub fingerprint: Option<ExpectedFingerprint>,
    /// Hash algorithm for verification.
    pub algorithm: DigestAlgorithm,
    /// Whether the cached file is made executable.
    pub executable: bool,
    /// How long the cached copy stays fresh; forever when absent.
    pub ttl: Option<Duration>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

impl FetchOptions {
    /// Sets the expected fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: ExpectedFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Marks the download executable.
    #[must_use]
    pub const fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    /// Sets the freshness window.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A verified download in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The cached bytes.
    pub path: Utf8PathBuf,
    /// Their digest.
    pub digest: Digest,
}

impl FetchResult {
    fn load(entry: &CacheEntry) -> std::result::Result<Self, String> {
        let record = entry.aux.join(DIGEST_FILE);
        let text = std::fs::read_to_string(&record).map_err(|err| format!("{record}: {err}"))?;
        let digest: Digest =
            serde_json::from_str(&text).map_err(|err| format!("{record}: {err}"))?;
        Ok(Self {
            path: entry.path.clone(),
            digest,
        })
    }

    fn dump(&self, aux: &Utf8Path) -> Result<()> {
        let record = aux.join(DIGEST_FILE);
        let json = serde_json::to_string(&self.digest)
            .with_context(|| format!("failed to serialise digest for {}", self.path))?;
        std::fs::write(&record, json).with_context(|| format!("failed to write {record}"))?;
        Ok(())
    }
}

/// Retrieves URLs into a [`DownloadCache`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    cache: DownloadCache,
    show_progress: bool,
    retry: RetryConfig,
}

impl Fetcher {
    /// Creates a fetcher over `cache` with progress bars and default retries.
    #[must_use]
    pub fn new(cache: DownloadCache) -> Self {
        Self {
            cache,
            show_progress: true,
            retry: RetryConfig::default(),
        }
    }

    /// Enables or hides download progress bars.
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The backing cache.
    #[must_use]
    pub const fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    /// Fetches `url` into the cache and verifies it.
    ///
    /// On a cache miss the expected digest is resolved first, then the body is
    /// streamed to the cache work area while hashed. An oversize
    /// `Content-Length` or stream aborts early. The size and fingerprint are
    /// checked before publication. A cached entry whose digest record cannot
    /// be read is deleted and fetched again.
    ///
    /// # Errors
    ///
    /// Returns auth, fetch or integrity errors, or internal I/O failures.
    /// Transient failures are retried first.
    pub fn fetch_and_verify(&self, url: &Url, options: &FetchOptions) -> Result<FetchResult> {
        retry_transient(&self.retry, url, || self.fetch_and_verify_once(url, options))
    }

    fn fetch_and_verify_once(&self, url: &Url, options: &FetchOptions) -> Result<FetchResult> {
        let loaded = self.cache.get_or_create(url, options.ttl, |result| match result {
            CacheResult::Missing(entry) => self.download(url, options, entry).map(Some),
            CacheResult::Complete(entry) => Ok(FetchResult::load(entry)
                .map_err(|err| log_unreadable(url, &err))
                .ok()),
        })?;
        if let Some(result) = loaded {
            return Ok(result);
        }
        self.cache.delete(url)?;
        self.cache
            .get_or_create(url, options.ttl, |result| match result {
                CacheResult::Missing(entry) => self.download(url, options, entry),
                CacheResult::Complete(entry) => FetchResult::load(entry).map_err(|err| {
                    LiftError::Internal(color_eyre::eyre::eyre!(
                        "cache entry for {url} is unreadable after refetch: {err}"
                    ))
                }),
            })
    }

    fn download(&self, url: &Url, options: &FetchOptions, entry: &MissingEntry) -> Result<FetchResult> {
        info!(target: LOG_TARGET, url = %url, "downloading");
        let client = Client::configured(url, &options.headers)?;
        let expected = self.expected_digest(url, options)?;
        let response = client.get(url)?;
        if expected.is_too_big(response.content_length) {
            return Err(too_big(url, &expected, response.content_length, "were advertised by Content-Length"));
        }

        let digest = {
            let file = File::create(&entry.work)
                .with_context(|| format!("failed to create {}", entry.work))?;
            let progress = self.progress_bar(url, response.content_length);
            let mut sink = progress.wrap_write(BufWriter::new(file));
            let mut reader = HashingReader::new(response.body, options.algorithm);
            let mut buffer = vec![0_u8; CHUNK_SIZE];
            loop {
                let count = reader
                    .read(&mut buffer)
                    .with_context(|| format!("failed to read response body from {url}"))?;
                if count == 0 {
                    break;
                }
                if expected.is_too_big(Some(reader.bytes_read())) {
                    return Err(too_big(url, &expected, Some(reader.bytes_read()), "have been downloaded so far"));
                }
                sink.write_all(buffer.get(..count).unwrap_or_default())
                    .with_context(|| format!("failed to write {}", entry.work))?;
            }
            sink.flush()
                .with_context(|| format!("failed to write {}", entry.work))?;
            progress.finish_and_clear();
            reader.digest()
        };

        expected.check(
            &format!("download from {url}"),
            &digest.fingerprint,
            digest.size,
        )?;
        if options.executable {
            set_permissions(&entry.work, EXECUTABLE_MODE)?;
        }
        let result = FetchResult {
            path: entry.path.clone(),
            digest,
        };
        result.dump(&entry.aux)?;
        Ok(result)
    }

    fn expected_digest(&self, url: &Url, options: &FetchOptions) -> Result<ExpectedDigest> {
        let algorithm = options.algorithm;
        match &options.fingerprint {
            Some(ExpectedFingerprint::Digest(digest)) => {
                Ok(ExpectedDigest::from_digest(digest, algorithm))
            }
            Some(ExpectedFingerprint::Fingerprint(fingerprint)) => {
                Ok(ExpectedDigest::from_fingerprint(fingerprint.clone(), algorithm))
            }
            Some(ExpectedFingerprint::Url(sidecar)) => {
                self.sidecar_digest(sidecar, algorithm, &options.headers)
            }
            None => {
                let sidecar = Url::parse(&format!("{url}.{}", algorithm.name())).map_err(|err| {
                    InputError::new(format!("Cannot form a digest URL for {url}: {err}"))
                })?;
                self.sidecar_digest(&sidecar, algorithm, &options.headers)
            }
        }
    }

    fn sidecar_digest(
        &self,
        sidecar: &Url,
        algorithm: DigestAlgorithm,
        headers: &BTreeMap<String, String>,
    ) -> Result<ExpectedDigest> {
        let text = Client::configured(sidecar, headers)?.get(sidecar)?.text(sidecar)?;
        let fingerprint = Fingerprint::from_sidecar(&text).ok_or_else(|| {
            InputError::new(format!("The digest file at {sidecar} is empty."))
        })?;
        Ok(ExpectedDigest::from_fingerprint(fingerprint, algorithm))
    }

    /// Fetches `url` into the cache without verification and returns its text.
    ///
    /// # Errors
    ///
    /// Returns auth or fetch errors, or internal I/O failures.
    pub fn fetch_text(
        &self,
        url: &Url,
        ttl: Option<Duration>,
        headers: &BTreeMap<String, String>,
    ) -> Result<String> {
        let path = self.fetch_to_cache(url, ttl, headers)?;
        let text =
            std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
        Ok(text)
    }

    /// Fetches `url` into the cache and deserialises it as JSON.
    ///
    /// # Errors
    ///
    /// As [`Fetcher::fetch_text`], plus an input error for invalid JSON.
    pub fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        ttl: Option<Duration>,
        headers: &BTreeMap<String, String>,
    ) -> Result<T> {
        let text = self.fetch_text(url, ttl, headers)?;
        serde_json::from_str(&text).map_err(|err| {
            InputError::new(format!("The content at {url} is not valid JSON: {err}")).into()
        })
    }

    fn fetch_to_cache(
        &self,
        url: &Url,
        ttl: Option<Duration>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Utf8PathBuf> {
        retry_transient(&self.retry, url, || {
            self.cache.get_or_create(url, ttl, |result| {
                if let CacheResult::Missing(entry) = result {
                    let mut body = Client::configured(url, headers)?.get(url)?.body;
                    let mut file = File::create(&entry.work)
                        .with_context(|| format!("failed to create {}", entry.work))?;
                    std::io::copy(&mut body, &mut file)
                        .with_context(|| format!("failed to download {url}"))?;
                }
                Ok(result.path().to_owned())
            })
        })
    }

    fn progress_bar(&self, url: &Url, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = total.map_or_else(ProgressBar::new_spinner, ProgressBar::new);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        ) {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message(url.to_string());
        progress
    }
}

fn too_big(url: &Url, expected: &ExpectedDigest, observed: Option<u64>, how: &'static str) -> LiftError {
    IntegrityError::TooBig {
        url: url.to_string(),
        expected: expected.size.unwrap_or_default(),
        observed: observed.unwrap_or_default(),
        how,
    }
    .into()
}

fn log_unreadable(url: &Url, err: &str) {
    warn!(
        target: LOG_TARGET,
        url = %url,
        error = %err,
        "Re-creating unreadable cache entry"
    );
}

#[cfg(test)]
mod tests;
