//! The content-addressed download store.
//!
//! Each URL maps to a key directory `<base>/1/<sha256(url)>` holding the
//! downloaded bytes under `_/<basename>` and auxiliary records under `+/`.
//! Siblings `<key>.lck`, `<key>.ttl` and `<key>.work` hold the population
//! lock, the optional expiry marker and in-flight work respectively.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use color_eyre::eyre::Context;
use reqwest::Url;
use sha2::{Digest as _, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::DownloadCacheConfig;
use super::lock::CacheLock;
use super::ttl;
use crate::cleanup_helpers::{delete_path, try_remove_path};
use crate::error::Result;
use crate::fs::{ensure_dir_exists, normalize};

/// Observability target for cache operations.
const LOG_TARGET: &str = "scie_lift::cache";

/// Bumped whenever the on-disk layout changes incompatibly.
const LAYOUT_VERSION: &str = "1";

const CONTENT_DIR: &str = "_";
const AUX_DIR: &str = "+";

/// A published cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cached bytes.
    pub path: Utf8PathBuf,
    /// Directory of auxiliary records published with the bytes.
    pub aux: Utf8PathBuf,
}

/// An entry the caller must populate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    /// Where the bytes will be published.
    pub path: Utf8PathBuf,
    /// Where the caller writes the bytes.
    pub work: Utf8PathBuf,
    /// Where the caller writes auxiliary records.
    pub aux: Utf8PathBuf,
}

/// What [`DownloadCache::get_or_create`] found for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResult {
    /// The entry is published and may be read.
    Complete(CacheEntry),
    /// The entry is absent; the caller holds the key's lock.
    Missing(MissingEntry),
}

impl CacheResult {
    /// The published location of the entry's bytes.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Complete(entry) => &entry.path,
            Self::Missing(entry) => &entry.path,
        }
    }
}

struct EntryPaths {
    key_dir: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    lock: Utf8PathBuf,
    ttl: Utf8PathBuf,
    name: String,
}

impl EntryPaths {
    fn for_url(base_dir: &Utf8Path, url: &Url) -> Self {
        let key = format!("{:x}", Sha256::digest(url.as_str().as_bytes()));
        let root = base_dir.join(LAYOUT_VERSION);
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("download")
            .to_owned();
        Self {
            key_dir: root.join(&key),
            work_dir: root.join(format!("{key}.work")),
            lock: root.join(format!("{key}.lck")),
            ttl: root.join(format!("{key}.ttl")),
            name,
        }
    }

    fn content(&self) -> Utf8PathBuf {
        self.key_dir.join(CONTENT_DIR).join(&self.name)
    }

    fn complete(&self) -> CacheResult {
        CacheResult::Complete(CacheEntry {
            path: self.content(),
            aux: self.key_dir.join(AUX_DIR),
        })
    }

    fn missing(&self) -> MissingEntry {
        MissingEntry {
            path: self.content(),
            work: self.work_dir.join(CONTENT_DIR).join(&self.name),
            aux: self.work_dir.join(AUX_DIR),
        }
    }
}

/// Removes an unpromoted work dir when population fails or unwinds.
struct WorkDirGuard {
    path: Utf8PathBuf,
    armed: bool,
}

impl WorkDirGuard {
    const fn new(path: Utf8PathBuf) -> Self {
        Self { path, armed: true }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkDirGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = try_remove_path(self.path.as_std_path()) {
            warn!(
                target: LOG_TARGET,
                path = %self.path,
                error = %err,
                "failed to remove abandoned cache work dir"
            );
        }
    }
}

/// A URL-keyed, lock-guarded, TTL-aware download store.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    base_dir: Utf8PathBuf,
}

impl DownloadCache {
    /// Creates a cache rooted at `base_dir`.
    ///
    /// A relative `base_dir` is anchored at the working directory so cached
    /// paths stay valid as symlink targets.
    #[must_use]
    pub fn new(base_dir: Utf8PathBuf) -> Self {
        Self {
            base_dir: camino::absolute_utf8(&base_dir)
                .map_or(base_dir, |absolute| normalize(&absolute)),
        }
    }

    /// Creates a cache in the configured downloads directory.
    #[must_use]
    pub fn from_config(config: &DownloadCacheConfig) -> Self {
        Self::new(config.downloads_dir())
    }

    /// The directory holding all entries.
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Runs `populate` against the cache entry for `url`.
    ///
    /// A published entry is handed over as [`CacheResult::Complete`]. Otherwise
    /// the key's lock is taken, publication is re-checked, and `populate` sees
    /// [`CacheResult::Missing`] with the lock held. When `populate` succeeds
    /// the work is atomically renamed into place and, given a `ttl`, an expiry
    /// marker is recorded. A failing `populate` publishes nothing.
    ///
    /// With a `ttl`, an entry whose marker is absent, unreadable or expired
    /// is deleted first.
    ///
    /// # Errors
    ///
    /// Propagates `populate`'s error, or reports cache I/O failures.
    ///
    /// # Examples
    /// ```no_run
    /// use scie_lift::cache::{CacheResult, DownloadCache};
    ///
    /// # fn demo(cache: &DownloadCache) -> scie_lift::Result<()> {
    /// let url = scie_lift::Url::parse("https://example.com/tool").expect("url");
    /// let path = cache.get_or_create(&url, None, |result| {
    ///     if let CacheResult::Missing(entry) = result {
    ///         std::fs::write(&entry.work, b"bytes")?;
    ///     }
    ///     Ok(result.path().to_owned())
    /// })?;
    /// # drop(path);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_or_create<T, F>(&self, url: &Url, ttl: Option<Duration>, populate: F) -> Result<T>
    where
        F: FnOnce(&CacheResult) -> Result<T>,
    {
        let entry = EntryPaths::for_url(&self.base_dir, url);

        if ttl.is_some() && ttl::is_expired(&entry.ttl, Utc::now()) {
            remove_entry(&entry)?;
        }
        if entry.content().exists() {
            return populate(&entry.complete());
        }

        let _lock = CacheLock::acquire_exclusive(&entry.lock)
            .with_context(|| format!("failed to lock cache entry for {url}"))?;
        if entry.content().exists() {
            log_raced(url);
            return populate(&entry.complete());
        }

        try_remove_path(entry.work_dir.as_std_path())
            .with_context(|| format!("failed to clear stale work dir {}", entry.work_dir))?;
        let missing = entry.missing();
        ensure_dir_exists(&entry.work_dir.join(CONTENT_DIR))?;
        ensure_dir_exists(&missing.aux)?;
        let mut guard = WorkDirGuard::new(entry.work_dir.clone());

        log_populate_start(url, &missing.path);
        let value = populate(&CacheResult::Missing(missing))?;

        if let Some(ttl) = ttl {
            ttl::write_expiry(&entry.ttl, ttl)?;
        }
        delete_path(entry.key_dir.as_std_path())
            .with_context(|| format!("failed to clear cache entry {}", entry.key_dir))?;
        std::fs::rename(&entry.work_dir, &entry.key_dir)
            .with_context(|| format!("failed to publish cache entry {}", entry.key_dir))?;
        guard.disarm();
        log_populate_complete(url, &entry.key_dir);
        Ok(value)
    }

    /// Deletes the entry for `url` so the next access repopulates it.
    ///
    /// # Errors
    ///
    /// Reports I/O failures other than the entry being absent.
    pub fn delete(&self, url: &Url) -> Result<()> {
        remove_entry(&EntryPaths::for_url(&self.base_dir, url))
    }
}

fn remove_entry(entry: &EntryPaths) -> Result<()> {
    delete_path(entry.key_dir.as_std_path())
        .with_context(|| format!("failed to delete cache entry {}", entry.key_dir))?;
    try_remove_path(entry.ttl.as_std_path())
        .with_context(|| format!("failed to delete cache expiry marker {}", entry.ttl))?;
    Ok(())
}

fn log_raced(url: &Url) {
    debug!(
        target: LOG_TARGET,
        url = %url,
        "cache entry published by a concurrent populator"
    );
}

fn log_populate_start(url: &Url, path: &Utf8Path) {
    debug!(
        target: LOG_TARGET,
        url = %url,
        path = %path,
        "populating cache entry"
    );
}

fn log_populate_complete(url: &Url, key_dir: &Utf8Path) {
    debug!(
        target: LOG_TARGET,
        url = %url,
        path = %key_dir,
        "cache entry published"
    );
}
