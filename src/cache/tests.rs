//! Behavioural tests for the download cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::Url;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::error::{InputError, LiftError};

struct Harness {
    _temp: TempDir,
    cache: DownloadCache,
    url: Url,
    fetches: AtomicUsize,
}

impl Harness {
    fn fetch(&self, ttl: Option<Duration>) -> Result<Utf8PathBuf, LiftError> {
        self.cache.get_or_create(&self.url, ttl, |result| {
            if let CacheResult::Missing(entry) = result {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                std::fs::write(&entry.work, b"payload")?;
                std::fs::write(entry.aux.join("note"), b"aux")?;
            }
            Ok(result.path().to_owned())
        })
    }

    fn key_root(&self) -> Utf8PathBuf {
        self.cache.base_dir().join("1")
    }

    fn ttl_marker(&self) -> Utf8PathBuf {
        let marker = std::fs::read_dir(self.key_root())
            .expect("key root")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| path.extension().is_some_and(|ext| ext == "ttl"))
            .expect("ttl marker");
        Utf8PathBuf::from_path_buf(marker).expect("utf8 marker")
    }
}

#[fixture]
fn harness() -> Harness {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).expect("utf8 tempdir");
    Harness {
        _temp: temp,
        cache: DownloadCache::new(base),
        url: Url::parse("https://example.com/releases/tool-1.0.tar.gz").expect("url"),
        fetches: AtomicUsize::new(0),
    }
}

#[rstest]
fn sequential_gets_fetch_once(harness: Harness) {
    let first = harness.fetch(None).expect("first fetch");
    let second = harness.fetch(None).expect("second fetch");

    assert_eq!(first, second);
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(first.file_name(), Some("tool-1.0.tar.gz"));
    assert_eq!(std::fs::read(&first).expect("cached bytes"), b"payload");
    let aux_note = first
        .parent()
        .and_then(|content| content.parent())
        .map(|key_dir| key_dir.join("+").join("note"))
        .expect("aux path");
    assert!(aux_note.exists(), "aux records publish with the bytes");
}

#[rstest]
fn expired_ttl_forces_refetch(harness: Harness) {
    let ttl = Some(Duration::from_secs(3600));
    harness.fetch(ttl).expect("first fetch");
    std::fs::write(harness.ttl_marker(), "2000-01-01T00:00:00+00:00").expect("expire marker");

    harness.fetch(ttl).expect("refetch");
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 2);
}

#[rstest]
fn future_ttl_serves_cached_entry(harness: Harness) {
    let ttl = Some(Duration::from_secs(3600));
    harness.fetch(ttl).expect("first fetch");
    std::fs::write(harness.ttl_marker(), "2999-01-01T00:00:00+00:00").expect("extend marker");

    harness.fetch(ttl).expect("cached");
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
}

#[rstest]
fn missing_ttl_marker_forces_refetch(harness: Harness) {
    harness.fetch(None).expect("fetch without ttl");
    harness
        .fetch(Some(Duration::from_secs(60)))
        .expect("ttl requested but never recorded");
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 2);
}

#[rstest]
fn failed_population_publishes_nothing(harness: Harness) {
    let err = harness
        .cache
        .get_or_create(&harness.url, None, |result| -> Result<(), LiftError> {
            if let CacheResult::Missing(entry) = result {
                std::fs::write(&entry.work, b"partial")?;
            }
            Err(InputError::new("digest mismatch").into())
        })
        .expect_err("population fails");
    assert_eq!(err.to_string(), "digest mismatch");

    let published = harness.fetch(None).expect("retry populates");
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(published).expect("bytes"), b"payload");

    let leftovers: Vec<_> = std::fs::read_dir(harness.key_root())
        .expect("key root")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".work"))
        .collect();
    assert!(leftovers.is_empty(), "work dirs must not linger");
}

#[rstest]
fn delete_forces_refetch(harness: Harness) {
    let path = harness.fetch(None).expect("fetch");
    harness.cache.delete(&harness.url).expect("delete");
    assert!(!path.exists());
    harness.fetch(None).expect("refetch");
    assert_eq!(harness.fetches.load(Ordering::SeqCst), 2);
}

#[rstest]
fn concurrent_gets_of_one_url_fetch_once(harness: Harness) {
    let harness = Arc::new(harness);
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let shared = Arc::clone(&harness);
            thread::spawn(move || shared.fetch(None).expect("fetch"))
        })
        .collect();
    let paths: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread"))
        .collect();

    assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
    assert!(paths.windows(2).all(|pair| pair.first() == pair.last()));
}

#[rstest]
fn distinct_urls_use_distinct_entries(harness: Harness) {
    let other = Url::parse("https://example.com/releases/tool-2.0.tar.gz").expect("url");
    let first = harness.fetch(None).expect("fetch");
    let second = harness
        .cache
        .get_or_create(&other, None, |result| {
            if let CacheResult::Missing(entry) = result {
                std::fs::write(&entry.work, b"other")?;
            }
            Ok(result.path().to_owned())
        })
        .expect("fetch other");
    assert_ne!(first, second);
}

#[rstest]
fn relative_base_dirs_are_anchored_at_the_working_directory() {
    let cwd = std::env::current_dir().expect("cwd");
    let expected = Utf8PathBuf::from_path_buf(cwd.join("science-cache")).expect("utf8 cwd");

    let cache = DownloadCache::new(Utf8PathBuf::from("./nested/../science-cache"));

    assert!(cache.base_dir().is_absolute());
    assert_eq!(cache.base_dir(), expected);
}
