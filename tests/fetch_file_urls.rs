//! Exercises the public fetcher against `file://` URLs and a shared cache.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use scie_lift::cache::DownloadCache;
use scie_lift::fetcher::{RetryConfig, USER_AGENT};
use scie_lift::{
    Digest, ExpectedFingerprint, FetchOptions, Fetcher, Fingerprint, LiftError, Url,
};
use tempfile::TempDir;

struct Mirror {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Mirror {
    fn cache(&self) -> DownloadCache {
        DownloadCache::new(self.root.join("cache"))
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.cache())
            .with_progress(false)
            .with_retry(RetryConfig {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                ..RetryConfig::default()
            })
    }

    fn publish(&self, name: &str, contents: &str) -> Url {
        let path = self.root.join("srv").join(name);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, contents).expect("write");
        Url::from_file_path(&path).expect("absolute path")
    }
}

#[fixture]
fn mirror() -> Mirror {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir");
    Mirror { _temp: temp, root }
}

fn digest_of(url: &Url) -> Digest {
    let path = Utf8PathBuf::from_path_buf(url.to_file_path().expect("file url")).expect("utf8");
    Digest::of_path(&path).expect("digest")
}

#[rstest]
fn cache_is_shared_between_fetchers(mirror: Mirror) {
    let url = mirror.publish("dist/app.tar.gz", "archive bytes");
    let options =
        FetchOptions::default().with_fingerprint(ExpectedFingerprint::Digest(digest_of(&url)));

    let first = mirror.fetcher().fetch_and_verify(&url, &options).expect("fetch");
    std::fs::remove_file(url.to_file_path().expect("file url")).expect("remove source");
    let second = mirror
        .fetcher()
        .fetch_and_verify(&url, &options)
        .expect("served from cache");

    assert_eq!(first, second);
}

#[rstest]
fn concurrent_fetches_agree(mirror: Mirror) {
    let url = mirror.publish("tool", "#!/bin/sh\nexit 0\n");
    let options =
        FetchOptions::default().with_fingerprint(ExpectedFingerprint::Digest(digest_of(&url)));

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let fetcher = mirror.fetcher();
                let (url_ref, options_ref) = (&url, &options);
                scope.spawn(move || fetcher.fetch_and_verify(url_ref, options_ref))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join").expect("fetch"))
            .collect()
    });

    let first = results.first().expect("results");
    assert!(results.iter().all(|result| result == first));
}

#[rstest]
fn fingerprint_mismatch_is_a_user_error(mirror: Mirror) {
    let url = mirror.publish("tool", "real bytes");
    let options = FetchOptions::default().with_fingerprint(ExpectedFingerprint::Fingerprint(
        Fingerprint::new("0".repeat(64)),
    ));

    let err = mirror
        .fetcher()
        .fetch_and_verify(&url, &options)
        .expect_err("mismatch");

    assert!(matches!(err, LiftError::Integrity(_)), "unexpected error: {err}");
    assert!(err.is_user_error());
}

#[rstest]
fn expired_text_is_fetched_again(mirror: Mirror) {
    let url = mirror.publish("latest.txt", "v1");
    let headers = BTreeMap::new();
    let fetcher = mirror.fetcher();

    assert_eq!(fetcher.fetch_text(&url, None, &headers).expect("fetch"), "v1");
    mirror.publish("latest.txt", "v2");
    assert_eq!(
        fetcher.fetch_text(&url, None, &headers).expect("cached"),
        "v1"
    );
    assert_eq!(
        fetcher
            .fetch_text(&url, Some(Duration::ZERO), &headers)
            .expect("refetch"),
        "v2"
    );
}

#[rstest]
fn user_agent_names_the_tool() {
    assert!(USER_AGENT.starts_with("science/"), "unexpected agent: {USER_AGENT}");
}
