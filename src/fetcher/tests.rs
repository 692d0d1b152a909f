//! Fetch-and-verify behaviour against `file://` URLs.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::error::FetchError;
use crate::test_support::capture_warn_logs;

struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
    fetcher: Fetcher,
}

impl Sandbox {
    fn serve(&self, name: &str, contents: &[u8]) -> (Url, Digest) {
        let path = self.root.join("srv").join(name);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, contents).expect("write");
        let url = Url::from_file_path(&path).expect("absolute path");
        (url, Digest::of_path(&path).expect("digest"))
    }

    fn published_entries(&self) -> Vec<String> {
        let root = self.fetcher.cache().base_dir().join("1");
        std::fs::read_dir(root)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .filter(|name| !name.contains('.'))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir");
    let fetcher = Fetcher::new(DownloadCache::new(root.join("cache")))
        .with_progress(false)
        .with_retry(RetryConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        });
    Sandbox {
        _temp: temp,
        root,
        fetcher,
    }
}

fn aux_record(result: &FetchResult) -> Utf8PathBuf {
    result
        .path
        .parent()
        .and_then(Utf8Path::parent)
        .map(|key_dir| key_dir.join("+").join("digest.json"))
        .expect("cache layout")
}

#[rstest]
fn verified_fetch_is_cached(sandbox: Sandbox) {
    let (url, digest) = sandbox.serve("tool", b"#!/bin/sh\necho hi\n");
    let options = FetchOptions::default().with_fingerprint(ExpectedFingerprint::Digest(digest.clone()));

    let first = sandbox.fetcher.fetch_and_verify(&url, &options).expect("fetch");
    assert_eq!(first.digest, digest);
    assert_eq!(std::fs::read(&first.path).expect("cached"), b"#!/bin/sh\necho hi\n");

    std::fs::remove_file(url.to_file_path().expect("file path")).expect("remove source");
    let second = sandbox.fetcher.fetch_and_verify(&url, &options).expect("cache hit");
    assert_eq!(second, first);
}

#[rstest]
fn wrong_fingerprint_leaves_nothing_published(sandbox: Sandbox) {
    let (url, _) = sandbox.serve("data.bin", b"payload");
    let options = FetchOptions::default()
        .with_fingerprint(ExpectedFingerprint::Fingerprint(Fingerprint::new("00ff")));

    let err = sandbox
        .fetcher
        .fetch_and_verify(&url, &options)
        .expect_err("mismatch");
    assert!(matches!(err, LiftError::Integrity(IntegrityError::Fingerprint { .. })));
    assert!(sandbox.published_entries().is_empty());
}

#[rstest]
fn oversize_content_is_rejected(sandbox: Sandbox) {
    let (url, digest) = sandbox.serve("data.bin", b"payload");
    let small = Digest::new(3, digest.fingerprint);
    let options = FetchOptions::default().with_fingerprint(ExpectedFingerprint::Digest(small));

    let err = sandbox
        .fetcher
        .fetch_and_verify(&url, &options)
        .expect_err("too big");
    assert!(matches!(
        err,
        LiftError::Integrity(IntegrityError::TooBig { expected: 3, observed: 7, .. })
    ));
    assert!(sandbox.published_entries().is_empty());
}

#[rstest]
fn default_sidecar_supplies_the_fingerprint(sandbox: Sandbox) {
    let (url, digest) = sandbox.serve("data.bin", b"payload");
    sandbox.serve(
        "data.bin.sha256",
        format!("{}  data.bin\n", digest.fingerprint).as_bytes(),
    );

    let result = sandbox
        .fetcher
        .fetch_and_verify(&url, &FetchOptions::default())
        .expect("sidecar verified");
    assert_eq!(result.digest, digest);
}

#[rstest]
fn explicit_sidecar_url_is_used(sandbox: Sandbox) {
    let (url, digest) = sandbox.serve("data.bin", b"payload");
    let (sidecar, _) = sandbox.serve("SHA256SUMS", format!("{}\n", digest.fingerprint).as_bytes());
    let options = FetchOptions::default().with_fingerprint(ExpectedFingerprint::Url(sidecar));

    let result = sandbox.fetcher.fetch_and_verify(&url, &options).expect("verified");
    assert_eq!(result.digest.size, 7);
}

#[rstest]
fn missing_sidecar_is_a_fetch_error(sandbox: Sandbox) {
    let (url, _) = sandbox.serve("data.bin", b"payload");
    let err = sandbox
        .fetcher
        .fetch_and_verify(&url, &FetchOptions::default())
        .expect_err("no sidecar");
    assert!(matches!(err, LiftError::Fetch(FetchError::Status { status: 404, .. })));
    assert!(!err.is_transient());
}

#[cfg(unix)]
#[rstest]
fn executable_downloads_get_mode_bits(sandbox: Sandbox) {
    use std::os::unix::fs::PermissionsExt as _;

    let (url, digest) = sandbox.serve("tool", b"#!/bin/sh\n");
    let options = FetchOptions::default()
        .with_fingerprint(ExpectedFingerprint::Digest(digest))
        .executable();
    let result = sandbox.fetcher.fetch_and_verify(&url, &options).expect("fetch");
    let mode = std::fs::metadata(&result.path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[rstest]
fn unreadable_digest_record_is_refetched(sandbox: Sandbox) {
    let (url, digest) = sandbox.serve("data.bin", b"payload");
    let options = FetchOptions::default().with_fingerprint(ExpectedFingerprint::Digest(digest));
    let first = sandbox.fetcher.fetch_and_verify(&url, &options).expect("fetch");
    std::fs::write(aux_record(&first), "{not json").expect("corrupt record");

    let (logs, second) = capture_warn_logs(|| sandbox.fetcher.fetch_and_verify(&url, &options));
    assert_eq!(second.expect("refetched"), first);
    assert!(logs.iter().any(|line| line.contains("Re-creating unreadable cache entry")));
}

#[rstest]
fn text_and_json_helpers_read_cached_content(sandbox: Sandbox) {
    let (text_url, _) = sandbox.serve("notes.txt", b"hello");
    let (json_url, _) = sandbox.serve("release.json", br#"{"tag_name": "v1.2.3"}"#);
    let headers = BTreeMap::new();

    assert_eq!(
        sandbox.fetcher.fetch_text(&text_url, None, &headers).expect("text"),
        "hello"
    );
    let release: serde_json::Value = sandbox
        .fetcher
        .fetch_json(&json_url, None, &headers)
        .expect("json");
    assert_eq!(release["tag_name"], "v1.2.3");

    let err = sandbox
        .fetcher
        .fetch_json::<serde_json::Value>(&text_url, None, &headers)
        .expect_err("not json");
    assert!(err.is_user_error());
}
