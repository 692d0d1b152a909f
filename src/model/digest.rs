//! Content digests and their verification.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::str::FromStr;

use camino::Utf8Path;
use color_eyre::eyre::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::error::{InputError, IntegrityError, LiftError};

/// A lowercase hex digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a hex fingerprint, normalising it to lowercase.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    /// Parses the first whitespace-delimited token of a digest sidecar file,
    /// e.g. the output of `sha256sum`.
    ///
    /// Returns `None` for an empty sidecar.
    #[must_use]
    pub fn from_sidecar(text: &str) -> Option<Self> {
        text.split_whitespace().next().map(Self::new)
    }

    /// Returns the hex text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The size and fingerprint of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    /// Size in bytes.
    pub size: u64,
    /// Hex fingerprint of the bytes.
    #[serde(rename = "hash")]
    pub fingerprint: Fingerprint,
}

impl Digest {
    /// Creates a digest from its parts.
    #[must_use]
    pub const fn new(size: u64, fingerprint: Fingerprint) -> Self {
        Self { size, fingerprint }
    }

    /// Hashes the file at `path` with the default algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn of_path(path: &Utf8Path) -> Result<Self, LiftError> {
        let file = File::open(path).with_context(|| format!("failed to open {path} for hashing"))?;
        let mut reader = HashingReader::new(file, DigestAlgorithm::default());
        io::copy(&mut reader, &mut io::sink())
            .with_context(|| format!("failed to read {path} for hashing"))?;
        Ok(reader.digest())
    }
}

/// Hash algorithms accepted for verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256, the default.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Name of the algorithm, also used as the digest sidecar file suffix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Creates a fresh incremental hasher.
    #[must_use]
    pub fn hasher(self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha384 => Hasher::Sha384(Sha384::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(InputError::new(format!(
                "Unsupported digest algorithm {other:?}; expected one of sha256, sha384 or sha512."
            ))),
        }
    }
}

/// Incremental hasher over one of the supported algorithms.
#[derive(Debug, Clone)]
pub enum Hasher {
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
}

impl Hasher {
    /// Feeds `data` into the hash state.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha384(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    /// Consumes the state and returns the hex fingerprint.
    #[must_use]
    pub fn finalize(self) -> Fingerprint {
        let hex = match self {
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha384(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha512(hasher) => format!("{:x}", hasher.finalize()),
        };
        Fingerprint(hex)
    }
}

/// Reader adapter that hashes and counts every byte read through it.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
    read: u64,
}

impl<R: Read> HashingReader<R> {
    /// Wraps `inner`, hashing with `algorithm`.
    pub fn new(inner: R, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            hasher: algorithm.hasher(),
            read: 0,
        }
    }

    /// Number of bytes read so far.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Digest of the bytes read so far.
    #[must_use]
    pub fn digest(self) -> Digest {
        Digest::new(self.read, self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        let data = buf.get(..count).unwrap_or_default();
        self.hasher.update(data);
        self.read += u64::try_from(count).unwrap_or(u64::MAX);
        Ok(count)
    }
}

/// What a piece of content is expected to hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    /// Expected fingerprint, when known.
    pub fingerprint: Option<Fingerprint>,
    /// Algorithm the fingerprint was computed with.
    pub algorithm: DigestAlgorithm,
    /// Expected size in bytes, when known.
    pub size: Option<u64>,
}

impl ExpectedDigest {
    /// Expects exactly the given digest.
    #[must_use]
    pub fn from_digest(digest: &Digest, algorithm: DigestAlgorithm) -> Self {
        Self {
            fingerprint: Some(digest.fingerprint.clone()),
            algorithm,
            size: Some(digest.size),
        }
    }

    /// Expects a fingerprint of unknown size.
    #[must_use]
    pub const fn from_fingerprint(fingerprint: Fingerprint, algorithm: DigestAlgorithm) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            algorithm,
            size: None,
        }
    }

    /// Returns `true` if `size` exceeds the expected size.
    #[must_use]
    pub fn is_too_big(&self, size: Option<u64>) -> bool {
        matches!((self.size, size), (Some(expected), Some(actual)) if actual > expected)
    }

    /// Checks a computed fingerprint and size against the expectation.
    ///
    /// # Errors
    ///
    /// Returns an [`IntegrityError`] describing the first mismatch.
    pub fn check(
        &self,
        subject: &str,
        actual_fingerprint: &Fingerprint,
        actual_size: u64,
    ) -> Result<(), IntegrityError> {
        if let Some(expected) = self.size {
            if expected != actual_size {
                return Err(IntegrityError::Size {
                    subject: subject.to_owned(),
                    expected,
                    actual: actual_size,
                });
            }
        }
        match &self.fingerprint {
            Some(expected) if expected != actual_fingerprint => Err(IntegrityError::Fingerprint {
                subject: subject.to_owned(),
                algorithm: self.algorithm.name().to_owned(),
                expected: expected.to_string(),
                actual: actual_fingerprint.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Hashes the file at `path` and checks it against the expectation.
    ///
    /// # Errors
    ///
    /// Returns an integrity error on mismatch or an internal error when the
    /// file cannot be read.
    pub fn check_path(&self, path: &Utf8Path, subject: &str) -> Result<(), LiftError> {
        let file = File::open(path).with_context(|| format!("failed to open {path} for hashing"))?;
        let mut reader = HashingReader::new(file, self.algorithm);
        io::copy(&mut reader, &mut io::sink())
            .with_context(|| format!("failed to read {path} for hashing"))?;
        let digest = reader.digest();
        self.check(
            &format!("{subject} at {path}"),
            &digest.fingerprint,
            digest.size,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn hello_digest() -> Digest {
        let mut reader = HashingReader::new(Cursor::new(b"hello".to_vec()), DigestAlgorithm::Sha256);
        io::copy(&mut reader, &mut io::sink()).expect("read cursor");
        reader.digest()
    }

    #[test]
    fn hashing_reader_counts_and_hashes() {
        let digest = hello_digest();
        assert_eq!(digest.size, 5);
        assert_eq!(digest.fingerprint.as_str(), HELLO_SHA256);
    }

    #[test]
    fn sidecar_parsing_takes_first_token() {
        let parsed = Fingerprint::from_sidecar(&format!("{}  *ptex-linux-x86_64\n", HELLO_SHA256.to_uppercase()));
        assert_eq!(parsed, Some(Fingerprint::new(HELLO_SHA256)));
        assert_eq!(Fingerprint::from_sidecar("  \n"), None);
    }

    #[test]
    fn check_reports_size_before_fingerprint() {
        let expected = ExpectedDigest::from_digest(
            &Digest::new(6, Fingerprint::new("00")),
            DigestAlgorithm::Sha256,
        );
        let digest = hello_digest();
        let err = expected
            .check("download", &digest.fingerprint, digest.size)
            .expect_err("size mismatch");
        assert!(matches!(err, IntegrityError::Size { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn check_reports_fingerprint_mismatch() {
        let expected =
            ExpectedDigest::from_fingerprint(Fingerprint::new("00"), DigestAlgorithm::Sha256);
        let digest = hello_digest();
        let err = expected
            .check("download", &digest.fingerprint, digest.size)
            .expect_err("fingerprint mismatch");
        assert!(err.to_string().contains(HELLO_SHA256));
    }

    #[test]
    fn is_too_big_requires_both_sizes() {
        let expected = ExpectedDigest::from_digest(&hello_digest(), DigestAlgorithm::Sha256);
        assert!(expected.is_too_big(Some(6)));
        assert!(!expected.is_too_big(Some(5)));
        assert!(!expected.is_too_big(None));
    }

    #[test]
    fn digest_serialises_with_hash_key() {
        let value = serde_json::to_value(hello_digest()).expect("serialise digest");
        assert_eq!(value["size"], 5);
        assert_eq!(value["hash"], HELLO_SHA256);
    }
}
