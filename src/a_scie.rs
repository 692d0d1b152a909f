//! Loading of the `ptex` and `scie-jump` helper binaries.
//!
//! Both helpers are published as GitHub release assets of the `a-scie`
//! organisation. Pinned versions are cached forever; the latest release is
//! re-checked after [`LATEST_TTL`].

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::Url;
use tracing::debug;

use crate::error::{InputError, Result};
use crate::fetcher::{ExpectedFingerprint, FetchOptions, Fetcher};
use crate::model::{Digest, Ptex, ScieJump};
use crate::platform::Platform;

const LOG_TARGET: &str = "scie_lift::a_scie";

/// How long a "latest" release download stays fresh.
pub const LATEST_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

const PTEX_PROJECT: &str = "ptex";
const PTEX_BINARY: &str = "ptex";
const JUMP_PROJECT: &str = "jump";
const JUMP_BINARY: &str = "scie-jump";

/// A helper binary resolved for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBinary {
    /// Platform binary name, e.g. `ptex.exe`.
    pub binary_name: String,
    /// Where the binary was downloaded from.
    pub url: Url,
    /// The local copy.
    pub path: Utf8PathBuf,
    /// Digest of the local copy.
    pub digest: Digest,
    /// Release version when pinned.
    pub version: Option<String>,
}

/// Supplies the helper binaries a lift needs.
///
/// The default [`ReleaseLoader`] downloads release assets; tests and
/// offline builds substitute their own implementation.
pub trait HelperLoader: fmt::Debug + Send + Sync {
    /// Loads `ptex` for `platform`.
    ///
    /// # Errors
    ///
    /// Returns fetch or integrity errors when the binary cannot be obtained.
    fn load_ptex(&self, platform: Platform, ptex: Option<&Ptex>) -> Result<LoadedBinary>;

    /// Loads `scie-jump` for `platform`, or `None` when the launcher is
    /// supplied some other way.
    ///
    /// # Errors
    ///
    /// Returns fetch or integrity errors when the binary cannot be obtained.
    fn load_jump(&self, platform: Platform, jump: Option<&ScieJump>)
    -> Result<Option<LoadedBinary>>;
}

/// Builds the download URL of a release asset.
///
/// # Errors
///
/// Returns an [`InputError`] if the joined URL does not parse.
pub fn release_url(
    base_url: Option<&Url>,
    project: &str,
    version: Option<&str>,
    binary_name: &str,
) -> std::result::Result<Url, InputError> {
    let base = base_url.map_or_else(
        || format!("https://github.com/a-scie/{project}/releases"),
        |url| url.as_str().trim_end_matches('/').to_owned(),
    );
    let url = match version {
        Some(pinned) => format!("{base}/download/v{pinned}/{binary_name}"),
        None => format!("{base}/latest/download/{binary_name}"),
    };
    Url::parse(&url).map_err(|err| InputError::new(format!("Invalid release URL {url}: {err}")))
}

/// Downloads helpers from their GitHub releases through a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct ReleaseLoader {
    fetcher: Fetcher,
}

impl ReleaseLoader {
    /// Creates a loader backed by `fetcher`.
    #[must_use]
    pub const fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn load(
        &self,
        platform: Platform,
        project: &str,
        binary: &str,
        release: Release<'_>,
    ) -> Result<LoadedBinary> {
        let qualified = platform.qualified_binary_name(binary);
        let url = release_url(release.base_url, project, release.version, &qualified)?;
        let mut options = FetchOptions::default().executable();
        if release.version.is_none() {
            options = options.with_ttl(LATEST_TTL);
        }
        if let Some(digest) = release.digest {
            options = options.with_fingerprint(ExpectedFingerprint::Digest(digest.clone()));
        }
        debug!(target: LOG_TARGET, %url, %platform, "loading helper binary");
        let fetched = self.fetcher.fetch_and_verify(&url, &options)?;
        Ok(LoadedBinary {
            binary_name: platform.binary_name(binary),
            url,
            path: fetched.path,
            digest: fetched.digest,
            version: release.version.map(str::to_owned),
        })
    }
}

#[derive(Clone, Copy)]
struct Release<'a> {
    base_url: Option<&'a Url>,
    version: Option<&'a str>,
    digest: Option<&'a Digest>,
}

impl HelperLoader for ReleaseLoader {
    fn load_ptex(&self, platform: Platform, ptex: Option<&Ptex>) -> Result<LoadedBinary> {
        let release = Release {
            base_url: ptex.and_then(|pin| pin.base_url.as_ref()),
            version: ptex.and_then(|pin| pin.version.as_deref()),
            digest: None,
        };
        self.load(platform, PTEX_PROJECT, PTEX_BINARY, release)
    }

    fn load_jump(
        &self,
        platform: Platform,
        jump: Option<&ScieJump>,
    ) -> Result<Option<LoadedBinary>> {
        let release = Release {
            base_url: jump.and_then(|pin| pin.base_url.as_ref()),
            version: jump.and_then(|pin| pin.version.as_deref()),
            digest: jump.and_then(|pin| pin.digest.as_ref()),
        };
        self.load(platform, JUMP_PROJECT, JUMP_BINARY, release)
            .map(Some)
    }
}
