//! Compiles scie application descriptions into per-platform lift manifests.
//!
//! An [`Application`] names the files, commands, and interpreters a scie
//! executable is built from. The [`lift::Assembler`] resolves it for each
//! target [`Platform`]: distributions are picked from the registered
//! providers, eager content is fetched and verified through the
//! [`fetcher::Fetcher`], local inputs are linked into a build chroot, and a
//! deterministic `lift.json` is written next to them ready for the native
//! assembler.
//!
//! # Examples
//! ```
//! use scie_lift::{Distribution, File, Identifier};
//!
//! let id = Identifier::parse("cpython")?;
//! let python = Distribution::new(id.clone(), File::new("cpython.tar.gz").with_key(id))
//!     .with_placeholder(Identifier::parse("python")?, "python/bin/python3");
//! assert_eq!(python.resolve_placeholder(Some("python"))?, "{cpython}/python/bin/python3");
//! # Ok::<(), scie_lift::InputError>(())
//! ```

pub mod a_scie;
pub mod build_info;
pub mod cache;
mod cleanup_helpers;
mod error;
pub mod fetcher;
mod fs;
pub mod lift;
mod model;
pub mod observability;
pub mod placeholders;
mod platform;
#[doc(hidden)]
pub mod test_support;

pub use a_scie::{HelperLoader, LoadedBinary, ReleaseLoader};
pub use build_info::{AppInfo, BuildInfo, Provenance};
pub use error::{
    AuthError, FetchError, InputError, IntegrityError, LiftError, ProviderError, Result,
};
pub use fetcher::{ExpectedFingerprint, FetchOptions, FetchResult, Fetcher};
pub use lift::{Assembler, ExportedManifest, FileMapping, LiftConfig};
pub use model::{
    Application, Command, Digest, DigestAlgorithm, Distribution, Env, ExpectedDigest, Fetch,
    File, FileSource, FileType, Fingerprint, Hasher, HashingReader, Identifier, Interpreter,
    InterpreterGroup, Provider, ProviderFactory, ProviderInfo, ProviderRegistry,
    ProviderRegistryBuilder, Ptex, ScieJump,
};
pub use platform::{CURRENT_PLATFORM_ENV, Platform};
pub use reqwest::Url;

use std::env::{self, VarError};
use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::cache::{DownloadCache, DownloadCacheConfig};

/// Environment variable that hides download progress bars.
pub const NO_PROGRESS_ENV: &str = "SCIENCE_NO_PROGRESS";

/// Ambient settings supplied via `SCIENCE_*` environment variables.
///
/// # Examples
/// ```
/// use scie_lift::ScienceEnvCfg;
///
/// let cfg = ScienceEnvCfg::default();
/// assert!(cfg.cache_dir.is_none());
/// assert_eq!(cfg.verbosity(), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "SCIENCE")]
pub struct ScienceEnvCfg {
    /// Root of the download cache; `downloads/` is created beneath it.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Suppresses download progress bars when `true`.
    ///
    /// Read from [`NO_PROGRESS_ENV`] only; there is no command-line flag.
    #[serde(skip)]
    pub no_progress: Option<bool>,
    /// Log verbosity relative to the default warning level.
    pub verbosity: Option<i8>,
}

impl ScienceEnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    /// Returns an [`InputError`] when a variable holds a value of the wrong
    /// type.
    pub fn load() -> std::result::Result<Self, InputError> {
        let args = [OsString::from("science")];
        let mut cfg = Self::load_from_iter(args)
            .map_err(|err| InputError::new(format!("Invalid science configuration: {err}")))?;
        cfg.no_progress = no_progress_from_env()?;
        Ok(cfg)
    }

    /// The cache layout these settings select.
    #[must_use]
    pub fn cache_config(&self) -> DownloadCacheConfig {
        self.cache_dir
            .clone()
            .map_or_else(DownloadCacheConfig::new, DownloadCacheConfig::with_dir)
    }

    /// A fetcher over the configured cache.
    #[must_use]
    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(DownloadCache::from_config(&self.cache_config()))
            .with_progress(!self.no_progress.unwrap_or(false))
    }

    /// The requested verbosity, `0` when unset.
    #[must_use]
    pub fn verbosity(&self) -> i8 {
        self.verbosity.unwrap_or_default()
    }
}

fn no_progress_from_env() -> std::result::Result<Option<bool>, InputError> {
    match env::var(NO_PROGRESS_ENV) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(InputError::new(format!(
                    "Invalid science configuration: {NO_PROGRESS_ENV} must be a boolean (received {trimmed:?})."
                ))),
            }
        }
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(value)) => Err(InputError::new(format!(
            "Invalid science configuration: {NO_PROGRESS_ENV} must contain valid UTF-8 (received {value:?})."
        ))),
    }
}
