//! Configuration for the download cache.
//!
//! Resolves the science cache directory from environment variables with
//! XDG-compliant fallback paths.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Environment variable overriding the science cache directory.
pub const CACHE_DIR_ENV: &str = "SCIENCE_CACHE_DIR";

/// Subdirectory path within the XDG cache home.
const CACHE_SUBDIR: &str = "science";

/// Subdirectory of the science cache holding downloads.
const DOWNLOADS_SUBDIR: &str = "downloads";

/// Configuration for the download cache.
#[derive(Debug, Clone)]
pub struct DownloadCacheConfig {
    /// Root of the science cache; downloads live beneath it.
    pub cache_dir: Utf8PathBuf,
}

impl DownloadCacheConfig {
    /// Creates a new cache configuration using the resolved cache directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: resolve_cache_dir(),
        }
    }

    /// Creates a cache configuration with a custom directory.
    #[must_use]
    pub const fn with_dir(cache_dir: Utf8PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Directory holding cached downloads.
    #[must_use]
    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.cache_dir.join(DOWNLOADS_SUBDIR)
    }
}

impl Default for DownloadCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the science cache directory from environment and XDG conventions.
///
/// The resolution order is:
///
/// 1. `SCIENCE_CACHE_DIR` environment variable if set and valid UTF-8
/// 2. `$XDG_CACHE_HOME/science` if `XDG_CACHE_HOME` is set
/// 3. `~/.cache/science` as fallback
/// 4. `<tmp>/science` as last resort
///
/// # Examples
///
/// ```
/// use scie_lift::cache::resolve_cache_dir;
///
/// let cache_dir = resolve_cache_dir();
/// assert!(!cache_dir.as_str().is_empty());
/// ```
#[must_use]
pub fn resolve_cache_dir() -> Utf8PathBuf {
    resolve_from_env()
        .or_else(resolve_from_xdg_cache)
        .or_else(resolve_from_home)
        .or_else(resolve_from_tmp)
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp").join(CACHE_SUBDIR))
}

fn non_empty_var(name: &str) -> Option<Utf8PathBuf> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()
}

fn resolve_from_env() -> Option<Utf8PathBuf> {
    non_empty_var(CACHE_DIR_ENV)
}

fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    non_empty_var("XDG_CACHE_HOME").map(|path| path.join(CACHE_SUBDIR))
}

fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".cache").join(CACHE_SUBDIR))
}

fn resolve_from_tmp() -> Option<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .ok()
        .map(|tmp| tmp.join(CACHE_SUBDIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::with_vars;

    #[test]
    fn resolve_cache_dir_respects_explicit_env_var() {
        let expected = "/custom/cache/path";
        let result = with_vars(
            [
                (CACHE_DIR_ENV, Some(expected)),
                ("XDG_CACHE_HOME", None::<&str>),
            ],
            resolve_cache_dir,
        );
        assert_eq!(result.as_str(), expected);
    }

    #[test]
    fn resolve_cache_dir_uses_xdg_cache_home_when_env_var_unset() {
        let xdg_cache = "/home/testuser/.cache";
        let result = with_vars(
            [
                (CACHE_DIR_ENV, None::<&str>),
                ("XDG_CACHE_HOME", Some(xdg_cache)),
            ],
            resolve_cache_dir,
        );
        assert_eq!(result.as_str(), "/home/testuser/.cache/science");
    }

    #[test]
    fn resolve_cache_dir_ignores_whitespace_only_env_var() {
        let xdg_cache = "/home/testuser/.cache";
        let result = with_vars(
            [
                (CACHE_DIR_ENV, Some("   ")),
                ("XDG_CACHE_HOME", Some(xdg_cache)),
            ],
            resolve_cache_dir,
        );
        assert_eq!(result.as_str(), "/home/testuser/.cache/science");
    }

    #[test]
    fn downloads_live_under_the_cache_dir() {
        let config = DownloadCacheConfig::with_dir(Utf8PathBuf::from("/custom/path"));
        assert_eq!(config.downloads_dir().as_str(), "/custom/path/downloads");
    }
}
