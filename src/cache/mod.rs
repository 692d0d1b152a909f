//! Content-addressed download cache shared by all fetches.
//!
//! Downloads are keyed by the SHA-256 of their URL and stored in a
//! user-specific cache directory shared across runs and processes.
//!
//! # Cache Location
//!
//! The cache directory is resolved in the following order:
//!
//! 1. `SCIENCE_CACHE_DIR` environment variable if set
//! 2. `$XDG_CACHE_HOME/science` if `XDG_CACHE_HOME` is set
//! 3. `~/.cache/science` as fallback
//!
//! Downloads live in its `downloads` subdirectory.
//!
//! # Cross-Process Coordination
//!
//! Population takes a file lock per cache key, so distinct URLs download in
//! parallel while concurrent fetches of one URL are serialised. Entries are
//! published by atomic rename and are never observed half written.

mod config;
mod download;
mod lock;
mod ttl;

pub use config::{CACHE_DIR_ENV, DownloadCacheConfig, resolve_cache_dir};
pub use download::{CacheEntry, CacheResult, DownloadCache, MissingEntry};
pub use lock::CacheLock;

#[cfg(test)]
mod tests;
