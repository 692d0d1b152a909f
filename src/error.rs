//! Domain error types for manifest assembly.
//!
//! Errors split into anticipated user-facing failures (bad input, integrity
//! mismatches, auth misconfiguration, missing distributions) and internal
//! failures carried as [`color_eyre::Report`]s with context attached.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for operations that may return a [`LiftError`].
pub type Result<T> = std::result::Result<T, LiftError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum LiftError {
    /// Bad or missing configuration supplied by the caller.
    #[error(transparent)]
    Input(#[from] InputError),
    /// Fetched or local content did not match its expected digest.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    /// Per-host credential configuration is ambiguous or incomplete.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// No distribution exists for an explicitly requested platform.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A remote or local fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Unexpected I/O or serialisation failure.
    #[error(transparent)]
    Internal(#[from] Report),
}

impl LiftError {
    /// Returns `true` for anticipated errors a user can correct.
    ///
    /// These are reported without a backtrace.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Input(_) | Self::Integrity(_) | Self::Auth(_) | Self::Provider(_)
        )
    }

    /// Returns `true` when retrying the failed operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for LiftError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(Report::new(err))
    }
}

/// An error caused by bad input that the user can correct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InputError(String);

impl InputError {
    /// Creates an input error carrying the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the user-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Content did not match the digest it was expected to have.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The content had a different size than expected.
    #[error("The {subject} has unexpected size.\nExpected {expected} bytes but found {actual} bytes.")]
    Size {
        /// What was checked.
        subject: String,
        /// Expected size in bytes.
        expected: u64,
        /// Observed size in bytes.
        actual: u64,
    },
    /// The content hashed to a different fingerprint than expected.
    #[error(
        "The {subject} has unexpected contents.\nExpected {algorithm} digest:\n  {expected}\nActual {algorithm} digest:\n  {actual}"
    )]
    Fingerprint {
        /// What was checked.
        subject: String,
        /// Name of the hash algorithm.
        algorithm: String,
        /// Expected hex fingerprint.
        expected: String,
        /// Observed hex fingerprint.
        actual: String,
    },
    /// More bytes arrived (or were advertised) than the expected size allows.
    #[error("The content at {url} is expected to be {expected} bytes, but {observed} bytes {how}.")]
    TooBig {
        /// Source of the content.
        url: String,
        /// Expected size in bytes.
        expected: u64,
        /// Observed or advertised byte count.
        observed: u64,
        /// Whether the count was advertised or downloaded so far.
        how: &'static str,
    },
}

/// Per-host authentication is misconfigured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// More than one kind of credential was configured for a host.
    #[error("{kind} auth was configured for {url} via env var but so was: {others}")]
    Ambiguous {
        /// The credential kind that was selected first.
        kind: String,
        /// The URL being fetched.
        url: String,
        /// Comma separated names of the conflicting variables.
        others: String,
    },
    /// A username was configured without its password.
    #[error("{kind} auth requires a password be configured via the {env_var} env var.")]
    Invalid {
        /// The credential kind missing its password.
        kind: String,
        /// The environment variable that must carry the password.
        env_var: String,
    },
}

/// A provider has no distribution for an explicitly requested platform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("No compatible {provider} distribution was found for {platform}.")]
pub struct ProviderError {
    /// Registry name of the provider.
    pub provider: String,
    /// The requested platform.
    pub platform: String,
}

/// Retrieval of a URL failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server (or file client) answered with a failure status.
    #[error("Failed to fetch {url}: HTTP status {status}")]
    Status {
        /// The URL requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The transport failed before a response was received.
    #[error("Failed to fetch {url}")]
    Transport {
        /// The URL requested.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Returns `true` for timeouts and the HTTP statuses worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 408 | 500 | 502 | 503 | 504),
            Self::Transport { source, .. } => source.is_timeout(),
        }
    }
}
