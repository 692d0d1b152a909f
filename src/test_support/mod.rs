//! Helpers shared by unit and integration tests.
//!
//! [`StaticProvider`] answers distribution lookups from a fixed table and
//! [`StubLoader`] hands out a local `ptex` so lifts run without network access.

mod fakes;
#[cfg(any(test, feature = "logging"))]
mod logging;

pub use fakes::{StaticProvider, StubLoader};
#[cfg(any(test, feature = "logging"))]
pub use logging::capture_warn_logs;
