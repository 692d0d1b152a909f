//! Offline stand-ins for distribution providers and helper loaders.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use reqwest::Url;

use crate::a_scie::{HelperLoader, LoadedBinary};
use crate::error::{InputError, Result};
use crate::model::{Digest, Distribution, Provider, Ptex, ScieJump};
use crate::platform::Platform;

/// A provider answering from a fixed platform → distribution table.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    distributions: BTreeMap<Platform, Distribution>,
}

impl StaticProvider {
    /// Publishes `distribution` for `platform`.
    #[must_use]
    pub fn with(mut self, platform: Platform, distribution: Distribution) -> Self {
        self.distributions.insert(platform, distribution);
        self
    }

    /// Publishes `distribution` for every platform.
    #[must_use]
    pub fn everywhere(distribution: &Distribution) -> Self {
        Self {
            distributions: Platform::ALL
                .into_iter()
                .map(|platform| (platform, distribution.clone()))
                .collect(),
        }
    }
}

impl Provider for StaticProvider {
    fn distribution(&self, platform: Platform) -> Option<Distribution> {
        self.distributions.get(&platform).cloned()
    }
}

/// A helper loader serving a local file as `ptex` and an optional fixed
/// launcher.
#[derive(Debug, Clone)]
pub struct StubLoader {
    ptex: Utf8PathBuf,
    jump: Option<LoadedBinary>,
}

impl StubLoader {
    /// Serves the file at `ptex` for every platform and loads no launcher.
    #[must_use]
    pub fn new(ptex: impl Into<Utf8PathBuf>) -> Self {
        Self {
            ptex: ptex.into(),
            jump: None,
        }
    }

    /// Also returns `jump` as the launcher.
    #[must_use]
    pub fn with_jump(mut self, jump: LoadedBinary) -> Self {
        self.jump = Some(jump);
        self
    }
}

impl HelperLoader for StubLoader {
    fn load_ptex(&self, platform: Platform, ptex: Option<&Ptex>) -> Result<LoadedBinary> {
        let url = Url::from_file_path(&self.ptex)
            .map_err(|()| InputError::new(format!("{} is not an absolute path.", self.ptex)))?;
        Ok(LoadedBinary {
            binary_name: platform.binary_name("ptex"),
            url,
            path: self.ptex.clone(),
            digest: Digest::of_path(&self.ptex)?,
            version: ptex.and_then(|pin| pin.version.clone()),
        })
    }

    fn load_jump(
        &self,
        _platform: Platform,
        _jump: Option<&ScieJump>,
    ) -> Result<Option<LoadedBinary>> {
        Ok(self.jump.clone())
    }
}
