//! Resolved interpreter artifacts and the provider contract producing them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{InputError, LiftError};
use crate::model::{File, Identifier};
use crate::platform::Platform;

/// An interpreter artifact resolved for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Id used in `#{id}` / `#{id:sub}` macros.
    pub id: Identifier,
    /// The file carrying the distribution.
    pub file: File,
    /// Where the distribution was published, for diagnostics.
    pub source: Option<String>,
    /// Named paths inside the extracted file, e.g. `python` → `python/bin/python3`.
    pub placeholders: BTreeMap<Identifier, String>,
}

impl Distribution {
    /// Creates a distribution with no named placeholders.
    #[must_use]
    pub const fn new(id: Identifier, file: File) -> Self {
        Self {
            id,
            file,
            source: None,
            placeholders: BTreeMap::new(),
        }
    }

    /// Adds a named placeholder.
    #[must_use]
    pub fn with_placeholder(mut self, name: Identifier, path: impl Into<String>) -> Self {
        self.placeholders.insert(name, path.into());
        self
    }

    /// Records the publication source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Maps an interpreter to its distribution on each platform.
///
/// Implementations are distribution catalogs; this crate only consumes them.
pub trait Provider: fmt::Debug + Send + Sync {
    /// Resolves the distribution for `platform`, or `None` when the provider
    /// publishes nothing for it.
    fn distribution(&self, platform: Platform) -> Option<Distribution>;

    /// Fully qualified implementation type name.
    ///
    /// Interpreter groups compare this to reject mixed-provider membership.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Constructs a provider for an interpreter from its configuration table.
pub type ProviderFactory =
    fn(id: &Identifier, lazy: bool, config: &serde_json::Value) -> Result<Arc<dyn Provider>, LiftError>;

/// A registered provider implementation.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    /// Short registration name, e.g. `PythonBuildStandalone`.
    pub short_name: String,
    /// Fully qualified implementation type name.
    pub fully_qualified_name: String,
    /// Constructor.
    pub factory: ProviderFactory,
}

/// Immutable lookup table of provider implementations.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderInfo>,
}

impl ProviderRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Finds a provider by short or fully qualified name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderInfo> {
        self.providers.get(name).or_else(|| {
            self.providers
                .values()
                .find(|info| info.fully_qualified_name == name)
        })
    }

    /// Iterates registered providers ordered by short name.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderInfo> {
        self.providers.values()
    }

    /// Creates a provider instance by name.
    ///
    /// # Errors
    ///
    /// Returns an input error for unknown names, or whatever the factory
    /// reports for invalid configuration.
    pub fn create(
        &self,
        name: &str,
        id: &Identifier,
        lazy: bool,
        config: &serde_json::Value,
    ) -> Result<Arc<dyn Provider>, LiftError> {
        let info = self.get(name).ok_or_else(|| {
            InputError::new(format!(
                "The provider {name:?} for interpreter {id} is not registered."
            ))
        })?;
        (info.factory)(id, lazy, config)
    }

    /// Human readable name for a provider instance: its registered short
    /// name when known, else its type name.
    #[must_use]
    pub fn name_of(&self, provider: &dyn Provider) -> String {
        let type_name = provider.type_name();
        self.providers
            .values()
            .find(|info| info.fully_qualified_name == type_name)
            .map_or_else(|| type_name.to_owned(), |info| info.short_name.clone())
    }
}

/// Accumulates provider registrations, rejecting duplicate short names.
#[derive(Debug, Default)]
pub struct ProviderRegistryBuilder {
    providers: BTreeMap<String, ProviderInfo>,
}

impl ProviderRegistryBuilder {
    /// Registers provider type `P` under `short_name`.
    ///
    /// # Errors
    ///
    /// Returns an input error when `short_name` is already taken.
    pub fn register<P: Provider + 'static>(
        mut self,
        short_name: &str,
        factory: ProviderFactory,
    ) -> Result<Self, InputError> {
        if let Some(existing) = self.providers.get(short_name) {
            return Err(InputError::new(format!(
                "The provider {} has a short name of {short_name:?} that conflicts with provider {}.",
                std::any::type_name::<P>(),
                existing.fully_qualified_name
            )));
        }
        self.providers.insert(
            short_name.to_owned(),
            ProviderInfo {
                short_name: short_name.to_owned(),
                fully_qualified_name: std::any::type_name::<P>().to_owned(),
                factory,
            },
        );
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}
