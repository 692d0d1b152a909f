//! Interpreters and runtime-selectable interpreter groups.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{InputError, LiftError};
use crate::model::{Identifier, Provider, ProviderRegistry};

/// An interpreter whose distribution comes from a provider.
#[derive(Debug, Clone)]
pub struct Interpreter {
    /// Stable id of the interpreter.
    pub id: Identifier,
    /// Resolves the distribution per platform.
    pub provider: Arc<dyn Provider>,
    /// Whether the distribution is fetched at first run.
    pub lazy: bool,
}

impl Interpreter {
    /// Creates an interpreter backed by `provider`.
    #[must_use]
    pub fn new(id: Identifier, provider: Arc<dyn Provider>, lazy: bool) -> Self {
        Self { id, provider, lazy }
    }

    /// Creates an interpreter using a registered provider.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider is unknown or rejects `config`.
    pub fn from_registry(
        registry: &ProviderRegistry,
        id: Identifier,
        provider_name: &str,
        lazy: bool,
        config: &serde_json::Value,
    ) -> Result<Self, LiftError> {
        let provider = registry.create(provider_name, &id, lazy, config)?;
        Ok(Self { id, provider, lazy })
    }
}

/// A set of interchangeable interpreters chosen at runtime by a selector.
#[derive(Debug, Clone)]
pub struct InterpreterGroup {
    id: Identifier,
    selector: String,
    members: Vec<Interpreter>,
}

impl InterpreterGroup {
    /// Creates a group, enforcing at least two distinct members that all
    /// share one provider implementation.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] for fewer than two members, duplicate member
    /// ids, or mixed provider types.
    pub fn create(
        id: Identifier,
        selector: impl Into<String>,
        members: Vec<Interpreter>,
    ) -> Result<Self, InputError> {
        let mut seen = BTreeSet::new();
        let mut unique = Vec::with_capacity(members.len());
        for member in members {
            if seen.insert(member.id.clone()) {
                unique.push(member);
            }
        }
        if unique.len() < 2 {
            return Err(InputError::new(format!(
                "At least two interpreters must be specified to form a group. Given: {}.",
                unique
                    .iter()
                    .map(|member| member.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        let provider_types: BTreeSet<&'static str> = unique
            .iter()
            .map(|member| member.provider.type_name())
            .collect();
        if provider_types.len() > 1 {
            return Err(InputError::new(format!(
                "All interpreters in group {id} must have the same provider. Found: {}.",
                provider_types.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(Self {
            id,
            selector: selector.into(),
            members: unique,
        })
    }

    /// Group id used in `#{id}` / `#{id:sub}` macros.
    #[must_use]
    pub const fn id(&self) -> &Identifier {
        &self.id
    }

    /// The runtime token (typically `{scie.env.VAR}`) naming the chosen member.
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Group members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[Interpreter] {
        &self.members
    }
}
