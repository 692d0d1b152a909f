//! Boot commands and their environment manipulation.

use std::collections::{BTreeMap, BTreeSet};

/// Environment changes applied when a command runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Env {
    /// Variables set only when not already present.
    pub default: BTreeMap<String, String>,
    /// Variables set unconditionally.
    pub replace: BTreeMap<String, String>,
    /// Variables removed by exact name.
    pub remove_exact: BTreeSet<String>,
    /// Variables removed when their name matches a regular expression.
    pub remove_re: BTreeSet<String>,
}

impl Env {
    /// Returns `true` when the env makes no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_empty()
            && self.replace.is_empty()
            && self.remove_exact.is_empty()
            && self.remove_re.is_empty()
    }
}

/// A command the scie can boot into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Command {
    /// Executable, possibly containing `#{...}` macros.
    pub exe: String,
    /// Arguments, possibly containing `#{...}` macros.
    pub args: Vec<String>,
    /// Environment changes.
    pub env: Env,
    /// Command name; the unnamed command is the default.
    pub name: Option<String>,
    /// Human readable description.
    pub description: Option<String>,
}

impl Command {
    /// Creates a command running `exe`.
    #[must_use]
    pub fn new(exe: impl Into<String>) -> Self {
        Self {
            exe: exe.into(),
            ..Self::default()
        }
    }

    /// Sets the command name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    /// The key this command is rendered under in the manifest.
    #[must_use]
    pub fn manifest_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}
