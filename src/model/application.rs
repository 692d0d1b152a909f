//! The application description consumed by the manifest assembler.

use std::collections::BTreeSet;

use reqwest::Url;

use crate::build_info::BuildInfo;
use crate::error::InputError;
use crate::model::{Command, Digest, File, Identifier, Interpreter, InterpreterGroup};
use crate::platform::Platform;

/// Pins the `ptex` helper used for lazy fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ptex {
    /// File key for the helper; defaults to `ptex`.
    pub id: Option<Identifier>,
    /// Release version; the latest release when absent.
    pub version: Option<String>,
    /// First argument passed by the `fetch` binding; defaults to `{scie.lift}`.
    pub argv1: Option<String>,
    /// Mirror of the GitHub release downloads.
    pub base_url: Option<Url>,
}

/// Pins the `scie-jump` launcher recorded in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScieJump {
    /// Release version.
    pub version: Option<String>,
    /// Expected digest of the launcher binary.
    pub digest: Option<Digest>,
    /// Mirror of the GitHub release downloads.
    pub base_url: Option<Url>,
}

/// A scie application: its interpreters, files and boot commands.
#[derive(Debug, Clone, Default)]
pub struct Application {
    /// Binary name of the scie.
    pub name: String,
    /// Human readable description.
    pub description: Option<String>,
    /// Whether the launcher loads a `.env` file at boot.
    pub load_dotenv: bool,
    /// Override of the launcher's extraction base directory.
    pub base: Option<String>,
    /// Platforms built when the caller names none.
    pub platforms: Vec<Platform>,
    /// Interpreters in declaration order.
    pub interpreters: Vec<Interpreter>,
    /// Runtime-selectable interpreter groups.
    pub interpreter_groups: Vec<InterpreterGroup>,
    /// Statically declared files.
    pub files: Vec<File>,
    /// Boot commands; at least one is required.
    pub commands: Vec<Command>,
    /// Boot bindings run on demand by commands.
    pub bindings: Vec<Command>,
    /// Launcher pin.
    pub scie_jump: Option<ScieJump>,
    /// Lazy fetch helper pin.
    pub ptex: Option<Ptex>,
    /// Provenance rendered when a lift asks for it.
    pub build_info: Option<BuildInfo>,
}

impl Application {
    /// Creates an empty application named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Platforms to build when none are requested explicitly, defaulting to
    /// the current platform.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when the current platform is unsupported.
    pub fn default_platforms(&self) -> Result<Vec<Platform>, InputError> {
        if self.platforms.is_empty() {
            Ok(vec![Platform::current()?])
        } else {
            Ok(self.platforms.clone())
        }
    }

    /// Checks the invariants the assembler relies on.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when there are no commands, command or
    /// binding names repeat, or interpreter ids repeat.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.commands.is_empty() {
            return Err(InputError::new(format!(
                "The application {:?} must define at least one command.",
                self.name
            )));
        }
        ensure_unique_names("command", &self.commands)?;
        ensure_unique_names("binding", &self.bindings)?;

        let mut interpreter_ids = BTreeSet::new();
        for interpreter in &self.interpreters {
            if !interpreter_ids.insert(interpreter.id.as_str()) {
                return Err(InputError::new(format!(
                    "The interpreter id {} is used more than once.",
                    interpreter.id
                )));
            }
        }
        Ok(())
    }
}

fn ensure_unique_names(kind: &str, commands: &[Command]) -> Result<(), InputError> {
    let mut seen = BTreeSet::new();
    for command in commands {
        let name = command.manifest_name();
        if !seen.insert(name) {
            return Err(if name.is_empty() {
                InputError::new(format!(
                    "There can be at most one unnamed {kind}; name the others."
                ))
            } else {
                InputError::new(format!("The {kind} name {name:?} is not unique."))
            });
        }
    }
    Ok(())
}
