//! In-memory application model: files, commands, interpreters and the
//! provider contract that resolves interpreter distributions.

mod application;
mod command;
mod digest;
mod distribution;
mod file;
mod identifier;
mod interpreter;

pub use application::{Application, Ptex, ScieJump};
pub use command::{Command, Env};
pub use digest::{Digest, DigestAlgorithm, ExpectedDigest, Fingerprint, Hasher, HashingReader};
pub use distribution::{
    Distribution, Provider, ProviderFactory, ProviderInfo, ProviderRegistry,
    ProviderRegistryBuilder,
};
pub use file::{Fetch, File, FileSource, FileType};
pub use identifier::Identifier;
pub use interpreter::{Interpreter, InterpreterGroup};

#[cfg(test)]
mod tests;
