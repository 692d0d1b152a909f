//! Files bundled into (or lazily fetched by) a scie.

use std::fmt;

use camino::Utf8Path;
use reqwest::Url;

use crate::error::{InputError, LiftError};
use crate::model::{Command, Digest, DigestAlgorithm, ExpectedDigest, Identifier};

/// Archive and blob kinds understood by the native assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// An opaque file.
    Blob,
    /// A local directory, zipped by the assembler.
    Directory,
    /// A zip archive.
    Zip,
    /// An uncompressed tarball.
    Tar,
    /// A gzip compressed tarball.
    TarGzip,
    /// A bzip2 compressed tarball.
    TarBzip2,
    /// An xz compressed tarball.
    TarLzma,
    /// A compress(1) compressed tarball.
    TarZlib,
    /// A zstd compressed tarball.
    TarZstd,
}

/// Recognised archive suffixes, longest first so `.tar.gz` wins over `.gz`.
const EXTENSIONS: [(&str, FileType); 13] = [
    (".tar.bz2", FileType::TarBzip2),
    (".tar.zst", FileType::TarZstd),
    (".tar.gz", FileType::TarGzip),
    (".tar.xz", FileType::TarLzma),
    (".tar.Z", FileType::TarZlib),
    (".tbz2", FileType::TarBzip2),
    (".tzst", FileType::TarZstd),
    (".tar", FileType::Tar),
    (".tgz", FileType::TarGzip),
    (".tlz", FileType::TarLzma),
    (".txz", FileType::TarLzma),
    (".zip", FileType::Zip),
    (".tbz", FileType::TarBzip2),
];

impl FileType {
    /// The manifest spelling of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Directory => "directory",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGzip => "tar.gz",
            Self::TarBzip2 => "tar.bz2",
            Self::TarLzma => "tar.xz",
            Self::TarZlib => "tar.Z",
            Self::TarZstd => "tar.zst",
        }
    }

    /// Infers an archive type from a file name's suffix.
    #[must_use]
    pub fn for_file_name(name: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(extension, _)| name.ends_with(extension))
            .map(|(_, file_type)| *file_type)
    }

    /// Returns `true` for archive types the assembler can extract.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        !matches!(self, Self::Blob | Self::Directory)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file whose bytes come from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fetch {
    /// Where the bytes live.
    pub url: Url,
    /// Whether the bytes are fetched at first run instead of at build time.
    pub lazy: bool,
}

impl Fetch {
    /// Name of the boot binding that performs lazy fetches.
    pub const BINDING_NAME: &'static str = "fetch";

    /// Creates a fetch source.
    #[must_use]
    pub const fn new(url: Url, lazy: bool) -> Self {
        Self { url, lazy }
    }

    /// Returns this fetch with its laziness flipped.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            url: self.url.clone(),
            lazy: !self.lazy,
        }
    }

    /// Builds the `fetch` boot binding that runs `fetch_exe` with `argv1`.
    #[must_use]
    pub fn create_binding(fetch_exe: &File, argv1: &str) -> Command {
        Command {
            name: Some(Self::BINDING_NAME.to_owned()),
            exe: fetch_exe.placeholder(),
            args: vec![argv1.to_owned()],
            ..Command::default()
        }
    }
}

/// Where a file's bytes come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum FileSource {
    /// A local, unmanaged path resolved at assembly time.
    #[default]
    Local,
    /// A remote URL, fetched eagerly or lazily.
    Fetch(Fetch),
    /// Produced at runtime by the named boot binding.
    Binding(Identifier),
}

/// A file entry in the lift manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    /// File name inside the scie.
    pub name: String,
    /// Optional key used instead of the name as the file's id.
    pub key: Option<Identifier>,
    /// Expected digest of the file content.
    pub digest: Option<Digest>,
    /// Archive kind, inferred when absent.
    pub file_type: Option<FileType>,
    /// Whether the extracted file must be executable.
    pub is_executable: bool,
    /// Whether the assembler extracts the file before boot.
    pub eager_extract: bool,
    /// Where the bytes come from.
    pub source: FileSource,
}

impl File {
    /// Creates a local file entry with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            digest: None,
            file_type: None,
            is_executable: false,
            eager_extract: false,
            source: FileSource::Local,
        }
    }

    /// Sets the file key.
    #[must_use]
    pub fn with_key(mut self, key: Identifier) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets the expected digest.
    #[must_use]
    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    /// Sets the file type.
    #[must_use]
    pub const fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    /// Marks the file executable.
    #[must_use]
    pub const fn executable(mut self) -> Self {
        self.is_executable = true;
        self
    }

    /// Sets the file source.
    #[must_use]
    pub fn with_source(mut self, source: FileSource) -> Self {
        self.source = source;
        self
    }

    /// The key when present, else the name. Unique within one manifest.
    #[must_use]
    pub fn id(&self) -> &str {
        self.key.as_ref().map_or(self.name.as_str(), Identifier::as_str)
    }

    /// The manifest placeholder resolving to this file's extracted path.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("{{{}}}", self.id())
    }

    /// Returns `true` for remote files fetched at first run.
    #[must_use]
    pub const fn is_lazy_fetch(&self) -> bool {
        matches!(&self.source, FileSource::Fetch(Fetch { lazy: true, .. }))
    }

    /// Returns a copy with the fetch laziness inverted.
    ///
    /// # Errors
    ///
    /// Bindings and local files have no laziness to invert.
    pub fn invert_lazy(&self) -> Result<Self, InputError> {
        match &self.source {
            FileSource::Fetch(fetch) => Ok(self.clone().with_source(FileSource::Fetch(fetch.inverted()))),
            FileSource::Binding(name) => {
                Err(InputError::new(format!("Cannot make binding {name:?} non-lazy.")))
            }
            FileSource::Local => Err(InputError::new(format!(
                "Cannot lazy fetch local file {:?}.",
                self.name
            ))),
        }
    }

    /// Verifies the content at `path` against the declared digest, if any.
    ///
    /// # Errors
    ///
    /// Returns an integrity error on mismatch.
    pub fn maybe_check_digest(&self, path: &Utf8Path) -> Result<(), LiftError> {
        match &self.digest {
            Some(digest) => ExpectedDigest::from_digest(digest, DigestAlgorithm::default())
                .check_path(path, &format!("file for {}", self.id())),
            None => Ok(()),
        }
    }
}
