//! Placement of file bytes into a platform chroot.

use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use tracing::debug;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::LOG_TARGET;
use crate::cleanup_helpers::try_remove_path;
use crate::error::{InputError, LiftError, Result};
use crate::fetcher::{ExpectedFingerprint, FetchOptions, Fetcher};
use crate::fs::{ensure_dir_exists, path_occupied, symlink};
use crate::model::{Digest, Fetch, File, FileSource, FileType};

/// Resolves each requested file to local bytes and links them into `chroot`.
pub(super) struct Materializer<'a> {
    pub(super) chroot: &'a Utf8Path,
    pub(super) dest_dir: &'a Utf8Path,
    pub(super) cwd: &'a Utf8Path,
    pub(super) fetcher: &'a Fetcher,
    pub(super) file_paths_by_id: &'a BTreeMap<String, Utf8PathBuf>,
    pub(super) hydrate: bool,
}

impl Materializer<'_> {
    /// Materializes `requested`, returning the file as it is rendered.
    ///
    /// Lazy fetches record their URL in `fetch_urls` and touch nothing on disk.
    pub(super) fn materialize(
        &self,
        requested: File,
        fetch_urls: &mut BTreeMap<String, String>,
    ) -> Result<File> {
        let (mut file, located) = self.locate(requested, fetch_urls)?;
        let Some(mut path) = located else {
            return Ok(file);
        };

        if file.file_type.is_none() {
            file.file_type = Some(infer_type(&path));
        }
        let is_directory = file.file_type == Some(FileType::Directory);
        if self.hydrate && is_directory {
            let zip_path = self.dest_dir.join(format!("{}.zip", file.name));
            zip_directory(&path, &zip_path)?;
            path = zip_path;
        }
        if self.hydrate && file.digest.is_none() && !path.is_dir() {
            file.digest = Some(Digest::of_path(&path)?);
        }

        let target = if self.hydrate && is_directory {
            self.chroot.join(format!("{}.zip", file.name))
        } else {
            self.chroot.join(&file.name)
        };
        if !self.hydrate && path.is_dir() {
            if let Some(file_type) = file.file_type.filter(|t| *t != FileType::Directory) {
                return Err(InputError::new(format!(
                    "The file for {} is expected to be a {file_type} but maps to the directory {path}.",
                    file.id()
                ))
                .into());
            }
            link_children(&path, &target)?;
        } else {
            file.maybe_check_digest(&path)?;
            if let Some(parent) = target.parent() {
                ensure_dir_exists(parent)?;
            }
            if !path_occupied(&target) {
                symlink(&path, &target)?;
            }
        }
        Ok(file)
    }

    fn locate(
        &self,
        requested: File,
        fetch_urls: &mut BTreeMap<String, String>,
    ) -> Result<(File, Option<Utf8PathBuf>)> {
        match &requested.source {
            FileSource::Fetch(Fetch { url, lazy: true }) => {
                fetch_urls.insert(requested.name.clone(), url.to_string());
                Ok((requested, None))
            }
            FileSource::Fetch(Fetch { url, lazy: false }) => {
                let mut options = FetchOptions::default();
                if let Some(digest) = &requested.digest {
                    options = options.with_fingerprint(ExpectedFingerprint::Digest(digest.clone()));
                }
                if requested.is_executable {
                    options = options.executable();
                }
                let fetched = self.fetcher.fetch_and_verify(url, &options)?;
                Ok((requested.with_source(FileSource::Local), Some(fetched.path)))
            }
            FileSource::Binding(_) => Ok((requested, None)),
            FileSource::Local => {
                let path = self
                    .file_paths_by_id
                    .get(requested.id())
                    .cloned()
                    .unwrap_or_else(|| self.cwd.join(&requested.name));
                if !path.exists() {
                    return Err(self.not_found(&requested, &path).into());
                }
                Ok((requested, Some(path)))
            }
        }
    }

    fn not_found(&self, file: &File, path: &Utf8Path) -> InputError {
        match path.strip_prefix(self.cwd) {
            Ok(relative) => InputError::new(format!(
                "The file for {} is not mapped or cannot be found at {relative} relative to the cwd of {}.",
                file.id(),
                self.cwd
            )),
            Err(_) => InputError::new(format!(
                "The file for {} is not mapped or cannot be found at {path}.",
                file.id()
            )),
        }
    }
}

fn infer_type(path: &Utf8Path) -> FileType {
    if path.is_dir() {
        FileType::Directory
    } else {
        path.file_name()
            .and_then(FileType::for_file_name)
            .unwrap_or(FileType::Blob)
    }
}

/// Links each child of `dir` into a fresh directory at `target`.
///
/// The native assembler zips a directory input from a sibling of the link it
/// is given, so the directory itself is never linked.
fn link_children(dir: &Utf8Path, target: &Utf8Path) -> Result<()> {
    ensure_dir_exists(target)?;
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("failed to list {dir}"))?
    {
        let entry = entry.with_context(|| format!("failed to list {dir}"))?;
        let link = target.join(entry.file_name());
        if !path_occupied(&link) {
            symlink(entry.path(), &link)?;
        }
    }
    Ok(())
}

/// Zips `dir` to `zip_path` with sorted entries and fixed timestamps so the
/// archive bytes depend only on the directory content.
pub(super) fn zip_directory(dir: &Utf8Path, zip_path: &Utf8Path) -> Result<()> {
    debug!(target: LOG_TARGET, %dir, %zip_path, "zipping directory");
    publish_zip(zip_path, |writer| add_entries(writer, dir, dir))
}

/// Writes a zip archive with no entries.
pub(super) fn write_empty_zip(path: &Utf8Path) -> Result<()> {
    publish_zip(path, |_| Ok(()))
}

/// Builds an archive under a unique sibling name and renames it over `path`.
///
/// Exports of other platforms may link `path` concurrently; they only ever
/// observe a complete archive.
fn publish_zip<F>(path: &Utf8Path, populate: F) -> Result<()>
where
    F: FnOnce(&mut ZipWriter<fs::File>) -> Result<()>,
{
    let staging = Utf8PathBuf::from(format!("{path}.{}.tmp", Uuid::new_v4().simple()));
    let published = write_zip(&staging, populate).and_then(|()| {
        fs::rename(&staging, path)
            .with_context(|| format!("failed to publish {path}"))
            .map_err(LiftError::from)
    });
    if published.is_err() {
        discard_staged(&staging);
    }
    published
}

fn discard_staged(staging: &Utf8Path) {
    if let Err(err) = try_remove_path(staging.as_std_path()) {
        debug!(target: LOG_TARGET, %staging, error = %err, "failed to remove staged archive");
    }
}

fn write_zip<F>(path: &Utf8Path, populate: F) -> Result<()>
where
    F: FnOnce(&mut ZipWriter<fs::File>) -> Result<()>,
{
    let file = fs::File::create(path).with_context(|| format!("failed to create {path}"))?;
    let mut writer = ZipWriter::new(file);
    populate(&mut writer)?;
    writer
        .finish()
        .with_context(|| format!("failed to finish {path}"))?;
    Ok(())
}

fn add_entries(writer: &mut ZipWriter<fs::File>, root: &Utf8Path, dir: &Utf8Path) -> Result<()> {
    let mut entries = dir
        .read_dir_utf8()
        .with_context(|| format!("failed to list {dir}"))?
        .map(|entry| entry.map(|e| e.path().to_path_buf()))
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {dir}"))?;
    entries.sort();

    for path in entries {
        let name = path
            .strip_prefix(root)
            .map(|relative| {
                relative
                    .components()
                    .map(|component| component.as_str())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .with_context(|| format!("{path} escapes {root}"))?;
        let options = entry_options(&path)?;
        if path.is_dir() {
            writer
                .add_directory(name.as_str(), options)
                .with_context(|| format!("failed to add {name}"))?;
            add_entries(writer, root, &path)?;
        } else {
            writer
                .start_file(name.as_str(), options)
                .with_context(|| format!("failed to add {name}"))?;
            let mut source =
                fs::File::open(&path).with_context(|| format!("failed to open {path}"))?;
            io::copy(&mut source, writer).with_context(|| format!("failed to zip {path}"))?;
        }
    }
    Ok(())
}

fn entry_options(path: &Utf8Path) -> Result<SimpleFileOptions> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .with_context(|| format!("failed to stat {path}"))?
            .permissions()
            .mode();
        Ok(options.unix_permissions(mode & 0o7777))
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(options)
    }
}
