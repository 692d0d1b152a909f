//! Shared path removal helpers with safety guards.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Records the outcome of a guarded removal attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RemovalOutcome {
    Removed,
    Missing,
}

/// Checks whether a path contains any parent-directory (`..`) components.
pub(crate) fn has_parent_dir(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::ParentDir))
}

/// Attempts to remove a file, symlink or directory tree, rejecting unsafe
/// paths before deletion.
pub(crate) fn try_remove_path(path: &Path) -> Result<RemovalOutcome, std::io::Error> {
    guard_removal_path(path)?;
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RemovalOutcome::Missing),
        Err(err) => return Err(err),
    };
    let removal = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removal {
        Ok(()) => Ok(RemovalOutcome::Removed),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemovalOutcome::Missing),
        Err(err) => Err(err),
    }
}

/// Removes `path` by first renaming it to a unique sibling.
///
/// Readers never observe a half-deleted tree at `path`: the rename is atomic
/// and the slow recursive removal happens under the throwaway name.
pub(crate) fn delete_path(path: &Path) -> Result<RemovalOutcome, std::io::Error> {
    guard_removal_path(path)?;
    let doomed = unique_sibling(path);
    match std::fs::rename(path, &doomed) {
        Ok(()) => try_remove_path(&doomed),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemovalOutcome::Missing),
        Err(err) => Err(err),
    }
}

fn unique_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

fn guard_removal_path(path: &Path) -> Result<(), std::io::Error> {
    if is_empty_or_root(path) || has_parent_dir(path) {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("refuse to remove unsafe path {}", path.display()),
        ));
    }
    Ok(())
}

fn is_empty_or_root(path: &Path) -> bool {
    let mut components = path.components();
    match components.next() {
        None => true,
        Some(Component::CurDir | Component::RootDir) => components.next().is_none(),
        Some(Component::Prefix(_)) => match components.next() {
            None => true,
            Some(Component::RootDir) => components.next().is_none(),
            _ => false,
        },
        _ => false,
    }
}
