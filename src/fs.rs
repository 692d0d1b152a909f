//! Shared filesystem helpers that operate within the capability sandbox.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::{
    ambient_authority,
    fs::{Dir, Permissions, PermissionsExt},
};
use color_eyre::eyre::{Context, Result};
use std::io::ErrorKind;

use crate::cleanup_helpers::delete_path;

/// Permission bits applied to fetched executables.
pub(crate) const EXECUTABLE_MODE: u32 = 0o755;

/// Resolves a path to an ambient directory handle paired with the relative path component.
///
/// Absolute paths are opened relative to the ambient root; relative paths reuse the current
/// working directory.
pub(crate) fn ambient_dir_and_path(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    if path.has_root() {
        let stripped = path
            .strip_prefix("/")
            .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf);
        let dir = Dir::open_ambient_dir("/", ambient_authority())
            .context("open ambient root directory")?;
        Ok((dir, stripped))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("open ambient working directory")?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Folds `.` and `..` components out of `path` without touching the filesystem.
///
/// `..` at the root stays at the root.
pub(crate) fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut resolved = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}

/// Anchors `path` at `base` when relative, then normalizes it.
pub(crate) fn absolutize(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    normalize(&base.join(path))
}

/// Ensures the provided path exists, creating intermediate directories when required.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    dir.create_dir_all(relative.as_std_path())
        .or_else(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(err)
            }
        })
        .with_context(|| format!("create {}", path.as_str()))
}

/// Replaces whatever lives at `path` with a fresh empty directory.
pub(crate) fn recreate_dir(path: &Utf8Path) -> Result<()> {
    delete_path(path.as_std_path()).with_context(|| format!("clear {path}"))?;
    ensure_dir_exists(path)
}

/// Applies the provided POSIX mode to the given path when it exists.
pub(crate) fn set_permissions(path: &Utf8Path, mode: u32) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    dir.set_permissions(relative.as_std_path(), Permissions::from_mode(mode))
        .with_context(|| format!("chmod {}", path.as_str()))
}

/// Creates a symlink at `link` pointing to `target`.
pub(crate) fn symlink(target: &Utf8Path, link: &Utf8Path) -> Result<()> {
    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let created = if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    };
    created.with_context(|| format!("symlink {link} -> {target}"))
}

/// Returns `true` when something, even a dangling symlink, occupies `path`.
pub(crate) fn path_occupied(path: &Utf8Path) -> bool {
    path.symlink_metadata().is_ok()
}
