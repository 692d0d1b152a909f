//! Caller options for a lift.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};

use crate::build_info::AppInfo;
use crate::error::InputError;
use crate::platform::Platform;

/// Maps a file id to the local path providing its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    /// File name or key.
    pub id: String,
    /// Local path; relative paths resolve against the working directory.
    pub path: Utf8PathBuf,
}

impl FileMapping {
    /// Parses `(<name>|<key>)=<path>`.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when there is no `=`.
    pub fn parse(value: &str) -> Result<Self, InputError> {
        value
            .split_once('=')
            .map(|(id, path)| Self {
                id: id.to_owned(),
                path: Utf8PathBuf::from(path),
            })
            .ok_or_else(|| {
                InputError::new(format!(
                    "Invalid file mapping. A file mapping must be of the form `(<name>|<key>)=<path>`: {value}"
                ))
            })
    }

    pub(crate) fn resolved(&self, cwd: &Utf8Path) -> Utf8PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            cwd.join(&self.path)
        }
    }
}

/// Options controlling how an application is lifted.
#[derive(Debug, Clone, Default)]
pub struct LiftConfig {
    /// Local paths for files, overriding the working directory lookup.
    pub file_mappings: Vec<FileMapping>,
    /// Ids of fetched files whose laziness is flipped.
    pub invert_lazy_ids: BTreeSet<String>,
    /// Whether the `science` provenance section is rendered.
    pub include_provenance: bool,
    /// App info overriding the application's declared entries.
    pub app_info: Vec<AppInfo>,
    /// Replaces the application name in the manifest.
    pub app_name: Option<String>,
    /// Platforms requested explicitly.
    pub platforms: Vec<Platform>,
    /// Whether directories are zipped and local files digested up front.
    pub hydrate_files: bool,
}

impl LiftConfig {
    /// Provenance is rendered when asked for or when app info is supplied.
    #[must_use]
    pub fn provenance_enabled(&self) -> bool {
        self.include_provenance || !self.app_info.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_mapping_parses_id_and_path() {
        let mapping = FileMapping::parse("tool=bin/tool=v2").expect("mapping");
        assert_eq!(mapping.id, "tool");
        assert_eq!(mapping.path, Utf8PathBuf::from("bin/tool=v2"));
        assert_eq!(
            mapping.resolved(Utf8Path::new("/work")),
            Utf8PathBuf::from("/work/bin/tool=v2")
        );
    }

    #[test]
    fn file_mapping_requires_equals() {
        let err = FileMapping::parse("tool").expect_err("no path");
        assert_eq!(
            err.message(),
            "Invalid file mapping. A file mapping must be of the form `(<name>|<key>)=<path>`: tool"
        );
    }

    #[test]
    fn app_info_implies_provenance() {
        let config = LiftConfig {
            app_info: vec![AppInfo::parse("a=b").expect("app info")],
            ..LiftConfig::default()
        };
        assert!(config.provenance_enabled());
        assert!(!LiftConfig::default().provenance_enabled());
    }
}
