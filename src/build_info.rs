//! Provenance recorded in the `science` section of a lift manifest.

use std::collections::BTreeMap;
use std::process::Command;

use camino::Utf8Path;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::InputError;
use crate::model::Digest;
use crate::platform::Platform;

const LOG_TARGET: &str = "scie_lift::build_info";

/// Where the science documentation lives.
pub const DOC_SITE_URL: &str = "https://science.scie.app";

/// Environment variable naming the running science binary.
pub const SCIE_ARGV0_ENV: &str = "SCIE_ARGV0";

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The origin of an input and, when known, its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Human readable source, usually a path.
    pub source: String,
    /// Digest of the source content.
    pub digest: Option<Digest>,
}

impl Provenance {
    /// Records `source` without a digest.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            digest: None,
        }
    }

    /// Records a local file along with its digest.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    pub fn of_path(path: &Utf8Path) -> crate::error::Result<Self> {
        Ok(Self {
            source: path.to_string(),
            digest: Some(Digest::of_path(path)?),
        })
    }
}

/// A single `key=value` addition to the manifest's app info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Top-level app info key.
    pub key: String,
    /// Its value.
    pub value: String,
}

impl AppInfo {
    /// Parses `key=value`; the value may itself contain `=`.
    ///
    /// # Errors
    ///
    /// Returns an [`InputError`] when there is no `=`.
    pub fn parse(value: &str) -> Result<Self, InputError> {
        value
            .split_once('=')
            .map(|(key, info)| Self {
                key: key.to_owned(),
                value: info.to_owned(),
            })
            .ok_or_else(|| {
                InputError::new(format!(
                    "Invalid app info. An app info entry must be of the form `<key>=<value>`: {value}"
                ))
            })
    }

    /// Collects entries into a map; later keys win.
    #[must_use]
    pub fn assemble(app_infos: &[Self]) -> BTreeMap<String, Value> {
        app_infos
            .iter()
            .map(|info| (info.key.clone(), Value::String(info.value.clone())))
            .collect()
    }
}

/// Provenance of a lift: the manifest source, the science binary and the
/// git state of the build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildInfo {
    /// Where the application description came from.
    pub manifest: Option<Provenance>,
    /// Digest of the running science binary.
    pub binary_digest: Option<Digest>,
    /// `git describe` output for the working directory.
    pub git_state: Option<String>,
    /// Free-form app info declared with the application.
    pub app_info: BTreeMap<String, Value>,
}

impl BuildInfo {
    /// Gathers provenance from the environment.
    ///
    /// The binary digest comes from the file named by `SCIE_ARGV0` and the git
    /// state from `git describe`; either is omitted when unavailable.
    #[must_use]
    pub fn gather(manifest: Provenance, app_info: BTreeMap<String, Value>) -> Self {
        let binary_digest = std::env::var(SCIE_ARGV0_ENV)
            .ok()
            .filter(|argv0| !argv0.is_empty())
            .and_then(|argv0| match Digest::of_path(Utf8Path::new(&argv0)) {
                Ok(digest) => Some(digest),
                Err(err) => {
                    debug!(target: LOG_TARGET, %argv0, error = %err, "cannot hash science binary");
                    None
                }
            });
        Self {
            manifest: Some(manifest),
            binary_digest,
            git_state: gather_git_state(),
            app_info,
        }
    }

    /// Renders the `science` manifest section.
    ///
    /// `extra_app_info` overrides top-level keys of the declared app info.
    /// `current` selects the science release asset named in `binary.url`.
    #[must_use]
    pub fn to_json(&self, current: Platform, extra_app_info: &BTreeMap<String, Value>) -> Value {
        let mut binary = Map::new();
        binary.insert("version".into(), json!(VERSION));
        binary.insert(
            "url".into(),
            json!(format!(
                "https://github.com/a-scie/lift/releases/download/v{VERSION}/{}",
                current.qualified_binary_name("science")
            )),
        );
        insert_digest(&mut binary, self.binary_digest.as_ref());

        let source = self
            .manifest
            .as_ref()
            .map_or("<unknown>", |manifest| manifest.source.as_str());
        let mut manifest = Map::new();
        manifest.insert("source".into(), json!(source));
        insert_digest(
            &mut manifest,
            self.manifest.as_ref().and_then(|m| m.digest.as_ref()),
        );

        let mut build_info = Map::new();
        build_info.insert(
            "notes".into(),
            json!([
                format!(
                    "This scie lift JSON manifest was generated from {source} using the science binary."
                ),
                format!("Find out more here: {DOC_SITE_URL}"),
            ]),
        );
        build_info.insert("binary".into(), Value::Object(binary));
        build_info.insert("manifest".into(), Value::Object(manifest));
        if let Some(git_state) = &self.git_state {
            build_info.insert("git_state".into(), json!(git_state));
        }

        let mut app_info = self.app_info.clone();
        app_info.extend(
            extra_app_info
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        if !app_info.is_empty() {
            build_info.insert("app_info".into(), Value::Object(app_info.into_iter().collect()));
        }
        Value::Object(build_info)
    }
}

fn insert_digest(target: &mut Map<String, Value>, digest: Option<&Digest>) {
    if let Some(digest) = digest {
        target.insert("size".into(), json!(digest.size));
        target.insert("hash".into(), json!(digest.fingerprint.as_str()));
    }
}

fn gather_git_state() -> Option<String> {
    let args = ["describe", "--always", "--dirty", "--long"];
    let output = match Command::new("git").args(args).output() {
        Ok(output) => output,
        Err(err) => {
            debug!(target: LOG_TARGET, error = %err, "git is not available");
            return None;
        }
    };
    if output.status.success() {
        return Some(String::from_utf8_lossy(&output.stdout).trim().to_owned());
    }
    warn!(target: LOG_TARGET, "Failed to gather git state for provenance.");
    info!(
        target: LOG_TARGET,
        status = %output.status,
        command = %format!("git {}", args.join(" ")),
        "git describe failed"
    );
    debug!(
        target: LOG_TARGET,
        stderr = %String::from_utf8_lossy(&output.stderr),
        "git describe stderr"
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fingerprint;
    use rstest::rstest;

    #[rstest]
    #[case("version=1.2.3", "version", "1.2.3")]
    #[case("expr=a=b", "expr", "a=b")]
    #[case("empty=", "empty", "")]
    fn app_info_splits_on_first_equals(
        #[case] raw: &str,
        #[case] key: &str,
        #[case] value: &str,
    ) {
        let info = AppInfo::parse(raw).expect("valid app info");
        assert_eq!(info.key, key);
        assert_eq!(info.value, value);
    }

    #[test]
    fn app_info_without_equals_is_rejected() {
        let err = AppInfo::parse("novalue").expect_err("missing =");
        assert_eq!(
            err.message(),
            "Invalid app info. An app info entry must be of the form `<key>=<value>`: novalue"
        );
    }

    #[test]
    fn to_json_merges_app_info_and_digests() {
        let info = BuildInfo {
            manifest: Some(Provenance {
                source: "lift.toml".into(),
                digest: Some(Digest::new(3, Fingerprint::new("abc"))),
            }),
            binary_digest: None,
            git_state: Some("v1.0.0-0-gdeadbee".into()),
            app_info: BTreeMap::from([
                ("team".to_owned(), json!("core")),
                ("release".to_owned(), json!({"channel": "beta"})),
            ]),
        };
        let extra = AppInfo::assemble(&[AppInfo::parse("release=stable").expect("app info")]);

        let rendered = info.to_json(Platform::LinuxX86_64, &extra);

        assert_eq!(rendered["manifest"], json!({"source": "lift.toml", "size": 3, "hash": "abc"}));
        assert_eq!(rendered["git_state"], json!("v1.0.0-0-gdeadbee"));
        assert_eq!(rendered["app_info"], json!({"team": "core", "release": "stable"}));
        assert_eq!(
            rendered["notes"][0],
            json!("This scie lift JSON manifest was generated from lift.toml using the science binary.")
        );
        let url = rendered["binary"]["url"].as_str().expect("binary url");
        assert!(url.ends_with("/science-linux-x86_64"), "{url}");
        assert!(rendered["binary"].get("hash").is_none());
    }

    #[test]
    fn empty_app_info_is_omitted() {
        let rendered = BuildInfo::default().to_json(Platform::MacosAarch64, &BTreeMap::new());
        assert!(rendered.get("app_info").is_none());
        assert_eq!(rendered["manifest"]["source"], json!("<unknown>"));
    }
}
