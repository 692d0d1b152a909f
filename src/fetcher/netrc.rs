//! Minimal `.netrc` support for host credentials.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::warn;

use super::LOG_TARGET;

/// Credentials for one machine.
#[derive(Debug, Default)]
pub(crate) struct NetrcEntry {
    login: Option<String>,
    password: Option<SecretString>,
}

/// A parsed netrc file.
#[derive(Debug, Default)]
pub(crate) struct Netrc {
    machines: BTreeMap<String, NetrcEntry>,
    default: Option<NetrcEntry>,
}

/// The netrc file is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum NetrcParseError {
    #[error("unexpected token {token:?} on line {line}")]
    UnexpectedToken { token: String, line: usize },
    #[error("missing value after {token:?} on line {line}")]
    MissingValue { token: String, line: usize },
}

enum Section {
    None,
    Machine(String),
    Default,
}

impl Netrc {
    /// Parses netrc text.
    pub(crate) fn parse(text: &str) -> Result<Self, NetrcParseError> {
        let mut netrc = Self::default();
        let mut section = Section::None;
        let mut entry = NetrcEntry::default();
        let mut in_macdef = false;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            if in_macdef {
                in_macdef = !line.trim().is_empty();
                continue;
            }
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }
                let mut value = |name: &str| {
                    tokens.next().map(str::to_owned).ok_or_else(|| NetrcParseError::MissingValue {
                        token: name.to_owned(),
                        line: line_no,
                    })
                };
                match token {
                    "machine" => {
                        let host = value(token)?;
                        netrc.finish(std::mem::replace(&mut section, Section::Machine(host)), entry);
                        entry = NetrcEntry::default();
                    }
                    "default" => {
                        netrc.finish(std::mem::replace(&mut section, Section::Default), entry);
                        entry = NetrcEntry::default();
                    }
                    "macdef" => {
                        value(token)?;
                        in_macdef = true;
                        break;
                    }
                    "login" | "password" | "account" => {
                        if matches!(section, Section::None) {
                            return Err(NetrcParseError::UnexpectedToken {
                                token: token.to_owned(),
                                line: line_no,
                            });
                        }
                        let text = value(token)?;
                        match token {
                            "login" => entry.login = Some(text),
                            "password" => entry.password = Some(SecretString::from(text)),
                            _ => {}
                        }
                    }
                    other => {
                        return Err(NetrcParseError::UnexpectedToken {
                            token: other.to_owned(),
                            line: line_no,
                        });
                    }
                }
            }
        }
        netrc.finish(section, entry);
        Ok(netrc)
    }

    fn finish(&mut self, section: Section, entry: NetrcEntry) {
        match section {
            Section::None => {}
            Section::Machine(host) => {
                self.machines.entry(host).or_insert(entry);
            }
            Section::Default => self.default = Some(entry),
        }
    }

    /// Login and password for `host`, falling back to the `default` entry.
    pub(crate) fn credentials(&self, host: &str) -> Option<(String, SecretString)> {
        let entry = self.machines.get(host).or(self.default.as_ref())?;
        let login = entry.login.clone().unwrap_or_default();
        let password = SecretString::from(
            entry
                .password
                .as_ref()
                .map(|secret| secret.expose_secret().to_owned())
                .unwrap_or_default(),
        );
        Some((login, password))
    }
}

/// `$NETRC`, else `~/.netrc`.
pub(crate) fn default_netrc_path() -> Option<Utf8PathBuf> {
    if let Some(path) = std::env::var_os("NETRC") {
        return Utf8PathBuf::from_path_buf(path.into()).ok();
    }
    let home = Utf8PathBuf::from_path_buf(dirs::home_dir()?).ok()?;
    Some(home.join(".netrc"))
}

/// Loads the netrc at `path`.
///
/// A missing file or a directory means no netrc. A malformed file is logged
/// and ignored.
pub(crate) fn load(path: &Utf8Path) -> Option<Netrc> {
    if !path.is_file() {
        return None;
    }
    let text = std::fs::read_to_string(path).ok()?;
    match Netrc::parse(&text) {
        Ok(netrc) => Some(netrc),
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                path = %path,
                error = %err,
                "Not using netrc for auth, netrc file is invalid"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# credentials
machine example.com login alice password s3cret
machine other.org
  login bob
  account ignored
  password hunter2

macdef init
cd /pub
binary

default login anonymous password guest
";

    fn creds(netrc: &Netrc, host: &str) -> Option<(String, String)> {
        netrc
            .credentials(host)
            .map(|(login, password)| (login, password.expose_secret().to_owned()))
    }

    #[test]
    fn parses_machines_macros_and_default() {
        let netrc = Netrc::parse(SAMPLE).expect("valid netrc");
        assert_eq!(creds(&netrc, "example.com"), Some(("alice".into(), "s3cret".into())));
        assert_eq!(creds(&netrc, "other.org"), Some(("bob".into(), "hunter2".into())));
        assert_eq!(creds(&netrc, "unknown.net"), Some(("anonymous".into(), "guest".into())));
    }

    #[test]
    fn no_default_means_no_credentials() {
        let netrc = Netrc::parse("machine example.com login a password b").expect("valid netrc");
        assert!(netrc.credentials("other.org").is_none());
    }

    #[test]
    fn malformed_files_report_the_line() {
        let err = Netrc::parse("machine a\nlogin\n").expect_err("missing value");
        assert_eq!(
            err,
            NetrcParseError::MissingValue {
                token: "login".into(),
                line: 2
            }
        );
        let orphan = Netrc::parse("password x").expect_err("orphan password");
        assert!(matches!(orphan, NetrcParseError::UnexpectedToken { line: 1, .. }));
    }

    #[test]
    fn load_ignores_missing_and_invalid_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 tempdir");
        assert!(load(&root.join("absent")).is_none());
        assert!(load(&root).is_none(), "directories are not netrc files");

        let invalid = root.join("netrc");
        std::fs::write(&invalid, "bogus tokens").expect("write");
        let (logs, loaded) = crate::test_support::capture_warn_logs(|| load(&invalid));
        assert!(loaded.is_none());
        assert!(logs.iter().any(|line| line.contains("netrc file is invalid")));
    }
}
