//! Per-host credential resolution.
//!
//! Credentials come from `SCIENCE_AUTH_<HOST>_*` environment variables, where
//! `<HOST>` is the upper-cased host name with `.` and `-` replaced by `_`, or
//! failing that from a netrc file.

use std::collections::BTreeMap;

use camino::Utf8Path;
use reqwest::Url;
use secrecy::SecretString;

use super::netrc;
use crate::error::AuthError;

/// Credentials attached to requests for one URL.
#[derive(Debug)]
pub(crate) enum Auth {
    /// `Authorization: Bearer <token>`.
    Bearer(SecretString),
    /// HTTP basic auth, from env vars or netrc.
    Basic {
        username: String,
        password: SecretString,
    },
    /// RFC 7616 digest auth, answered on a 401 challenge.
    Digest {
        username: String,
        password: SecretString,
    },
}

/// The env var prefix carrying credentials for `host`.
pub(crate) fn env_prefix(host: &str) -> String {
    format!("SCIENCE_AUTH_{}", host.to_uppercase().replace(['.', '-'], "_"))
}

/// Resolves credentials for `url` from the process environment and the
/// default netrc file.
pub(crate) fn configure_auth(url: &Url) -> Result<Option<Auth>, AuthError> {
    let vars = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    let netrc_path = netrc::default_netrc_path();
    configure_auth_from(url, vars, netrc_path.as_deref())
}

/// Resolves credentials for `url` from `vars` and the netrc at `netrc_path`.
///
/// A bearer token wins, then basic, then digest credentials; any other
/// credential variable configured alongside the chosen one is ambiguous. A
/// username without its password is invalid.
pub(crate) fn configure_auth_from<I>(
    url: &Url,
    vars: I,
    netrc_path: Option<&Utf8Path>,
) -> Result<Option<Auth>, AuthError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let Some(host) = url.host_str().filter(|host| !host.is_empty()) else {
        return Ok(None);
    };
    let prefix = env_prefix(host);
    let mut env: BTreeMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .collect();
    if let Some(token) = take(&mut env, &prefix, "BEARER") {
        ensure_unambiguous("Bearer", url, &env)?;
        return Ok(Some(Auth::Bearer(SecretString::from(token))));
    }
    for (kind, label) in [("BASIC", "Basic"), ("DIGEST", "Digest")] {
        let Some(username) = take(&mut env, &prefix, &format!("{kind}_USER")) else {
            continue;
        };
        let pass_var = format!("{prefix}_{kind}_PASS");
        let password = take(&mut env, &prefix, &format!("{kind}_PASS")).ok_or_else(|| AuthError::Invalid {
            kind: label.to_owned(),
            env_var: pass_var,
        })?;
        ensure_unambiguous(label, url, &env)?;
        let password = SecretString::from(password);
        return Ok(Some(if kind == "BASIC" {
            Auth::Basic { username, password }
        } else {
            Auth::Digest { username, password }
        }));
    }

    Ok(netrc_path
        .and_then(netrc::load)
        .and_then(|netrc| netrc.credentials(host))
        .map(|(username, password)| Auth::Basic { username, password }))
}

fn take(env: &mut BTreeMap<String, String>, prefix: &str, name: &str) -> Option<String> {
    env.remove(&format!("{prefix}_{name}"))
        .filter(|value| !value.is_empty())
}

fn ensure_unambiguous(
    kind: &str,
    url: &Url,
    remaining: &BTreeMap<String, String>,
) -> Result<(), AuthError> {
    if remaining.is_empty() {
        return Ok(());
    }
    Err(AuthError::Ambiguous {
        kind: kind.to_owned(),
        url: url.to_string(),
        others: remaining.keys().cloned().collect::<Vec<_>>().join(", "),
    })
}
