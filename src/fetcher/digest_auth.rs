//! RFC 7616 HTTP digest access authentication.

use std::collections::BTreeMap;

use md5::Md5;
use reqwest::Url;
use sha2::{Digest as _, Sha256};

/// A parsed `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Challenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: Algorithm,
    qop_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl Algorithm {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "MD5-SESS" => Some(Self::Md5Sess),
            "SHA-256" => Some(Self::Sha256),
            "SHA-256-SESS" => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    const fn is_session(self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    fn hash(self, data: &str) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => format!("{:x}", Md5::digest(data.as_bytes())),
            Self::Sha256 | Self::Sha256Sess => format!("{:x}", Sha256::digest(data.as_bytes())),
        }
    }
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for non-digest schemes, unsupported algorithms, or
    /// challenges missing a realm or nonce.
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let (scheme, rest) = header.trim().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let params = parse_params(rest);
        let algorithm = params
            .get("algorithm")
            .map_or(Some(Algorithm::Md5), |value| Algorithm::parse(value))?;
        let qop_auth = params.get("qop").is_some_and(|qop| {
            qop.split(',')
                .any(|option| option.trim().eq_ignore_ascii_case("auth"))
        });
        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            algorithm,
            qop_auth,
        })
    }

    /// Computes the `Authorization` header answering this challenge.
    pub(crate) fn respond(
        &self,
        method: &str,
        url: &Url,
        username: &str,
        password: &str,
        cnonce: &str,
    ) -> String {
        let uri = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        };
        let nc = "00000001";
        let algorithm = self.algorithm;

        let mut ha1 = algorithm.hash(&format!("{username}:{}:{password}", self.realm));
        if algorithm.is_session() {
            ha1 = algorithm.hash(&format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = algorithm.hash(&format!("{method}:{uri}"));
        let response = if self.qop_auth {
            algorithm.hash(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            algorithm.hash(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\", algorithm={}",
            quote(username),
            quote(&self.realm),
            quote(&self.nonce),
            algorithm.name()
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        if self.qop_auth {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        header
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parses `key=value, key="quoted, value"` auth parameters.
fn parse_params(text: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.next_if(|ch| ch.is_whitespace() || *ch == ',').is_some() {}
        let key: String = std::iter::from_fn(|| chars.next_if(|ch| *ch != '=' && *ch != ','))
            .collect();
        if key.trim().is_empty() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            value.extend(std::iter::from_fn(|| chars.next_if(|ch| *ch != ',')));
        }
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_parameters() {
        let challenge = Challenge::parse(
            r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
        )
        .expect("digest challenge");
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert!(challenge.qop_auth);
        assert_eq!(challenge.algorithm, Algorithm::Md5);
        assert_eq!(challenge.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        assert!(Challenge::parse(r#"Basic realm="x""#).is_none());
        assert!(Challenge::parse(r#"Digest realm="x", nonce="n", algorithm=SHA-512-256"#).is_none());
    }

    #[test]
    fn computes_the_rfc_2617_example_response() {
        let challenge = Challenge::parse(
            r#"Digest realm="testrealm@host.com", qop="auth", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
        )
        .expect("digest challenge");
        let url = Url::parse("http://www.nowhere.org/dir/index.html").expect("url");
        let header = challenge.respond("GET", &url, "Mufasa", "Circle Of Life", "0a4f113b");
        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#), "{header}");
        assert!(header.contains("qop=auth, nc=00000001"));
    }

    #[test]
    fn sha256_without_qop_hashes_nonce_directly() {
        let challenge = Challenge::parse(r#"Digest realm="r", nonce="n", algorithm=SHA-256"#)
            .expect("digest challenge");
        let url = Url::parse("https://example.com/a?b=c").expect("url");
        let header = challenge.respond("GET", &url, "u", "p", "cn");
        let ha1 = Algorithm::Sha256.hash("u:r:p");
        let ha2 = Algorithm::Sha256.hash("GET:/a?b=c");
        let expected = Algorithm::Sha256.hash(&format!("{ha1}:n:{ha2}"));
        assert!(header.contains(&format!("response=\"{expected}\"")));
        assert!(header.contains("uri=\"/a?b=c\""));
        assert!(!header.contains("qop="));
    }
}
