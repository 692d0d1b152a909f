//! HTTP and `file://` clients behind one streaming `get`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};

use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{StatusCode, Url};
use color_eyre::eyre::Context;
use secrecy::ExposeSecret;
use tracing::debug;

use super::LOG_TARGET;
use super::auth::{Auth, configure_auth};
use super::digest_auth::Challenge;
use crate::error::{FetchError, InputError, LiftError, Result};

/// Default `User-Agent` for remote requests.
pub const USER_AGENT: &str = concat!("science/", env!("CARGO_PKG_VERSION"));

/// A successful response whose body has not been read yet.
pub(crate) struct FetchResponse {
    /// Advertised body length, when known.
    pub(crate) content_length: Option<u64>,
    /// The body stream.
    pub(crate) body: Box<dyn Read + Send>,
}

impl FetchResponse {
    /// Reads the whole body as UTF-8 text.
    pub(crate) fn text(mut self, url: &Url) -> Result<String> {
        let mut text = String::new();
        self.body
            .read_to_string(&mut text)
            .with_context(|| format!("failed to read {url}"))?;
        Ok(text)
    }
}

/// A client configured for one URL's scheme, headers and credentials.
pub(crate) enum Client {
    File,
    Http { inner: HttpClient, auth: Option<Auth> },
}

impl Client {
    /// Configures a client for `url`.
    ///
    /// `file://` URLs are served from the local filesystem. Remote clients
    /// follow redirects, send a `science/<version>` user agent unless one is
    /// given, and resolve credentials unless an `Authorization` header is
    /// supplied.
    pub(crate) fn configured(url: &Url, headers: &BTreeMap<String, String>) -> Result<Self> {
        if url.scheme() == "file" {
            return Ok(Self::File);
        }
        let header_map = header_map(headers)?;
        let auth = if header_map.contains_key(AUTHORIZATION) {
            None
        } else {
            configure_auth(url)?
        };
        let inner = HttpClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(header_map)
            .build()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(Self::Http { inner, auth })
    }

    /// Issues a `GET` for `url`, failing on non-success statuses.
    pub(crate) fn get(&self, url: &Url) -> Result<FetchResponse> {
        match self {
            Self::File => get_file(url),
            Self::Http { inner, auth } => get_http(inner, auth.as_ref(), url),
        }
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> std::result::Result<HeaderMap, InputError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| InputError::new(format!("Invalid header name {name:?}: {err}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|err| InputError::new(format!("Invalid value for header {name}: {err}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn status_error(url: &Url, status: StatusCode) -> LiftError {
    FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    }
    .into()
}

fn transport_error(url: &Url, source: reqwest::Error) -> LiftError {
    FetchError::Transport {
        url: url.to_string(),
        source,
    }
    .into()
}

fn get_file(url: &Url) -> Result<FetchResponse> {
    let path = url
        .to_file_path()
        .map_err(|()| status_error(url, StatusCode::BAD_REQUEST))?;
    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(status_error(url, StatusCode::NOT_FOUND));
        }
        Err(_) => return Err(status_error(url, StatusCode::FORBIDDEN)),
    };
    if !metadata.is_file() {
        return Err(status_error(url, StatusCode::BAD_REQUEST));
    }
    let file = File::open(&path).map_err(|_| status_error(url, StatusCode::FORBIDDEN))?;
    Ok(FetchResponse {
        content_length: Some(metadata.len()),
        body: Box::new(file),
    })
}

fn get_http(inner: &HttpClient, auth: Option<&Auth>, url: &Url) -> Result<FetchResponse> {
    let request = inner.get(url.clone());
    let response = match auth {
        None => send(request, url)?,
        Some(Auth::Bearer(token)) => send(request.bearer_auth(token.expose_secret()), url)?,
        Some(Auth::Basic { username, password }) => {
            send(request.basic_auth(username, Some(password.expose_secret())), url)?
        }
        Some(Auth::Digest { username, password }) => {
            let first = send(request, url)?;
            match digest_challenge(&first) {
                Some(challenge) => {
                    debug!(target: LOG_TARGET, url = %url, "answering digest auth challenge");
                    let cnonce = uuid::Uuid::new_v4().simple().to_string();
                    let header =
                        challenge.respond("GET", url, username, password.expose_secret(), &cnonce);
                    send(inner.get(url.clone()).header(AUTHORIZATION, header), url)?
                }
                None => first,
            }
        }
    };
    if !response.status().is_success() {
        return Err(status_error(url, response.status()));
    }
    Ok(FetchResponse {
        content_length: response.content_length(),
        body: Box::new(response),
    })
}

fn send(request: RequestBuilder, url: &Url) -> Result<reqwest::blocking::Response> {
    request.send().map_err(|source| transport_error(url, source))
}

fn digest_challenge(response: &reqwest::blocking::Response) -> Option<Challenge> {
    if response.status() != StatusCode::UNAUTHORIZED {
        return None;
    }
    response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(Challenge::parse)
}
