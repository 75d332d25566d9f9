// src/repository/fetch.rs

//! URL fetching
//!
//! `file:` URLs and scheme-less paths open locally; `http(s)` URLs fetch
//! remotely, honoring `If-Modified-Since`. Transport failures are
//! normalized through the fixed [`FetchError`] table so callers never see
//! raw client errors.

use std::io::{self, Read};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use tracing::{debug, warn};

use crate::error::{Error, FetchError, Result};
use crate::stream::{ByteStream, FileStream, StreamMeta};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Local path behind a URL, when it has no remote scheme.
pub fn local_path(url: &str) -> Option<&str> {
    if let Some(path) = url.strip_prefix("file:") {
        return Some(path);
    }
    if url.starts_with("http:") || url.starts_with("https:") || url.starts_with("ftp:") {
        return None;
    }
    Some(url)
}

/// Open a byte stream for a URL. `since` turns into a conditional request;
/// an unchanged resource reports [`FetchError::Unchanged`].
pub fn open(url: &str, since: Option<SystemTime>) -> Result<Box<dyn ByteStream>> {
    if let Some(path) = local_path(url) {
        debug!("opening local file {path}");
        return Ok(Box::new(FileStream::open(path)?));
    }
    if url.starts_with("ftp:") {
        warn!("ftp is not supported: {url}");
        return Err(FetchError::Proto.into());
    }
    Ok(Box::new(HttpStream::open(url, since)?))
}

/// Remote source backed by an HTTP response body.
pub struct HttpStream {
    response: Response,
    meta: StreamMeta,
}

impl HttpStream {
    fn open(url: &str, since: Option<SystemTime>) -> Result<HttpStream> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        let mut request = client.get(url);
        if let Some(since) = since {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, http_date(since));
        }

        debug!("fetching {url}");
        let response = request.send().map_err(map_transport_error)?;
        let status = response.status();
        if let Some(err) = map_status(status) {
            debug!("fetch of {url} failed: {status}");
            return Err(err.into());
        }

        let mtime = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        Ok(HttpStream {
            response,
            meta: StreamMeta {
                mtime,
                atime: None,
            },
        })
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf)
    }
}

impl ByteStream for HttpStream {
    fn meta(&self) -> StreamMeta {
        self.meta
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    let fe = if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Refused
    } else if e.is_builder() || e.url().is_none() {
        FetchError::BadUrl
    } else {
        FetchError::Network
    };
    fe.into()
}

fn map_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_MODIFIED => FetchError::Unchanged,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth,
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound,
        StatusCode::REQUEST_TIMEOUT => FetchError::Timeout,
        s if s.is_server_error() => FetchError::Server,
        _ => FetchError::Proto,
    })
}

/// Format a timestamp as an HTTP date (RFC 7231, always GMT).
fn http_date(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(s).ok().map(SystemTime::from)
}
