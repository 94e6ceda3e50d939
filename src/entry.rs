//! Cached entries and the blob codec.

use bincode::{Decode, Encode};
use bytes::Bytes;
use http::header::{ETAG, LAST_MODIFIED, VARY};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};

use crate::body::Body;
use crate::error::Error;
use crate::headers;

/// Prefix of the synthesized headers that hold the Vary projection.
pub(crate) const VARIED_PREFIX: &str = "x-varied-";

/// A stored response: status, ordered header multimap, complete body.
#[derive(Debug, Clone)]
pub struct Entry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Wire form of an entry. Stable within a process; not a cross-version
/// format.
#[derive(Encode, Decode)]
struct Blob {
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

/// Outcome of matching an entry's Vary projection against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaryMatch {
    /// Every varied header matches byte-for-byte.
    Match,
    /// Some varied header differs.
    Mismatch,
    /// The stored response carried `Vary: *`; never serveable.
    Never,
}

impl Entry {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Entry {
            status,
            headers,
            body,
        }
    }

    /// Serialize to the opaque blob held by the store.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_owned(), value.as_bytes().to_vec()))
            .collect();
        let blob = Blob {
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
        };
        bincode::encode_to_vec(blob, bincode::config::standard())
            .map_err(|err| Error::Codec(err.to_string()))
    }

    /// Deserialize a blob. Corrupt blobs surface as [`Error::Codec`] and
    /// are handled as misses by the transport.
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        let (blob, _): (Blob, usize) =
            bincode::decode_from_slice(raw, bincode::config::standard())
                .map_err(|err| Error::Codec(err.to_string()))?;
        let status =
            StatusCode::from_u16(blob.status).map_err(|err| Error::Codec(err.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &blob.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| Error::Codec(err.to_string()))?;
            let value =
                HeaderValue::from_bytes(value).map_err(|err| Error::Codec(err.to_string()))?;
            headers.append(name, value);
        }
        Ok(Entry {
            status,
            headers,
            body: Bytes::from(blob.body),
        })
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|value| value.to_str().ok())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
    }

    /// The entry's validator for annotation purposes: its ETag, or the
    /// digest of its body when it entered the store without one.
    pub fn validator(&self) -> String {
        match self.etag() {
            Some(etag) => etag.to_owned(),
            None => content_digest(&self.body),
        }
    }

    /// Match the entry's Vary projection against a new request: for every
    /// header the stored response varies on, the request's value must be
    /// byte-equal to the recorded `x-varied-*` value.
    pub fn vary(&self, req_headers: &HeaderMap) -> VaryMatch {
        for token in headers::comma_tokens(&self.headers, &VARY) {
            if token == "*" {
                return VaryMatch::Never;
            }
            let Ok(name) = HeaderName::from_bytes(token.as_bytes()) else {
                return VaryMatch::Mismatch;
            };
            let Ok(varied) =
                HeaderName::from_bytes(format!("{VARIED_PREFIX}{token}").as_bytes())
            else {
                return VaryMatch::Mismatch;
            };
            let recorded = headers::joined_value(&self.headers, &varied).unwrap_or_default();
            let presented = headers::joined_value(req_headers, &name).unwrap_or_default();
            if recorded != presented {
                return VaryMatch::Mismatch;
            }
        }
        VaryMatch::Match
    }

    /// Turn the entry into a response, dropping the internal `x-varied-*`
    /// projection headers.
    pub fn into_response(mut self) -> Response<Body> {
        let varied: Vec<HeaderName> = self
            .headers
            .keys()
            .filter(|name| name.as_str().starts_with(VARIED_PREFIX))
            .cloned()
            .collect();
        for name in varied {
            while self.headers.remove(&name).is_some() {}
        }

        let mut resp = Response::new(Body::full(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}

/// Stable digest standing in for a missing ETag.
pub fn content_digest(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}
