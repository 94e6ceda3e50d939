//! The caching transport: decides when responses are stored, served from
//! the store, revalidated with conditional requests, or fetched fresh.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    HeaderName, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE, VARY,
};
use http::{HeaderMap, Method, Request, Response, StatusCode};

use crate::body::{Body, Finisher};
use crate::clock::{Clock, SystemClock};
use crate::control::CacheControl;
use crate::entry::{self, Entry, VaryMatch};
use crate::error::Result;
use crate::freshness::{self, Freshness};
use crate::headers;
use crate::store::{CacheStore, Lookup};

/// Marker set on responses served from the store when
/// [`Options::mark_cached_responses`] is enabled.
pub const X_FROM_CACHE: &str = "x-from-cache";
/// Validator of the entry as it first entered the store.
pub const X_ETAG_1: &str = "x-etag-1";
/// Validator of the body being returned right now.
pub const X_ETAG_2: &str = "x-etag-2";

/// Anything that can execute one HTTP exchange.
///
/// The engine implements it too, so caching transports compose with other
/// decorators.
pub trait RoundTripper: Send + Sync {
    fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Body>>;
}

/// Key derivation override.
pub type KeyFn = Arc<dyn Fn(&Request<Bytes>) -> String + Send + Sync>;
/// Gate on storing a response the HTTP rules would otherwise allow. The
/// response view carries status and headers; the body has not been read
/// when the storage decision is taken.
pub type ShouldCacheFn = Arc<dyn Fn(&Request<Bytes>, &Response<()>, &str) -> bool + Send + Sync>;
/// Serve a stored entry without revalidation or freshness checks.
pub type AlwaysUseCachedFn = Arc<dyn Fn(&Request<Bytes>, &str) -> bool + Send + Sync>;
/// Observer invoked before origin-facing work; the returned finisher runs
/// exactly once after the response body is closed, or on error.
pub type AroundFn = Arc<dyn Fn(&Request<Bytes>, &str) -> Finisher + Send + Sync>;

/// Optional capabilities customizing the engine.
#[derive(Clone, Default)]
pub struct Options {
    pub cache_key: Option<KeyFn>,
    pub should_cache: Option<ShouldCacheFn>,
    pub always_use_cached: Option<AlwaysUseCachedFn>,
    pub around: Option<AroundFn>,
    /// Mark cache-served responses with `x-from-cache: 1`.
    pub mark_cached_responses: bool,
    /// Attach `x-etag-1`/`x-etag-2` validator annotations. Computing the
    /// digest materializes origin bodies.
    pub enable_etag_pair: bool,
}

/// The caching engine.
///
/// Re-entrant; concurrent calls share only the store, and each `get`,
/// `set` and `delete` is individually atomic. Two concurrent first
/// requests for one key may both hit the origin; the last store wins.
pub struct Transport {
    upstream: Arc<dyn RoundTripper>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    opts: Options,
}

impl Transport {
    pub fn new(upstream: Arc<dyn RoundTripper>, store: Arc<dyn CacheStore>) -> Self {
        Transport {
            upstream,
            store,
            clock: Arc::new(SystemClock),
            opts: Options::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    fn cache_key(&self, req: &Request<Bytes>) -> String {
        if let Some(hook) = &self.opts.cache_key {
            return hook(req);
        }
        if req.method() == Method::GET {
            req.uri().to_string()
        } else {
            format!("{} {}", req.method(), req.uri())
        }
    }

    /// Load and decode the entry under `key`. The second value is an
    /// entry the store handed back without vouching for it, kept only to
    /// seed annotations.
    fn load(&self, key: &str) -> (Option<Entry>, Option<Entry>) {
        match self.store.get(key) {
            Lookup::Hit(blob) => match Entry::decode(&blob) {
                Ok(entry) => (Some(entry), None),
                Err(err) => {
                    tracing::warn!(
                        target: "cachet::transport",
                        key,
                        error = %err,
                        "corrupt entry, deleting"
                    );
                    self.store.delete(key);
                    (None, None)
                }
            },
            Lookup::Stale(blob) => (None, Entry::decode(&blob).ok()),
            Lookup::Miss => (None, None),
        }
    }

    fn persist(&self, key: &str, entry: &Entry) {
        match entry.encode() {
            Ok(blob) => {
                tracing::debug!(target: "cachet::transport", key, size = blob.len(), "stored");
                self.store.set(key, blob);
            }
            Err(err) => {
                tracing::warn!(
                    target: "cachet::transport",
                    key,
                    error = %err,
                    "encode failed, skipping store"
                );
            }
        }
    }

    /// Serve a stored entry: strip projection headers, mark, annotate.
    fn deliver(&self, entry: Entry, seed: Option<&str>) -> Response<Body> {
        let current = self.opts.enable_etag_pair.then(|| entry.validator());
        let mut resp = entry.into_response();
        if self.opts.mark_cached_responses {
            resp.headers_mut().insert(
                HeaderName::from_static(X_FROM_CACHE),
                HeaderValue::from_static("1"),
            );
        }
        if let Some(current) = current {
            annotate(resp.headers_mut(), seed, &current);
        }
        resp
    }

    /// The unconditional-serve path: the entry is returned as-is, and if
    /// the cache predicate rejects the pair, the entry is deleted once
    /// the caller closes the body.
    fn serve_unconditional(
        &self,
        entry: Entry,
        req: &Request<Bytes>,
        key: &str,
        seed: Option<&str>,
    ) -> Response<Body> {
        let keep = match &self.opts.should_cache {
            Some(hook) => {
                let mut view = Response::new(());
                *view.status_mut() = entry.status;
                *view.headers_mut() = entry.headers.clone();
                hook(req, &view, key)
            }
            None => true,
        };

        let mut resp = self.deliver(entry, seed);
        if !keep {
            let store = Arc::clone(&self.store);
            let key = key.to_owned();
            resp.body_mut().on_close(Box::new(move || {
                tracing::debug!(target: "cachet::transport", key = %key, "predicate rejected entry, deleting");
                store.delete(&key);
            }));
        }
        resp
    }

    fn should_cache(&self, req: &Request<Bytes>, parts: &http::response::Parts, key: &str) -> bool {
        match &self.opts.should_cache {
            Some(hook) => {
                let mut view = Response::new(());
                *view.status_mut() = parts.status;
                *view.version_mut() = parts.version;
                *view.headers_mut() = parts.headers.clone();
                hook(req, &view, key)
            }
            None => true,
        }
    }

    /// Storage decision and bookkeeping for a response that came from the
    /// origin (anything but a 304 merge).
    fn finish_origin(
        &self,
        req: &Request<Bytes>,
        resp: Response<Body>,
        key: &str,
        seed: Option<&str>,
    ) -> Result<Response<Body>> {
        let (mut parts, body) = resp.into_parts();

        let storable = storable_status(parts.status)
            && !CacheControl::parse(req.headers()).has("no-store")
            && !CacheControl::parse(&parts.headers).has("no-store")
            && self.should_cache(req, &parts, key);

        if !storable {
            tracing::debug!(target: "cachet::transport", key, status = %parts.status, "not storable");
            self.store.delete(key);
            if self.opts.enable_etag_pair {
                let bytes = body.bytes()?;
                let current = current_validator(&parts.headers, &bytes);
                annotate(&mut parts.headers, seed, &current);
                return Ok(Response::from_parts(parts, Body::full(bytes)));
            }
            return Ok(Response::from_parts(parts, body));
        }

        // Header block as it will be stored: live headers plus the Vary
        // projection, minus hop-by-hop noise.
        let mut stored_headers = parts.headers.clone();
        record_vary(&mut stored_headers, req.headers());
        headers::strip_hop_by_hop(&mut stored_headers);

        if self.opts.enable_etag_pair {
            let bytes = body.bytes()?;
            let entry = Entry::new(parts.status, stored_headers, bytes.clone());
            self.persist(key, &entry);
            let current = current_validator(&parts.headers, &bytes);
            annotate(&mut parts.headers, seed, &current);
            return Ok(Response::from_parts(parts, Body::full(bytes)));
        }

        let status = parts.status;
        let store = Arc::clone(&self.store);
        let key = key.to_owned();
        let teed = Body::tee(body, move |bytes| {
            let entry = Entry::new(status, stored_headers, Bytes::from(bytes));
            match entry.encode() {
                Ok(blob) => {
                    tracing::debug!(target: "cachet::transport", key = %key, size = blob.len(), "stored");
                    store.set(&key, blob);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "cachet::transport",
                        key = %key,
                        error = %err,
                        "encode failed, skipping store"
                    );
                }
            }
        });
        Ok(Response::from_parts(parts, teed))
    }

    fn dispatch(&self, req: Request<Bytes>, key: &str) -> Result<Response<Body>> {
        if !cache_aware(&req) {
            return self.upstream.round_trip(req);
        }

        let (mut cached, stale_seed) = self.load(key);
        let seed = cached
            .as_ref()
            .or(stale_seed.as_ref())
            .map(Entry::validator);

        if let (Some(entry), Some(hook)) = (&cached, &self.opts.always_use_cached) {
            if hook(&req, key) {
                tracing::debug!(target: "cachet::transport", key, "serving unconditionally");
                return Ok(self.serve_unconditional(entry.clone(), &req, key, seed.as_deref()));
            }
        }

        if let Some(entry) = &cached {
            if entry.vary(req.headers()) == VaryMatch::Never {
                tracing::debug!(target: "cachet::transport", key, "entry varies on *, deleting");
                self.store.delete(key);
                cached = None;
            }
        }

        let only_if_cached = CacheControl::parse(req.headers()).has("only-if-cached");

        let mut req = req;
        if let Some(entry) = &cached {
            if entry.vary(req.headers()) == VaryMatch::Match {
                if only_if_cached {
                    return Ok(self.deliver(entry.clone(), seed.as_deref()));
                }
                match freshness::evaluate(&entry.headers, req.headers(), self.clock.as_ref()) {
                    Freshness::Fresh => {
                        tracing::debug!(target: "cachet::transport", key, "fresh hit");
                        return Ok(self.deliver(entry.clone(), seed.as_deref()));
                    }
                    Freshness::Stale => {
                        tracing::debug!(target: "cachet::transport", key, "stale, revalidating");
                        install_validators(&mut req, entry);
                    }
                    Freshness::Transparent => {}
                }
            }
        }

        if only_if_cached {
            tracing::debug!(target: "cachet::transport", key, "only-if-cached miss");
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::GATEWAY_TIMEOUT;
            return Ok(resp);
        }

        let kept = clone_request(&req);
        let outcome = self.upstream.round_trip(req);
        let req = kept;

        let resp = match outcome {
            Ok(resp) => {
                if resp.status().is_server_error() {
                    if let Some(entry) = &cached {
                        if freshness::allows_stale_on_error(
                            &entry.headers,
                            req.headers(),
                            self.clock.as_ref(),
                        ) {
                            tracing::debug!(
                                target: "cachet::transport",
                                key,
                                status = %resp.status(),
                                "origin error status, serving stale"
                            );
                            return Ok(self.deliver(entry.clone(), seed.as_deref()));
                        }
                    }
                }
                resp
            }
            Err(err) => {
                if let Some(entry) = &cached {
                    if freshness::allows_stale_on_error(
                        &entry.headers,
                        req.headers(),
                        self.clock.as_ref(),
                    ) {
                        tracing::debug!(target: "cachet::transport", key, "origin failed, serving stale");
                        return Ok(self.deliver(entry.clone(), seed.as_deref()));
                    }
                }
                return Err(err);
            }
        };

        if resp.status() == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                tracing::debug!(target: "cachet::transport", key, "revalidated");
                let merged = merge_not_modified(entry, resp.headers());
                self.persist(key, &merged);
                return Ok(self.deliver(merged, seed.as_deref()));
            }
            // A 304 for conditions the caller set themselves.
            return Ok(resp);
        }

        self.finish_origin(&req, resp, key, seed.as_deref())
    }
}

impl RoundTripper for Transport {
    fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Body>> {
        let key = self.cache_key(&req);
        let finisher = self.opts.around.as_ref().map(|hook| hook(&req, &key));
        match self.dispatch(req, &key) {
            Ok(mut resp) => {
                if let Some(finisher) = finisher {
                    resp.body_mut().on_close(finisher);
                }
                Ok(resp)
            }
            Err(err) => {
                if let Some(finisher) = finisher {
                    finisher();
                }
                Err(err)
            }
        }
    }
}

/// Only bodiless, safe GETs take part in caching; a request asking for a
/// byte range bypasses the cache entirely.
fn cache_aware(req: &Request<Bytes>) -> bool {
    req.method() == Method::GET && !req.headers().contains_key(RANGE)
}

/// Statuses cacheable by default under RFC 7231 section 6.1. Notably
/// excludes 206 and anything synthesized by the engine.
fn storable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        200 | 203 | 204 | 300 | 301 | 404 | 405 | 410 | 414 | 501
    )
}

/// Install `If-None-Match`/`If-Modified-Since` from the stored entry's
/// validators, unless the caller already set their own.
fn install_validators(req: &mut Request<Bytes>, entry: &Entry) {
    if !req.headers().contains_key(IF_NONE_MATCH) {
        if let Some(etag) = entry.etag() {
            if let Ok(value) = HeaderValue::from_str(etag) {
                req.headers_mut().insert(IF_NONE_MATCH, value);
            }
        }
    }
    if !req.headers().contains_key(IF_MODIFIED_SINCE) {
        if let Some(last_modified) = entry.last_modified() {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                req.headers_mut().insert(IF_MODIFIED_SINCE, value);
            }
        }
    }
}

/// Overwrite the stored entry's end-to-end headers with the 304's. Status
/// and body stay untouched: a cached 404 that validates is still a 404.
fn merge_not_modified(mut entry: Entry, fresh: &HeaderMap) -> Entry {
    for name in headers::end_to_end_headers(fresh) {
        while entry.headers.remove(&name).is_some() {}
        for value in fresh.get_all(&name) {
            entry.headers.append(name.clone(), value.clone());
        }
    }
    entry
}

/// Record the request's projection of every header the response varies
/// on, as synthesized `x-varied-*` headers in the stored block.
fn record_vary(stored: &mut HeaderMap, req_headers: &HeaderMap) {
    for token in headers::comma_tokens(stored, &VARY) {
        if token == "*" {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(token.as_bytes()) else {
            continue;
        };
        let Some(value) = headers::joined_value(req_headers, &name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let Ok(varied) =
            HeaderName::from_bytes(format!("{}{token}", entry::VARIED_PREFIX).as_bytes())
        else {
            continue;
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            stored.insert(varied, value);
        }
    }
}

fn annotate(headers: &mut HeaderMap, seed: Option<&str>, current: &str) {
    let first = seed.unwrap_or(current);
    if let (Ok(one), Ok(two)) = (HeaderValue::from_str(first), HeaderValue::from_str(current)) {
        headers.insert(HeaderName::from_static(X_ETAG_1), one);
        headers.insert(HeaderName::from_static(X_ETAG_2), two);
    }
}

fn current_validator(headers: &HeaderMap, body: &[u8]) -> String {
    match headers.get(ETAG).and_then(|value| value.to_str().ok()) {
        Some(etag) => etag.to_owned(),
        None => entry::content_digest(body),
    }
}

/// Shallow request copy: method, target, version, headers, body bytes.
/// Extensions stay with the request handed to the executor.
fn clone_request(req: &Request<Bytes>) -> Request<Bytes> {
    let mut out = Request::new(req.body().clone());
    *out.method_mut() = req.method().clone();
    *out.uri_mut() = req.uri().clone();
    *out.version_mut() = req.version();
    *out.headers_mut() = req.headers().clone();
    out
}
