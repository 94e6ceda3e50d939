//! # cachet
//!
//! A private, RFC 7234 client-side HTTP caching transport.
//!
//! The engine sits between a caller and the executor that performs real
//! HTTP exchanges. Cacheable GET responses are stored under a request
//! fingerprint; repeats are served locally while fresh, revalidated with
//! conditional requests while stale, and can paper over origin failures
//! inside a `stale-if-error` window. Storage is an opaque key/value seam;
//! a thread-safe in-memory reference store is included.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use cachet::{Body, MemoryStore, RoundTripper, Transport};
//! use http::{Request, Response};
//!
//! struct Origin;
//!
//! impl RoundTripper for Origin {
//!     fn round_trip(&self, _req: Request<Bytes>) -> cachet::Result<Response<Body>> {
//!         // real network I/O goes here
//!         Ok(Response::new(Body::empty()))
//!     }
//! }
//!
//! let transport = Transport::new(Arc::new(Origin), Arc::new(MemoryStore::new()));
//! let response = transport.round_trip(
//!     Request::builder()
//!         .uri("https://example.com/")
//!         .body(Bytes::new())
//!         .unwrap(),
//! )?;
//! # drop(response);
//! # Ok::<(), cachet::Error>(())
//! ```

pub mod body;
pub mod clock;
pub mod control;
pub mod date;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod headers;
pub mod store;
pub mod transport;

pub mod prelude;

pub use crate::prelude::*;
