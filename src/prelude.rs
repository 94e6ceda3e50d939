//! Canonical imports for crate consumers.

pub use crate::body::{Body, Finisher};
pub use crate::clock::{Clock, SystemClock};
pub use crate::entry::Entry;
pub use crate::error::{Error, Result};
pub use crate::freshness::Freshness;
pub use crate::store::{CacheStore, Lookup, MemoryStore};
pub use crate::transport::{
    Options, RoundTripper, Transport, X_ETAG_1, X_ETAG_2, X_FROM_CACHE,
};
