use std::error::Error as StdError;

/// A `Result` alias where the `Err` case is `cachet::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the caching transport.
///
/// `Upstream` wraps whatever the underlying executor failed with and is
/// propagated unchanged unless a stale-if-error window applies. `Codec`
/// never reaches callers of `round_trip` (a corrupt entry is handled as a
/// miss) but is visible to direct users of the entry codec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying executor failed before producing a response.
    #[error("error sending request")]
    Upstream(#[source] Box<dyn StdError + Send + Sync>),

    /// A stored blob could not be decoded back into a response.
    #[error("corrupt cache entry: {0}")]
    Codec(String),

    /// Reading a response body failed.
    #[error("response body")]
    Body(#[from] std::io::Error),
}

impl Error {
    /// Wrap an executor failure.
    pub fn upstream<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Upstream(err.into())
    }
}
