//! Streaming response bodies with close finishers and a store-on-EOF tee.

use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;

/// Callback run exactly once when a body is closed (dropped).
pub type Finisher = Box<dyn FnOnce() + Send>;

type OnComplete = Box<dyn FnOnce(Vec<u8>) + Send>;

/// A synchronous streaming response body.
///
/// Wraps either fully materialized bytes or a caller-supplied reader.
/// Close finishers run when the body is dropped. The tee installed by the
/// transport hands the accumulated bytes to its finalizer only if the
/// stream is drained to EOF; an abandoned body stores nothing.
pub struct Body {
    reader: Reader,
    finishers: Vec<Finisher>,
}

enum Reader {
    Full(Cursor<Bytes>),
    Stream(Box<dyn Read + Send>),
    Tee {
        inner: Box<Body>,
        seen: Vec<u8>,
        on_complete: Option<OnComplete>,
    },
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    /// A body over bytes already in memory.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        Body {
            reader: Reader::Full(Cursor::new(bytes.into())),
            finishers: Vec::new(),
        }
    }

    /// A body streaming from `reader`.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Body {
            reader: Reader::Stream(Box::new(reader)),
            finishers: Vec::new(),
        }
    }

    /// Decorate `body` so a full read to EOF hands the accumulated bytes
    /// to `on_complete`.
    pub(crate) fn tee(body: Body, on_complete: impl FnOnce(Vec<u8>) + Send + 'static) -> Body {
        Body {
            reader: Reader::Tee {
                inner: Box::new(body),
                seen: Vec::new(),
                on_complete: Some(Box::new(on_complete)),
            },
            finishers: Vec::new(),
        }
    }

    /// Register a callback to run when the body is closed.
    pub(crate) fn on_close(&mut self, finisher: Finisher) {
        self.finishers.push(finisher);
    }

    /// Drain the remaining stream into memory.
    pub fn bytes(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.reader {
            Reader::Full(cursor) => cursor.read(buf),
            Reader::Stream(reader) => reader.read(buf),
            Reader::Tee {
                inner,
                seen,
                on_complete,
            } => {
                let n = inner.read(buf)?;
                if n > 0 {
                    seen.extend_from_slice(&buf[..n]);
                } else if !buf.is_empty() {
                    if let Some(done) = on_complete.take() {
                        done(std::mem::take(seen));
                    }
                }
                Ok(n)
            }
        }
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        for finisher in self.finishers.drain(..) {
            finisher();
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.reader {
            Reader::Full(cursor) => format!("full({} bytes)", cursor.get_ref().len()),
            Reader::Stream(_) => "stream".to_owned(),
            Reader::Tee { seen, .. } => format!("tee({} bytes seen)", seen.len()),
        };
        f.debug_struct("Body").field("reader", &kind).finish()
    }
}
