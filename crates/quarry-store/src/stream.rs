//! Lazy result streams.
//!
//! Query results decode into entities on demand. The rows themselves are
//! already in memory when a stream is built (the backend returns the full
//! row set of a statement); what the stream defers is decoding, so a
//! consumer taking only the first element pays one `from_row`, not N. A
//! stream is not restartable: once exhausted or failed it yields nothing
//! further. A [`CancelToken`] shared with the consumer aborts iteration
//! between elements.

use quarry_core::{Entity, Error, Result, Row};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation handle for a running stream.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect before the next element.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An iterator decoding fetched rows into entities one at a time.
///
/// Construction takes the already-fetched rows; iteration does no I/O.
/// Cancellation stops decoding, it cannot take back the fetch.
#[derive(Debug)]
pub struct EntityStream<E: Entity> {
    rows: std::vec::IntoIter<Row>,
    token: CancelToken,
    done: bool,
    _entity: PhantomData<E>,
}

impl<E: Entity> EntityStream<E> {
    pub(crate) fn new(rows: Vec<Row>, token: CancelToken) -> Self {
        Self {
            rows: rows.into_iter(),
            token,
            done: false,
            _entity: PhantomData,
        }
    }

    /// The token cancelling this stream.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Decode the remaining elements, stopping at the first failure.
    pub fn collect_all(self) -> Result<Vec<E>> {
        self.collect()
    }

    /// Decode at most the first element and drop the rest.
    pub fn into_first(mut self) -> Result<Option<E>> {
        self.next().transpose()
    }
}

impl<E: Entity> Iterator for EntityStream<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.token.is_cancelled() {
            self.done = true;
            return Some(Err(Error::Cancelled));
        }
        match self.rows.next() {
            Some(row) => {
                let decoded = E::from_row(&row);
                if decoded.is_err() {
                    self.done = true;
                }
                Some(decoded)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.rows.len()))
        }
    }
}
