//! Pull cursors in both iteration modes.
//!
//! A cursor is the minimal pull primitive. `None` reports completion and, once
//! reported, every later pull must report it again.

use super::Mode;
use crate::errors::FlowError;
use async_trait::async_trait;
use futures::stream::{BoxStream, Fuse};
use futures::StreamExt;
use std::fmt;

/// The outcome of one pull: `None` when exhausted, otherwise an element or its failure.
pub type Pull<T> = Option<Result<T, FlowError>>;

/// A cursor whose pulls complete immediately.
pub trait SyncCursor<T>: Send {
    /// Pulls the next element.
    fn next(&mut self) -> Pull<T>;
}

/// A cursor whose pulls complete through a future.
#[async_trait]
pub trait AsyncCursor<T>: Send {
    /// Pulls the next element.
    async fn next(&mut self) -> Pull<T>;
}

/// A cursor of either mode, chosen at construction and never swapped.
pub enum Cursor<T> {
    /// A synchronous cursor.
    Sync(Box<dyn SyncCursor<T>>),
    /// An asynchronous cursor.
    Async(Box<dyn AsyncCursor<T>>),
}

impl<T: Send + 'static> Cursor<T> {
    /// Wraps a synchronous cursor.
    pub fn sync(cursor: impl SyncCursor<T> + 'static) -> Self {
        Self::Sync(Box::new(cursor))
    }

    /// Wraps an asynchronous cursor.
    pub fn from_async(cursor: impl AsyncCursor<T> + 'static) -> Self {
        Self::Async(Box::new(cursor))
    }

    /// Returns the cursor's mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Sync(_) => Mode::Sync,
            Self::Async(_) => Mode::Async,
        }
    }

    /// Converts into an asynchronous cursor, lifting a synchronous one.
    #[must_use]
    pub fn into_async(self) -> Box<dyn AsyncCursor<T>> {
        match self {
            Self::Sync(inner) => Box::new(Lifted { inner }),
            Self::Async(inner) => inner,
        }
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Cursor::Sync"),
            Self::Async(_) => f.write_str("Cursor::Async"),
        }
    }
}

/// A synchronous cursor pulled through the asynchronous protocol.
struct Lifted<T> {
    inner: Box<dyn SyncCursor<T>>,
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for Lifted<T> {
    async fn next(&mut self) -> Pull<T> {
        self.inner.next()
    }
}

/// Synchronous cursor over a fallible iterator.
pub struct IterCursor<I> {
    inner: std::iter::Fuse<I>,
}

impl<I: Iterator> IterCursor<I> {
    /// Creates a cursor over the iterator.
    pub fn new(iter: I) -> Self {
        Self { inner: iter.fuse() }
    }
}

impl<T, I> SyncCursor<T> for IterCursor<I>
where
    I: Iterator<Item = Result<T, FlowError>> + Send,
{
    fn next(&mut self) -> Pull<T> {
        self.inner.next()
    }
}

/// Asynchronous cursor over a fallible stream.
pub struct StreamCursor<T> {
    inner: Fuse<BoxStream<'static, Result<T, FlowError>>>,
}

impl<T> StreamCursor<T> {
    /// Creates a cursor over the stream.
    pub fn new(stream: BoxStream<'static, Result<T, FlowError>>) -> Self {
        Self {
            inner: stream.fuse(),
        }
    }
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for StreamCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        self.inner.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_cursor_stays_done() {
        let mut cursor = IterCursor::new(vec![Ok::<_, FlowError>(1), Ok(2)].into_iter());
        assert_eq!(cursor.next().map(Result::ok), Some(Some(1)));
        assert_eq!(cursor.next().map(Result::ok), Some(Some(2)));
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_stream_cursor() {
        let stream = futures::stream::iter(vec![Ok(1), Err(FlowError::msg("bad")), Ok(3)]).boxed();
        let mut cursor = StreamCursor::new(stream);

        assert_eq!(cursor.next().await.unwrap().unwrap(), 1);
        assert_eq!(cursor.next().await.unwrap().unwrap_err().to_string(), "bad");
        assert_eq!(cursor.next().await.unwrap().unwrap(), 3);
        assert!(cursor.next().await.is_none());
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lift_sync_cursor() {
        let cursor: Cursor<i32> = Cursor::sync(IterCursor::new(vec![Ok::<_, FlowError>(7)].into_iter()));
        assert_eq!(cursor.mode(), Mode::Sync);

        let mut lifted = cursor.into_async();
        assert_eq!(lifted.next().await.unwrap().unwrap(), 7);
        assert!(lifted.next().await.is_none());
    }
}
