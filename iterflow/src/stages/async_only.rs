//! Enforcement of asynchronous-only stages and the sync-to-async conversion.

use super::Operator;
use crate::core::{AsyncCursor, Cursor, Pull, SyncCursor};
use crate::errors::FlowError;
use std::marker::PhantomData;
use tracing::warn;

/// Builds an asynchronous-only stage.
///
/// With an asynchronous upstream, `build` wraps it. With a synchronous one,
/// the stage is replaced by an [`AsyncRequired`] cursor; construction itself
/// never fails.
pub fn async_only<In, Out, F>(operator: &str, upstream: Cursor<In>, build: F) -> Cursor<Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: FnOnce(Box<dyn AsyncCursor<In>>) -> Box<dyn AsyncCursor<Out>>,
{
    match upstream {
        Cursor::Sync(_) => Cursor::sync(AsyncRequired::new(operator)),
        Cursor::Async(upstream) => Cursor::Async(build(upstream)),
    }
}

/// A synchronous cursor standing in for an asynchronous-only stage.
///
/// The first pull fails naming the operator; every later pull reports completion.
#[derive(Debug)]
pub struct AsyncRequired<T> {
    operator: String,
    fired: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AsyncRequired<T> {
    /// Creates the cursor for the named operator.
    #[must_use]
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            fired: false,
            _marker: PhantomData,
        }
    }
}

impl<T> SyncCursor<T> for AsyncRequired<T> {
    fn next(&mut self) -> Pull<T> {
        if self.fired {
            return None;
        }
        self.fired = true;
        warn!(
            operator = %self.operator,
            "Asynchronous-only operator pulled through a synchronous pipeline"
        );
        Some(Err(FlowError::AsyncRequired {
            operator: self.operator.clone(),
        }))
    }
}

/// Converts a synchronous pipeline into an asynchronous one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToAsync;

/// Creates the sync-to-async conversion stage.
#[must_use]
pub fn to_async() -> ToAsync {
    ToAsync
}

impl<T: Send + 'static> Operator<T, T> for ToAsync {
    fn name(&self) -> &str {
        "to_async"
    }

    fn apply(&self, upstream: Cursor<T>) -> Cursor<T> {
        Cursor::Async(upstream.into_async())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mode;
    use crate::source::Source;

    #[test]
    fn test_async_required_fails_once_then_completes() {
        let upstream = Source::from(vec![1, 2, 3]).normalize();
        let cursor: Cursor<i32> = async_only("delay", upstream, |upstream| upstream);
        let Cursor::Sync(mut cursor) = cursor else {
            panic!("expected a synchronous cursor");
        };

        let err = cursor.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Operator \"delay\" requires an asynchronous pipeline");
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_async_upstream_is_wrapped() {
        let upstream = Source::stream_with(|| futures::stream::iter(vec![1])).normalize();
        let cursor: Cursor<i32> = async_only("delay", upstream, |upstream| upstream);
        assert_eq!(cursor.mode(), Mode::Async);
    }

    #[tokio::test]
    async fn test_to_async_lifts_sync_cursor() {
        let upstream = Source::from(vec![4, 5]).normalize();
        let Cursor::Async(mut cursor) = to_async().apply(upstream) else {
            panic!("expected an asynchronous cursor");
        };
        assert_eq!(cursor.next().await.unwrap().unwrap(), 4);
        assert_eq!(cursor.next().await.unwrap().unwrap(), 5);
        assert!(cursor.next().await.is_none());
    }
}
