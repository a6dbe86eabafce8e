//! Per-element settle gates.

use crate::core::{AsyncCursor, Cursor, Pull};
use crate::errors::FlowError;
use crate::stages::{async_only, Operator};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

type SettleFn<T> = Arc<dyn Fn(T, usize) -> BoxFuture<'static, Result<(), FlowError>> + Send + Sync>;

/// Releases each element once its settle future completes.
pub struct Throttle<T> {
    settle: SettleFn<T>,
}

impl<T> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            settle: Arc::clone(&self.settle),
        }
    }
}

/// Awaits `settle` for every element before releasing the original element.
///
/// The settle future sees a copy of the element and its index. Its output only
/// signals completion; a failure fails that element instead.
pub fn throttle<T, F, Fut>(settle: F) -> Throttle<T>
where
    F: Fn(T, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
    Throttle {
        settle: Arc::new(move |value, index| settle(value, index).boxed()),
    }
}

impl<T: Clone + Send + 'static> Operator<T, T> for Throttle<T> {
    fn name(&self) -> &str {
        "throttle"
    }

    fn apply(&self, upstream: Cursor<T>) -> Cursor<T> {
        let settle = Arc::clone(&self.settle);
        async_only("throttle", upstream, move |upstream| -> Box<dyn AsyncCursor<T>> {
            Box::new(ThrottleCursor {
                upstream,
                settle,
                index: 0,
            })
        })
    }
}

struct ThrottleCursor<T> {
    upstream: Box<dyn AsyncCursor<T>>,
    settle: SettleFn<T>,
    index: usize,
}

#[async_trait]
impl<T: Clone + Send> AsyncCursor<T> for ThrottleCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        let value = match self.upstream.next().await? {
            Ok(value) => value,
            Err(error) => return Some(Err(error)),
        };
        let index = self.index;
        self.index += 1;
        Some((self.settle)(value.clone(), index).await.map(|()| value))
    }
}
