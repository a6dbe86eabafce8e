//! Pass-wide deadlines.

use crate::core::{AsyncCursor, Cursor, Pull};
use crate::errors::FlowError;
use crate::stages::{async_only, Operator};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type OnTimeout = Arc<dyn Fn(usize) -> Result<(), FlowError> + Send + Sync>;

/// Ends the pass once a time limit has passed since its first pull.
///
/// Running out of time is completion, not failure. A negative limit disables
/// the stage; it then passes everything through in either mode.
#[derive(Clone)]
pub struct Timeout {
    limit: Option<Duration>,
    on_timeout: Option<OnTimeout>,
}

impl Timeout {
    /// Returns the time limit, or `None` when disabled.
    #[must_use]
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}

/// Ends the pass `ms` milliseconds after its first pull.
#[must_use]
pub fn timeout(ms: i64) -> Timeout {
    Timeout {
        limit: u64::try_from(ms).ok().map(Duration::from_millis),
        on_timeout: None,
    }
}

/// Like [`timeout`], calling `on_timeout` with the number of elements released.
///
/// An error returned by `on_timeout` is handed out as the final pull.
pub fn timeout_with<F>(ms: i64, on_timeout: F) -> Timeout
where
    F: Fn(usize) -> Result<(), FlowError> + Send + Sync + 'static,
{
    Timeout {
        on_timeout: Some(Arc::new(on_timeout)),
        ..timeout(ms)
    }
}

impl<T: Send + 'static> Operator<T, T> for Timeout {
    fn name(&self) -> &str {
        "timeout"
    }

    fn apply(&self, upstream: Cursor<T>) -> Cursor<T> {
        let Some(limit) = self.limit else {
            return upstream;
        };
        let on_timeout = self.on_timeout.clone();
        async_only("timeout", upstream, move |upstream| -> Box<dyn AsyncCursor<T>> {
            Box::new(TimeoutCursor {
                upstream,
                limit,
                deadline: None,
                on_timeout,
                released: 0,
                done: false,
            })
        })
    }
}

struct TimeoutCursor<T> {
    upstream: Box<dyn AsyncCursor<T>>,
    limit: Duration,
    deadline: Option<Instant>,
    on_timeout: Option<OnTimeout>,
    released: usize,
    done: bool,
}

impl<T> TimeoutCursor<T> {
    fn expire(&mut self) -> Pull<T> {
        self.done = true;
        debug!(
            limit_ms = u64::try_from(self.limit.as_millis()).unwrap_or(u64::MAX),
            released = self.released,
            "Pipeline timed out"
        );
        let on_timeout = self.on_timeout.as_ref()?;
        on_timeout(self.released).err().map(Err)
    }
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for TimeoutCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        if self.done {
            return None;
        }
        let limit = self.limit;
        let deadline = *self.deadline.get_or_insert_with(|| Instant::now() + limit);
        if Instant::now() >= deadline {
            return self.expire();
        }

        match tokio::time::timeout_at(deadline, self.upstream.next()).await {
            Ok(pull) => {
                match &pull {
                    Some(Ok(_)) => self.released += 1,
                    Some(Err(_)) => {}
                    None => self.done = true,
                }
                pull
            }
            Err(_) => self.expire(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::source::Source;
    use crate::testing::assert_stays_done_async;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Yields 1..=5, one every 40ms.
    fn ticking() -> Pipeline<i32> {
        Pipeline::new(Source::stream_with(|| {
            futures::stream::iter(1..=5).then(|n| async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                n
            })
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_pass_as_completion() {
        let output = ticking().pipe(timeout(100)).collect_async().await.unwrap();
        assert_eq!(output, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_starts_at_first_pull() {
        let pipeline = ticking().pipe(timeout(100));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(pipeline.collect_async().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_receives_release_count() {
        let count = Arc::new(AtomicUsize::new(usize::MAX));
        let recorded = Arc::clone(&count);

        let output = ticking()
            .pipe(timeout_with(130, move |released| {
                recorded.store(released, Ordering::SeqCst);
                Ok(())
            }))
            .collect_async()
            .await
            .unwrap();

        assert_eq!(output, vec![1, 2, 3]);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_timeout_error_is_final_pull() {
        let mut cursor = ticking()
            .pipe(timeout_with(50, |released| {
                Err(FlowError::msg(format!("timed out after {released}")))
            }))
            .iter();

        assert_eq!(cursor.next_async().await.unwrap().unwrap(), 1);
        assert_eq!(cursor.next_async().await.unwrap().unwrap_err().to_string(), "timed out after 1");
        assert_stays_done_async(&mut cursor).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_when_upstream_is_fast() {
        let output = ticking().pipe(timeout(1_000)).collect_async().await.unwrap();
        assert_eq!(output, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_negative_timeout_is_identity_in_sync_mode() {
        let stage = timeout(-1);
        assert_eq!(stage.limit(), None);
        let output = Pipeline::from_items(vec![1, 2, 3]).pipe(stage).collect_sync().unwrap();
        assert_eq!(output, vec![1, 2, 3]);
    }

    #[test]
    fn test_timeout_requires_async_pipeline() {
        let err = Pipeline::from_items(vec![1]).pipe(timeout(10)).collect_sync().unwrap_err();
        assert_eq!(err.to_string(), "Operator \"timeout\" requires an asynchronous pipeline");
    }
}
