//! Per-element delays.

use crate::core::{AsyncCursor, Cursor, Pull};
use crate::stages::{async_only, Operator};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

type DelayFn<T> = Arc<dyn Fn(&T, usize) -> Duration + Send + Sync>;

/// Holds every element back before releasing it.
pub struct Delay<T> {
    by: DelayFn<T>,
}

impl<T> Clone for Delay<T> {
    fn clone(&self) -> Self {
        Self {
            by: Arc::clone(&self.by),
        }
    }
}

/// Delays every element by `duration`.
pub fn delay<T>(duration: Duration) -> Delay<T> {
    Delay {
        by: Arc::new(move |_: &T, _: usize| duration),
    }
}

/// Delays every element by what `by` computes from the element and its index.
pub fn delay_by<T, F>(by: F) -> Delay<T>
where
    F: Fn(&T, usize) -> Duration + Send + Sync + 'static,
{
    Delay { by: Arc::new(by) }
}

impl<T: Send + 'static> Operator<T, T> for Delay<T> {
    fn name(&self) -> &str {
        "delay"
    }

    fn apply(&self, upstream: Cursor<T>) -> Cursor<T> {
        let by = Arc::clone(&self.by);
        async_only("delay", upstream, move |upstream| -> Box<dyn AsyncCursor<T>> {
            Box::new(DelayCursor {
                upstream,
                by,
                index: 0,
            })
        })
    }
}

struct DelayCursor<T> {
    upstream: Box<dyn AsyncCursor<T>>,
    by: DelayFn<T>,
    index: usize,
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for DelayCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        let pull = self.upstream.next().await;
        let wait = match &pull {
            Some(Ok(value)) => Some((self.by)(value, self.index)),
            _ => None,
        };
        if let Some(wait) = wait {
            self.index += 1;
            tokio::time::sleep(wait).await;
        }
        pull
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowError;
    use crate::pipeline::Pipeline;
    use crate::source::Source;
    use crate::testing::assert_stays_done;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_holds_each_element() {
        let started = Instant::now();
        let output = Pipeline::from_items(vec![1, 2, 3])
            .into_async()
            .pipe(delay(Duration::from_millis(100)))
            .collect_async()
            .await
            .unwrap();
        assert_eq!(output, vec![1, 2, 3]);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_by_uses_value_and_index() {
        let started = Instant::now();
        let output = Pipeline::from_items(vec![10u64, 20])
            .into_async()
            .pipe(delay_by(|value: &u64, index| Duration::from_millis(*value + index as u64)))
            .collect_async()
            .await
            .unwrap();
        assert_eq!(output, vec![10, 20]);
        assert_eq!(started.elapsed(), Duration::from_millis(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_pass_without_delay() {
        let source = Source::try_stream_with(|| futures::stream::iter(vec![Err(FlowError::msg("early"))]));
        let started = Instant::now();
        let mut cursor = Pipeline::<i32>::new(source)
            .pipe(delay(Duration::from_secs(5)))
            .iter();
        assert!(cursor.next_async().await.unwrap().is_err());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_delay_requires_async_pipeline() {
        let mut cursor = Pipeline::from_items(vec![1]).pipe(delay(Duration::from_millis(1))).iter();
        let err = cursor.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Operator \"delay\" requires an asynchronous pipeline");
        assert_stays_done(&mut cursor);
    }
}
