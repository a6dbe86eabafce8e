//! Retry stages with configurable backoff and jitter strategies.
//!
//! A retry stage re-pulls its upstream after a failure instead of passing the
//! failure on. It only helps when the upstream is re-pullable after a failure,
//! such as a source that fails transiently.

use crate::core::{AsyncCursor, Cursor, Pull};
use crate::errors::FlowError;
use crate::stages::{async_only, Directive, Feed, Kernel, KernelOperator, Operator};
use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-pulls allowed after the first failure of an element.
    pub max_retries: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// Delay bookkeeping for one retry stage.
#[derive(Debug, Default)]
pub struct BackoffState {
    previous_delay_ms: Option<u64>,
}

impl BackoffState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the previous delay once an element gets through.
    pub fn reset(&mut self) {
        self.previous_delay_ms = None;
    }

    /// Calculates the delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn calculate_delay(&mut self, attempt: usize, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let steps = u64::try_from(attempt).unwrap_or(u64::MAX).saturating_add(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(exponent)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(steps).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}

/// The failure a retry predicate decides on.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// Zero-based position of the element being retried.
    pub index: usize,
    /// Retries already spent on this element.
    pub attempt: usize,
    /// The failure just pulled.
    pub error: FlowError,
}

type RetryPredicate = Arc<dyn Fn(&RetryAttempt) -> bool + Send + Sync>;
type AsyncRetryPredicate = Arc<dyn Fn(RetryAttempt) -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Clone)]
enum Policy {
    Attempts(usize),
    Predicate(RetryPredicate),
}

struct Retry {
    policy: Policy,
    index: usize,
    attempt: usize,
    original: Option<FlowError>,
}

impl Retry {
    fn new(policy: Policy) -> Self {
        Self {
            policy,
            index: 0,
            attempt: 0,
            original: None,
        }
    }
}

impl<T: Send> Kernel<T, T> for Retry {
    fn resume(&mut self, feed: Feed<T>) -> Directive<T> {
        match feed {
            Feed::Resume => Directive::Pull,
            Feed::Item(value) => {
                self.index += 1;
                self.attempt = 0;
                self.original = None;
                Directive::Emit(value)
            }
            Feed::Error(error) => {
                let allowed = !error.is_usage()
                    && match &self.policy {
                        Policy::Attempts(limit) => self.attempt < *limit,
                        Policy::Predicate(predicate) => predicate(&RetryAttempt {
                            index: self.index,
                            attempt: self.attempt,
                            error: error.clone(),
                        }),
                    };
                if allowed {
                    self.attempt += 1;
                    debug!(index = self.index, attempt = self.attempt, error = %error, "Retrying failed pull");
                    self.original.get_or_insert(error);
                    return Directive::Pull;
                }
                self.index += 1;
                self.attempt = 0;
                Directive::Fail(self.original.take().unwrap_or(error))
            }
            Feed::End => Directive::Done,
        }
    }
}

/// Re-pulls up to `attempts` times after a failure before passing it on.
pub fn retry<T: Send + 'static>(attempts: usize) -> KernelOperator<T, T> {
    KernelOperator::new("retry", move || Retry::new(Policy::Attempts(attempts)))
}

/// Re-pulls after a failure for as long as `predicate` allows it.
pub fn retry_if<T, F>(predicate: F) -> KernelOperator<T, T>
where
    T: Send + 'static,
    F: Fn(&RetryAttempt) -> bool + Send + Sync + 'static,
{
    let predicate: RetryPredicate = Arc::new(predicate);
    KernelOperator::new("retry", move || Retry::new(Policy::Predicate(Arc::clone(&predicate))))
}

#[derive(Clone)]
enum AsyncPolicy {
    Predicate(AsyncRetryPredicate),
    Backoff(RetryConfig),
}

/// An asynchronous-only retry stage.
#[derive(Clone)]
pub struct AsyncRetry {
    policy: AsyncPolicy,
}

/// Re-pulls after a failure for as long as an asynchronous predicate allows it.
pub fn retry_when<F, Fut>(predicate: F) -> AsyncRetry
where
    F: Fn(RetryAttempt) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let predicate: AsyncRetryPredicate = Arc::new(move |attempt| -> BoxFuture<'static, bool> {
        Box::pin(predicate(attempt))
    });
    AsyncRetry {
        policy: AsyncPolicy::Predicate(predicate),
    }
}

/// Re-pulls after a failure, sleeping between attempts as `config` prescribes.
#[must_use]
pub fn retry_with_backoff(config: RetryConfig) -> AsyncRetry {
    AsyncRetry {
        policy: AsyncPolicy::Backoff(config),
    }
}

impl AsyncRetry {
    fn label(&self) -> &'static str {
        match self.policy {
            AsyncPolicy::Predicate(_) => "retry_when",
            AsyncPolicy::Backoff(_) => "retry_with_backoff",
        }
    }
}

impl<T: Send + 'static> Operator<T, T> for AsyncRetry {
    fn name(&self) -> &str {
        self.label()
    }

    fn apply(&self, upstream: Cursor<T>) -> Cursor<T> {
        let policy = self.policy.clone();
        async_only(self.label(), upstream, move |upstream| -> Box<dyn AsyncCursor<T>> {
            Box::new(AsyncRetryCursor {
                upstream,
                policy,
                index: 0,
                attempt: 0,
                original: None,
                backoff: BackoffState::new(),
                done: false,
            })
        })
    }
}

struct AsyncRetryCursor<T> {
    upstream: Box<dyn AsyncCursor<T>>,
    policy: AsyncPolicy,
    index: usize,
    attempt: usize,
    original: Option<FlowError>,
    backoff: BackoffState,
    done: bool,
}

impl<T> AsyncRetryCursor<T> {
    fn settle(&mut self) {
        self.index += 1;
        self.attempt = 0;
        self.original = None;
        self.backoff.reset();
    }

    async fn allows(&mut self, error: &FlowError) -> bool {
        if error.is_usage() {
            return false;
        }
        match &self.policy {
            AsyncPolicy::Predicate(predicate) => {
                let attempt = RetryAttempt {
                    index: self.index,
                    attempt: self.attempt,
                    error: error.clone(),
                };
                predicate(attempt).await
            }
            AsyncPolicy::Backoff(config) => {
                if self.attempt >= config.max_retries {
                    return false;
                }
                let delay = self.backoff.calculate_delay(self.attempt, config);
                debug!(
                    index = self.index,
                    attempt = self.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for AsyncRetryCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        if self.done {
            return None;
        }
        loop {
            match self.upstream.next().await {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Ok(value)) => {
                    self.settle();
                    return Some(Ok(value));
                }
                Some(Err(error)) => {
                    if self.allows(&error).await {
                        self.attempt += 1;
                        self.original.get_or_insert(error);
                        continue;
                    }
                    let error = self.original.take().unwrap_or(error);
                    self.settle();
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::source::Source;
    use crate::testing::FlakySource;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter_strategy, JitterStrategy::Full);
    }

    #[test]
    fn test_retry_config_from_partial_json() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_retries": 5, "jitter_strategy": "none"}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay_without_jitter() {
        let exponential = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        let linear = exponential.clone().with_backoff(BackoffStrategy::Linear);
        let constant = exponential.clone().with_backoff(BackoffStrategy::Constant);
        let mut state = BackoffState::new();

        let delays = |config: &RetryConfig, state: &mut BackoffState| -> Vec<u128> {
            (0..3).map(|attempt| state.calculate_delay(attempt, config).as_millis()).collect()
        };
        assert_eq!(delays(&exponential, &mut state), vec![100, 200, 400]);
        assert_eq!(delays(&linear, &mut state), vec![100, 200, 300]);
        assert_eq!(delays(&constant, &mut state), vec![100, 100, 100]);
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);
        let mut state = BackoffState::new();
        assert_eq!(state.calculate_delay(10, &config), Duration::from_millis(5000));
    }

    #[test]
    fn test_jittered_delays_stay_in_range() {
        let full = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        let decorrelated = full.clone().with_jitter(JitterStrategy::Decorrelated).with_max_delay_ms(250);
        let mut state = BackoffState::new();

        for attempt in 0..10 {
            assert!(state.calculate_delay(attempt, &full) <= Duration::from_millis(100));
            let delay = state.calculate_delay(attempt, &decorrelated);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_retry_gives_up_with_the_original_failure() {
        let flaky = FlakySource::new(vec![1, 2], 2);
        let mut cursor = Pipeline::new(flaky.source()).pipe(retry(1)).iter();
        assert_eq!(cursor.next().unwrap().unwrap_err().to_string(), "transient failure 1 of 2");
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_retry_succeeds_with_enough_attempts() {
        let flaky = FlakySource::new(vec![1, 2], 2);
        let output = Pipeline::new(flaky.source()).pipe(retry(2)).collect_sync().unwrap();
        assert_eq!(output, vec![1, 2]);
        assert_eq!(flaky.pulls(), 5);
    }

    #[test]
    fn test_retry_if_sees_attempts() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let flaky = FlakySource::new(vec![7], 3);

        let output = Pipeline::new(flaky.source())
            .pipe(retry_if(move |attempt: &RetryAttempt| {
                recorded.lock().push((attempt.index, attempt.attempt));
                attempt.attempt < 5
            }))
            .collect_sync()
            .unwrap();

        assert_eq!(output, vec![7]);
        assert_eq!(*seen.lock(), vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn test_retry_does_not_retry_usage_errors() {
        let mut cursor = Pipeline::from_items(vec![1])
            .pipe(crate::timing::delay(Duration::from_millis(1)))
            .pipe(retry(3))
            .iter();
        assert!(cursor.next().unwrap().unwrap_err().is_usage());
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_retry_over_async_upstream() {
        let flaky = FlakySource::new(vec![1, 2], 2);
        let output = Pipeline::new(flaky.source())
            .into_async()
            .pipe(retry(2))
            .collect_async()
            .await
            .unwrap();
        assert_eq!(output, vec![1, 2]);
        assert_eq!(flaky.pulls(), 5);
    }

    #[tokio::test]
    async fn test_retry_over_stream_gives_up_with_the_original_failure() {
        let pipeline = Pipeline::new(Source::try_stream_with(|| {
            futures::stream::iter(vec![
                Err(FlowError::msg("first")),
                Err(FlowError::msg("second")),
                Ok(3),
            ])
        }));

        let mut recovered = pipeline.clone().pipe(retry(2)).iter();
        assert_eq!(recovered.next_async().await.unwrap().unwrap(), 3);
        assert!(recovered.next_async().await.is_none());

        let mut exhausted = pipeline.pipe(retry(1)).iter();
        assert_eq!(exhausted.next_async().await.unwrap().unwrap_err().to_string(), "first");
        assert!(exhausted.next_async().await.is_none());
    }

    #[tokio::test]
    async fn test_retry_when_async_predicate() {
        let flaky = FlakySource::new(vec![1, 2, 3], 1);
        let output = Pipeline::new(flaky.source())
            .into_async()
            .pipe(retry_when(|attempt: RetryAttempt| async move { attempt.attempt == 0 }))
            .collect_async()
            .await
            .unwrap();
        assert_eq!(output, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_sleeps_between_attempts() {
        let flaky = FlakySource::new(vec![1], 2);
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);

        let started = tokio::time::Instant::now();
        let output = Pipeline::new(flaky.source())
            .into_async()
            .pipe(retry_with_backoff(config))
            .collect_async()
            .await
            .unwrap();

        assert_eq!(output, vec![1]);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_gives_up() {
        let flaky = FlakySource::new(vec![1], 5);
        let config = RetryConfig::new()
            .with_max_retries(2)
            .with_base_delay_ms(10)
            .with_jitter(JitterStrategy::None);

        let err = Pipeline::new(flaky.source())
            .into_async()
            .pipe(retry_with_backoff(config))
            .collect_async()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "transient failure 1 of 5");
    }

    #[test]
    fn test_async_retry_in_sync_pipeline() {
        let err = Pipeline::from_items(vec![1])
            .pipe(retry_with_backoff(RetryConfig::default()))
            .collect_sync()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operator \"retry_with_backoff\" requires an asynchronous pipeline"
        );
    }
}
