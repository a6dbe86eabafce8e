//! Test fixtures for pipelines.

use crate::errors::FlowError;
use crate::source::{Pulled, Source};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

/// A source that fails a fixed number of times before yielding its values.
///
/// Failure `k` (one-based) reads `transient failure k of n`. The pull count is
/// shared by every pass over the source.
#[derive(Debug, Clone)]
pub struct FlakySource<T> {
    values: Arc<Vec<T>>,
    failures: usize,
    pulls: Arc<AtomicUsize>,
}

impl<T: Clone + Send + Sync + 'static> FlakySource<T> {
    /// Creates a source failing `failures` times, then yielding `values`.
    pub fn new(values: Vec<T>, failures: usize) -> Self {
        Self {
            values: Arc::new(values),
            failures,
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the source to build a pipeline on.
    pub fn source(&self) -> Source<T> {
        let values = Arc::clone(&self.values);
        let pulls = Arc::clone(&self.pulls);
        let failures = self.failures;

        Source::from_next(move || {
            let pull = pulls.fetch_add(1, Ordering::SeqCst);
            if pull < failures {
                return Pulled::error(FlowError::msg(format!(
                    "transient failure {} of {failures}",
                    pull + 1
                )));
            }
            values
                .get(pull - failures)
                .cloned()
                .map_or_else(Pulled::done, Pulled::value)
        })
    }

    /// Returns how many times the source has been pulled.
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

/// Tracks how many values are in flight and the most seen at once.
#[derive(Debug, Default)]
pub struct InFlightProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightProbe {
    /// Creates an idle probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value entering flight.
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    /// Records a value leaving flight.
    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Returns the values currently in flight.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Returns the most values seen in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

static TRACING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG` and defaults to `iterflow=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iterflow=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flaky_source_fails_then_yields() {
        init_test_tracing();
        let flaky = FlakySource::new(vec!["a", "b"], 1);
        let mut cursor = Pipeline::new(flaky.source()).iter();

        assert_eq!(cursor.next().unwrap().unwrap_err().to_string(), "transient failure 1 of 1");
        assert!(cursor.next().is_none());

        // A later pass continues where the shared `next` function stopped.
        let output = Pipeline::new(flaky.source()).collect_sync().unwrap();
        assert_eq!(output, vec!["a", "b"]);
        assert_eq!(flaky.pulls(), 4);
    }

    #[test]
    fn test_in_flight_probe() {
        let probe = InFlightProbe::new();
        probe.enter();
        probe.enter();
        probe.exit();
        probe.enter();
        assert_eq!(probe.current(), 2);
        assert_eq!(probe.peak(), 2);
    }
}
