//! Pipeline composition.

use super::cursor::PipelineCursor;
use super::recovery::{catch_error, RecoveryContext};
use crate::core::{Cursor, Mode};
use crate::errors::FlowError;
use crate::events::EventSink;
use crate::source::Source;
use crate::stages::{to_async, Operator};
use futures::stream::FusedStream;
use std::fmt;
use std::sync::Arc;

pub(crate) type Build<T> = Arc<dyn Fn() -> Cursor<T> + Send + Sync>;

/// A source chained through an ordered list of stages.
///
/// Building a pipeline is pure: nothing is pulled until a pass created with
/// [`Pipeline::iter`] is pulled for the first time. Every pass builds fresh
/// stage state, so a pipeline can be iterated any number of times.
pub struct Pipeline<T> {
    build: Build<T>,
    mode: Option<Mode>,
    stages: Vec<String>,
    sink: Option<Arc<dyn EventSink>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
            mode: self.mode,
            stages: self.stages.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("mode", &self.mode)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline over a source, in whatever mode the source has.
    pub fn new(source: Source<T>) -> Self {
        let mode = source.mode();
        Self {
            build: Arc::new(move || source.normalize()),
            mode,
            stages: Vec::new(),
            sink: None,
        }
    }

    /// Creates a pipeline that must be synchronous.
    ///
    /// # Errors
    ///
    /// Returns a usage error right away if the source is asynchronous.
    pub fn new_sync(source: Source<T>) -> Result<Self, FlowError> {
        if source.mode() == Some(Mode::Async) {
            return Err(FlowError::usage(
                "source",
                "asynchronous stream",
                "a synchronous pipeline requires a synchronous source",
            ));
        }
        Ok(Self::new(source))
    }

    /// Creates a pipeline over a collection.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::new(Source::from_items(items))
    }

    /// Appends a stage.
    #[must_use]
    pub fn pipe<U, O>(self, operator: O) -> Pipeline<U>
    where
        U: Send + 'static,
        O: Operator<T, U> + 'static,
    {
        let Self {
            build,
            mode,
            mut stages,
            sink,
        } = self;
        stages.push(operator.name().to_string());
        Pipeline {
            build: Arc::new(move || operator.apply(build())),
            mode,
            stages,
            sink,
        }
    }

    /// Attaches an error-recovery layer to everything piped so far.
    ///
    /// The handler sees each failure that reaches this layer together with a
    /// [`RecoveryContext`]. Returning `Ok(())` skips the failed element, or
    /// substitutes it when the handler called [`RecoveryContext::emit`].
    /// Returning an error passes that error on to outer layers.
    #[must_use]
    pub fn catch<H>(self, handler: H) -> Self
    where
        T: Clone,
        H: Fn(FlowError, &mut RecoveryContext<T>) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        self.pipe(catch_error(handler))
    }

    /// Converts the pipeline to the asynchronous mode.
    #[must_use]
    pub fn into_async(self) -> Self {
        let mut pipeline = self.pipe(to_async());
        pipeline.mode = Some(Mode::Async);
        pipeline
    }

    /// Sends this pipeline's lifecycle events to `sink` instead of the global sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the mode, or `None` when it is only known after the first pull.
    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Starts a new pass.
    #[must_use]
    pub fn iter(&self) -> PipelineCursor<T> {
        PipelineCursor::new(Arc::clone(&self.build), self.sink.clone(), self.stages.len())
    }

    /// Starts a new pass driven as a stream.
    pub fn stream(&self) -> impl FusedStream<Item = Result<T, FlowError>> + Send {
        self.iter().into_stream()
    }

    /// Returns the first element of a new synchronous pass.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first pull.
    pub fn first(&self) -> Result<Option<T>, FlowError> {
        self.iter().next().transpose()
    }

    /// Returns the first element of a new asynchronous pass.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first pull.
    pub async fn first_async(&self) -> Result<Option<T>, FlowError> {
        self.iter().next_async().await.transpose()
    }

    /// Drains a new synchronous pass.
    ///
    /// # Errors
    ///
    /// Returns the first unrecovered failure.
    pub fn collect_sync(&self) -> Result<Vec<T>, FlowError> {
        self.iter().collect()
    }

    /// Drains a new asynchronous pass.
    ///
    /// # Errors
    ///
    /// Returns the first unrecovered failure.
    pub async fn collect_async(&self) -> Result<Vec<T>, FlowError> {
        let mut cursor = self.iter();
        let mut values = Vec::new();
        while let Some(pull) = cursor.next_async().await {
            values.push(pull?);
        }
        Ok(values)
    }
}

impl<'a, T: Send + 'static> IntoIterator for &'a Pipeline<T> {
    type Item = Result<T, FlowError>;
    type IntoIter = PipelineCursor<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::map;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_sync_rejects_stream_source_immediately() {
        let source = Source::stream_with(|| futures::stream::iter(vec![1]));
        let err = Pipeline::new_sync(source).unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_construction_is_lazy() {
        let pulls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&pulls);
        let pipeline = Pipeline::new(Source::from_next(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            crate::source::Pulled::value(1)
        }))
        .pipe(map(|value: i32, _, _| value));

        let _cursor = pipeline.iter();
        assert_eq!(pulls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stage_names_and_mode() {
        let pipeline = Pipeline::from_items(vec![1, 2])
            .pipe(map(|value: i32, _, _| value + 1))
            .catch(|error, _ctx| Err(error));
        assert_eq!(pipeline.stages(), &["map".to_string(), "catch".to_string()]);
        assert_eq!(pipeline.mode(), Some(Mode::Sync));
        assert_eq!(pipeline.clone().into_async().mode(), Some(Mode::Async));
    }

    #[test]
    fn test_first_and_reiteration() {
        let pipeline = Pipeline::from_items(vec![5, 6, 7]);
        assert_eq!(pipeline.first().unwrap(), Some(5));
        assert_eq!(pipeline.collect_sync().unwrap(), vec![5, 6, 7]);

        let mut total = 0;
        for value in &pipeline {
            total += value.unwrap();
        }
        assert_eq!(total, 18);
    }

    #[test]
    fn test_first_of_empty_pipeline() {
        let pipeline = Pipeline::from_items(Vec::<i32>::new());
        assert_eq!(pipeline.first().unwrap(), None);
    }

    #[tokio::test]
    async fn test_into_async_and_first_async() {
        let pipeline = Pipeline::from_items(vec![3, 4]).into_async();
        assert_eq!(pipeline.first_async().await.unwrap(), Some(3));
        assert_eq!(pipeline.collect_async().await.unwrap(), vec![3, 4]);
    }
}
