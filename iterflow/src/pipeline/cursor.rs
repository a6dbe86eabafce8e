//! A single pass over a pipeline.

use super::builder::Build;
use crate::core::{Cursor, Mode, Pull};
use crate::errors::FlowError;
use crate::events::{get_event_sink, pass_payload, EventSink};
use futures::stream::{FusedStream, StreamExt};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

enum State<T> {
    /// Nothing has been pulled; the stage chain is not built yet.
    Pending(Build<T>),
    Running(Cursor<T>),
    Finished,
}

/// The outermost cursor of one pass.
///
/// Builds the stage chain on the first pull and treats the first unrecovered
/// failure as terminal: once it has been handed out, every later pull reports
/// completion.
pub struct PipelineCursor<T> {
    state: State<T>,
    run_id: Uuid,
    sink: Arc<dyn EventSink>,
    stage_count: usize,
    emitted: usize,
    started_at: Option<Instant>,
}

impl<T> fmt::Debug for PipelineCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Running(_) => "running",
            State::Finished => "finished",
        };
        f.debug_struct("PipelineCursor")
            .field("run_id", &self.run_id)
            .field("state", &state)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> PipelineCursor<T> {
    pub(crate) fn new(build: Build<T>, sink: Option<Arc<dyn EventSink>>, stage_count: usize) -> Self {
        Self {
            state: State::Pending(build),
            run_id: Uuid::new_v4(),
            sink: sink.unwrap_or_else(get_event_sink),
            stage_count,
            emitted: 0,
            started_at: None,
        }
    }

    /// Returns the identifier of this pass.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the mode, or `None` before the first pull.
    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        match &self.state {
            State::Running(cursor) => Some(cursor.mode()),
            _ => None,
        }
    }

    /// Returns whether the pass has reported completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Pulls the next element through the asynchronous protocol.
    pub async fn next_async(&mut self) -> Pull<T> {
        let run_id = self.run_id;
        let pull = match self.start() {
            None => return None,
            Some(Cursor::Async(cursor)) => cursor.next().await,
            Some(Cursor::Sync(_)) => Some(Err(mismatch(run_id, Mode::Sync, Mode::Async))),
        };
        self.settle(pull)
    }

    /// Converts the pass into a stream of elements.
    ///
    /// The stream is fused: once it has ended, every later poll reports the end.
    pub fn into_stream(self) -> impl FusedStream<Item = Result<T, FlowError>> + Send {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next_async().await.map(|pull| (pull, cursor))
        })
        .fuse()
    }

    fn next_sync(&mut self) -> Pull<T> {
        let run_id = self.run_id;
        let pull = match self.start() {
            None => return None,
            Some(Cursor::Sync(cursor)) => cursor.next(),
            Some(Cursor::Async(_)) => Some(Err(mismatch(run_id, Mode::Async, Mode::Sync))),
        };
        self.settle(pull)
    }

    fn start(&mut self) -> Option<&mut Cursor<T>> {
        if let State::Pending(build) = &self.state {
            let cursor = build();
            debug!(
                run_id = %self.run_id,
                mode = %cursor.mode(),
                stages = self.stage_count,
                "Pipeline pass started"
            );
            self.sink.try_emit(
                "pipeline.started",
                Some(pass_payload(
                    self.run_id,
                    json!({ "mode": cursor.mode(), "stage_count": self.stage_count }),
                )),
            );
            self.started_at = Some(Instant::now());
            self.state = State::Running(cursor);
        }
        match &mut self.state {
            State::Running(cursor) => Some(cursor),
            _ => None,
        }
    }

    fn settle(&mut self, pull: Pull<T>) -> Pull<T> {
        match &pull {
            Some(Ok(_)) => self.emitted += 1,
            Some(Err(error)) => {
                self.state = State::Finished;
                warn!(run_id = %self.run_id, error = %error, "Pipeline pass failed");
                self.sink.try_emit(
                    "pipeline.failed",
                    Some(pass_payload(
                        self.run_id,
                        json!({
                            "emitted": self.emitted,
                            "duration_ms": self.elapsed_ms(),
                            "error": error.to_dict(),
                        }),
                    )),
                );
            }
            None => {
                self.state = State::Finished;
                debug!(run_id = %self.run_id, emitted = self.emitted, "Pipeline pass completed");
                self.sink.try_emit(
                    "pipeline.completed",
                    Some(pass_payload(
                        self.run_id,
                        json!({ "emitted": self.emitted, "duration_ms": self.elapsed_ms() }),
                    )),
                );
            }
        }
        pull
    }

    fn elapsed_ms(&self) -> u128 {
        self.started_at.map_or(0, |started| started.elapsed().as_millis())
    }
}

fn mismatch(run_id: Uuid, actual: Mode, attempted: Mode) -> FlowError {
    warn!(%run_id, %actual, %attempted, "Pipeline pulled through the wrong protocol");
    FlowError::ModeMismatch { actual, attempted }
}

impl<T: Send + 'static> Iterator for PipelineCursor<T> {
    type Item = Result<T, FlowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sync()
    }
}
