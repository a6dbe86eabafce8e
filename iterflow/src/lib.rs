//! # Iterflow
//!
//! Lazy sequence pipelines that run the same operators over synchronous and
//! asynchronous sources.
//!
//! Iterflow provides a structured approach to building pull-based pipelines
//! with support for:
//!
//! - **Dual-mode execution**: one operator definition serves iterators and streams
//! - **Error recovery**: skip or substitute failed elements with `catch` layers
//! - **Retry**: re-pull failed elements, with optional backoff and jitter
//! - **Bounded concurrency**: keep a window of deferred values in flight
//! - **Event-driven observability**: lifecycle events for every pass
//!
//! ## Quick Start
//!
//! ```rust
//! use iterflow::prelude::*;
//!
//! let pipeline = Pipeline::from_items(vec![1, 2, 3, 4, 5])
//!     .pipe(try_map(|value: i32, _, _| {
//!         if value == 3 {
//!             Err(FlowError::msg("unlucky"))
//!         } else {
//!             Ok(value)
//!         }
//!     }))
//!     .catch(|_error, ctx: &mut RecoveryContext<i32>| {
//!         let last = ctx.last_value.unwrap_or_default();
//!         ctx.emit(last * 10);
//!         Ok(())
//!     });
//!
//! assert_eq!(pipeline.collect_sync().unwrap(), vec![1, 2, 20, 4, 5]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod events;
pub mod ops;
pub mod pipeline;
pub mod source;
pub mod stages;
pub mod testing;
pub mod timing;
pub mod window;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{AsyncCursor, Cursor, IterationState, Mode, Pull, SyncCursor};
    pub use crate::errors::{FlowError, FlowResult};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::ops::{filter, map, skip, take, tap, try_map};
    pub use crate::pipeline::{
        retry, retry_if, retry_when, retry_with_backoff, BackoffStrategy, JitterStrategy,
        Pipeline, PipelineCursor, RecoveryContext, RetryAttempt, RetryConfig,
    };
    pub use crate::source::{Pulled, Source};
    pub use crate::stages::{to_async, Operator};
    pub use crate::timing::{delay, delay_by, throttle, timeout, timeout_with};
    pub use crate::window::{wait, wait_cache, wait_race, Capacity, Deferred};
}
