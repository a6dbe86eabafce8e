//! Pipeline composition and execution.
//!
//! This module provides:
//! - The lazy, re-iterable [`Pipeline`]
//! - The per-pass [`PipelineCursor`]
//! - Error recovery layers
//! - Retry stages with backoff

mod builder;
mod cursor;
mod recovery;
mod retry;


pub use builder::Pipeline;
pub use cursor::PipelineCursor;
pub use recovery::{catch_error, RecoveryContext};
pub use retry::{
    retry, retry_if, retry_when, retry_with_backoff, AsyncRetry, BackoffState, BackoffStrategy,
    JitterStrategy, RetryAttempt, RetryConfig,
};
