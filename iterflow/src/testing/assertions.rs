//! Assertions on cursor completion.

use crate::errors::FlowError;
use crate::pipeline::PipelineCursor;
use std::fmt::Debug;

/// Asserts that a cursor reports completion, and keeps reporting it.
pub fn assert_stays_done<T, I>(cursor: &mut I)
where
    T: Debug,
    I: Iterator<Item = Result<T, FlowError>>,
{
    for pull in 0..3 {
        let next = cursor.next();
        assert!(next.is_none(), "pull {pull} after completion produced {next:?}");
    }
}

/// Asserts that an asynchronous pass reports completion, and keeps reporting it.
pub async fn assert_stays_done_async<T>(cursor: &mut PipelineCursor<T>)
where
    T: Debug + Send + 'static,
{
    for pull in 0..3 {
        let next = cursor.next_async().await;
        assert!(next.is_none(), "pull {pull} after completion produced {next:?}");
    }
    assert!(cursor.is_finished());
}
