//! The operator contract.
//!
//! Every stage of a pipeline is an [`Operator`]: given the upstream cursor it
//! builds the downstream cursor, in the same mode. Mode-transparent stages are
//! written as [`Kernel`]s and work in both modes; asynchronous-only stages are
//! built with [`async_only`], which turns a synchronous upstream into a cursor
//! that fails on its first pull.

mod async_only;
mod kernel;

pub use async_only::{async_only, to_async, AsyncRequired, ToAsync};
pub use kernel::{Directive, Feed, Kernel, KernelOperator};

use crate::core::Cursor;
use std::sync::Arc;

/// One transformation stage of a pipeline.
///
/// `apply` is called once per pass and must build fresh per-pass state.
/// It never fails; misuse surfaces on the first pull instead.
pub trait Operator<In, Out>: Send + Sync {
    /// Returns the operator name used in errors and events.
    fn name(&self) -> &str;

    /// Builds the downstream cursor.
    fn apply(&self, upstream: Cursor<In>) -> Cursor<Out>;
}

impl<In, Out, O> Operator<In, Out> for Arc<O>
where
    O: Operator<In, Out> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, upstream: Cursor<In>) -> Cursor<Out> {
        (**self).apply(upstream)
    }
}
