//! Mode-transparent stage kernels and their two drivers.
//!
//! A kernel never touches a cursor. It is resumed with what happened upstream
//! and answers with what it wants next, so the same kernel runs unchanged under
//! the synchronous and the asynchronous driver.

use super::Operator;
use crate::core::{AsyncCursor, Cursor, Pull, SyncCursor};
use crate::errors::FlowError;
use async_trait::async_trait;
use std::sync::Arc;

/// What the driver hands a kernel when resuming it.
#[derive(Debug)]
pub enum Feed<In> {
    /// Downstream asked for the next element; nothing new arrived.
    Resume,
    /// Upstream produced an element.
    Item(In),
    /// Upstream failed to produce an element. Upstream stays pullable.
    Error(FlowError),
    /// Upstream is exhausted.
    End,
}

impl<In> Feed<In> {
    fn from_pull(pull: Pull<In>) -> Self {
        match pull {
            Some(Ok(value)) => Self::Item(value),
            Some(Err(error)) => Self::Error(error),
            None => Self::End,
        }
    }
}

/// What a kernel asks the driver to do next.
#[derive(Debug)]
pub enum Directive<Out> {
    /// Pull upstream once and resume with the outcome.
    Pull,
    /// Hand this element downstream.
    Emit(Out),
    /// Hand this failure downstream; the stage stays alive.
    Fail(FlowError),
    /// The stage is exhausted for good.
    Done,
}

/// A sans-IO state machine implementing one mode-transparent stage.
///
/// Kernels pull at most once per resumption, so a stage never advances
/// upstream more than once for each element it handles.
pub trait Kernel<In, Out>: Send {
    /// Advances the kernel.
    fn resume(&mut self, feed: Feed<In>) -> Directive<Out>;
}

type KernelFactory<In, Out> = Arc<dyn Fn() -> Box<dyn Kernel<In, Out>> + Send + Sync>;

/// An operator made of a kernel, built fresh for every pass.
pub struct KernelOperator<In, Out> {
    name: String,
    factory: KernelFactory<In, Out>,
}

impl<In, Out> KernelOperator<In, Out> {
    /// Creates an operator from a kernel factory.
    pub fn new<F, K>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> K + Send + Sync + 'static,
        K: Kernel<In, Out> + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move || -> Box<dyn Kernel<In, Out>> { Box::new(factory()) }),
        }
    }
}

impl<In, Out> Operator<In, Out> for KernelOperator<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, upstream: Cursor<In>) -> Cursor<Out> {
        let kernel = (self.factory)();
        match upstream {
            Cursor::Sync(upstream) => Cursor::sync(SyncDriver {
                upstream,
                kernel,
                done: false,
            }),
            Cursor::Async(upstream) => Cursor::from_async(AsyncDriver {
                upstream,
                kernel,
                done: false,
            }),
        }
    }
}

struct SyncDriver<In, Out> {
    upstream: Box<dyn SyncCursor<In>>,
    kernel: Box<dyn Kernel<In, Out>>,
    done: bool,
}

impl<In: Send, Out: Send> SyncCursor<Out> for SyncDriver<In, Out> {
    fn next(&mut self) -> Pull<Out> {
        if self.done {
            return None;
        }
        let mut feed = Feed::Resume;
        loop {
            match self.kernel.resume(feed) {
                Directive::Pull => feed = Feed::from_pull(self.upstream.next()),
                Directive::Emit(value) => return Some(Ok(value)),
                Directive::Fail(error) => return Some(Err(error)),
                Directive::Done => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

struct AsyncDriver<In, Out> {
    upstream: Box<dyn AsyncCursor<In>>,
    kernel: Box<dyn Kernel<In, Out>>,
    done: bool,
}

#[async_trait]
impl<In: Send, Out: Send> AsyncCursor<Out> for AsyncDriver<In, Out> {
    async fn next(&mut self) -> Pull<Out> {
        if self.done {
            return None;
        }
        let mut feed = Feed::Resume;
        loop {
            match self.kernel.resume(feed) {
                Directive::Pull => feed = Feed::from_pull(self.upstream.next().await),
                Directive::Emit(value) => return Some(Ok(value)),
                Directive::Fail(error) => return Some(Err(error)),
                Directive::Done => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
