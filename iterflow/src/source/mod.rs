//! Iteration sources and their normalization into cursors.
//!
//! A [`Source`] is classified once, when it is built, into a closed set of
//! shapes. Normalizing a source produces a fresh cursor for one pass, so a
//! pipeline can be iterated again without sharing state between passes.
//! The exception is [`Source::from_next`]: a bare `next` function is a cursor
//! already, and every pass continues from wherever it stopped.

use crate::core::{AsyncCursor, Cursor, IterCursor, Mode, Pull, StreamCursor, SyncCursor};
use crate::errors::FlowError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type BoxIter<T> = Box<dyn Iterator<Item = Result<T, FlowError>> + Send>;
type IterFactory<T> = Arc<dyn Fn() -> BoxIter<T> + Send + Sync>;
type StreamFactory<T> = Arc<dyn Fn() -> BoxStream<'static, Result<T, FlowError>> + Send + Sync>;
type NextFn<T> = Arc<Mutex<dyn FnMut() -> Pulled<T> + Send>>;
type ValueFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// The result of calling a bare `next` function.
pub enum Pulled<T> {
    /// The pull completed immediately.
    Ready(Pull<T>),
    /// The pull completes later.
    Deferred(BoxFuture<'static, Pull<T>>),
}

impl<T> Pulled<T> {
    /// An immediately available element.
    pub fn value(value: T) -> Self {
        Self::Ready(Some(Ok(value)))
    }

    /// An immediate failure.
    pub fn error(error: FlowError) -> Self {
        Self::Ready(Some(Err(error)))
    }

    /// Immediate completion.
    pub fn done() -> Self {
        Self::Ready(None)
    }

    /// A pull that completes when `future` does.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Pull<T>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }

    /// Returns the mode this result implies.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Ready(_) => Mode::Sync,
            Self::Deferred(_) => Mode::Async,
        }
    }
}

/// Anything a pipeline can iterate over.
pub enum Source<T> {
    /// A re-iterable synchronous sequence.
    Iter(IterFactory<T>),
    /// A re-iterable asynchronous sequence.
    Stream(StreamFactory<T>),
    /// A bare `next` function; its mode is inferred from its first result.
    Next(NextFn<T>),
    /// A single value treated as a one-element sequence.
    Value(ValueFactory<T>),
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Iter(f) => Self::Iter(Arc::clone(f)),
            Self::Stream(f) => Self::Stream(Arc::clone(f)),
            Self::Next(f) => Self::Next(Arc::clone(f)),
            Self::Value(f) => Self::Value(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Iter(_) => "Iter",
            Self::Stream(_) => "Stream",
            Self::Next(_) => "Next",
            Self::Value(_) => "Value",
        };
        f.debug_tuple("Source").field(&shape).finish()
    }
}

impl<T: Send + 'static> Source<T> {
    /// A collection cloned for every pass.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::Iter(Arc::new(move || -> BoxIter<T> {
            Box::new(items.clone().into_iter().map(Ok))
        }))
    }

    /// A fresh iterator per pass.
    pub fn iter_with<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::Iter(Arc::new(move || -> BoxIter<T> {
            Box::new(factory().into_iter().map(Ok))
        }))
    }

    /// A fresh fallible iterator per pass.
    pub fn try_iter_with<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<T, FlowError>>,
        I::IntoIter: Send + 'static,
    {
        Self::Iter(Arc::new(move || -> BoxIter<T> { Box::new(factory().into_iter()) }))
    }

    /// A fresh stream per pass.
    pub fn stream_with<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = T> + Send + 'static,
    {
        Self::Stream(Arc::new(
            move || -> BoxStream<'static, Result<T, FlowError>> { factory().map(Ok).boxed() },
        ))
    }

    /// A fresh fallible stream per pass.
    pub fn try_stream_with<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T, FlowError>> + Send + 'static,
    {
        Self::Stream(Arc::new(
            move || -> BoxStream<'static, Result<T, FlowError>> { factory().boxed() },
        ))
    }

    /// A bare `next` function shared by every pass.
    pub fn from_next<F>(next: F) -> Self
    where
        F: FnMut() -> Pulled<T> + Send + 'static,
    {
        Self::Next(Arc::new(Mutex::new(next)))
    }

    /// A single value.
    pub fn once(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::Value(Arc::new(move || value.clone()))
    }

    /// Returns the mode, or `None` when it is only known after the first pull.
    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        match self {
            Self::Iter(_) | Self::Value(_) => Some(Mode::Sync),
            Self::Stream(_) => Some(Mode::Async),
            Self::Next(_) => None,
        }
    }

    /// Produces the cursor for one pass.
    ///
    /// A `next` source is called once here to learn its mode; the result is
    /// buffered and returned by the cursor's first pull.
    pub fn normalize(&self) -> Cursor<T> {
        match self {
            Self::Iter(factory) => Cursor::sync(IterCursor::new(factory())),
            Self::Stream(factory) => Cursor::from_async(StreamCursor::new(factory())),
            Self::Value(factory) => {
                let factory = Arc::clone(factory);
                Cursor::sync(IterCursor::new(std::iter::once_with(move || {
                    Ok::<T, FlowError>(factory())
                })))
            }
            Self::Next(next) => {
                let first = {
                    let mut call = next.lock();
                    (&mut *call)()
                };
                match first {
                    Pulled::Ready(pull) => Cursor::sync(NextCursor {
                        next: Arc::clone(next),
                        buffered: Some(pull),
                        done: false,
                    }),
                    Pulled::Deferred(future) => Cursor::from_async(AsyncNextCursor {
                        next: Arc::clone(next),
                        buffered: Some(future),
                        done: false,
                    }),
                }
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> From<Vec<T>> for Source<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_items(items)
    }
}

/// A `next` source inferred synchronous.
struct NextCursor<T> {
    next: NextFn<T>,
    buffered: Option<Pull<T>>,
    done: bool,
}

impl<T: Send> SyncCursor<T> for NextCursor<T> {
    fn next(&mut self) -> Pull<T> {
        if self.done {
            return None;
        }
        let pull = match self.buffered.take() {
            Some(pull) => pull,
            None => {
                let pulled = {
                    let mut call = self.next.lock();
                    (&mut *call)()
                };
                match pulled {
                    Pulled::Ready(pull) => pull,
                    Pulled::Deferred(_) => Some(Err(FlowError::usage(
                        "next",
                        "deferred result",
                        "the source was inferred synchronous from its first result",
                    ))),
                }
            }
        };
        if pull.is_none() {
            self.done = true;
        }
        pull
    }
}

/// A `next` source inferred asynchronous.
struct AsyncNextCursor<T> {
    next: NextFn<T>,
    buffered: Option<BoxFuture<'static, Pull<T>>>,
    done: bool,
}

#[async_trait]
impl<T: Send> AsyncCursor<T> for AsyncNextCursor<T> {
    async fn next(&mut self) -> Pull<T> {
        if self.done {
            return None;
        }
        let pull = match self.buffered.take() {
            Some(future) => future.await,
            None => {
                let pulled = {
                    let mut call = self.next.lock();
                    (&mut *call)()
                };
                // A ready result is an already-settled pull.
                match pulled {
                    Pulled::Ready(pull) => pull,
                    Pulled::Deferred(future) => future.await,
                }
            }
        };
        if pull.is_none() {
            self.done = true;
        }
        pull
    }
}
