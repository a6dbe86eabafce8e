//! Bounded concurrency windows.
//!
//! A window pulls up to `capacity` deferred values ahead of the consumer and
//! keeps them in flight together. [`wait_cache`] releases them in upstream
//! order, [`wait_race`] in the order they settle. Both drain every slot before
//! reporting completion, and both are asynchronous-only.

mod slots;

pub use slots::{wait, wait_cache, wait_race, Window};

use crate::errors::FlowError;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// A value that may still be in flight.
///
/// A ready value occupies a window slot exactly like a pending one.
pub enum Deferred<T> {
    /// Already settled.
    Ready(T),
    /// Settles when the future completes.
    Pending(BoxFuture<'static, Result<T, FlowError>>),
}

impl<T: Send + 'static> Deferred<T> {
    /// Creates a settled value.
    pub fn ready(value: T) -> Self {
        Self::Ready(value)
    }

    /// Creates a value settled by `future`.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, FlowError>> + Send + 'static,
    {
        Self::Pending(future.boxed())
    }

    /// Returns whether the value has already settled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Converts into a future resolving to the value.
    pub fn into_future(self) -> BoxFuture<'static, Result<T, FlowError>> {
        match self {
            Self::Ready(value) => future::ready(Ok(value)).boxed(),
            Self::Pending(future) => future,
        }
    }
}

impl<T> From<T> for Deferred<T> {
    fn from(value: T) -> Self {
        Self::Ready(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// How many deferred values a window keeps in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// At most this many.
    Bounded(NonZeroUsize),
    /// No limit: the whole upstream is pulled ahead.
    Unbounded,
}

impl Capacity {
    /// Returns the slot limit, or `None` when unbounded.
    #[must_use]
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Bounded(limit) => Some(limit.get()),
            Self::Unbounded => None,
        }
    }

    /// Returns whether `in_flight` slots leave room for another.
    #[must_use]
    pub fn admits(self, in_flight: usize) -> bool {
        self.limit().map_or(true, |limit| in_flight < limit)
    }
}

impl From<usize> for Capacity {
    fn from(capacity: usize) -> Self {
        NonZeroUsize::new(capacity).map_or(Self::Unbounded, Self::Bounded)
    }
}

impl From<NonZeroUsize> for Capacity {
    fn from(capacity: NonZeroUsize) -> Self {
        Self::Bounded(capacity)
    }
}

impl Capacity {
    /// Parses the capacity of `operator`, naming both in the usage error.
    pub fn parse_for(operator: &str, text: &str) -> Result<Self, FlowError> {
        Self::parse(&format!("{operator} capacity"), text)
    }

    fn parse(parameter: &str, text: &str) -> Result<Self, FlowError> {
        let capacity: i64 = text
            .trim()
            .parse()
            .map_err(|_| FlowError::usage(parameter, text, "expected an integer"))?;
        // Zero and negative capacities disable windowing.
        Ok(usize::try_from(capacity).map_or(Self::Unbounded, Self::from))
    }
}

impl FromStr for Capacity {
    type Err = FlowError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse("capacity", text)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(limit) => write!(f, "{limit}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}
