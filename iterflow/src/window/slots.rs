//! The window cursor shared by the ordered and the racing window.

use super::{Capacity, Deferred};
use crate::core::{AsyncCursor, Cursor, Pull};
use crate::errors::FlowError;
use crate::stages::{async_only, Operator};
use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use futures::stream::{FuturesOrdered, FuturesUnordered};
use futures::{FutureExt, Stream, StreamExt};
use tracing::trace;

type Slot<T> = BoxFuture<'static, Result<T, FlowError>>;

/// In-flight slots of a window.
trait Slots<T>: Stream<Item = Result<T, FlowError>> + Unpin + Send + Default {
    fn admit(&mut self, slot: Slot<T>);
    fn in_flight(&self) -> usize;
}

/// Releases slots in admission order.
impl<T: Send> Slots<T> for FuturesOrdered<Slot<T>> {
    fn admit(&mut self, slot: Slot<T>) {
        self.push_back(slot);
    }

    fn in_flight(&self) -> usize {
        self.len()
    }
}

/// Releases slots as they settle.
impl<T: Send> Slots<T> for FuturesUnordered<Slot<T>> {
    fn admit(&mut self, slot: Slot<T>) {
        self.push(slot);
    }

    fn in_flight(&self) -> usize {
        self.len()
    }
}

type Upstream<T> = Box<dyn AsyncCursor<Deferred<T>>>;

/// An upstream pull in progress. It owns the upstream until it resolves, so
/// it survives being raced against the slots.
type PendingPull<T> = BoxFuture<'static, (Upstream<T>, Pull<Deferred<T>>)>;

struct WindowCursor<T, Q> {
    upstream: Option<Upstream<T>>,
    pulling: Option<PendingPull<T>>,
    slots: Q,
    capacity: Capacity,
    position: usize,
    exhausted: bool,
}

impl<T: Send + 'static, Q: Slots<T>> WindowCursor<T, Q> {
    fn new(upstream: Upstream<T>, capacity: Capacity) -> Self {
        Self {
            upstream: Some(upstream),
            pulling: None,
            slots: Q::default(),
            capacity,
            position: 0,
            exhausted: false,
        }
    }

    /// Starts the next upstream pull if the window has room for its result.
    fn start_pull(&mut self) {
        if self.pulling.is_some()
            || self.exhausted
            || !self.capacity.admits(self.slots.in_flight())
        {
            return;
        }
        if let Some(mut upstream) = self.upstream.take() {
            self.pulling = Some(
                async move {
                    let pull = upstream.next().await;
                    (upstream, pull)
                }
                .boxed(),
            );
        }
    }

    fn admit(&mut self, upstream: Upstream<T>, pull: Pull<Deferred<T>>) {
        self.upstream = Some(upstream);
        self.pulling = None;
        let slot = match pull {
            None => {
                self.exhausted = true;
                return;
            }
            Some(Ok(deferred)) => deferred.into_future(),
            // A failed pull still takes a slot, settled as its error.
            Some(Err(error)) => future::ready(Err(error)).boxed(),
        };
        trace!(
            position = self.position,
            in_flight = self.slots.in_flight() + 1,
            capacity = %self.capacity,
            "Admitted window slot"
        );
        self.position += 1;
        self.slots.admit(slot);
    }
}

#[async_trait]
impl<T: Send + 'static, Q: Slots<T>> AsyncCursor<T> for WindowCursor<T, Q> {
    async fn next(&mut self) -> Pull<T> {
        loop {
            self.start_pull();
            let Some(pulling) = self.pulling.as_mut() else {
                // Full or exhausted: only a settling slot makes progress.
                return self.slots.next().await;
            };
            if self.slots.in_flight() == 0 {
                let (upstream, pull) = pulling.await;
                self.admit(upstream, pull);
                continue;
            }
            // Slots keep running while upstream is pulled; whichever is ready
            // first wins, and an unfinished pull is resumed on the next call.
            tokio::select! {
                biased;
                (upstream, pull) = pulling => self.admit(upstream, pull),
                settled = self.slots.next() => return settled,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Ordered,
    Settled,
}

/// A bounded concurrency window over deferred values.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    release: Release,
    capacity: Capacity,
}

impl Window {
    /// Returns the window capacity.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Builds an ordered window from a textual capacity.
    pub fn try_cache(text: &str) -> Result<Self, FlowError> {
        Capacity::parse_for("wait_cache", text).map(wait_cache)
    }

    /// Builds a racing window from a textual capacity.
    pub fn try_race(text: &str) -> Result<Self, FlowError> {
        Capacity::parse_for("wait_race", text).map(wait_race)
    }

    fn label(&self) -> &'static str {
        match self.release {
            Release::Ordered => "wait_cache",
            Release::Settled => "wait_race",
        }
    }
}

impl<T: Send + 'static> Operator<Deferred<T>, T> for Window {
    fn name(&self) -> &str {
        self.label()
    }

    fn apply(&self, upstream: Cursor<Deferred<T>>) -> Cursor<T> {
        let Self { release, capacity } = *self;
        async_only(self.label(), upstream, move |upstream| -> Box<dyn AsyncCursor<T>> {
            match release {
                Release::Ordered => {
                    Box::new(WindowCursor::<T, FuturesOrdered<Slot<T>>>::new(upstream, capacity))
                }
                Release::Settled => {
                    Box::new(WindowCursor::<T, FuturesUnordered<Slot<T>>>::new(upstream, capacity))
                }
            }
        })
    }
}

/// Keeps up to `capacity` values in flight and releases them in upstream order.
pub fn wait_cache(capacity: impl Into<Capacity>) -> Window {
    Window {
        release: Release::Ordered,
        capacity: capacity.into(),
    }
}

/// Keeps up to `capacity` values in flight and releases them as they settle.
pub fn wait_race(capacity: impl Into<Capacity>) -> Window {
    Window {
        release: Release::Settled,
        capacity: capacity.into(),
    }
}

/// Awaits each value before pulling the next one.
#[must_use]
pub fn wait() -> Window {
    wait_cache(1)
}
