//! Error recovery layers.

use crate::errors::FlowError;
use crate::stages::{Directive, Feed, Kernel, KernelOperator};
use std::sync::Arc;
use tracing::debug;

/// What a recovery handler knows about the failure it is handling.
#[derive(Debug, Clone)]
pub struct RecoveryContext<T> {
    /// Zero-based position of the failed element among everything this layer has seen.
    pub index: usize,
    /// The last element this layer let through or substituted.
    pub last_value: Option<T>,
    /// Consecutive failures immediately before this one.
    pub repeats: usize,
    replacement: Option<T>,
}

impl<T> RecoveryContext<T> {
    fn new(index: usize, last_value: Option<T>, repeats: usize) -> Self {
        Self {
            index,
            last_value,
            repeats,
            replacement: None,
        }
    }

    /// Substitutes `value` for the failed element.
    ///
    /// Calling it again replaces the earlier substitute.
    pub fn emit(&mut self, value: T) {
        self.replacement = Some(value);
    }

    /// Returns whether a substitute has been emitted.
    #[must_use]
    pub fn has_emitted(&self) -> bool {
        self.replacement.is_some()
    }
}

struct Recovery<T, H> {
    handler: Arc<H>,
    index: usize,
    last_value: Option<T>,
    repeats: usize,
}

impl<T, H> Recovery<T, H> {
    fn pass(&mut self, value: T) -> Directive<T>
    where
        T: Clone,
    {
        self.repeats = 0;
        self.last_value = Some(value.clone());
        Directive::Emit(value)
    }
}

impl<T, H> Kernel<T, T> for Recovery<T, H>
where
    T: Clone + Send,
    H: Fn(FlowError, &mut RecoveryContext<T>) -> Result<(), FlowError> + Send + Sync,
{
    fn resume(&mut self, feed: Feed<T>) -> Directive<T> {
        match feed {
            Feed::Resume => Directive::Pull,
            Feed::Item(value) => {
                self.index += 1;
                self.pass(value)
            }
            Feed::Error(error) => {
                let mut ctx = RecoveryContext::new(self.index, self.last_value.clone(), self.repeats);
                self.index += 1;
                debug!(index = ctx.index, repeats = ctx.repeats, error = %error, "Recovering failed element");

                match (self.handler)(error, &mut ctx) {
                    Ok(()) => match ctx.replacement {
                        Some(value) => self.pass(value),
                        None => {
                            self.repeats += 1;
                            Directive::Pull
                        }
                    },
                    Err(error) => {
                        self.repeats += 1;
                        Directive::Fail(error)
                    }
                }
            }
            Feed::End => Directive::Done,
        }
    }
}

/// Creates a recovery layer around everything upstream of it.
pub fn catch_error<T, H>(handler: H) -> KernelOperator<T, T>
where
    T: Clone + Send + 'static,
    H: Fn(FlowError, &mut RecoveryContext<T>) -> Result<(), FlowError> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    KernelOperator::new("catch", move || Recovery {
        handler: Arc::clone(&handler),
        index: 0,
        last_value: None,
        repeats: 0,
    })
}
