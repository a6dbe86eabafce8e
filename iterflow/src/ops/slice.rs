//! Count-based slicing operators.

use crate::stages::{Directive, Feed, Kernel, KernelOperator};

struct Take {
    remaining: usize,
}

impl<T> Kernel<T, T> for Take {
    fn resume(&mut self, feed: Feed<T>) -> Directive<T> {
        match feed {
            // Stop without pulling once the quota is met.
            Feed::Resume if self.remaining == 0 => Directive::Done,
            Feed::Resume => Directive::Pull,
            Feed::Item(value) => {
                self.remaining -= 1;
                Directive::Emit(value)
            }
            Feed::Error(error) => Directive::Fail(error),
            Feed::End => Directive::Done,
        }
    }
}

struct Skip {
    remaining: usize,
}

impl<T> Kernel<T, T> for Skip {
    fn resume(&mut self, feed: Feed<T>) -> Directive<T> {
        match feed {
            Feed::Resume => Directive::Pull,
            Feed::Item(_) if self.remaining > 0 => {
                self.remaining -= 1;
                Directive::Pull
            }
            Feed::Item(value) => Directive::Emit(value),
            Feed::Error(error) => Directive::Fail(error),
            Feed::End => Directive::Done,
        }
    }
}

/// Emits at most `count` elements.
#[must_use]
pub fn take<T: Send + 'static>(count: usize) -> KernelOperator<T, T> {
    KernelOperator::new("take", move || Take { remaining: count })
}

/// Drops the first `count` elements.
#[must_use]
pub fn skip<T: Send + 'static>(count: usize) -> KernelOperator<T, T> {
    KernelOperator::new("skip", move || Skip { remaining: count })
}
