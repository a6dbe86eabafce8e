//! Everyday operators built on the kernel contract.
//!
//! Callbacks receive the element, its upstream index and the stage's
//! [`IterationState`](crate::core::IterationState).

mod slice;
mod transform;

pub use slice::{skip, take};
pub use transform::{filter, map, tap, try_map};
