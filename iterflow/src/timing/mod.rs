//! Time-based stages.
//!
//! Every stage here suspends between pulls, so they are asynchronous-only.
//! The one exception is a disabled [`timeout`], which is an identity stage
//! in both modes.

mod delay;
mod throttle;
mod timeout;

pub use delay::{delay, delay_by, Delay};
pub use throttle::{throttle, Throttle};
pub use timeout::{timeout, timeout_with, Timeout};
