//! Testing utilities for iterflow pipelines.
//!
//! This module provides:
//! - Sources that fail on demand
//! - A probe counting values in flight
//! - Assertions on cursor completion
//! - Test logging setup

mod assertions;
mod fixtures;

pub use assertions::{assert_stays_done, assert_stays_done_async};
pub use fixtures::{init_test_tracing, FlakySource, InFlightProbe};
