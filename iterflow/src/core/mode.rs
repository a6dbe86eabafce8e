//! Iteration mode enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a cursor completes its pulls.
///
/// The mode of a cursor is fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Each pull completes before it returns.
    Sync,
    /// Each pull returns a deferred completion.
    Async,
}

impl Mode {
    /// Returns true for the asynchronous mode.
    #[must_use]
    pub const fn is_async(self) -> bool {
        matches!(self, Self::Async)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "synchronous"),
            Self::Async => write!(f, "asynchronous"),
        }
    }
}
