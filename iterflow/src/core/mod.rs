//! Core model types for iterflow.
//!
//! This module contains the fundamental types every stage is built on:
//! - The iteration mode enum
//! - Sync and async cursors and their closed wrapper
//! - The per-stage shared state container

mod cursor;
mod mode;
mod state;

pub use cursor::{AsyncCursor, Cursor, IterCursor, Pull, StreamCursor, SyncCursor};
pub use mode::Mode;
pub use state::IterationState;
