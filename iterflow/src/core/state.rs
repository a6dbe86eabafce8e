//! Shared state container for per-element callbacks.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Mutable state owned by one stage instance for one iteration pass.
///
/// Callbacks receive the same container on every invocation and keep memory
/// across elements by storing typed slots in it. A new pass gets a new
/// container; it is never reset in the middle of a pass.
#[derive(Default)]
pub struct IterationState {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl IterationState {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot of type `S`, if present.
    #[must_use]
    pub fn get<S: Any + Send>(&self) -> Option<&S> {
        self.slots
            .get(&TypeId::of::<S>())
            .and_then(|slot| slot.downcast_ref::<S>())
    }

    /// Returns the slot of type `S` mutably, if present.
    pub fn get_mut<S: Any + Send>(&mut self) -> Option<&mut S> {
        self.slots
            .get_mut(&TypeId::of::<S>())
            .and_then(|slot| slot.downcast_mut::<S>())
    }

    /// Returns the slot of type `S`, inserting its default first if absent.
    pub fn get_or_default<S: Any + Send + Default>(&mut self) -> &mut S {
        self.get_or_insert_with(S::default)
    }

    /// Returns the slot of type `S`, inserting `init()` first if absent.
    pub fn get_or_insert_with<S, F>(&mut self, init: F) -> &mut S
    where
        S: Any + Send,
        F: FnOnce() -> S,
    {
        let slot = self
            .slots
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Box::new(init()));
        match slot.downcast_mut::<S>() {
            Some(value) => value,
            // The map is keyed by the slot's own TypeId.
            None => unreachable!("slot type does not match its key"),
        }
    }

    /// Stores a slot, returning the previous value of that type.
    pub fn insert<S: Any + Send>(&mut self, value: S) -> Option<S> {
        self.slots
            .insert(TypeId::of::<S>(), Box::new(value))
            .and_then(|old| old.downcast::<S>().ok())
            .map(|old| *old)
    }

    /// Removes the slot of type `S`.
    pub fn remove<S: Any + Send>(&mut self) -> Option<S> {
        self.slots
            .remove(&TypeId::of::<S>())
            .and_then(|old| old.downcast::<S>().ok())
            .map(|old| *old)
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when no slot is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterationState")
            .field("slots", &self.slots.len())
            .finish()
    }
}
