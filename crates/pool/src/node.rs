//! Pooled nodes and their guard words

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

/// Head guard of a node handed out by `alloc`.
pub(crate) const GUARD_IN_USE: u32 = 0xA110_CA7E;
/// Head guard of a node sitting in the idle list.
pub(crate) const GUARD_FREE: u32 = 0xF4EE_B10C;
/// Tail guard written after the element; must never change.
pub(crate) const GUARD_TAIL: u32 = 0x7A11_5AFE;

/// Interpretation of a node's head guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Handed out by `alloc`
    InUse,
    /// Returned to the idle list
    Free,
    /// Neither; the guard was overwritten
    Corrupt(u32),
}

impl GuardState {
    pub(crate) fn from_word(word: u32) -> Self {
        match word {
            GUARD_IN_USE => GuardState::InUse,
            GUARD_FREE => GuardState::Free,
            other => GuardState::Corrupt(other),
        }
    }
}

pub(crate) struct NodeSlot<T> {
    pub(crate) id: u64,
    pub(crate) pool_id: u64,
    pub(crate) guard: u32,
    pub(crate) value: T,
    pub(crate) tail_guard: u32,
    pub(crate) idle_since: Option<Instant>,
}

impl<T: Default> NodeSlot<T> {
    pub(crate) fn fresh(id: u64, pool_id: u64) -> Box<Self> {
        Box::new(NodeSlot {
            id,
            pool_id,
            guard: GUARD_FREE,
            value: T::default(),
            tail_guard: GUARD_TAIL,
            idle_since: Some(Instant::now()),
        })
    }
}

/// A node owned by the caller between `alloc` and `free`.
///
/// Dereferences to the pooled element. Values are not reset between uses;
/// callers overwrite what they need.
pub struct PoolNode<T> {
    pub(crate) slot: Box<NodeSlot<T>>,
}

impl<T> PoolNode<T> {
    /// Node id, unique within its pool
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Current state of the head guard
    pub fn guard_state(&self) -> GuardState {
        GuardState::from_word(self.slot.guard)
    }

    /// True if the tail guard is intact
    pub fn tail_intact(&self) -> bool {
        self.slot.tail_guard == GUARD_TAIL
    }
}

impl<T> Deref for PoolNode<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.value
    }
}

impl<T> DerefMut for PoolNode<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot.value
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolNode")
            .field("id", &self.slot.id)
            .field("guard", &self.guard_state())
            .field("value", &self.slot.value)
            .finish()
    }
}
