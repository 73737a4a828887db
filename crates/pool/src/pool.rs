//! The object pool proper
//!
//! Idle nodes sit in a deque: the front holds the node that has been idle the
//! longest, the back the most recently freed one. `alloc` pops from the back,
//! `free` pushes to the back, and `purge` trims from the front.

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::node::{GuardState, NodeSlot, PoolNode, GUARD_FREE, GUARD_IN_USE, GUARD_TAIL};
use crate::reaper;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Size of `T` rounded up to a whole number of machine words.
pub fn element_size_of<T>() -> usize {
    let word = std::mem::size_of::<usize>();
    let raw = std::mem::size_of::<T>().max(1);
    (raw + word - 1) / word * word
}

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLifecycle {
    /// No reaper running
    Idle,
    /// Reaper thread is running
    Reaping,
    /// Destruction has begun; allocation fails
    Exiting,
}

/// Pool metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Pool name
    pub name: String,
    /// Element size, word aligned
    pub element_size: usize,
    /// Reserved node count
    pub min_count: usize,
    /// Nodes currently owned by the pool (idle + in use)
    pub total: usize,
    /// Nodes in the idle list
    pub idle: usize,
    /// Nodes handed out
    pub in_use: usize,
    /// Successful allocations since creation
    pub allocs: u64,
    /// Successful frees since creation
    pub frees: u64,
    /// Frees with an unrecognized head guard
    pub corruptions: u64,
    /// Frees with a damaged tail guard
    pub overruns: u64,
    /// Rejected double frees
    pub double_frees: u64,
    /// Nodes reclaimed by purge
    pub reaped: u64,
    /// Lifecycle state
    pub lifecycle: PoolLifecycle,
}

pub(crate) struct PoolState<T> {
    pub(crate) idle: VecDeque<Box<NodeSlot<T>>>,
    pub(crate) in_use: HashSet<u64>,
    pub(crate) total: usize,
    pub(crate) min_count: usize,
    pub(crate) lifecycle: PoolLifecycle,
    next_node_id: u64,
    allocs: u64,
    frees: u64,
    corruptions: u64,
    overruns: u64,
    double_frees: u64,
    reaped: u64,
}

impl<T: Default> PoolState<T> {
    fn fresh_slot(&mut self, pool_id: u64) -> Box<NodeSlot<T>> {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.total += 1;
        NodeSlot::fresh(id, pool_id)
    }

    fn push_fresh(&mut self, pool_id: u64) {
        let slot = self.fresh_slot(pool_id);
        self.idle.push_back(slot);
    }

    /// Drop idle nodes older than `ttl`, never going below `min_count`.
    pub(crate) fn purge_expired(&mut self, ttl: Duration, now: Instant) -> usize {
        let mut removed = 0;
        while self.total > self.min_count {
            let expired = match self.idle.front() {
                Some(slot) => slot
                    .idle_since
                    .map_or(true, |since| now.saturating_duration_since(since) >= ttl),
                None => false,
            };
            if !expired {
                break;
            }
            self.idle.pop_front();
            self.total -= 1;
            removed += 1;
        }
        self.reaped += removed as u64;
        removed
    }
}

pub(crate) struct PoolInner<T> {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) element_size: usize,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<T>>,
    pub(crate) reaper_wake: Condvar,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// A named pool of `T` nodes.
///
/// Cloning is cheap and shares the same pool. Pools are normally obtained
/// through a [`PoolRegistry`](crate::PoolRegistry), which owns their
/// lifetime.
pub struct ObjectPool<T> {
    pub(crate) inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default + Send + 'static> ObjectPool<T> {
    pub(crate) fn new(id: u64, name: &str, config: PoolConfig) -> Self {
        let mut state = PoolState {
            idle: VecDeque::with_capacity(config.min_count),
            in_use: HashSet::with_capacity(config.min_count),
            total: 0,
            min_count: config.min_count,
            lifecycle: PoolLifecycle::Idle,
            next_node_id: 0,
            allocs: 0,
            frees: 0,
            corruptions: 0,
            overruns: 0,
            double_frees: 0,
            reaped: 0,
        };
        for _ in 0..config.min_count {
            state.push_fresh(id);
        }

        let element_size = element_size_of::<T>();
        debug!(target: "lightbus::pool", pool = name, element_size, min = config.min_count, "Pool created");

        Self {
            inner: Arc::new(PoolInner {
                id,
                name: name.to_string(),
                element_size,
                config,
                state: Mutex::new(state),
                reaper_wake: Condvar::new(),
                reaper: Mutex::new(None),
            }),
        }
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Word-aligned element size
    pub fn element_size(&self) -> usize {
        self.inner.element_size
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> PoolLifecycle {
        self.inner.state.lock().lifecycle
    }

    /// Take a node, reusing the most recently freed idle node when there is
    /// one. Growing past `min_count` starts the reaper.
    pub fn alloc(&self) -> Result<PoolNode<T>> {
        let mut state = self.inner.state.lock();
        if state.lifecycle == PoolLifecycle::Exiting {
            return Err(PoolError::Exiting(self.inner.name.clone()));
        }

        let mut slot = match state.idle.pop_back() {
            Some(slot) => slot,
            None => {
                if let Some(max) = self.inner.config.max_count {
                    if state.total >= max {
                        return Err(PoolError::Exhausted {
                            name: self.inner.name.clone(),
                            max,
                        });
                    }
                }
                state.fresh_slot(self.inner.id)
            }
        };

        slot.guard = GUARD_IN_USE;
        slot.idle_since = None;
        state.in_use.insert(slot.id);
        state.allocs += 1;

        let start_reaper =
            state.total > state.min_count && state.lifecycle == PoolLifecycle::Idle;
        if start_reaper {
            state.lifecycle = PoolLifecycle::Reaping;
        }
        drop(state);

        if start_reaper {
            self.start_reaper();
        }
        Ok(PoolNode { slot })
    }

    /// Return a node to the idle list.
    ///
    /// A damaged head or tail guard is logged and counted, and the node is
    /// still accepted. A node whose guard already reads free, or that this
    /// pool does not consider in use, is a double free: it is rejected and
    /// the idle list is left untouched.
    pub fn free(&self, node: PoolNode<T>) -> Result<()> {
        let mut slot = node.slot;
        let name = &self.inner.name;

        if slot.pool_id != self.inner.id {
            error!(target: "lightbus::pool", pool = %name, node = slot.id, "Node returned to the wrong pool");
            return Err(PoolError::ForeignNode {
                name: name.clone(),
                node: slot.id,
            });
        }

        let mut state = self.inner.state.lock();
        if state.lifecycle == PoolLifecycle::Exiting {
            // Already reclaimed when destruction began.
            state.frees += 1;
            return Ok(());
        }

        match GuardState::from_word(slot.guard) {
            GuardState::InUse => {}
            GuardState::Free => {
                state.double_frees += 1;
                if state.in_use.remove(&slot.id) {
                    state.total -= 1;
                }
                error!(target: "lightbus::pool", pool = %name, node = slot.id, "Double free rejected");
                return Err(PoolError::DoubleFree {
                    name: name.clone(),
                    node: slot.id,
                });
            }
            GuardState::Corrupt(word) => {
                state.corruptions += 1;
                warn!(
                    target: "lightbus::pool",
                    pool = %name,
                    node = slot.id,
                    guard = word,
                    "Guard corrupted while node was in use"
                );
            }
        }

        if slot.tail_guard != GUARD_TAIL {
            state.overruns += 1;
            warn!(
                target: "lightbus::pool",
                pool = %name,
                node = slot.id,
                guard = slot.tail_guard,
                "Write past end of element"
            );
            slot.tail_guard = GUARD_TAIL;
        }

        if !state.in_use.remove(&slot.id) {
            state.double_frees += 1;
            error!(target: "lightbus::pool", pool = %name, node = slot.id, "Free of a node that is not in use");
            return Err(PoolError::DoubleFree {
                name: name.clone(),
                node: slot.id,
            });
        }

        slot.guard = GUARD_FREE;
        slot.idle_since = Some(Instant::now());
        state.frees += 1;
        state.idle.push_back(slot);
        Ok(())
    }

    /// Change the reserved node count.
    ///
    /// Growing adds `new_min - old_min` fresh idle nodes. Shrinking removes
    /// up to `old_min - new_min` idle nodes, oldest first; in-use nodes are
    /// never touched. Returns the number of nodes added or removed.
    pub fn resize(&self, new_min: usize) -> Result<usize> {
        let mut state = self.inner.state.lock();
        if state.lifecycle == PoolLifecycle::Exiting {
            return Err(PoolError::Exiting(self.inner.name.clone()));
        }
        if let Some(max) = self.inner.config.max_count {
            if new_min > max {
                return Err(crate::PoolConfigError::MinExceedsMax { min: new_min, max }.into());
            }
        }

        let old_min = state.min_count;
        state.min_count = new_min;

        let changed = if new_min >= old_min {
            let room = self
                .inner
                .config
                .max_count
                .map_or(usize::MAX, |max| max.saturating_sub(state.total));
            let grow = (new_min - old_min).min(room);
            for _ in 0..grow {
                state.push_fresh(self.inner.id);
            }
            grow
        } else {
            let mut removed = 0;
            while removed < old_min - new_min && state.idle.pop_front().is_some() {
                state.total -= 1;
                removed += 1;
            }
            removed
        };

        debug!(target: "lightbus::pool", pool = %self.inner.name, old_min, new_min, changed, "Pool resized");
        Ok(changed)
    }

    /// Remove idle nodes that have been idle for at least `ttl`. The pool is
    /// never shrunk below its minimum. Returns the number removed.
    pub fn purge(&self, ttl: Duration) -> usize {
        let mut state = self.inner.state.lock();
        if state.lifecycle == PoolLifecycle::Exiting {
            return 0;
        }
        state.purge_expired(ttl, Instant::now())
    }

    /// Return a snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            name: self.inner.name.clone(),
            element_size: self.inner.element_size,
            min_count: state.min_count,
            total: state.total,
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            allocs: state.allocs,
            frees: state.frees,
            corruptions: state.corruptions,
            overruns: state.overruns,
            double_frees: state.double_frees,
            reaped: state.reaped,
            lifecycle: state.lifecycle,
        }
    }

    fn start_reaper(&self) {
        match reaper::spawn(Arc::downgrade(&self.inner)) {
            Ok(handle) => {
                // The previous reaper, if any, has already returned.
                *self.inner.reaper.lock() = Some(handle);
            }
            Err(e) => {
                error!(target: "lightbus::pool", pool = %self.inner.name, error = %e, "Failed to spawn reaper");
                let mut state = self.inner.state.lock();
                if state.lifecycle == PoolLifecycle::Reaping {
                    state.lifecycle = PoolLifecycle::Idle;
                }
            }
        }
    }

    /// Tear the pool down: release idle nodes, reclaim in-use nodes as leaks,
    /// and stop the reaper. Called by the registry when the last handle goes.
    pub(crate) fn shutdown(&self) {
        let name = &self.inner.name;
        {
            let mut state = self.inner.state.lock();
            state.lifecycle = PoolLifecycle::Exiting;
            let idle = state.idle.len();
            state.idle.clear();
            let mut leaked: Vec<u64> = state.in_use.drain().collect();
            leaked.sort_unstable();
            for node in &leaked {
                error!(target: "lightbus::pool", pool = %name, node, "Leaked in-use node reclaimed at destroy");
            }
            state.total = 0;
            debug!(target: "lightbus::pool", pool = %name, idle, leaked = leaked.len(), "Pool destroyed");
        }
        self.inner.reaper_wake.notify_all();

        let handle = self.inner.reaper.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
