//! Pool registry: pools looked up by name
//!
//! Creating a pool whose name is already registered returns a handle to the
//! existing pool and bumps its reference count, provided the element type
//! matches. Dropping the last handle removes the name and destroys the pool.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = PoolRegistry::new();
//! let jobs = registry.create::<Job>("i2c-3-jobs", PoolConfig::new(4))?;
//! let again = registry.create::<Job>("i2c-3-jobs", PoolConfig::new(4))?;
//! assert_eq!(jobs.ref_count(), 2);
//! ```

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::pool::{element_size_of, ObjectPool};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct RegistryEntry {
    pool_id: u64,
    element_size: usize,
    type_name: &'static str,
    refs: usize,
    pool: Arc<dyn Any + Send + Sync>,
}

struct RegistryInner {
    pools: DashMap<String, RegistryEntry>,
}

impl RegistryInner {
    fn ref_count(&self, name: &str, pool_id: u64) -> usize {
        self.pools
            .get(name)
            .filter(|entry| entry.pool_id == pool_id)
            .map_or(0, |entry| entry.refs)
    }

    /// Drop one reference. Returns true when it was the last one and the
    /// name has been removed.
    fn release(&self, name: &str, pool_id: u64) -> bool {
        match self.pools.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().pool_id != pool_id {
                    return false;
                }
                let entry = occupied.get_mut();
                entry.refs -= 1;
                if entry.refs == 0 {
                    occupied.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }
}

/// Pool ids are unique across every registry in the process, so a node can
/// never pass for one of another registry's pool.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide default registry.
static GLOBAL_REGISTRY: Lazy<PoolRegistry> = Lazy::new(PoolRegistry::new);

/// Registry of named pools.
///
/// Cloning shares the same registry.
#[derive(Clone)]
pub struct PoolRegistry {
    inner: Arc<RegistryInner>,
}

impl PoolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                pools: DashMap::new(),
            }),
        }
    }

    /// The lazily created process-wide registry.
    pub fn global() -> &'static PoolRegistry {
        &GLOBAL_REGISTRY
    }

    /// Create the pool `name`, or share it if it already exists.
    ///
    /// Sharing requires the same element size (`ElementSizeMismatch`
    /// otherwise) and the same element type (`TypeMismatch`). The config of
    /// a shared pool is the one it was first created with.
    pub fn create<T: Default + Send + 'static>(
        &self,
        name: &str,
        config: PoolConfig,
    ) -> Result<PoolHandle<T>> {
        if name.is_empty() {
            return Err(PoolError::InvalidName);
        }
        config.validate()?;
        let element_size = element_size_of::<T>();

        let pool = match self.inner.pools.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.element_size != element_size {
                    return Err(PoolError::ElementSizeMismatch {
                        name: name.to_string(),
                        existing: entry.element_size,
                        requested: element_size,
                    });
                }
                let inner = Arc::clone(&entry.pool).downcast().map_err(|_| {
                    PoolError::TypeMismatch {
                        name: name.to_string(),
                        existing: entry.type_name,
                        requested: std::any::type_name::<T>(),
                    }
                })?;
                entry.refs += 1;
                debug!(target: "lightbus::pool", pool = name, refs = entry.refs, "Sharing existing pool");
                ObjectPool { inner }
            }
            Entry::Vacant(vacant) => {
                let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
                let pool = ObjectPool::<T>::new(pool_id, name, config);
                let shared: Arc<dyn Any + Send + Sync> = pool.inner.clone();
                vacant.insert(RegistryEntry {
                    pool_id,
                    element_size,
                    type_name: std::any::type_name::<T>(),
                    refs: 1,
                    pool: shared,
                });
                pool
            }
        };

        Ok(PoolHandle {
            pool,
            registry: Arc::clone(&self.inner),
        })
    }

    /// Destroy a handle. Equivalent to dropping it.
    pub fn destroy<T: Default + Send + 'static>(&self, handle: PoolHandle<T>) {
        drop(handle);
    }

    /// True if a pool with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.inner.pools.contains_key(name)
    }

    /// Number of registered pools
    pub fn len(&self) -> usize {
        self.inner.pools.len()
    }

    /// True when no pool is registered
    pub fn is_empty(&self) -> bool {
        self.inner.pools.is_empty()
    }

    /// Registered pool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .pools
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.names())
            .finish()
    }
}

/// Reference-counted handle to a registered pool.
///
/// Dereferences to [`ObjectPool`]. Dropping the last handle for a name
/// destroys the pool: idle nodes are released, nodes still in use are
/// reclaimed and logged as leaks, and the reaper is stopped.
pub struct PoolHandle<T: Default + Send + 'static> {
    pool: ObjectPool<T>,
    registry: Arc<RegistryInner>,
}

impl<T: Default + Send + 'static> PoolHandle<T> {
    /// Current reference count of the underlying pool
    pub fn ref_count(&self) -> usize {
        self.registry.ref_count(self.pool.name(), self.pool.inner.id)
    }

    /// True if both handles refer to the same pool
    pub fn same_pool(&self, other: &PoolHandle<T>) -> bool {
        Arc::ptr_eq(&self.pool.inner, &other.pool.inner)
    }

    /// Drop this handle, destroying the pool if it was the last one.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<T: Default + Send + 'static> Deref for PoolHandle<T> {
    type Target = ObjectPool<T>;

    fn deref(&self) -> &ObjectPool<T> {
        &self.pool
    }
}

impl<T: Default + Send + 'static> Drop for PoolHandle<T> {
    fn drop(&mut self) {
        if self.registry.release(self.pool.name(), self.pool.inner.id) {
            self.pool.shutdown();
        }
    }
}

impl<T: Default + Send + 'static> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("name", &self.pool.name())
            .field("element_size", &self.pool.element_size())
            .finish()
    }
}
