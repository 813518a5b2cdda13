//! Object pools for the runtime buffers handed to each `execute` call.
//!
//! Per §4.5, the stack and memory buffers used by an interpreted or native
//! call must come from a pool rather than being allocated fresh per call.
//! `ObjectPool<T>` is a generic, thread-safe pool; `VmPools` bundles the two
//! concrete pools a [`crate::vm::Vm`] owns (stack words, memory bytes).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Default cap on pooled objects per pool, matched per-pool at construction.
const DEFAULT_MAX_POOL_SIZE: usize = 1024;

/// Thread-safe object pool for reusing allocations.
pub struct ObjectPool<T> {
    pool: Arc<Mutex<VecDeque<T>>>,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    reset: Arc<dyn Fn(&mut T) + Send + Sync>,
    max_size: usize,
    allocations: Arc<AtomicUsize>,
    hits: Arc<AtomicUsize>,
}

impl<T> ObjectPool<T> {
    /// Creates a new object pool with the default capacity.
    pub fn new<F, R>(factory: F, reset: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::with_capacity(DEFAULT_MAX_POOL_SIZE, factory, reset)
    }

    /// Creates a new object pool with an explicit retention cap.
    pub fn with_capacity<F, R>(max_size: usize, factory: F, reset: R) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            pool: Arc::new(Mutex::new(VecDeque::with_capacity(max_size))),
            factory: Arc::new(factory),
            reset: Arc::new(reset),
            max_size,
            allocations: Arc::new(AtomicUsize::new(0)),
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Gets an object from the pool, or allocates a fresh one if empty.
    pub fn allocate(&self) -> PooledObject<T> {
        let mut pool = self.pool.lock().unwrap();
        let obj = if let Some(obj) = pool.pop_front() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            obj
        } else {
            self.allocations.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        };
        drop(pool);

        PooledObject {
            inner: Some(obj),
            pool: Arc::clone(&self.pool),
            reset: Arc::clone(&self.reset),
            max_size: self.max_size,
        }
    }

    /// Current number of idle objects retained by the pool.
    pub fn size(&self) -> usize {
        self.pool.lock().unwrap().len()
    }

    /// Drops every idle object.
    pub fn clear(&self) {
        self.pool.lock().unwrap().clear();
    }

    /// Total objects ever constructed by this pool's factory.
    pub fn total_allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Total `allocate()` calls served from the idle pool instead of the factory.
    pub fn pool_hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Pool hit ratio in `[0, 100]`.
    pub fn hit_ratio(&self) -> f32 {
        let hits = self.hits.load(Ordering::Relaxed);
        let allocations = self.allocations.load(Ordering::Relaxed);
        if allocations == 0 {
            0.0
        } else {
            (hits as f32 / (hits + allocations) as f32) * 100.0
        }
    }
}

/// RAII handle: returns its object to the pool when dropped (after reset),
/// or discards it if the pool is already at capacity.
pub struct PooledObject<T> {
    inner: Option<T>,
    pool: Arc<Mutex<VecDeque<T>>>,
    reset: Arc<dyn Fn(&mut T) + Send + Sync>,
    max_size: usize,
}

impl<T> PooledObject<T> {
    /// Consumes the handle, taking ownership of the inner value without
    /// returning it to the pool.
    pub fn take(mut self) -> T {
        self.inner.take().expect("value already taken")
    }
}

impl<T> std::ops::Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref().expect("value already taken")
    }
}

impl<T> std::ops::DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut().expect("value already taken")
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(mut obj) = self.inner.take() {
            (self.reset)(&mut obj);
            let mut pool = self.pool.lock().unwrap();
            if pool.len() < self.max_size {
                pool.push_back(obj);
            }
        }
    }
}

/// One 256-bit EVM stack slot. The interpreter never needs arithmetic on
/// this type directly here (that's EVM semantics, out of scope) — only that
/// stack buffers are `[StackWord; N]`-shaped and pool-allocated.
pub type StackWord = [u64; 4];

/// A pre-sized operand stack buffer, reused across calls.
pub type StackBuffer = Vec<StackWord>;

/// A growable memory buffer, reused across calls.
pub type MemoryBuffer = Vec<u8>;

/// The two pools a [`crate::vm::Vm`] owns: one for operand-stack buffers,
/// one for linear-memory buffers. Acquired once per `execute` call.
pub struct VmPools {
    pub stack: ObjectPool<StackBuffer>,
    pub memory: ObjectPool<MemoryBuffer>,
}

impl VmPools {
    /// Builds pools sized for typical contract execution: a 1024-slot stack
    /// (the EVM's own operand stack limit) and a 4KiB memory buffer.
    pub fn new(max_stack_cache: usize, max_memory_cache: usize) -> Self {
        Self {
            stack: ObjectPool::with_capacity(
                max_stack_cache,
                || Vec::with_capacity(1024),
                |v| v.clear(),
            ),
            memory: ObjectPool::with_capacity(
                max_memory_cache,
                || Vec::with_capacity(4096),
                |v| v.clear(),
            ),
        }
    }
}
