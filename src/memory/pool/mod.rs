/*!
 * Retainable Memory Pool
 *
 * Bucketed, per-core pool of retainable memory instances.
 *
 * # Design
 *
 * - **Size classes**: bucket `i` holds instances of exactly
 *   `min_buffer_length << i` elements
 * - **Per-core stacks**: each bucket keeps one bounded stack per logical
 *   core, chosen by the current core id
 * - **Probe forward**: a rent checks its own bucket and up to
 *   `max_buckets_to_probe` larger ones, never smaller
 * - **Miss**: allocates through the factory at the target bucket's size
 * - **Oversize**: requests above the top bucket bypass pooling and are
 *   freed rather than pooled when released
 *
 * Both length bounds round up to powers of two: with a maximum of 5000 the
 * top bucket holds 8192 elements and serves every request up to 8192.
 *
 * A miss allocates rather than waits; nothing here blocks on another core.
 *
 * # Ownership
 *
 * The pool owns the identity of the instances it creates: once an instance
 * is returned, handles to it other than the pool's must not be used again.
 */

mod bucket;
mod config;
mod registry;

pub use config::PoolConfig;
pub use registry::{known_pools, pool_info, PoolId, PoolInfo};

use bucket::{bucket_index, Bucket, Pop};

use super::array::ArrayMemory;
use super::counter::AtomicCounter;
use super::element::Element;
use super::offheap::{OffHeapBufferPool, OffHeapMemory};
use super::private::PrivateMemory;
use super::retainable::{claim, free, SharedMemory};
use super::stats::{record_pool_event, PoolEvent};
use crate::core::hints::{likely, unlikely};
use crate::core::{current_core_id, MemoryError, MemoryResult};
use crossbeam_utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Builds a memory instance of `length` elements for the calling core
///
/// The pool attaches itself to the returned instance.
pub type MemoryFactory<T> =
    Arc<dyn Fn(usize, usize) -> MemoryResult<SharedMemory<T>> + Send + Sync>;

/// Snapshot of one pool's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolStats {
    pub rents: u64,
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub rejections: u64,
    pub oversize: u64,
    pub contention: u64,
    pub pooled: usize,
}

#[derive(Default)]
struct PoolCounters {
    rents: CachePadded<AtomicU64>,
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    returns: CachePadded<AtomicU64>,
    rejections: CachePadded<AtomicU64>,
    oversize: CachePadded<AtomicU64>,
    contention: CachePadded<AtomicU64>,
}

impl PoolCounters {
    #[inline]
    fn record(&self, event: PoolEvent) {
        let counter = match event {
            PoolEvent::Rent => &self.rents,
            PoolEvent::Hit => &self.hits,
            PoolEvent::Miss => &self.misses,
            PoolEvent::Return => &self.returns,
            PoolEvent::Rejection => &self.rejections,
            PoolEvent::Oversize => &self.oversize,
            PoolEvent::Contention => &self.contention,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        record_pool_event(event);
    }
}

/// Pool of retainable memory instances bucketed by power-of-two size class
pub struct RetainableMemoryPool<T: Element> {
    id: PoolId,
    config: PoolConfig,
    min_length: usize,
    max_length: usize,
    buckets: Box<[Bucket<T>]>,
    factory: MemoryFactory<T>,
    disposed: AtomicBool,
    counters: PoolCounters,
    this: Weak<Self>,
}

impl<T: Element> RetainableMemoryPool<T> {
    /// Create a pool using `factory` for misses
    pub fn new(config: PoolConfig, factory: MemoryFactory<T>) -> MemoryResult<Arc<Self>> {
        Self::with_kind(config, factory, "custom")
    }

    /// Pool of [`ArrayMemory`] instances
    pub fn array(config: PoolConfig) -> MemoryResult<Arc<Self>> {
        let factory: MemoryFactory<T> = Arc::new(|length, _core| {
            let memory: SharedMemory<T> = ArrayMemory::<T>::create(length)?;
            Ok(memory)
        });
        Self::with_kind(config, factory, "array")
    }

    /// Pool of [`PrivateMemory`] instances
    pub fn private(config: PoolConfig) -> MemoryResult<Arc<Self>> {
        let factory: MemoryFactory<T> = Arc::new(|length, _core| {
            let memory: SharedMemory<T> = PrivateMemory::<T>::create(length)?;
            Ok(memory)
        });
        Self::with_kind(config, factory, "private")
    }

    /// Pool of [`OffHeapMemory`] instances drawing buffers from `buffers`
    pub fn offheap(
        config: PoolConfig,
        buffers: Option<Arc<OffHeapBufferPool<T>>>,
    ) -> MemoryResult<Arc<Self>> {
        if !T::BLITTABLE {
            return Err(MemoryError::NotBlittable(std::any::type_name::<T>()));
        }
        let factory: MemoryFactory<T> = Arc::new(move |length, _core| {
            let memory: SharedMemory<T> = OffHeapMemory::<T>::create(length, buffers.clone())?;
            Ok(memory)
        });
        Self::with_kind(config, factory, "offheap")
    }

    fn with_kind(
        config: PoolConfig,
        factory: MemoryFactory<T>,
        kind: &'static str,
    ) -> MemoryResult<Arc<Self>> {
        config.validate()?;

        let min_length = config.min_buffer_length.next_power_of_two();
        let max_length = config.max_buffer_length.next_power_of_two();
        let bucket_count = bucket_index(max_length, min_length) + 1;
        let cores = config.effective_core_count();
        let buckets: Box<[Bucket<T>]> = (0..bucket_count)
            .map(|index| Bucket::new(min_length << index, cores, config.max_buffers_per_core))
            .collect();

        let id = registry::register(|id| PoolInfo {
            id,
            element_type: std::any::type_name::<T>(),
            kind,
            min_buffer_length: min_length,
            max_buffer_length: max_length,
            bucket_count,
            core_count: cores,
        });

        tracing::info!(
            pool = %id,
            kind,
            element = std::any::type_name::<T>(),
            buckets = bucket_count,
            cores,
            "Retainable memory pool created"
        );

        Ok(Arc::new_cyclic(|this| Self {
            id,
            config,
            min_length,
            max_length,
            buckets,
            factory,
            disposed: AtomicBool::new(false),
            counters: PoolCounters::default(),
            this: this.clone(),
        }))
    }

    /// Identity tag
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Largest pooled length (the configured maximum rounded up)
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Number of size classes
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Element length of bucket `index`
    pub fn bucket_size(&self, index: usize) -> Option<usize> {
        self.buckets.get(index).map(Bucket::size)
    }

    /// Bucket serving requests of `length` elements
    pub fn bucket_index(&self, length: usize) -> usize {
        bucket_index(length, self.min_length)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Instances currently pooled across every bucket
    pub fn pooled_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        let load = |counter: &CachePadded<AtomicU64>| counter.load(Ordering::Relaxed);
        PoolStats {
            rents: load(&self.counters.rents),
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            returns: load(&self.counters.returns),
            rejections: load(&self.counters.rejections),
            oversize: load(&self.counters.oversize),
            contention: load(&self.counters.contention),
            pooled: self.pooled_count(),
        }
    }

    // ========================================================================
    // Rent
    // ========================================================================

    /// Rent an instance of at least `min_length` elements, unretained
    pub fn rent_memory(&self, min_length: usize) -> MemoryResult<SharedMemory<T>> {
        if unlikely(self.is_disposed()) {
            return Err(MemoryError::Disposed);
        }
        self.counters.record(PoolEvent::Rent);
        let core = current_core_id();

        if unlikely(min_length > self.max_length) {
            self.counters.record(PoolEvent::Oversize);
            tracing::debug!(pool = %self.id, length = min_length, "Oversize rent bypasses pool");
            return (self.factory)(min_length, core);
        }

        let target = self.bucket_index(min_length);
        let last = (target + self.config.max_buckets_to_probe).min(self.buckets.len() - 1);

        for bucket in &self.buckets[target..=last] {
            match bucket.try_pop(core) {
                Pop::Hit(memory) => {
                    if self.config.rent_always_clean {
                        // Still pooled: unreachable by borrowers
                        unsafe { memory.core().clear_storage() };
                    }
                    if likely(memory.core().counter().try_revive(AtomicCounter::POOLED)) {
                        self.counters.record(PoolEvent::Hit);
                        return Ok(memory);
                    }
                    log::error!(
                        "{} held an instance in an unexpected state: {:?}",
                        self.id,
                        memory.core().counter()
                    );
                }
                Pop::Contended => self.counters.record(PoolEvent::Contention),
                Pop::Empty => {}
            }
        }

        self.counters.record(PoolEvent::Miss);
        let size = self.buckets[target].size();
        tracing::debug!(pool = %self.id, length = min_length, size, "Pool miss");

        let memory = (self.factory)(size, core)?;
        debug_assert!(memory.length() >= min_length);
        if self.config.rent_always_clean {
            // Fresh and unshared
            unsafe { memory.core().clear_storage() };
        }
        memory.core().attach_pool(self.id, self.this.clone());
        Ok(memory)
    }

    // ========================================================================
    // Return
    // ========================================================================

    /// Return an unretained instance
    ///
    /// Returns `Ok(true)` when pooled. Otherwise the instance is freed and
    /// `Ok(false)` is returned; instances this pool never attached (such as
    /// oversize rents) are always freed.
    pub fn return_memory(&self, memory: SharedMemory<T>, clear: bool) -> MemoryResult<bool> {
        let attached = match memory.core().pool_id() {
            Some(id) if id == self.id => true,
            None => false,
            Some(other) => return Err(self.foreign(Some(other))),
        };
        claim(&memory)?;

        if attached && self.return_claimed(&memory, clear)? {
            return Ok(true);
        }
        free(memory, true);
        Ok(false)
    }

    fn foreign(&self, actual: Option<PoolId>) -> MemoryError {
        MemoryError::ForeignPool {
            expected: self.id.0,
            actual: actual.map(|id| id.0),
        }
    }

    /// Push a claimed instance into its bucket
    ///
    /// The caller won the instance's transition to disposed, so no other
    /// thread can retain, return or free it meanwhile. `Ok(false)` means the
    /// instance was not pooled and the caller must free it.
    pub(crate) fn return_claimed(&self, memory: &SharedMemory<T>, clear: bool) -> MemoryResult<bool> {
        if self.is_disposed() {
            return Ok(false);
        }

        let core_state = memory.core();
        match core_state.pool_id() {
            Some(id) if id == self.id => {}
            other => return Err(self.foreign(other)),
        }

        let length = memory.length();
        let index = self.bucket_index(length);
        let bucket = match self.buckets.get(index) {
            Some(bucket) if bucket.size() == length => bucket,
            _ => {
                self.counters.record(PoolEvent::Rejection);
                tracing::debug!(pool = %self.id, length, "Instance outside size classes not pooled");
                return Ok(false);
            }
        };

        let counter = core_state.counter();
        debug_assert_eq!(counter.raw(), AtomicCounter::DISPOSED, "unclaimed return");
        counter.set_flags(AtomicCounter::POOLED);

        if clear || self.config.return_always_clean || !T::BLITTABLE {
            // Disposed and pooled: unreachable by borrowers
            unsafe { core_state.clear_storage() };
        }

        let (pushed, contended) = bucket.push(current_core_id(), Arc::clone(memory));
        if contended {
            self.counters.record(PoolEvent::Contention);
        }
        match pushed {
            Ok(()) => {
                self.counters.record(PoolEvent::Return);
                Ok(true)
            }
            Err(_) => {
                counter.clear_flags(AtomicCounter::POOLED);
                self.counters.record(PoolEvent::Rejection);
                tracing::debug!(pool = %self.id, size = bucket.size(), "Per-core stack full");
                Ok(false)
            }
        }
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Free every pooled instance and stop pooling
    ///
    /// Later returns are freed instead of pooled and rents fail with
    /// `Disposed`. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut freed = 0usize;
        let mut retained = 0usize;
        for bucket in self.buckets.iter() {
            for memory in bucket.drain() {
                let counter = memory.core().counter();
                if counter.force_clear_count() > 0 {
                    retained += 1;
                }
                counter.clear_flags(AtomicCounter::POOLED);
                free(memory, true);
                freed += 1;
            }
        }

        if retained > 0 {
            tracing::warn!(pool = %self.id, retained, "Pooled instances carried references at teardown");
        }
        registry::unregister(self.id);
        tracing::debug!(pool = %self.id, freed, "Retainable memory pool disposed");
    }
}

impl<T: Element> Drop for RetainableMemoryPool<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Element> std::fmt::Debug for RetainableMemoryPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainableMemoryPool")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("buckets", &self.buckets.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
