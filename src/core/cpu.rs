/*!
 * CPU Topology and Current Core Lookup
 *
 * Core-count detection for sizing per-core structures, and a fast
 * "which core am I on" lookup used to pick a per-core pool slot.
 *
 * The core id is a contention heuristic, not a correctness requirement:
 * a thread may migrate between the lookup and the slot access, which at
 * worst sends an instance to a neighbouring core's slot.
 */

use std::cell::Cell;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Global singleton for hardware topology
static TOPOLOGY: OnceLock<CpuTopology> = OnceLock::new();

/// Hardware topology used to size per-core structures
#[derive(Debug, Clone)]
pub struct CpuTopology {
    core_count: usize,
    cache_line_size: usize,
}

impl CpuTopology {
    /// Get or initialize the global topology instance
    pub fn global() -> &'static Self {
        TOPOLOGY.get_or_init(|| {
            let core_count = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or_else(|_| {
                    log::warn!("Failed to detect CPU count, defaulting to 8");
                    8
                });

            let topology = Self {
                core_count,
                cache_line_size: Self::detect_cache_line_size(),
            };

            tracing::info!(
                cores = topology.core_count,
                cache_line = topology.cache_line_size,
                "CPU topology initialized"
            );

            topology
        })
    }

    fn detect_cache_line_size() -> usize {
        // x86-64, ARM64 and RISC-V all ship 64-byte lines in practice
        crate::core::limits::SAFE_CACHE_LINE
    }

    /// Number of logical cores
    #[inline]
    pub fn core_count(&self) -> usize {
        self.core_count
    }

    /// L1 cache line size in bytes
    #[inline]
    pub fn cache_line_size(&self) -> usize {
        self.cache_line_size
    }
}

/// Number of logical cores
#[inline]
pub fn core_count() -> usize {
    CpuTopology::global().core_count()
}

/// Id of the core the calling thread is running on
///
/// Falls back to a per-thread id when the platform offers no core lookup.
#[inline]
pub fn current_core_id() -> usize {
    #[cfg(target_os = "linux")]
    {
        if let Ok(cpu) = nix::sched::sched_getcpu() {
            return cpu;
        }
    }
    thread_core_hint()
}

/// Per-thread stand-in for a core id
fn thread_core_hint() -> usize {
    thread_local! {
        static HINT: Cell<Option<usize>> = const { Cell::new(None) };
    }
    static NEXT_THREAD: AtomicUsize = AtomicUsize::new(0);

    HINT.with(|hint| match hint.get() {
        Some(id) => id,
        None => {
            let ordinal = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
            let mut hasher = ahash::RandomState::with_seeds(1, 2, 3, 4).build_hasher();
            ordinal.hash(&mut hasher);
            std::thread::current().id().hash(&mut hasher);
            let id = (hasher.finish() as usize) % core_count();
            hint.set(Some(id));
            id
        }
    })
}
