/*!
 * Object Pool
 * Per-core slots of reusable memory shells
 */

use crate::core::limits::OBJECT_POOL_SLOT_CAPACITY;
use crate::core::{core_count, current_core_id, type_slot};
use crossbeam_queue::ArrayQueue;
use crossbeam_utils::CachePadded;
use std::sync::Arc;

/// Bounded per-core store of freed instances
///
/// A shell is an instance whose backing has been released; it is accepted
/// only while the caller holds the sole strong reference, so a shell handed
/// out again never aliases a live instance.
pub struct ObjectPool<M: Send + Sync + 'static> {
    slots: Box<[CachePadded<ArrayQueue<Arc<M>>>]>,
}

impl<M: Send + Sync + 'static> ObjectPool<M> {
    /// Create a pool with `slot_count` per-core slots of `capacity` shells each
    pub fn new(slot_count: usize, capacity: usize) -> Self {
        let slots = (0..slot_count.max(1))
            .map(|_| CachePadded::new(ArrayQueue::new(capacity.max(1))))
            .collect();
        Self { slots }
    }

    /// Pool shared by every user of `M`
    pub fn shared() -> &'static Self {
        type_slot::<ObjectPool<M>, ObjectPool<M>>(|| {
            Self::new(core_count(), OBJECT_POOL_SLOT_CAPACITY)
        })
    }

    #[inline]
    fn slot(&self) -> &ArrayQueue<Arc<M>> {
        &self.slots[current_core_id() % self.slots.len()]
    }

    /// Take a shell from the calling core's slot
    #[inline]
    pub fn rent(&self) -> Option<Arc<M>> {
        self.slot().pop()
    }

    /// Offer a shell; false when it was dropped instead
    pub fn give_back(&self, shell: Arc<M>) -> bool {
        if Arc::strong_count(&shell) != 1 || Arc::weak_count(&shell) != 0 {
            return false;
        }
        self.slot().push(shell).is_ok()
    }

    /// Shells held across every slot
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
