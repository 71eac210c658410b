/*!
 * Pool Registry
 *
 * Process-wide table of live pools for diagnostics. The lock is taken only
 * when a pool is constructed or disposed, never on rent/return.
 */

use ahash::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Identity tag of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub u32);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Registered facts about a live pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolInfo {
    pub id: PoolId,
    pub element_type: &'static str,
    pub kind: &'static str,
    pub min_buffer_length: usize,
    pub max_buffer_length: usize,
    pub bucket_count: usize,
    pub core_count: usize,
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn table() -> &'static Mutex<HashMap<PoolId, PoolInfo>> {
    static TABLE: OnceLock<Mutex<HashMap<PoolId, PoolInfo>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::default()))
}

/// Issue an id and record the pool built with it
pub(crate) fn register(build: impl FnOnce(PoolId) -> PoolInfo) -> PoolId {
    let id = PoolId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    let info = build(id);
    table().lock().insert(id, info);
    id
}

pub(crate) fn unregister(id: PoolId) {
    table().lock().remove(&id);
}

/// Snapshot of every live pool, ordered by id
pub fn known_pools() -> Vec<PoolInfo> {
    let mut pools: Vec<PoolInfo> = table().lock().values().cloned().collect();
    pools.sort_by_key(|info| info.id);
    pools
}

/// Facts about one live pool
pub fn pool_info(id: PoolId) -> Option<PoolInfo> {
    table().lock().get(&id).cloned()
}
