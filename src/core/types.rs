/*!
 * Runtime Type Tags
 *
 * Small integer tags issued once per element type, and per-type static
 * slots (Rust has no generic statics).
 */

use dashmap::DashMap;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Runtime tag identifying an element type
///
/// Tag 0 is reserved for "no type".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TypeTag(pub u32);

impl TypeTag {
    /// Tag of a view that carries no element type
    pub const NONE: TypeTag = TypeTag(0);

    /// Registered information for this tag
    pub fn info(self) -> Option<TypeInfo> {
        registry()
            .infos
            .get(&self)
            .map(|entry| entry.value().clone())
    }

    /// Registered type name, or `"<none>"`
    pub fn name(self) -> &'static str {
        self.info().map(|info| info.name).unwrap_or("<none>")
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.0, self.name())
    }
}

/// Static facts about a tagged type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub tag: TypeTag,
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
    pub blittable: bool,
}

struct TypeRegistry {
    tags: DashMap<TypeId, TypeTag>,
    infos: DashMap<TypeTag, TypeInfo>,
    next: AtomicU32,
    slots: DashMap<TypeId, &'static (dyn Any + Send + Sync)>,
}

fn registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| TypeRegistry {
        tags: DashMap::new(),
        infos: DashMap::new(),
        next: AtomicU32::new(1),
        slots: DashMap::new(),
    })
}

/// Tag for `T`, issued on first use
pub fn type_tag<T: crate::memory::Element>() -> TypeTag {
    let registry = registry();
    let id = TypeId::of::<T>();
    if let Some(tag) = registry.tags.get(&id) {
        return *tag;
    }

    *registry.tags.entry(id).or_insert_with(|| {
        let tag = TypeTag(registry.next.fetch_add(1, Ordering::Relaxed));
        let info = TypeInfo {
            tag,
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            blittable: T::BLITTABLE,
        };
        registry.infos.insert(tag, info);
        tag
    })
}

/// Per-type `'static` singleton, created by `init` on first use
///
/// `K` only selects the slot; the stored value has type `V`.
pub fn type_slot<K: 'static, V: Any + Send + Sync>(init: impl FnOnce() -> V) -> &'static V {
    let registry = registry();
    let id = TypeId::of::<(K, V)>();

    let existing = registry.slots.get(&id).map(|slot| *slot);
    let slot: &'static (dyn Any + Send + Sync) = match existing {
        Some(slot) => slot,
        None => {
            // Built outside the map lock so `init` may itself use slots
            let value = init();
            *registry
                .slots
                .entry(id)
                .or_insert_with(|| Box::leak(Box::new(value)))
        }
    };

    slot.downcast_ref::<V>()
        .unwrap_or_else(|| unreachable!("type slot keyed by its own value type"))
}
