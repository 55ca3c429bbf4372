//! Component type registration.
//!
//! Every component type gets a dense [`ComponentTypeId`] the first time the
//! world sees it. The id is the index of the type's store in the world's column
//! table and the erase-operation identity used by the cleanup ledger.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to slots and remembers a display name per slot.
///
/// Names are labels only. Two types may share one.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by slot.
    names: Vec<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `T`, assigning the next one under `name` if `T` is new.
    /// A repeated registration keeps the first name.
    pub fn register<T: 'static>(&mut self, name: &str) -> ComponentTypeId {
        let next = ComponentTypeId(self.names.len() as u32);
        let id = *self.by_type.entry(TypeId::of::<T>()).or_insert(next);
        if id == next {
            self.names.push(name.to_owned());
        }
        id
    }

    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Display name of a slot.
    pub fn name(&self, id: ComponentTypeId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos;
    struct Tag;

    #[test]
    fn slots_are_dense_and_stable() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position");
        let t = reg.register::<Tag>("tag");
        assert_eq!((p.index(), t.index()), (0, 1));
        assert_eq!(reg.register::<Pos>("position_again"), p);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.lookup::<Tag>(), Some(t));
    }

    #[test]
    fn first_name_wins() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position");
        reg.register::<Pos>("renamed");
        assert_eq!(reg.name(p), Some("position"));
    }

    #[test]
    fn names_may_repeat_across_types() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("thing");
        let t = reg.register::<Tag>("thing");
        assert_ne!(p, t);
        assert_eq!(reg.name(t), Some("thing"));
    }
}
