//! Entity identifiers, the identifier space, and the owning [`Entity`] handle.
//!
//! An [`EntityId`] is a plain `u64`. Identifiers are handed out in strictly
//! increasing order by an [`IdSpace`] and are never recycled, so there is no
//! generation counter. The maximum value is reserved as [`EntityId::INVALID`]:
//! it marks "no such entity" and doubles as the end-of-sequence sentinel at the
//! tail of every component store.
//!
//! An [`Entity`] owns the cleanup ledger entries of one identifier. Dropping a
//! valid handle destroys the entity, i.e. removes every component attached to
//! it.

use std::fmt;
use std::rc::Weak;

use serde::{Deserialize, Serialize};

use crate::world::WorldInner;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A unique, never reused entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// The reserved "no such entity" value. Never assigned to a real entity.
    pub const INVALID: EntityId = EntityId(u64::MAX);

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// `true` unless this is [`EntityId::INVALID`].
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }

    /// The smallest identifier strictly greater than `self`.
    #[inline]
    pub(crate) fn successor(self) -> Self {
        debug_assert!(self.is_valid(), "the invalid id has no successor");
        Self(self.0 + 1)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntityId({})", self.0)
        } else {
            f.write_str("EntityId(INVALID)")
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

// ---------------------------------------------------------------------------
// IdSpace
// ---------------------------------------------------------------------------

/// Hands out monotonically increasing [`EntityId`]s.
///
/// There is no deallocation: identifiers are abundant and never recycled.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdSpace {
    next: u64,
}

impl IdSpace {
    /// Create an identifier space whose first identifier is 0.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Allocate a fresh identifier, strictly greater than every identifier
    /// issued before.
    ///
    /// # Panics
    ///
    /// Panics if the next identifier would be [`EntityId::INVALID`].
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        assert!(id.is_valid(), "entity identifier space exhausted");
        self.next += 1;
        id
    }

    /// Number of identifiers issued so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Owning handle to an entity.
///
/// The handle is move-only. Whoever holds it is responsible for the entity's
/// components: dropping a valid handle removes all of them. Use
/// [`Entity::take`] to transfer ownership out of a place you cannot move
/// from; the source is left invalid and its drop does nothing.
///
/// A handle that outlives its [`World`](crate::world::World) is inert.
pub struct Entity {
    id: EntityId,
    world: Weak<WorldInner>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, world: Weak<WorldInner>) -> Self {
        Self { id, world }
    }

    /// The identifier this handle owns, or [`EntityId::INVALID`].
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// `false` for default-constructed and moved-from handles.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    /// Move ownership into a new handle, leaving `self` invalid.
    pub fn take(&mut self) -> Entity {
        std::mem::take(self)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            id: EntityId::INVALID,
            world: Weak::new(),
        }
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        if !self.id.is_valid() {
            return;
        }
        if let Some(world) = self.world.upgrade() {
            world.release(self.id);
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&self.id).finish()
    }
}

impl From<&Entity> for EntityId {
    fn from(entity: &Entity) -> Self {
        entity.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
