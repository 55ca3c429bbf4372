//! The cleanup ledger: one removal record per attached component.
//!
//! Every successful attach adds a [`Remover`] naming the owning entity and the
//! component slot whose store must be erased. Records are kept sorted by
//! `(entity, slot)`, so all records of one entity form a contiguous run that
//! destruction can drain in a single range operation.

use tracing::trace;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;

/// A type-erased "remove this entity's row from that store" record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Remover {
    pub entity: EntityId,
    pub slot: ComponentTypeId,
    /// Component type name, for diagnostics only.
    pub type_name: &'static str,
}

impl Remover {
    #[inline]
    fn key(&self) -> (EntityId, ComponentTypeId) {
        (self.entity, self.slot)
    }
}

/// Sorted collection of [`Remover`]s for every live component in a world.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    entries: Vec<Remover>,
}

impl Ledger {
    /// Record that `remover.entity` now holds a component in `remover.slot`.
    pub(crate) fn insert(&mut self, remover: Remover) {
        let key = remover.key();
        let at = self.entries.partition_point(|r| r.key() < key);
        debug_assert!(
            self.entries.get(at).map(Remover::key) != Some(key),
            "ledger already holds a record for {key:?}"
        );
        trace!(entity = %remover.entity, component = remover.type_name, "ledger: record");
        self.entries.insert(at, remover);
    }

    /// Remove exactly the record for `(entity, slot)`.
    pub(crate) fn remove(&mut self, entity: EntityId, slot: ComponentTypeId) -> Option<Remover> {
        let key = (entity, slot);
        let at = self.entries.partition_point(|r| r.key() < key);
        if self.entries.get(at).map(Remover::key) == Some(key) {
            Some(self.entries.remove(at))
        } else {
            None
        }
    }

    /// Remove and return every record owned by `entity`, in slot order.
    pub(crate) fn drain_entity(&mut self, entity: EntityId) -> Vec<Remover> {
        let range = self.range_of(entity);
        self.entries.drain(range).collect()
    }

    /// Records owned by `entity`, in slot order.
    pub(crate) fn entries_for(&self, entity: EntityId) -> &[Remover] {
        &self.entries[self.range_of(entity)]
    }

    fn range_of(&self, entity: EntityId) -> std::ops::Range<usize> {
        let start = self.entries.partition_point(|r| r.entity < entity);
        let end = start + self.entries[start..].partition_point(|r| r.entity == entity);
        start..end
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every record without running it. Used at world teardown, when
    /// the stores are dropped wholesale anyway.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
