//! Dense, identifier-sorted component storage.
//!
//! A [`ComponentStore<T>`] keeps two parallel sequences: the owning entity ids
//! and the component values. Both are sorted ascending by id and `values[i]`
//! belongs to `ids[i]`. The id sequence carries one trailing
//! [`EntityId::INVALID`] so lookups and joins can scan forward without bounds
//! checks against the length; [`ComponentStore::ids`] hides it.
//!
//! Erasure is order preserving (`Vec::remove`). Swap-removal would break the
//! sort order the join relies on.
//!
//! The world keeps one boxed store per registered type in [`Columns`],
//! addressed by [`ComponentTypeId`]. The [`ErasedStore`] trait is what the
//! cleanup ledger calls when it does not know the concrete type.

use std::any::Any;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Sorted parallel `(id, value)` storage for one component type.
#[derive(Debug)]
pub struct ComponentStore<T> {
    /// Ascending, terminated by `EntityId::INVALID`.
    ids: Vec<EntityId>,
    values: Vec<T>,
    /// Placeholder left behind while a join owns the real store.
    checked_out: bool,
}

impl<T> ComponentStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            ids: vec![EntityId::INVALID],
            values: Vec::new(),
            checked_out: false,
        }
    }

    pub(crate) fn checked_out() -> Self {
        Self {
            checked_out: true,
            ..Self::new()
        }
    }

    /// Number of stored components.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owning entity ids, ascending, without the sentinel.
    #[inline]
    pub fn ids(&self) -> &[EntityId] {
        &self.ids[..self.values.len()]
    }

    /// Component values, in the same order as [`ids`](Self::ids).
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Mutable component values. The row layout cannot be changed through it.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// `(id, value)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.ids().iter().copied().zip(self.values.iter())
    }

    /// Ids including the trailing sentinel.
    #[inline]
    pub(crate) fn sentinel_ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// First row whose id is `>= id`. Lands on the sentinel when every id is
    /// smaller.
    #[inline]
    fn lower_bound(&self, id: EntityId) -> usize {
        self.ids.partition_point(|&probe| probe < id)
    }

    /// Row holding `id`'s component, if any.
    pub fn position(&self, id: EntityId) -> Option<usize> {
        if !id.is_valid() {
            return None;
        }
        let row = self.lower_bound(id);
        (self.ids[row] == id).then_some(row)
    }

    /// Whether `id` holds a component in this store.
    pub fn contains(&self, id: EntityId) -> bool {
        self.position(id).is_some()
    }

    /// The component owned by `id`, or `None`.
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.position(id).map(|row| &self.values[row])
    }

    /// Mutable access to the component owned by `id`, or `None`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.position(id).map(|row| &mut self.values[row])
    }

    /// Insert `value` for `id` at its sorted position.
    ///
    /// # Panics
    ///
    /// Panics if `id` already holds a `T` or is the invalid id.
    pub fn insert(&mut self, id: EntityId, value: T) -> &mut T {
        let row = self.insert_row(id, value);
        &mut self.values[row]
    }

    pub(crate) fn insert_row(&mut self, id: EntityId, value: T) -> usize {
        assert!(
            id.is_valid(),
            "{}",
            EcsError::InvalidEntity {
                operation: "insert",
                entity: id,
                component: std::any::type_name::<T>(),
            }
        );
        let row = self.lower_bound(id);
        if self.ids[row] == id {
            panic!(
                "{}",
                EcsError::DuplicateComponent {
                    operation: "insert",
                    entity: id,
                    component: std::any::type_name::<T>(),
                }
            );
        }
        self.ids.insert(row, id);
        self.values.insert(row, value);
        debug_assert!(self.is_sorted(), "store order broken by insert");
        row
    }

    /// Remove and return the row at `index`, shifting later rows down.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the row is not owned by
    /// `expected`.
    pub fn erase_at(&mut self, index: usize, expected: EntityId) -> T {
        assert!(
            index < self.values.len(),
            "erase_at: row {index} out of range for `{}` store of length {}",
            std::any::type_name::<T>(),
            self.values.len()
        );
        assert_eq!(
            self.ids[index],
            expected,
            "erase_at: row {index} of `{}` is not owned by {expected}",
            std::any::type_name::<T>()
        );
        self.ids.remove(index);
        self.values.remove(index)
    }

    /// Remove `id`'s component if present.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let row = self.position(id)?;
        Some(self.erase_at(row, id))
    }

    /// Recover the owner of a reference that points into this store.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not point at an element of this store, or if
    /// `T` is zero-sized (zero-sized values have no address identity).
    pub fn entity_of(&self, value: &T) -> EntityId {
        let size = std::mem::size_of::<T>();
        assert!(
            size != 0,
            "entity_of: `{}` is zero-sized, its references carry no position",
            std::any::type_name::<T>()
        );
        let base = self.values.as_ptr() as usize;
        let addr = value as *const T as usize;
        let end = base + self.values.len() * size;
        assert!(
            addr >= base && addr < end,
            "entity_of: reference does not point into the `{}` store",
            std::any::type_name::<T>()
        );
        debug_assert_eq!((addr - base) % size, 0);
        self.ids[(addr - base) / size]
    }

    /// Strictly ascending ids (sentinel included) and matching lengths.
    pub(crate) fn is_sorted(&self) -> bool {
        self.ids.len() == self.values.len() + 1
            && self.ids.last() == Some(&EntityId::INVALID)
            && self.ids.windows(2).all(|w| w[0] < w[1])
    }
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ErasedStore
// ---------------------------------------------------------------------------

/// Type-erased view of a [`ComponentStore`], used where the component type is
/// not statically known (entity destruction, join bookkeeping).
pub trait ErasedStore: Any {
    /// `std::any::type_name` of the component type.
    fn type_name(&self) -> &'static str;
    /// Number of stored components.
    fn len(&self) -> usize;
    /// Whether the store holds no components.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Whether `id` holds a component in this store.
    fn contains(&self, id: EntityId) -> bool;
    /// Remove `id`'s row. Returns `false` if it had none.
    fn erase_entity(&mut self, id: EntityId) -> bool;
    /// Ids including the trailing sentinel.
    fn sentinel_ids(&self) -> &[EntityId];
    /// Whether this is the placeholder of a store owned by a join, or parked
    /// after one.
    fn is_checked_out(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedStore for ComponentStore<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.position(id).is_some()
    }

    fn erase_entity(&mut self, id: EntityId) -> bool {
        self.remove(id).is_some()
    }

    fn sentinel_ids(&self) -> &[EntityId] {
        &self.ids
    }

    fn is_checked_out(&self) -> bool {
        self.checked_out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// One boxed store per registered component type, indexed by slot.
#[derive(Default)]
pub(crate) struct Columns {
    stores: Vec<Box<dyn ErasedStore>>,
}

impl Columns {
    /// Make sure `slot` has a store. Slots are handed out densely, so a new
    /// slot is always the next index.
    pub(crate) fn ensure<T: 'static>(&mut self, slot: ComponentTypeId) {
        if slot.index() == self.stores.len() {
            self.stores.push(Box::new(ComponentStore::<T>::new()));
        }
        debug_assert!(slot.index() < self.stores.len());
    }

    pub(crate) fn erased(&self, slot: ComponentTypeId) -> &dyn ErasedStore {
        &*self.stores[slot.index()]
    }

    pub(crate) fn store<T: 'static>(&self, slot: ComponentTypeId) -> &ComponentStore<T> {
        let erased = self.erased(slot);
        assert!(
            !erased.is_checked_out(),
            "component store `{}` is in use by an active join",
            erased.type_name()
        );
        match erased.as_any().downcast_ref::<ComponentStore<T>>() {
            Some(store) => store,
            None => panic!(
                "slot {slot:?} holds `{}`, not `{}`",
                erased.type_name(),
                std::any::type_name::<T>()
            ),
        }
    }

    pub(crate) fn store_mut<T: 'static>(
        &mut self,
        slot: ComponentTypeId,
    ) -> &mut ComponentStore<T> {
        let erased = &mut *self.stores[slot.index()];
        let type_name = erased.type_name();
        assert!(
            !erased.is_checked_out(),
            "component store `{type_name}` is in use by an active join"
        );
        match erased.as_any_mut().downcast_mut::<ComponentStore<T>>() {
            Some(store) => store,
            None => panic!(
                "slot {slot:?} holds `{type_name}`, not `{}`",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Move the store out, leaving a placeholder that rejects access.
    pub(crate) fn check_out<T: 'static>(&mut self, slot: ComponentTypeId) -> ComponentStore<T> {
        std::mem::replace(self.store_mut::<T>(slot), ComponentStore::checked_out())
    }

    /// Put a store taken with [`check_out`](Self::check_out) back.
    pub(crate) fn check_in(&mut self, slot: ComponentTypeId, store: Box<dyn ErasedStore>) {
        let placeholder = &self.stores[slot.index()];
        debug_assert!(placeholder.is_checked_out(), "check_in without check_out");
        debug_assert_eq!(placeholder.type_name(), store.type_name());
        self.stores[slot.index()] = store;
    }

    /// Type-erased removal of `id`'s row from the store at `slot`.
    pub(crate) fn erase(&mut self, slot: ComponentTypeId, id: EntityId) -> bool {
        self.stores[slot.index()].erase_entity(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
