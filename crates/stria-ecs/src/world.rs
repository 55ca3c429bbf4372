//! The [`World`]: identifier space, component columns and cleanup ledger.
//!
//! All operations take `&self`. The world's state lives behind an `Rc` so
//! that [`Entity`] handles can hold a weak back-reference and clean up after
//! themselves when dropped. Interior mutability is per field (`Cell` /
//! `RefCell`); a `RefCell` conflict is always a caller bug and panics with
//! the usual "already borrowed" message.
//!
//! ## Destruction during a join
//!
//! A join checks its stores out of the column table for as long as it lives.
//! Destroying an entity while any join is active would have to erase rows
//! from those stores, so the destruction is queued instead and carried out
//! as soon as the last join ends (or on the next world operation after that).
//! Inserting into or removing from a store that a join holds is rejected with
//! [`EcsError::JoinActive`]; queue such changes through
//! [`Commands`](crate::command::Commands).
//!
//! A join that ends while the caller still holds a `Ref` or `RefMut` from the
//! world cannot put its stores back yet. They are parked and returned by the
//! first world operation after those borrows are gone.

use std::any::type_name;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::component::{ComponentRegistry, ComponentTypeId};
use crate::entity::{Entity, EntityId, IdSpace};
use crate::ledger::{Ledger, Remover};
use crate::store::{Columns, ComponentStore, ErasedStore};
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldInner
// ---------------------------------------------------------------------------

/// Shared state behind a [`World`]. Entity handles hold a `Weak` to it.
pub(crate) struct WorldInner {
    ids: Cell<IdSpace>,
    /// Ids whose handle has not been dropped yet.
    live: RefCell<BTreeSet<EntityId>>,
    registry: RefCell<ComponentRegistry>,
    // Declared before `columns`: the ledger must be gone before component
    // values (which may own handles) are dropped.
    ledger: RefCell<Ledger>,
    columns: RefCell<Columns>,
    /// Stores a finished join could not return while the columns were borrowed.
    parked: RefCell<Vec<(ComponentTypeId, Box<dyn ErasedStore>)>>,
    /// Destructions postponed by an active join or a busy store.
    pending: RefCell<VecDeque<EntityId>>,
    active_joins: Cell<usize>,
}

impl WorldInner {
    fn new() -> Self {
        Self {
            ids: Cell::new(IdSpace::new()),
            live: RefCell::new(BTreeSet::new()),
            registry: RefCell::new(ComponentRegistry::new()),
            ledger: RefCell::new(Ledger::default()),
            columns: RefCell::new(Columns::default()),
            parked: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            active_joins: Cell::new(0),
        }
    }

    /// Remove every component owned by `id`. Called from `Entity::drop`.
    pub(crate) fn release(&self, id: EntityId) {
        self.live.borrow_mut().remove(&id);
        if self.active_joins.get() == 0 && self.try_release(id) {
            self.settle();
        } else {
            debug!(entity = %id, "destroy deferred");
            self.pending.borrow_mut().push_back(id);
        }
    }

    /// Run the ledger records of `id`. Returns `false`, touching nothing, when
    /// the ledger or the columns are currently borrowed.
    fn try_release(&self, id: EntityId) -> bool {
        let (Ok(mut ledger), Ok(mut columns)) =
            (self.ledger.try_borrow_mut(), self.columns.try_borrow_mut())
        else {
            return false;
        };
        for remover in ledger.drain_entity(id) {
            // A component value dropped here may itself own a handle; its
            // release finds the columns borrowed and lands in `pending`.
            let erased = columns.erase(remover.slot, id);
            debug_assert!(erased, "ledger record without a row: {remover:?}");
            debug!(entity = %id, component = remover.type_name, "destroy: component removed");
        }
        true
    }

    /// Return parked stores, then carry out postponed destructions if no join
    /// is active.
    fn settle(&self) {
        self.unpark();
        if self.active_joins.get() > 0 {
            return;
        }
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(id) = next else { break };
            if !self.try_release(id) {
                self.pending.borrow_mut().push_front(id);
                break;
            }
        }
    }

    fn unpark(&self) {
        let mut parked = self.parked.borrow_mut();
        if parked.is_empty() {
            return;
        }
        let Ok(mut columns) = self.columns.try_borrow_mut() else {
            return;
        };
        for (slot, store) in parked.drain(..) {
            debug!(component = store.type_name(), "parked store returned");
            columns.check_in(slot, store);
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Container of entities and their components.
pub struct World {
    inner: Rc<WorldInner>,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(WorldInner::new()),
        }
    }

    // -- Registration ------------------------------------------------------

    /// Register `T` under a human-readable `name` and create its store.
    ///
    /// Registration is optional: the first operation touching `T` registers
    /// it under its Rust type name. Re-registering returns the existing id.
    ///
    /// # Panics
    ///
    /// Panics if `name` already belongs to a different type.
    pub fn register_component<T: 'static>(&self, name: &str) -> ComponentTypeId {
        let slot = self.inner.registry.borrow_mut().register::<T>(name);
        self.inner.columns.borrow_mut().ensure::<T>(slot);
        slot
    }

    /// Slot of `T`, if it has been registered.
    pub fn component_type_id<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.inner.registry.borrow().lookup::<T>()
    }

    /// The component registry.
    pub fn registry(&self) -> Ref<'_, ComponentRegistry> {
        self.inner.registry.borrow()
    }

    pub(crate) fn slot_of<T: 'static>(&self) -> ComponentTypeId {
        match self.component_type_id::<T>() {
            Some(slot) => slot,
            None => self.register_component::<T>(type_name::<T>()),
        }
    }

    // -- Entity lifecycle --------------------------------------------------

    /// Create an entity with no components.
    ///
    /// The returned handle owns the entity: dropping it removes every
    /// component attached to the id.
    pub fn create(&self) -> Entity {
        self.inner.settle();
        let mut ids = self.inner.ids.get();
        let id = ids.allocate();
        self.inner.ids.set(ids);
        self.inner.live.borrow_mut().insert(id);
        trace!(entity = %id, "entity created");
        Entity::new(id, Rc::downgrade(&self.inner))
    }

    /// Destroy an entity now. Same as dropping the handle.
    pub fn destroy(&self, entity: Entity) {
        trace!(entity = %entity.id(), "entity destroyed");
        drop(entity);
    }

    /// Number of identifiers issued so far.
    pub fn entities_created(&self) -> u64 {
        self.inner.ids.get().issued()
    }

    /// Whether `id` was created by this world and its handle is still around.
    /// An id whose destruction is merely postponed is not alive.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.inner.live.borrow().contains(&id)
    }

    /// Destructions waiting for the active joins to end.
    pub fn pending_destroys(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Carry out postponed destructions now. A no-op while a join is active.
    pub fn flush(&self) {
        self.inner.settle();
    }

    // -- Components --------------------------------------------------------

    /// Attach `value` to `id` and return a mutable reference to the stored
    /// component.
    ///
    /// The reference borrows the column table; drop it before the next world
    /// operation.
    ///
    /// # Panics
    ///
    /// Panics on every condition [`try_insert_component`](Self::try_insert_component)
    /// reports as an error, most notably if `id` already has a `T`.
    pub fn insert_component<T: 'static>(&self, id: EntityId, value: T) -> RefMut<'_, T> {
        if let Err(e) = self.try_insert_component(id, value) {
            panic!("contract violation: {e}");
        }
        let slot = self.slot_of::<T>();
        RefMut::map(self.inner.columns.borrow_mut(), |columns| {
            columns
                .store_mut::<T>(slot)
                .get_mut(id)
                .expect("component was inserted above")
        })
    }

    /// Attach `value` to `id`, recording a removal entry in the cleanup
    /// ledger.
    pub fn try_insert_component<T: 'static>(
        &self,
        id: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        self.inner.settle();
        let component = type_name::<T>();
        if !self.is_alive(id) {
            return Err(EcsError::InvalidEntity {
                operation: "insert",
                entity: id,
                component,
            });
        }
        let slot = self.slot_of::<T>();
        {
            let mut columns = self.inner.columns.borrow_mut();
            if columns.erased(slot).is_checked_out() {
                return Err(EcsError::JoinActive {
                    operation: "insert",
                    component,
                });
            }
            let store = columns.store_mut::<T>(slot);
            if store.contains(id) {
                return Err(EcsError::DuplicateComponent {
                    operation: "insert",
                    entity: id,
                    component,
                });
            }
            store.insert_row(id, value);
        }
        self.inner.ledger.borrow_mut().insert(Remover {
            entity: id,
            slot,
            type_name: component,
        });
        Ok(())
    }

    /// The `T` attached to `id`, or `None`.
    ///
    /// # Panics
    ///
    /// Panics if a join currently holds the `T` store; read it through the
    /// join instead.
    pub fn get_component<T: 'static>(&self, id: EntityId) -> Option<Ref<'_, T>> {
        self.inner.settle();
        let slot = self.component_type_id::<T>()?;
        Ref::filter_map(self.inner.columns.borrow(), |columns| {
            columns.store::<T>(slot).get(id)
        })
        .ok()
    }

    /// Mutable access to the `T` attached to `id`, or `None`.
    pub fn get_component_mut<T: 'static>(&self, id: EntityId) -> Option<RefMut<'_, T>> {
        self.inner.settle();
        let slot = self.component_type_id::<T>()?;
        RefMut::filter_map(self.inner.columns.borrow_mut(), |columns| {
            columns.store_mut::<T>(slot).get_mut(id)
        })
        .ok()
    }

    /// Whether `id` has a `T` attached.
    pub fn has_component<T: 'static>(&self, id: EntityId) -> bool {
        self.inner.settle();
        match self.component_type_id::<T>() {
            Some(slot) => self.inner.columns.borrow().erased(slot).contains(id),
            None => false,
        }
    }

    /// Detach and return the `T` attached to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` has no `T` or a join holds the `T` store.
    pub fn remove_component<T: 'static>(&self, id: EntityId) -> T {
        match self.try_remove_component(id) {
            Ok(value) => value,
            Err(e) => panic!("contract violation: {e}"),
        }
    }

    /// Detach and return the `T` attached to `id`, together with its ledger
    /// record.
    pub fn try_remove_component<T: 'static>(&self, id: EntityId) -> Result<T, EcsError> {
        self.inner.settle();
        let component = type_name::<T>();
        let missing = EcsError::MissingComponent {
            operation: "remove",
            entity: id,
            component,
        };
        let Some(slot) = self.component_type_id::<T>() else {
            return Err(missing);
        };
        let value = {
            let mut columns = self.inner.columns.borrow_mut();
            if columns.erased(slot).is_checked_out() {
                return Err(EcsError::JoinActive {
                    operation: "remove",
                    component,
                });
            }
            columns.store_mut::<T>(slot).remove(id).ok_or(missing)?
        };
        let record = self.inner.ledger.borrow_mut().remove(id, slot);
        debug_assert!(record.is_some(), "row of {id} had no ledger record");
        Ok(value)
    }

    /// Owner of a component reference obtained from this world.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not point into the `T` store.
    pub fn entity_of<T: 'static>(&self, value: &T) -> EntityId {
        self.inner.settle();
        let Some(slot) = self.component_type_id::<T>() else {
            panic!("entity_of: no `{}` store exists", type_name::<T>());
        };
        self.inner.columns.borrow().store::<T>(slot).entity_of(value)
    }

    /// Read access to the whole `T` store.
    pub fn store<T: 'static>(&self) -> Ref<'_, ComponentStore<T>> {
        self.inner.settle();
        let slot = self.slot_of::<T>();
        Ref::map(self.inner.columns.borrow(), |columns| columns.store::<T>(slot))
    }

    /// Number of `T` components in the world.
    pub fn component_count<T: 'static>(&self) -> usize {
        self.inner.settle();
        match self.component_type_id::<T>() {
            Some(slot) => self.inner.columns.borrow().erased(slot).len(),
            None => 0,
        }
    }

    /// Registered names of the components attached to `id`, in slot order.
    pub fn components_of(&self, id: EntityId) -> Vec<String> {
        self.inner.settle();
        let registry = self.inner.registry.borrow();
        self.inner
            .ledger
            .borrow()
            .entries_for(id)
            .iter()
            .filter_map(|r| registry.name(r.slot))
            .map(str::to_owned)
            .collect()
    }

    /// Total number of cleanup records, one per attached component.
    pub fn ledger_len(&self) -> usize {
        self.inner.ledger.borrow().len()
    }

    // -- Join bookkeeping --------------------------------------------------

    /// Whether a join is currently iterating this world.
    pub fn is_joining(&self) -> bool {
        self.inner.active_joins.get() > 0
    }

    pub(crate) fn is_checked_out(&self, slot: ComponentTypeId) -> bool {
        self.inner.columns.borrow().erased(slot).is_checked_out()
    }

    pub(crate) fn check_out<T: 'static>(&self, slot: ComponentTypeId) -> ComponentStore<T> {
        self.inner.columns.borrow_mut().check_out::<T>(slot)
    }

    /// Put a checked-out store back, or park it if the columns are borrowed.
    pub(crate) fn check_in<T: 'static>(
        &self,
        slot: ComponentTypeId,
        store: ComponentStore<T>,
    ) {
        let store: Box<dyn ErasedStore> = Box::new(store);
        match self.inner.columns.try_borrow_mut() {
            Ok(mut columns) => columns.check_in(slot, store),
            Err(_) => {
                debug!(component = store.type_name(), "store return postponed");
                self.inner.parked.borrow_mut().push((slot, store));
            }
        }
    }

    pub(crate) fn begin_join(&self) {
        self.inner.settle();
        self.inner.active_joins.set(self.inner.active_joins.get() + 1);
    }

    pub(crate) fn end_join(&self) {
        let active = self.inner.active_joins.get();
        debug_assert!(active > 0, "end_join without begin_join");
        self.inner.active_joins.set(active.saturating_sub(1));
        self.inner.settle();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        // Handles still alive become inert once the Rc is gone. Component
        // values dropped with the columns may own handles of their own; with
        // the ledger cleared those drops have nothing left to do.
        if let Ok(mut ledger) = self.inner.ledger.try_borrow_mut() {
            debug!(records = ledger.len(), "world dropped");
            ledger.clear();
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities_created", &self.entities_created())
            .field("component_types", &self.inner.registry.borrow().len())
            .field("ledger_len", &self.ledger_len())
            .field("pending_destroys", &self.pending_destroys())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
