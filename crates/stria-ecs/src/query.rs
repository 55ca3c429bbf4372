//! Multi-way joins over component stores.
//!
//! A [`Join`] walks the entities that have every component in its
//! [`Query`] tuple, in ascending id order. All stores are sorted by id and end
//! in the [`EntityId::INVALID`] sentinel, so the join is a leapfrog
//! intersection: each column's cursor skips forward to the current candidate
//! and the candidate is raised to whatever the cursor lands on, until all
//! columns agree or the sentinel is reached. No column ever needs a bounds
//! check, because the sentinel compares greater than every real id.
//!
//! ## Access
//!
//! The joined stores are checked out of the world for the lifetime of the
//! join, which gives the join exclusive, safe `&mut` access to the current
//! row of every column. While a store is checked out:
//!
//! - reading or writing it through the [`World`] panics,
//! - inserting into or removing from it returns [`EcsError::JoinActive`],
//! - dropping an [`Entity`](crate::entity::Entity) handle is deferred until
//!   the join ends.
//!
//! Stores not named by the join stay fully usable. A join dropped while the
//! caller still holds a borrow from the world parks its stores; they return
//! at the first world operation after that borrow ends.
//!
//! [`EcsError::JoinActive`]: crate::EcsError::JoinActive

use std::any::{type_name, TypeId};
use std::fmt;

use tracing::trace;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::store::{ComponentStore, ErasedStore};
use crate::world::World;

// ---------------------------------------------------------------------------
// Query trait -- a tuple of component types
// ---------------------------------------------------------------------------

/// A tuple of distinct component types, `(A,)` through `(A, B, C, D, E, F)`.
///
/// Implemented by macro for tuples; there is no need to implement it by hand.
pub trait Query: 'static {
    /// The checked-out stores, one per column.
    type Stores;
    /// Mutable references to the current row, one per column.
    type Item<'a>;
    /// Number of columns.
    const WIDTH: usize;

    fn type_ids() -> Vec<TypeId>;
    fn type_names() -> Vec<&'static str>;
    /// Slots of every column, registering unseen types.
    fn slots(world: &World) -> Vec<ComponentTypeId>;
    fn check_out(world: &World, slots: &[ComponentTypeId]) -> Self::Stores;
    fn check_in(world: &World, slots: &[ComponentTypeId], stores: Self::Stores);
    fn column(stores: &Self::Stores, k: usize) -> &dyn ErasedStore;
    fn column_mut(stores: &mut Self::Stores, k: usize) -> &mut dyn ErasedStore;
    fn fetch<'a>(stores: &'a mut Self::Stores, rows: &[usize]) -> Self::Item<'a>;
}

macro_rules! impl_query {
    ($width:expr; $($name:ident => $idx:tt),+) => {
        impl<$($name: 'static),+> Query for ($($name,)+) {
            type Stores = ($(ComponentStore<$name>,)+);
            type Item<'a> = ($(&'a mut $name,)+);
            const WIDTH: usize = $width;

            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$name>()),+]
            }

            fn slots(world: &World) -> Vec<ComponentTypeId> {
                vec![$(world.slot_of::<$name>()),+]
            }

            fn check_out(world: &World, slots: &[ComponentTypeId]) -> Self::Stores {
                ($(world.check_out::<$name>(slots[$idx]),)+)
            }

            fn check_in(world: &World, slots: &[ComponentTypeId], stores: Self::Stores) {
                $(world.check_in::<$name>(slots[$idx], stores.$idx);)+
            }

            fn column(stores: &Self::Stores, k: usize) -> &dyn ErasedStore {
                match k {
                    $($idx => &stores.$idx,)+
                    _ => panic!("column {k} out of range for a {}-way join", $width),
                }
            }

            fn column_mut(stores: &mut Self::Stores, k: usize) -> &mut dyn ErasedStore {
                match k {
                    $($idx => &mut stores.$idx,)+
                    _ => panic!("column {k} out of range for a {}-way join", $width),
                }
            }

            fn fetch<'a>(stores: &'a mut Self::Stores, rows: &[usize]) -> Self::Item<'a> {
                ($(&mut stores.$idx.values_mut()[rows[$idx]],)+)
            }
        }
    };
}

impl_query!(1; A => 0);
impl_query!(2; A => 0, B => 1);
impl_query!(3; A => 0, B => 1, C => 2);
impl_query!(4; A => 0, B => 1, C => 2, D => 3);
impl_query!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_query!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Cursor over the entities holding every component of `Q`.
///
/// ```
/// # use stria_ecs::prelude::*;
/// # struct Pos(f32); struct Vel(f32);
/// let world = World::new();
/// let e = world.create();
/// world.insert_component(e.id(), Pos(0.0));
/// world.insert_component(e.id(), Vel(2.0));
///
/// let mut join = world.query::<(Pos, Vel)>();
/// while !join.is_done() {
///     let (pos, vel) = join.components();
///     pos.0 += vel.0;
///     join.advance();
/// }
/// ```
pub struct Join<'w, Q: Query> {
    world: &'w World,
    slots: Vec<ComponentTypeId>,
    type_ids: Vec<TypeId>,
    /// `None` only during drop.
    stores: Option<Q::Stores>,
    /// Cursor per column. Always points at a real row or the sentinel.
    rows: Vec<usize>,
    current: EntityId,
}

impl<'w, Q: Query> Join<'w, Q> {
    fn new(world: &'w World) -> Self {
        world.flush();
        let type_ids = Q::type_ids();
        let names = Q::type_names();
        for (i, id) in type_ids.iter().enumerate() {
            if type_ids[..i].contains(id) {
                panic!("join lists `{}` more than once", names[i]);
            }
        }

        let slots = Q::slots(world);
        for (slot, name) in slots.iter().zip(&names) {
            assert!(
                !world.is_checked_out(*slot),
                "component store `{name}` is in use by an active join"
            );
        }

        world.begin_join();
        let stores = Q::check_out(world, &slots);
        trace!(components = ?names, "join started");

        let mut join = Self {
            world,
            slots,
            type_ids,
            stores: Some(stores),
            rows: vec![0; Q::WIDTH],
            current: EntityId::INVALID,
        };
        join.seek(EntityId::from_raw(0));
        join
    }

    /// Move every cursor to the first row `>= target` they all share.
    fn seek(&mut self, mut target: EntityId) {
        let Some(stores) = self.stores.as_ref() else {
            return;
        };
        loop {
            let start = target;
            for (k, row) in self.rows.iter_mut().enumerate() {
                let ids = Q::column(stores, k).sentinel_ids();
                while ids[*row] < target {
                    *row += 1;
                }
                target = ids[*row];
            }
            if target == start || !target.is_valid() {
                break;
            }
        }
        self.current = target;
    }

    /// Whether the join has run past its last match.
    #[inline]
    pub fn is_done(&self) -> bool {
        !self.current.is_valid()
    }

    /// The entity at the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the join is done.
    pub fn entity(&self) -> EntityId {
        assert!(!self.is_done(), "join is exhausted");
        self.current
    }

    /// Step to the next entity holding every component.
    ///
    /// # Panics
    ///
    /// Panics if the join is done.
    pub fn advance(&mut self) {
        assert!(!self.is_done(), "advance past the end of a join");
        if Q::WIDTH == 1 {
            // One column: every row matches.
            if let Some(stores) = self.stores.as_ref() {
                self.rows[0] += 1;
                self.current = Q::column(stores, 0).sentinel_ids()[self.rows[0]];
            }
        } else {
            self.seek(self.current.successor());
        }
    }

    fn column_of<U: 'static>(&self) -> usize {
        let wanted = TypeId::of::<U>();
        match self.type_ids.iter().position(|t| *t == wanted) {
            Some(k) => k,
            None => panic!("`{}` is not part of this join", type_name::<U>()),
        }
    }

    /// The current entity's `U`.
    ///
    /// # Panics
    ///
    /// Panics if the join is done or `U` is not one of its columns.
    pub fn get<U: 'static>(&self) -> &U {
        assert!(!self.is_done(), "join is exhausted");
        let k = self.column_of::<U>();
        let stores = self.stores.as_ref().expect("stores are held until drop");
        let store = Q::column(stores, k)
            .as_any()
            .downcast_ref::<ComponentStore<U>>()
            .expect("column type matches its TypeId");
        &store.values()[self.rows[k]]
    }

    /// Mutable access to the current entity's `U`.
    ///
    /// # Panics
    ///
    /// Panics if the join is done or `U` is not one of its columns.
    pub fn get_mut<U: 'static>(&mut self) -> &mut U {
        assert!(!self.is_done(), "join is exhausted");
        let k = self.column_of::<U>();
        let row = self.rows[k];
        let stores = self.stores.as_mut().expect("stores are held until drop");
        let store = Q::column_mut(stores, k)
            .as_any_mut()
            .downcast_mut::<ComponentStore<U>>()
            .expect("column type matches its TypeId");
        &mut store.values_mut()[row]
    }

    /// Mutable references to every component of the current entity, in
    /// tuple order.
    ///
    /// # Panics
    ///
    /// Panics if the join is done.
    pub fn components(&mut self) -> Q::Item<'_> {
        assert!(!self.is_done(), "join is exhausted");
        let stores = self.stores.as_mut().expect("stores are held until drop");
        Q::fetch(stores, &self.rows)
    }

    /// Owner of a reference obtained from one of this join's columns.
    pub fn entity_of<U: 'static>(&self, value: &U) -> EntityId {
        let k = self.column_of::<U>();
        let stores = self.stores.as_ref().expect("stores are held until drop");
        Q::column(stores, k)
            .as_any()
            .downcast_ref::<ComponentStore<U>>()
            .expect("column type matches its TypeId")
            .entity_of(value)
    }

    /// Run `f` on every remaining match, advancing after each call.
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, Q::Item<'_>),
    {
        while !self.is_done() {
            let id = self.current;
            f(id, self.components());
            self.advance();
        }
    }

    /// Ids of every remaining match. Leaves the join done.
    pub fn entities(&mut self) -> Vec<EntityId> {
        let mut out = Vec::new();
        while !self.is_done() {
            out.push(self.current);
            self.advance();
        }
        out
    }

    /// The world this join iterates.
    pub fn world(&self) -> &'w World {
        self.world
    }
}

impl<Q: Query> Drop for Join<'_, Q> {
    fn drop(&mut self) {
        if let Some(stores) = self.stores.take() {
            Q::check_in(self.world, &self.slots, stores);
        }
        self.world.end_join();
    }
}

impl<Q: Query> fmt::Debug for Join<'_, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join")
            .field("components", &Q::type_names())
            .field("current", &self.current)
            .field("rows", &self.rows)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// World::query
// ---------------------------------------------------------------------------

impl World {
    /// Start a join over the component types in `Q`.
    ///
    /// ```
    /// # use stria_ecs::prelude::*;
    /// # struct Hp(i32);
    /// let world = World::new();
    /// let e = world.create();
    /// world.insert_component(e.id(), Hp(3));
    /// assert_eq!(world.query::<(Hp,)>().entities(), vec![e.id()]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a type twice or a store of `Q` is already held by
    /// another join.
    pub fn query<Q: Query>(&self) -> Join<'_, Q> {
        Join::new(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::EcsError;

    #[derive(Debug, PartialEq)]
    struct A(u64);
    #[derive(Debug, PartialEq)]
    struct B(u64);
    #[derive(Debug, PartialEq)]
    struct C(u64);

    fn spawn(world: &World, n: usize) -> Vec<Entity> {
        (0..n).map(|_| world.create()).collect()
    }

    #[test]
    fn three_way_join_finds_the_common_id() {
        let world = World::new();
        let es = spawn(&world, 10);
        for i in [1, 3, 5, 7] {
            world.insert_component(es[i].id(), A(i as u64));
        }
        for i in [3, 5, 9] {
            world.insert_component(es[i].id(), B(i as u64));
        }
        for i in [3, 7, 9] {
            world.insert_component(es[i].id(), C(i as u64));
        }
        let mut join = world.query::<(A, B, C)>();
        assert_eq!(join.entity(), es[3].id());
        let (a, b, c) = join.components();
        assert_eq!((a.0, b.0, c.0), (3, 3, 3));
        join.advance();
        assert!(join.is_done());
    }

    #[test]
    fn two_way_join_is_the_intersection() {
        let world = World::new();
        let es = spawn(&world, 20);
        for e in es.iter().step_by(2) {
            world.insert_component(e.id(), A(0));
        }
        for e in es.iter().step_by(3) {
            world.insert_component(e.id(), B(0));
        }
        let expected: Vec<EntityId> = es.iter().step_by(6).map(Entity::id).collect();
        assert_eq!(world.query::<(A, B)>().entities(), expected);
        assert_eq!(world.query::<(B, A)>().entities(), expected);
    }

    #[test]
    fn single_column_join_visits_every_row() {
        let world = World::new();
        let es = spawn(&world, 4);
        for e in &es {
            world.insert_component(e.id(), A(e.id().to_raw()));
        }
        let mut seen = Vec::new();
        world.query::<(A,)>().for_each(|id, (a,)| {
            assert_eq!(a.0, id.to_raw());
            seen.push(id);
        });
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn empty_join_is_done_immediately() {
        let world = World::new();
        let es = spawn(&world, 3);
        world.insert_component(es[0].id(), A(0));
        world.insert_component(es[1].id(), B(0));
        assert!(world.query::<(A, B)>().is_done());
        assert!(world.query::<(C,)>().is_done());
    }

    #[test]
    fn writes_through_the_join_persist() {
        let world = World::new();
        let es = spawn(&world, 2);
        for e in &es {
            world.insert_component(e.id(), A(1));
            world.insert_component(e.id(), B(10));
        }
        let mut join = world.query::<(A, B)>();
        while !join.is_done() {
            let b = join.get::<B>().0;
            join.get_mut::<A>().0 += b;
            join.advance();
        }
        drop(join);
        for e in &es {
            assert_eq!(*world.get_component::<A>(e.id()).unwrap(), A(11));
        }
    }

    #[test]
    fn entity_of_inside_a_join() {
        let world = World::new();
        let es = spawn(&world, 3);
        for e in &es {
            world.insert_component(e.id(), A(0));
        }
        let mut join = world.query::<(A,)>();
        join.advance();
        let id = join.entity_of(join.get::<A>());
        assert_eq!(id, es[1].id());
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn repeated_type_panics() {
        let world = World::new();
        let _join = world.query::<(A, A)>();
    }

    #[test]
    #[should_panic(expected = "not part of this join")]
    fn get_of_a_foreign_type_panics() {
        let world = World::new();
        let e = world.create();
        world.insert_component(e.id(), A(0));
        let join = world.query::<(A,)>();
        join.get::<B>();
    }

    #[test]
    fn destroy_during_a_join_is_deferred() {
        let world = World::new();
        let mut es = spawn(&world, 3);
        for e in &es {
            world.insert_component(e.id(), A(0));
        }
        let victim = es.remove(1);
        let victim_id = victim.id();
        {
            let mut join = world.query::<(A,)>();
            drop(victim);
            assert_eq!(world.pending_destroys(), 1);
            assert_eq!(join.entities().len(), 3);
        }
        assert_eq!(world.pending_destroys(), 0);
        assert!(!world.has_component::<A>(victim_id));
        assert_eq!(world.component_count::<A>(), 2);
    }

    #[test]
    fn structural_change_to_a_joined_store_is_rejected() {
        let world = World::new();
        let es = spawn(&world, 2);
        world.insert_component(es[0].id(), A(0));
        let _join = world.query::<(A,)>();
        let err = world.try_insert_component(es[1].id(), A(1)).unwrap_err();
        assert!(matches!(err, EcsError::JoinActive { .. }));
        let err = world.try_remove_component::<A>(es[0].id()).unwrap_err();
        assert!(matches!(err, EcsError::JoinActive { .. }));
        // Stores outside the join are untouched by it.
        world.insert_component(es[1].id(), B(1));
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn insert_into_a_joined_store_panics() {
        let world = World::new();
        let e = world.create();
        let _join = world.query::<(A,)>();
        world.insert_component(e.id(), A(1));
    }

    #[test]
    fn disjoint_joins_can_nest() {
        let world = World::new();
        let e = world.create();
        world.insert_component(e.id(), A(0));
        world.insert_component(e.id(), B(0));
        let outer = world.query::<(A,)>();
        let inner = world.query::<(B,)>();
        assert!(!outer.is_done() && !inner.is_done());
        drop(inner);
        assert!(world.is_joining());
        drop(outer);
        assert!(!world.is_joining());
    }

    #[test]
    fn join_dropped_under_a_held_borrow_parks_its_stores() {
        let world = World::new();
        let e = world.create();
        world.insert_component(e.id(), A(1));
        world.insert_component(e.id(), B(2));

        let join = world.query::<(A,)>();
        let b = world.get_component::<B>(e.id()).unwrap();
        drop(join);
        assert_eq!(*b, B(2));
        drop(b);

        assert_eq!(*world.get_component::<A>(e.id()).unwrap(), A(1));
        assert_eq!(world.query::<(A, B)>().entities(), vec![e.id()]);
        world.remove_component::<A>(e.id());
        assert_eq!(world.component_count::<A>(), 0);
    }

    #[test]
    fn store_survives_a_panicking_join() {
        let world = World::new();
        let e = world.create();
        world.insert_component(e.id(), A(1));
        world.insert_component(e.id(), B(2));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _b = world.get_component::<B>(e.id()).unwrap();
            let mut join = world.query::<(A,)>();
            join.get_mut::<A>().0 = 5;
            panic!("system failed");
        }));
        assert!(result.is_err());

        assert!(!world.is_joining());
        assert_eq!(*world.get_component::<A>(e.id()).unwrap(), A(5));
    }

    #[test]
    #[should_panic(expected = "in use by an active join")]
    fn overlapping_joins_panic() {
        let world = World::new();
        let _outer = world.query::<(A, B)>();
        let _inner = world.query::<(B,)>();
    }
}
