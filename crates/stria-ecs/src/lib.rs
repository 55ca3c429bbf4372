//! Stria ECS -- sorted columnar Entity Component System.
//!
//! Every component type lives in its own store: two parallel sequences of
//! owning entity ids and values, sorted by id. Systems iterate entities that
//! hold a set of component types through a leapfrog join over those sorted
//! sequences. Entity ids are never reused, so there are no generations.
//!
//! An [`Entity`](entity::Entity) handle owns its components through a
//! type-erased cleanup ledger: dropping the handle removes every component
//! attached to its id, whatever the types.
//!
//! # Quick Start
//!
//! ```
//! use stria_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let world = World::new();
//! let entity = world.create();
//! world.insert_component(entity.id(), Position { x: 0.0, y: 0.0 });
//! world.insert_component(entity.id(), Velocity { dx: 1.0, dy: 0.0 });
//!
//! world.query::<(Position, Velocity)>().for_each(|_, (pos, vel)| {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! });
//! assert_eq!(
//!     *world.get_component::<Position>(entity.id()).unwrap(),
//!     Position { x: 1.0, y: 0.0 }
//! );
//!
//! drop(entity);
//! assert_eq!(world.component_count::<Position>(), 0);
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod component;
pub mod entity;
mod ledger;
pub mod query;
pub mod store;
pub mod tick;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// The panicking entry points (`insert_component`, `remove_component`) treat
/// every variant as a contract violation; the `try_` variants return them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity already holds a component of this type.
    #[error("{operation}: entity {entity} already has a `{component}` component")]
    DuplicateComponent {
        operation: &'static str,
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The entity holds no component of this type.
    #[error("{operation}: entity {entity} has no `{component}` component")]
    MissingComponent {
        operation: &'static str,
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The id is the invalid sentinel or was never issued.
    #[error("{operation}: {entity} is not an issued entity id (component `{component}`)")]
    InvalidEntity {
        operation: &'static str,
        entity: entity::EntityId,
        component: &'static str,
    },

    /// The store is checked out by an active join.
    #[error("{operation}: the `{component}` store is in use by an active join")]
    JoinActive {
        operation: &'static str,
        component: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::{ApplyReport, Commands};
    pub use crate::component::{ComponentRegistry, ComponentTypeId};
    pub use crate::entity::{Entity, EntityId, IdSpace};
    pub use crate::query::{Join, Query};
    pub use crate::store::ComponentStore;
    pub use crate::tick::{TickConfig, TickDiagnostics, TickLoop};
    pub use crate::world::World;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    fn spawn(world: &World, n: usize) -> Vec<Entity> {
        (0..n).map(|_| world.create()).collect()
    }

    fn assert_store_invariant<T: 'static>(world: &World) {
        let store = world.store::<T>();
        assert!(store.ids().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.ids().len(), store.values().len());
    }

    // -- store invariants ----------------------------------------------------

    #[test]
    fn stores_stay_sorted_under_mixed_operations() {
        let world = World::new();
        let mut es = spawn(&world, 12);
        for i in [7, 2, 11, 0, 5, 9, 3] {
            world.insert_component(es[i].id(), Health(i as u32));
        }
        world.remove_component::<Health>(es[5].id());
        drop(es.remove(9));
        world.insert_component(es[4].id(), Health(4));
        assert_store_invariant::<Health>(&world);
        assert_eq!(world.component_count::<Health>(), 6);
    }

    #[test]
    #[should_panic(expected = "already has a")]
    fn attaching_twice_is_a_contract_violation() {
        let world = World::new();
        let e = world.create();
        world.insert_component(e.id(), Health(1));
        world.insert_component(e.id(), Health(2));
    }

    #[test]
    #[should_panic(expected = "has no")]
    fn detaching_a_missing_component_is_a_contract_violation() {
        let world = World::new();
        let e = world.create();
        world.remove_component::<Health>(e.id());
    }

    #[test]
    fn attach_get_detach_round_trip() {
        let world = World::new();
        let e = world.create();
        let stored = world
            .insert_component(e.id(), Position { x: 1.0, y: 2.0 })
            .clone();
        assert_eq!(stored, Position { x: 1.0, y: 2.0 });
        assert_eq!(
            *world.get_component::<Position>(e.id()).unwrap(),
            Position { x: 1.0, y: 2.0 }
        );
        world.remove_component::<Position>(e.id());
        assert!(world.get_component::<Position>(e.id()).is_none());
    }

    // -- joins ---------------------------------------------------------------

    #[test]
    fn two_way_join_visits_the_intersection_in_order() {
        let world = World::new();
        let es = spawn(&world, 30);
        let with_pos: Vec<usize> = (0..30).filter(|i| i % 3 != 1).collect();
        let with_vel: Vec<usize> = (0..30).filter(|i| i % 4 != 0).collect();
        for &i in with_pos.iter().rev() {
            world.insert_component(es[i].id(), Position { x: i as f32, y: 0.0 });
        }
        for &i in &with_vel {
            world.insert_component(es[i].id(), Velocity { dx: 1.0, dy: 0.0 });
        }

        let expected: Vec<EntityId> = with_pos
            .iter()
            .filter(|i| with_vel.contains(i))
            .map(|&i| es[i].id())
            .collect();
        let visited = world.query::<(Position, Velocity)>().entities();
        assert_eq!(visited, expected);
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn three_way_join_matches_only_the_shared_entity() {
        let world = World::new();
        let es = spawn(&world, 10);
        for i in [1, 3, 5, 7] {
            world.insert_component(es[i].id(), Position { x: 0.0, y: 0.0 });
        }
        for i in [3, 5, 9] {
            world.insert_component(es[i].id(), Velocity { dx: 0.0, dy: 0.0 });
        }
        for i in [3, 7, 9] {
            world.insert_component(es[i].id(), Health(0));
        }
        assert_eq!(
            world.query::<(Position, Velocity, Health)>().entities(),
            vec![es[3].id()]
        );
    }

    #[test]
    fn single_type_join_is_a_linear_scan() {
        let world = World::new();
        let es = spawn(&world, 5);
        for e in es.iter().rev() {
            world.insert_component(e.id(), Health(0));
        }
        let ids: Vec<EntityId> = es.iter().map(Entity::id).collect();
        assert_eq!(world.query::<(Health,)>().entities(), ids);
    }

    #[test]
    fn empty_join_never_invokes_the_system() {
        let world = World::new();
        let _e = world.create();
        let calls = Rc::new(RefCell::new(0));
        let mut tl = TickLoop::new(world, TickConfig::default());
        let c = Rc::clone(&calls);
        tl.add_system::<(Health,), _>("never", move |_, _| *c.borrow_mut() += 1);
        tl.run_ticks(3);
        assert_eq!(*calls.borrow(), 0);
    }

    // -- ownership and cleanup ----------------------------------------------

    #[test]
    fn destroying_an_entity_removes_all_its_components() {
        let world = World::new();
        let mut es = spawn(&world, 3);
        for e in &es {
            world.insert_component(e.id(), Position { x: 0.0, y: 0.0 });
            world.insert_component(e.id(), Health(1));
        }
        let victim = es.remove(1);
        let id = victim.id();
        let (pos_before, hp_before) = (
            world.component_count::<Position>(),
            world.component_count::<Health>(),
        );

        world.destroy(victim);

        assert!(world.get_component::<Position>(id).is_none());
        assert!(world.get_component::<Health>(id).is_none());
        assert_eq!(world.component_count::<Position>(), pos_before - 1);
        assert_eq!(world.component_count::<Health>(), hp_before - 1);
        assert_eq!(world.ledger_len(), 4);
    }

    #[test]
    fn moving_a_handle_transfers_cleanup() {
        let world = World::new();
        let mut h = world.create();
        let id = h.id();
        world.insert_component(id, Health(3));

        let h2 = h.take();
        assert!(!h.is_valid());
        assert!(h2.is_valid());

        drop(h);
        assert!(world.has_component::<Health>(id));

        drop(h2);
        assert!(!world.has_component::<Health>(id));
        assert_eq!(world.ledger_len(), 0);
    }

    #[test]
    fn teardown_with_live_handles_is_clean() {
        let world = World::new();
        let es = spawn(&world, 4);
        for e in &es {
            world.insert_component(e.id(), Health(1));
        }
        drop(world);
        drop(es);
    }

    // -- ticks ---------------------------------------------------------------

    #[test]
    fn independent_side_effects_precede_joined_ones() {
        let world = World::new();
        let es = spawn(&world, 2);
        for e in &es {
            world.insert_component(e.id(), Health(0));
        }

        let ticks_seen = Rc::new(RefCell::new(0u32));
        let observed: Rc<RefCell<Vec<u32>>> = Rc::default();

        let mut tl = TickLoop::new(world, TickConfig::default());
        let t = Rc::clone(&ticks_seen);
        tl.add_independent_system("r1", move |_, _| *t.borrow_mut() += 1);
        let (t, o) = (Rc::clone(&ticks_seen), Rc::clone(&observed));
        tl.add_system::<(Health,), _>("r2", move |_, _| o.borrow_mut().push(*t.borrow()));

        tl.tick();
        assert_eq!(*observed.borrow(), vec![1, 1]);
        tl.tick();
        assert_eq!(*observed.borrow(), vec![1, 1, 2, 2]);
    }

    #[test]
    fn movement_over_many_ticks_is_deterministic() {
        fn run() -> Vec<(f32, f32)> {
            let world = World::new();
            let es = spawn(&world, 8);
            for (i, e) in es.iter().enumerate() {
                world.insert_component(e.id(), Position { x: 0.0, y: 0.0 });
                if i % 2 == 0 {
                    world.insert_component(e.id(), Velocity { dx: i as f32, dy: 1.0 });
                }
            }
            let mut tl = TickLoop::new(world, TickConfig::default());
            tl.add_system::<(Position, Velocity), _>("move", |join, _| {
                let (pos, vel) = join.components();
                pos.x += vel.dx;
                pos.y += vel.dy;
            });
            tl.run_ticks(100);
            let store = tl.world().store::<Position>();
            let out = store.values().iter().map(|p| (p.x, p.y)).collect();
            drop(store);
            drop(es);
            out
        }

        let a = run();
        assert_eq!(a, run());
        assert_eq!(a[2], (200.0, 100.0));
        assert_eq!(a[1], (0.0, 0.0));
    }
}
