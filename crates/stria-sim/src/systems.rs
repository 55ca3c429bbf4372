//! Game systems for the headless enemy simulation.
//!
//! Enemy handles are owned by a shared [`Roster`]. A system that decides an
//! enemy must go takes its handle out of the roster and queues it for
//! destruction, so the components disappear when the tick's commands are
//! applied.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::Rng;
use rand_pcg::Pcg64;
use serde::Serialize;
use stria_ecs::prelude::*;
use tracing::{debug, info};

use crate::components::{Enemy, Hp, LifeTime, Position, RunStraightAi, Speed};
use crate::config::SimConfig;

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Running totals of what happened to enemies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub spawned: u64,
    pub expired: u64,
    pub killed: u64,
}

/// Owner of every live enemy handle.
#[derive(Debug, Default)]
pub struct Roster {
    handles: BTreeMap<EntityId, Entity>,
    stats: Stats,
}

pub type SharedRoster = Rc<RefCell<Roster>>;

impl Roster {
    pub fn adopt(&mut self, entity: Entity) {
        self.stats.spawned += 1;
        self.handles.insert(entity.id(), entity);
    }

    /// Hand over the handle of `id`, if the roster still owns it.
    pub fn release(&mut self, id: EntityId) -> Option<Entity> {
        self.handles.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.handles.keys().copied().collect()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Rolled parameters of one enemy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemySpec {
    pub position: Position,
    pub speed: f32,
    pub hp: i32,
    pub lifetime: u32,
}

impl EnemySpec {
    pub fn roll(rng: &mut Pcg64, config: &SimConfig) -> Self {
        Self {
            position: Position {
                x: 0.0,
                y: rng.gen_range(-10.0f32..10.0),
            },
            speed: rng.gen_range(config.speed_min..config.speed_max),
            hp: config.enemy_hp,
            lifetime: rng.gen_range(config.lifetime_min..=config.lifetime_max),
        }
    }
}

/// Create an enemy with its full component set.
pub fn spawn_enemy(world: &World, spec: EnemySpec) -> Entity {
    let enemy = world.create();
    let id = enemy.id();
    world.insert_component(id, spec.position);
    world.insert_component(id, Speed { speed: spec.speed });
    world.insert_component(id, Hp::new(spec.hp));
    world.insert_component(id, LifeTime {
        frames_left: spec.lifetime,
    });
    world.insert_component(id, Enemy);
    world.insert_component(id, RunStraightAi);
    enemy
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register every game system on `tick_loop`, in execution order.
///
/// Independent: `spawner`, `census`. Joined: `run_straight`, `lifetime`,
/// `wither`.
pub fn install(
    tick_loop: &mut TickLoop,
    config: &SimConfig,
    mut rng: Pcg64,
    roster: SharedRoster,
) {
    // -- spawner --------------------------------------------------------------
    let spawn_every = config.spawn_every;
    let spawn_config = config.clone();
    let spawn_roster = Rc::clone(&roster);
    let mut ticks = 0u64;
    tick_loop.add_independent_system("spawner", move |_world, cmds| {
        ticks += 1;
        if spawn_every == 0 || ticks % spawn_every != 0 {
            return;
        }
        let spec = EnemySpec::roll(&mut rng, &spawn_config);
        let roster = Rc::clone(&spawn_roster);
        cmds.custom("spawn enemy", move |world| {
            let enemy = spawn_enemy(world, spec);
            debug!(entity = %enemy.id(), lifetime = spec.lifetime, "enemy spawned");
            roster.borrow_mut().adopt(enemy);
        });
    });

    // -- census ---------------------------------------------------------------
    let census_every = config.census_every;
    let census_roster = Rc::clone(&roster);
    let mut ticks = 0u64;
    tick_loop.add_independent_system("census", move |world, _cmds| {
        ticks += 1;
        if census_every == 0 || ticks % census_every != 0 {
            return;
        }
        let roster = census_roster.borrow();
        let stats = roster.stats();
        info!(
            tick = ticks,
            alive = roster.len(),
            enemies = world.component_count::<Enemy>(),
            spawned = stats.spawned,
            expired = stats.expired,
            killed = stats.killed,
            "census"
        );
    });

    // -- run_straight ---------------------------------------------------------
    let dt = config.fixed_dt as f32;
    tick_loop.add_system_with::<(Position, Speed, RunStraightAi), _, _, _>(
        "run_straight",
        move |_world| dt,
        |join, dt, _cmds| {
            let (position, speed, _) = join.components();
            position.x += speed.speed * *dt;
        },
    );

    // -- lifetime -------------------------------------------------------------
    let lifetime_roster = Rc::clone(&roster);
    tick_loop.add_system::<(LifeTime,), _>("lifetime", move |join, cmds| {
        let life = join.get_mut::<LifeTime>();
        life.frames_left = life.frames_left.saturating_sub(1);
        if life.frames_left > 0 {
            return;
        }
        let id = join.entity();
        let mut roster = lifetime_roster.borrow_mut();
        if let Some(entity) = roster.release(id) {
            roster.stats.expired += 1;
            debug!(entity = %id, "lifetime over");
            cmds.destroy(entity);
        }
    });

    // -- wither ---------------------------------------------------------------
    tick_loop.add_system::<(Hp, Enemy), _>("wither", move |join, cmds| {
        let hp = join.get_mut::<Hp>();
        hp.hp -= 1;
        if !hp.is_dead() {
            return;
        }
        let id = join.entity();
        let mut roster = roster.borrow_mut();
        if let Some(entity) = roster.release(id) {
            roster.stats.killed += 1;
            debug!(entity = %id, "enemy withered away");
            cmds.destroy(entity);
        }
    });
}
