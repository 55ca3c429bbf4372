//! The headless simulation driver.

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Serialize;
use stria_ecs::prelude::*;
use tracing::info;

use crate::components::{Enemy, Map, Position};
use crate::config::{ConfigError, SimConfig};
use crate::systems::{self, EnemySpec, SharedRoster, Stats};

/// End-of-run report, printed as JSON by the binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub ticks: u64,
    pub sim_time: f64,
    pub stats: Stats,
    pub alive: usize,
    /// Live `Enemy` components. Always equal to `alive`.
    pub enemies: usize,
    /// Largest x reached by a live enemy.
    pub furthest_x: f32,
    pub failed_commands: u64,
}

/// A world populated with enemies and the systems that drive them.
pub struct Simulation {
    tick_loop: TickLoop,
    roster: SharedRoster,
    /// The level itself; lives as long as the simulation.
    map: Entity,
    config: SimConfig,
    failed_commands: u64,
}

impl Simulation {
    /// Build the world, spawn the initial enemies and install the systems.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let world = World::new();
        let map = world.create();
        world.insert_component(map.id(), Map);
        world.insert_component(map.id(), Position::default());

        let mut rng = Pcg64::seed_from_u64(config.seed);
        let roster: SharedRoster = Rc::new(RefCell::new(Default::default()));
        for _ in 0..config.initial_enemies {
            let spec = EnemySpec::roll(&mut rng, &config);
            roster.borrow_mut().adopt(systems::spawn_enemy(&world, spec));
        }

        let mut tick_loop = TickLoop::new(
            world,
            TickConfig {
                fixed_dt: config.fixed_dt,
            },
        );
        systems::install(&mut tick_loop, &config, rng, Rc::clone(&roster));
        info!(
            seed = config.seed,
            enemies = config.initial_enemies,
            systems = ?tick_loop.system_names(),
            "simulation ready"
        );

        Ok(Self {
            tick_loop,
            roster,
            map,
            config,
            failed_commands: 0,
        })
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        self.tick_loop.tick();
        self.failed_commands += self.tick_loop.last_diagnostics().report.failed_count as u64;
    }

    /// Run the configured number of ticks and report.
    pub fn run(&mut self) -> Summary {
        for _ in 0..self.config.ticks {
            self.step();
        }
        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            alive = summary.alive,
            spawned = summary.stats.spawned,
            "simulation finished"
        );
        summary
    }

    pub fn summary(&self) -> Summary {
        let world = self.tick_loop.world();
        let mut furthest_x = 0.0f32;
        world
            .query::<(Position, Enemy)>()
            .for_each(|_, (position, _)| furthest_x = furthest_x.max(position.x));

        let roster = self.roster.borrow();
        Summary {
            ticks: self.tick_loop.tick_count(),
            sim_time: self.tick_loop.sim_time(),
            stats: roster.stats(),
            alive: roster.len(),
            enemies: world.component_count::<Enemy>(),
            furthest_x,
            failed_commands: self.failed_commands,
        }
    }

    pub fn world(&self) -> &World {
        self.tick_loop.world()
    }

    pub fn map(&self) -> EntityId {
        self.map.id()
    }

    /// Ids of the live enemies, ascending.
    pub fn enemies(&self) -> Vec<EntityId> {
        self.roster.borrow().ids()
    }
}
