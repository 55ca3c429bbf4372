//! Fixed-timestep system runner.
//!
//! The [`TickLoop`] owns a [`World`] and two ordered lists of systems. Each
//! tick:
//!
//! 1. Every *independent* system runs once, in registration order.
//! 2. Every *joined* system runs once per entity matching its [`Query`], in
//!    registration order, visiting entities in ascending id order.
//! 3. The shared [`Commands`] queue is applied to the world (FIFO).
//! 4. Destructions postponed by the joins are carried out.
//! 5. The tick counter advances.
//!
//! A joined system may also carry a precompute step that runs once per tick,
//! before its entity loop, and whose result is handed to every invocation
//! that tick.
//!
//! # Example
//!
//! ```
//! use stria_ecs::prelude::*;
//!
//! struct Pos(f64);
//! struct Vel(f64);
//!
//! let world = World::new();
//! let e = world.create();
//! world.insert_component(e.id(), Pos(0.0));
//! world.insert_component(e.id(), Vel(2.0));
//!
//! let mut tick_loop = TickLoop::new(world, TickConfig::default());
//! tick_loop.add_system_with::<(Pos, Vel), _, _, _>(
//!     "movement",
//!     |_world| 0.5_f64,
//!     |join, dt, _cmds| {
//!         let (pos, vel) = join.components();
//!         pos.0 += vel.0 * *dt;
//!     },
//! );
//! tick_loop.run_ticks(4);
//!
//! assert_eq!(tick_loop.tick_count(), 4);
//! assert_eq!(tick_loop.world().get_component::<Pos>(e.id()).unwrap().0, 4.0);
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::command::{ApplyReport, Commands};
use crate::query::{Join, Query};
use crate::world::World;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep tick loop.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
}

impl Default for TickConfig {
    /// 60 Hz.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and bookkeeping for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick.
    pub total_time: Duration,
    /// Time spent applying commands.
    pub command_apply_time: Duration,
    /// Outcome of the command apply.
    pub report: ApplyReport,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

type SystemFn = Box<dyn FnMut(&World, &mut Commands)>;

struct RegisteredSystem {
    name: String,
    run: SystemFn,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// Drives a [`World`] forward one tick at a time.
///
/// Execution is deterministic: system order is fixed at registration, joins
/// visit entities in id order and commands apply in FIFO order. Randomness
/// belongs in seeded generators owned by the systems.
pub struct TickLoop {
    world: World,
    commands: Commands,
    /// Run once per tick, before any joined system.
    independent: Vec<RegisteredSystem>,
    /// Run once per matching entity per tick.
    joined: Vec<RegisteredSystem>,
    tick_counter: u64,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    /// Create a tick loop around `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(world: World, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            commands: Commands::new(),
            independent: Vec::new(),
            joined: Vec::new(),
            tick_counter: 0,
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    fn assert_unique(&self, name: &str) {
        assert!(
            !self
                .independent
                .iter()
                .chain(&self.joined)
                .any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
    }

    /// Register a system that runs once per tick with no entity binding.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_independent_system<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&World, &mut Commands) + 'static,
    {
        self.assert_unique(name);
        debug!(system = name, kind = "independent", "system registered");
        self.independent.push(RegisteredSystem {
            name: name.to_owned(),
            run: Box::new(func),
        });
    }

    /// Register a system that runs once for every entity holding all of `Q`.
    ///
    /// `func` receives the join positioned on the current entity. It must not
    /// advance the join itself.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system<Q, F>(&mut self, name: &str, mut func: F)
    where
        Q: Query,
        F: FnMut(&mut Join<'_, Q>, &mut Commands) + 'static,
    {
        self.assert_unique(name);
        debug!(system = name, components = ?Q::type_names(), "system registered");
        let run = move |world: &World, cmds: &mut Commands| {
            let mut join = world.query::<Q>();
            while !join.is_done() {
                func(&mut join, cmds);
                join.advance();
            }
        };
        self.joined.push(RegisteredSystem {
            name: name.to_owned(),
            run: Box::new(run),
        });
    }

    /// Like [`add_system`](Self::add_system), with a `precompute` step run
    /// once per tick whose result is passed to every invocation of `func`.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system_with<Q, P, Pre, F>(
        &mut self,
        name: &str,
        mut precompute: Pre,
        mut func: F,
    ) where
        Q: Query,
        P: 'static,
        Pre: FnMut(&World) -> P + 'static,
        F: FnMut(&mut Join<'_, Q>, &P, &mut Commands) + 'static,
    {
        self.assert_unique(name);
        debug!(
            system = name,
            components = ?Q::type_names(),
            precompute = true,
            "system registered"
        );
        let run = move |world: &World, cmds: &mut Commands| {
            let shared = precompute(world);
            let mut join = world.query::<Q>();
            while !join.is_done() {
                func(&mut join, &shared, cmds);
                join.advance();
            }
        };
        self.joined.push(RegisteredSystem {
            name: name.to_owned(),
            run: Box::new(run),
        });
    }

    /// Execute one tick.
    pub fn tick(&mut self) {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.system_count());

        for system in self.independent.iter_mut().chain(self.joined.iter_mut()) {
            let start = Instant::now();
            self.commands.set_issuer(Some(&system.name));
            (system.run)(&self.world, &mut self.commands);
            system_times.push((system.name.clone(), start.elapsed()));
        }
        self.commands.set_issuer(None);

        let apply_start = Instant::now();
        let report = self.commands.apply(&self.world);
        let command_apply_time = apply_start.elapsed();
        self.world.flush();

        self.tick_counter += 1;
        trace!(
            tick = self.tick_counter,
            applied = report.success_count,
            failed = report.failed_count,
            "tick complete"
        );

        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            command_apply_time,
            report,
        };
    }

    /// Run `count` ticks. Returns the number of commands applied
    /// successfully across all of them.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut applied = 0u64;
        for _ in 0..count {
            self.tick();
            applied += self.last_diagnostics.report.success_count as u64;
        }
        applied
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds, computed as `tick_count * fixed_dt`.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    /// The fixed time step in seconds per tick.
    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    /// The world being simulated.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Give the world back, dropping every system.
    pub fn into_world(self) -> World {
        self.world
    }

    /// Commands queued outside of a tick are applied with the next one.
    pub fn commands(&mut self) -> &mut Commands {
        &mut self.commands
    }

    /// The number of registered systems.
    pub fn system_count(&self) -> usize {
        self.independent.len() + self.joined.len()
    }

    /// System names in execution order: independent, then joined.
    pub fn system_names(&self) -> Vec<&str> {
        self.independent
            .iter()
            .chain(&self.joined)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Diagnostics from the last tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("tick_counter", &self.tick_counter)
            .field("config", &self.config)
            .field("systems", &self.system_names())
            .field("world", &self.world)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
