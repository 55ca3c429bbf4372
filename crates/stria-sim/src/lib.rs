//! Stria Sim -- a headless enemy simulation on top of [`stria_ecs`].
//!
//! Enemies spawn at the left edge, run straight along +x, wither and expire.
//! The crate carries the common game components and the systems that use
//! them; every structural change goes through the tick's command queue.
//!
//! # Quick Start
//!
//! ```
//! use stria_sim::prelude::*;
//!
//! let config = SimConfig { ticks: 30, initial_enemies: 4, ..SimConfig::default() };
//! let mut sim = Simulation::new(config).unwrap();
//! let summary = sim.run();
//!
//! assert_eq!(summary.ticks, 30);
//! assert_eq!(summary.alive, summary.enemies);
//! ```

#![deny(unsafe_code)]

pub mod components;
pub mod config;
pub mod simulation;
pub mod systems;

/// Re-export the ECS crate for convenience.
pub use stria_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common simulation usage.
pub mod prelude {
    pub use stria_ecs::prelude::*;

    pub use crate::components::{Enemy, Hp, LifeTime, Map, Position, RunStraightAi, Speed};
    pub use crate::config::{ConfigError, SimConfig};
    pub use crate::simulation::{Simulation, Summary};
    pub use crate::systems::{EnemySpec, Roster, Stats};
}
