//! Simulation configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! none at all) is fine. Command-line flags override individual fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a [`SimConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parameters of one headless simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the spawner's generator. Same seed, same run.
    pub seed: u64,
    /// Ticks to run.
    pub ticks: u64,
    /// Enemies present before the first tick.
    pub initial_enemies: u32,
    /// Spawn one enemy every this many ticks. 0 disables spawning.
    pub spawn_every: u64,
    /// Seconds per tick.
    pub fixed_dt: f64,
    /// Lifetime of a spawned enemy is drawn from `lifetime_min..=lifetime_max`.
    pub lifetime_min: u32,
    pub lifetime_max: u32,
    /// Hit points of a spawned enemy.
    pub enemy_hp: i32,
    /// Speed of a spawned enemy is drawn from `speed_min..speed_max`.
    pub speed_min: f32,
    pub speed_max: f32,
    /// Log a census line every this many ticks. 0 disables it.
    pub census_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            ticks: 600,
            initial_enemies: 16,
            spawn_every: 10,
            fixed_dt: 1.0 / 60.0,
            lifetime_min: 60,
            lifetime_max: 240,
            enemy_hp: 120,
            speed_min: 0.5,
            speed_max: 4.0,
            census_every: 60,
        }
    }
}

impl SimConfig {
    /// Read a config from a JSON file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: SimConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )));
        }
        if self.lifetime_min == 0 || self.lifetime_min > self.lifetime_max {
            return Err(ConfigError::Invalid(format!(
                "lifetime range {}..={} is empty or starts at zero",
                self.lifetime_min, self.lifetime_max
            )));
        }
        if !(self.speed_min.is_finite() && self.speed_max.is_finite())
            || self.speed_min >= self.speed_max
        {
            return Err(ConfigError::Invalid(format!(
                "speed range {}..{} is empty",
                self.speed_min, self.speed_max
            )));
        }
        if self.enemy_hp <= 0 {
            return Err(ConfigError::Invalid(format!(
                "enemy_hp must be positive, got {}",
                self.enemy_hp
            )));
        }
        Ok(())
    }
}
