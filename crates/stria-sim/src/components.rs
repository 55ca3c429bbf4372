//! Common game components.
//!
//! Plain data. The tags carry no fields and only exist to be joined on.

use serde::{Deserialize, Serialize};

/// Movement speed in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub speed: f32,
}

/// Hit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hp {
    pub hp: i32,
    pub max_hp: i32,
}

impl Hp {
    /// Full health: `hp == max_hp == value`.
    pub fn new(value: i32) -> Self {
        Self {
            hp: value,
            max_hp: value,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }
}

/// Remaining lifetime in logical frames (ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeTime {
    pub frames_left: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

// -- Tags ---------------------------------------------------------------------

/// Set on every targetable enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Enemy;

/// Set on the map the player is playing on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Map;

/// Moves along +x at its [`Speed`] and never turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStraightAi;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_new_fills_both_fields() {
        let hp = Hp::new(30);
        assert_eq!(hp.hp, 30);
        assert_eq!(hp.max_hp, 30);
        assert!(!hp.is_dead());
        assert!(Hp { hp: 0, max_hp: 30 }.is_dead());
    }
}
