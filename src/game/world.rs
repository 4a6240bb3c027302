//! Static world data: collision rectangles, goal zones, team spawns
//!
//! Loaded once at startup and shared immutably across the process.

use std::path::Path;

use serde::Deserialize;

use crate::ws::protocol::Team;

/// Axis-aligned collision rectangle
#[derive(Debug, Clone, Deserialize)]
pub struct RectCollider {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectCollider {
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// Closest point on the rectangle to an arbitrary point
    pub fn closest_point(&self, px: f64, py: f64) -> (f64, f64) {
        (
            px.clamp(self.x, self.x + self.width),
            py.clamp(self.y, self.y + self.height),
        )
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Goal zone; a ball centre inside it scores for the opposing team
#[derive(Debug, Clone, Deserialize)]
pub struct GoalZone {
    pub name: String,
    pub team: Team,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl GoalZone {
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

#[derive(Debug, Deserialize)]
struct CollisionFile {
    collisions: Vec<RectCollider>,
}

#[derive(Debug, Deserialize)]
struct GoalFile {
    goals: Vec<GoalZone>,
}

/// Immutable world geometry
#[derive(Debug)]
pub struct StaticWorld {
    pub colliders: Vec<RectCollider>,
    pub goals: Vec<GoalZone>,
}

impl StaticWorld {
    /// Load world geometry from the two JSON data files
    pub fn load(collision_path: &Path, goal_path: &Path) -> Result<Self, WorldError> {
        let collisions: CollisionFile =
            serde_json::from_str(&std::fs::read_to_string(collision_path)?)?;
        let goals: GoalFile = serde_json::from_str(&std::fs::read_to_string(goal_path)?)?;

        Ok(Self {
            colliders: collisions.collisions,
            goals: goals.goals,
        })
    }

    /// Build a world directly from parts (tests and tools)
    pub fn from_parts(colliders: Vec<RectCollider>, goals: Vec<GoalZone>) -> Self {
        Self { colliders, goals }
    }

    /// The goal zone containing a point, if any
    pub fn goal_at(&self, x: f64, y: f64) -> Option<&GoalZone> {
        self.goals.iter().find(|g| g.contains(x, y))
    }

    /// Whether a point lies inside any collider
    pub fn point_in_collider(&self, x: f64, y: f64) -> bool {
        self.colliders.iter().any(|c| c.contains(x, y))
    }
}

/// World loading errors
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("failed to read world data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse world data file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Indexed red spawn points, defending the left goal
pub const RED_SPAWNS: [(f64, f64); 6] = [
    (880.0, 800.0),
    (660.0, 500.0),
    (660.0, 1100.0),
    (440.0, 300.0),
    (440.0, 1300.0),
    (280.0, 800.0),
];

/// Indexed blue spawn points, defending the right goal
pub const BLUE_SPAWNS: [(f64, f64); 6] = [
    (2640.0, 800.0),
    (2860.0, 500.0),
    (2860.0, 1100.0),
    (3080.0, 300.0),
    (3080.0, 1300.0),
    (3240.0, 800.0),
];

/// Where spectators are placed when joining an active match
pub const SPECTATOR_SPAWN: (f64, f64) = (1760.0, 120.0);

/// Spawn point for the nth player of a team (wraps past six)
pub fn team_spawn(team: Team, index: usize) -> (f64, f64) {
    match team {
        Team::Red => RED_SPAWNS[index % RED_SPAWNS.len()],
        Team::Blue => BLUE_SPAWNS[index % BLUE_SPAWNS.len()],
        _ => SPECTATOR_SPAWN,
    }
}

/// X coordinate a team's power shot aims at (the opposing goal mouth)
pub fn attack_target_x(team: Team) -> f64 {
    match team {
        Team::Red => 3400.0,
        _ => 120.0,
    }
}

/// Y coordinate of both goal mouths
pub const GOAL_MOUTH_Y: f64 = 800.0;
