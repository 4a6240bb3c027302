//! Skill specs, cooldowns, and active effect registries
//!
//! This module holds the data side of the skill system. Activation handling
//! runs inside the simulation loop (see pitch.rs) because skills mutate
//! physics state synchronously.

use std::collections::HashMap;

use uuid::Uuid;

use crate::game::timers::TimerId;
use crate::ws::protocol::{SkillConfigEntry, SkillId};

/// Velocity and speed-multiplier factor applied to slowed players
pub const SLOWDOWN_FACTOR: f64 = 0.35;
/// Preferred blink distance along the facing vector
pub const BLINK_MAX_DISTANCE: f64 = 400.0;
/// Shortest blink a spectator may take to clear a collider
pub const BLINK_MIN_DISTANCE: f64 = 300.0;
/// Step used when scanning for a collider-free spectator blink endpoint
pub const BLINK_SCAN_STEP: f64 = 25.0;
/// Kick range while metavision is active (base range is 250)
pub const METAVISION_KICK_RANGE: f64 = 300.0;
/// Radius around the ball in which a lurking intercept may trigger
pub const LURKING_RADIUS: f64 = 500.0;
/// Distance behind the ball the lurking player lands at
pub const LURKING_OFFSET: f64 = 40.0;
/// Maximum distance to the ball for a power shot
pub const POWER_SHOT_RANGE: f64 = 200.0;
/// Base ball speed of a power shot before the kick power multiplier
pub const POWER_SHOT_SPEED: f64 = 2000.0;
/// Ball-player knockback while a power shot window is open
pub const POWER_SHOT_KNOCKBACK: f64 = 300.0;
/// Ball-player restitution while a power shot window is open
pub const POWER_SHOT_RETENTION: f64 = 0.8;
/// Temporary kick power stat bonus during the power shot window
pub const POWER_SHOT_STAT_BONUS: u8 = 5;

/// Static cooldown/duration data for one skill
#[derive(Debug, Clone, Copy)]
pub struct SkillSpec {
    pub id: SkillId,
    pub cooldown_ms: u64,
    pub duration_ms: u64,
}

/// Spec table; durations of 0 mean instantaneous or toggled effects
pub fn spec(id: SkillId) -> SkillSpec {
    match id {
        SkillId::Slowdown => SkillSpec { id, cooldown_ms: 30_000, duration_ms: 5_000 },
        SkillId::Blink => SkillSpec { id, cooldown_ms: 12_000, duration_ms: 0 },
        SkillId::Metavision => SkillSpec { id, cooldown_ms: 20_000, duration_ms: 8_000 },
        SkillId::NinjaStep => SkillSpec { id, cooldown_ms: 0, duration_ms: 0 },
        SkillId::LurkingRadius => SkillSpec { id, cooldown_ms: 20_000, duration_ms: 5_000 },
        SkillId::PowerShot => SkillSpec { id, cooldown_ms: 20_000, duration_ms: 3_000 },
    }
}

/// Full table for the skill config request/reply
pub fn config_entries() -> Vec<SkillConfigEntry> {
    SkillId::ALL
        .iter()
        .map(|&id| {
            let s = spec(id);
            SkillConfigEntry { id, cooldown_ms: s.cooldown_ms, duration_ms: s.duration_ms }
        })
        .collect()
}

/// Open power shot window on a kicker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerShotWindow {
    pub knockback: f64,
    pub retention: f64,
    pub bonus_kick_power: u8,
}

impl Default for PowerShotWindow {
    fn default() -> Self {
        Self {
            knockback: POWER_SHOT_KNOCKBACK,
            retention: POWER_SHOT_RETENTION,
            bonus_kick_power: POWER_SHOT_STAT_BONUS,
        }
    }
}

/// Per-player active skill effects consulted by integration and collision
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActiveEffects {
    /// Set while hit by an opponent's slowdown; scales the speed multiplier
    pub slowed_until: Option<u64>,
    pub metavision: bool,
    /// Ninja step toggle: phase through players while not near the ball
    pub phasing: bool,
    /// Open lurking window, armed by the first activation
    pub lurking_until: Option<u64>,
    /// Timer closing the lurking window, cancelled when the intercept fires
    pub lurking_timer: Option<TimerId>,
    pub power_shot: Option<PowerShotWindow>,
}

impl ActiveEffects {
    pub fn slowed(&self, now: u64) -> bool {
        self.slowed_until.is_some_and(|until| now < until)
    }

    /// Factor applied to the stat speed multiplier each integration
    pub fn speed_factor(&self, now: u64) -> f64 {
        if self.slowed(now) {
            SLOWDOWN_FACTOR
        } else {
            1.0
        }
    }

    pub fn lurking_armed(&self, now: u64) -> bool {
        self.lurking_until.is_some_and(|until| now < until)
    }
}

/// Cooldowns and effects for every player in the simulation
#[derive(Debug, Default)]
pub struct SkillEngine {
    cooldowns: HashMap<(Uuid, SkillId), u64>,
    effects: HashMap<Uuid, ActiveEffects>,
}

impl SkillEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a player's effects (default when none active)
    pub fn effects(&self, player: Uuid) -> ActiveEffects {
        self.effects.get(&player).copied().unwrap_or_default()
    }

    pub fn effects_mut(&mut self, player: Uuid) -> &mut ActiveEffects {
        self.effects.entry(player).or_default()
    }

    pub fn on_cooldown(&self, player: Uuid, skill: SkillId, now: u64) -> bool {
        self.cooldowns
            .get(&(player, skill))
            .is_some_and(|&next_usable| now < next_usable)
    }

    /// Start the cooldown clock for a skill just used
    pub fn start_cooldown(&mut self, player: Uuid, skill: SkillId, now: u64) {
        let cd = spec(skill).cooldown_ms;
        if cd > 0 {
            self.cooldowns.insert((player, skill), now + cd);
        }
    }

    /// Drop everything for a disconnecting player
    pub fn remove_player(&mut self, player: Uuid) {
        self.cooldowns.retain(|(p, _), _| *p != player);
        self.effects.remove(&player);
    }

    /// Drop all effects and cooldowns (game reset / game end)
    pub fn clear(&mut self) {
        self.cooldowns.clear();
        self.effects.clear();
    }

    /// Clear the slow flag on every player (slowdown expiry)
    pub fn clear_all_slows(&mut self) {
        for eff in self.effects.values_mut() {
            eff.slowed_until = None;
        }
    }
}
