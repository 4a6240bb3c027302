//! Input ingestion and kick/dribble validation
//!
//! All rejections here are silent on the wire (§ error policy: the client's
//! prediction simply snaps back on the next snapshot); callers log at debug.

use uuid::Uuid;

use crate::game::kernel;
use crate::game::skills::{SkillEngine, METAVISION_KICK_RANGE};
use crate::game::state::SimulationState;
use crate::ws::protocol::InputFrame;

/// Base kick reach in pixels
pub const KICK_MAX_DISTANCE: f64 = 250.0;
/// Dribble reach in pixels
pub const MAX_DRIBBLE_DISTANCE: f64 = 300.0;
/// Ball speed granted by a dribble
pub const DRIBBLE_SPEED: f64 = 300.0;
/// Dribbles are rejected this soon after any kick
pub const DRIBBLE_LOCKOUT_MS: u64 = 100;
/// Recoil applied to the kicker, anti-parallel to the kick
pub const KICK_RECOIL: f64 = 400.0;

/// Why a kick was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KickError {
    #[error("unknown player")]
    UnknownPlayer,
    #[error("spectators cannot kick")]
    Spectator,
    #[error("kick cooldown active")]
    Cooldown,
    #[error("ball out of reach")]
    OutOfRange,
}

/// Why a dribble was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DribbleError {
    #[error("unknown player")]
    UnknownPlayer,
    #[error("spectators cannot dribble")]
    Spectator,
    #[error("too soon after a kick")]
    KickLockout,
    #[error("ball out of reach")]
    OutOfRange,
}

/// A kick that passed validation and was applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KickApplied {
    pub kick_sequence: u64,
    pub vx: f64,
    pub vy: f64,
}

/// Append an ordered input batch to a player's queue
/// Returns the number of frames accepted
pub fn queue_input_batch(
    state: &mut SimulationState,
    player: Uuid,
    frames: &[InputFrame],
) -> usize {
    let Some(body) = state.players.get_mut(&player) else {
        return 0;
    };
    let last_processed = body.last_processed_seq;
    frames
        .iter()
        .filter(|f| body.input_queue.push(f, last_processed))
        .count()
}

/// Validate and apply a kick
///
/// Distance is checked against the kicker and ball positions rewound to the
/// client timestamp when one is supplied and still inside the lag
/// compensation window; otherwise current authoritative positions are used.
#[allow(clippy::too_many_arguments)]
pub fn apply_kick(
    state: &mut SimulationState,
    skills: &SkillEngine,
    player: Uuid,
    angle: f64,
    base_power: f64,
    client_timestamp: Option<u64>,
    kick_cooldown_ms: u64,
    lag_comp_window_ms: u64,
) -> Result<KickApplied, KickError> {
    let now = state.now_ms;
    let effects = skills.effects(player);

    let body = state.players.get(&player).ok_or(KickError::UnknownPlayer)?;
    if body.is_spectator() {
        return Err(KickError::Spectator);
    }
    if let Some(last) = body.last_kick_at {
        if now.saturating_sub(last) < kick_cooldown_ms {
            return Err(KickError::Cooldown);
        }
    }

    let (kicker_x, kicker_y, ball_x, ball_y) = match client_timestamp {
        Some(ts) => {
            let kicker = body.history.rewind(ts, now, lag_comp_window_ms);
            let ball = state.ball_history.rewind(ts, now, lag_comp_window_ms);
            match (kicker, ball) {
                (Some((kx, ky)), Some((bx, by))) => (kx, ky, bx, by),
                // History too old or missing: lag compensation disabled
                _ => (body.x, body.y, state.ball.x, state.ball.y),
            }
        }
        None => (body.x, body.y, state.ball.x, state.ball.y),
    };

    let max_distance = if effects.metavision { METAVISION_KICK_RANGE } else { KICK_MAX_DISTANCE };
    let dx = ball_x - kicker_x;
    let dy = ball_y - kicker_y;
    if (dx * dx + dy * dy).sqrt() > max_distance {
        return Err(KickError::OutOfRange);
    }

    let power_mul = kernel::kick_power_multiplier(effective_kick_power(state, skills, player));
    let (vx, vy) = kernel::kick_velocity(angle, base_power, power_mul, effects.metavision);

    if let Some(body) = state.players.get_mut(&player) {
        body.last_kick_at = Some(now);
        body.vx -= angle.cos() * KICK_RECOIL;
        body.vy -= angle.sin() * KICK_RECOIL;
    }

    state.ball.set_velocity(vx, vy);
    state.ball.last_kick_at = now;
    state.ball.register_touch(player, now);

    Ok(KickApplied { kick_sequence: state.ball.kick_sequence, vx, vy })
}

/// Validate and apply a dribble nudge
/// Returns the new kick sequence
pub fn apply_dribble(state: &mut SimulationState, player: Uuid) -> Result<u64, DribbleError> {
    let now = state.now_ms;

    let body = state.players.get(&player).ok_or(DribbleError::UnknownPlayer)?;
    if body.is_spectator() {
        return Err(DribbleError::Spectator);
    }
    if now.saturating_sub(state.ball.last_kick_at) < DRIBBLE_LOCKOUT_MS && state.ball.last_kick_at > 0
    {
        return Err(DribbleError::KickLockout);
    }
    if body.distance_to(state.ball.x, state.ball.y) > MAX_DRIBBLE_DISTANCE {
        return Err(DribbleError::OutOfRange);
    }

    let dx = state.ball.x - body.x;
    let dy = state.ball.y - body.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if dist < 1e-6 { (1.0, 0.0) } else { (dx / dist, dy / dist) };

    state.ball.set_velocity(nx * DRIBBLE_SPEED, ny * DRIBBLE_SPEED);
    state.ball.register_touch(player, now);

    Ok(state.ball.kick_sequence)
}

/// Kick power stat including any active power shot bonus
pub fn effective_kick_power(state: &SimulationState, skills: &SkillEngine, player: Uuid) -> u8 {
    let base = state.players.get(&player).map(|b| b.stats.kick_power).unwrap_or(0);
    match skills.effects(player).power_shot {
        Some(window) => base.saturating_add(window.bonus_kick_power),
        None => base,
    }
}
