//! Kinematic kernel shared by server simulation and client prediction
//!
//! Every function here is pure and uses f64 throughout. Clients replay the
//! exact same operations in the exact same order, so reordering anything in
//! this module is a protocol break even when the math is equivalent.

/// Playfield width in pixels
pub const PITCH_WIDTH: f64 = 3520.0;
/// Playfield height in pixels
pub const PITCH_HEIGHT: f64 = 1600.0;
/// Ball collision radius
pub const BALL_RADIUS: f64 = 30.0;
/// Player collision radius
pub const PLAYER_RADIUS: f64 = 30.0;
/// Exponential drag coefficient for the ball
pub const BALL_DRAG: f64 = 1.0;
/// Exponential drag coefficient for players
pub const PLAYER_DRAG: f64 = 4.0;
/// Base player acceleration in px/s^2
pub const PLAYER_ACCEL: f64 = 1600.0;
/// Base player speed cap in px/s
pub const PLAYER_MAX_SPEED: f64 = 600.0;
/// Wall restitution for the ball
pub const BALL_BOUNCE: f64 = 0.7;
/// Fixed physics step in seconds
pub const PHYSICS_DT: f64 = 0.016;
/// Below this speed the ball is declared stopped
pub const BALL_STOP_SPEED: f64 = 10.0;
/// Kick power bonus while metavision is active
pub const METAVISION_POWER_MUL: f64 = 1.2;
/// Pitch centre, where the ball spawns and resets
pub const PITCH_CENTER: (f64, f64) = (PITCH_WIDTH / 2.0, PITCH_HEIGHT / 2.0);

/// Directional input for one physics step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Speed multiplier from the speed stat
pub fn speed_multiplier(speed: u8) -> f64 {
    1.0 + 0.1 * speed as f64
}

/// Kick power multiplier from the kick power stat
pub fn kick_power_multiplier(kick_power: u8) -> f64 {
    1.0 + 0.1 * kick_power as f64
}

/// Drag multiplier from the dribbling stat, floored at 0.5
pub fn drag_multiplier(dribbling: u8) -> f64 {
    (1.0 - 0.05 * dribbling as f64).max(0.5)
}

/// Integrate the ball for one step
/// Returns (x, y, vx, vy)
pub fn integrate_ball(x: f64, y: f64, vx: f64, vy: f64, dt: f64) -> (f64, f64, f64, f64) {
    let decay = (-BALL_DRAG * dt).exp();
    let mut vx = vx * decay;
    let mut vy = vy * decay;

    let mut x = x + vx * dt;
    let mut y = y + vy * dt;

    // Wall clamps run in a fixed order: left, right, top, bottom. The
    // reflected component always points back into the interior so a ball
    // pinned against a wall cannot gain energy from repeated clamping.
    if x < BALL_RADIUS {
        x = BALL_RADIUS;
        vx = vx.abs() * BALL_BOUNCE;
    }
    if x > PITCH_WIDTH - BALL_RADIUS {
        x = PITCH_WIDTH - BALL_RADIUS;
        vx = -vx.abs() * BALL_BOUNCE;
    }
    if y < BALL_RADIUS {
        y = BALL_RADIUS;
        vy = vy.abs() * BALL_BOUNCE;
    }
    if y > PITCH_HEIGHT - BALL_RADIUS {
        y = PITCH_HEIGHT - BALL_RADIUS;
        vy = -vy.abs() * BALL_BOUNCE;
    }

    (x, y, vx, vy)
}

/// Integrate a player for one step
/// Returns (x, y, vx, vy)
pub fn integrate_player(
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    input: MoveInput,
    drag_mul: f64,
    speed_mul: f64,
    dt: f64,
) -> (f64, f64, f64, f64) {
    let accel = PLAYER_ACCEL * speed_mul;
    let max_speed = PLAYER_MAX_SPEED * speed_mul;

    let mut vx = vx;
    let mut vy = vy;

    if input.up {
        vy -= accel * dt;
    }
    if input.down {
        vy += accel * dt;
    }
    if input.left {
        vx -= accel * dt;
    }
    if input.right {
        vx += accel * dt;
    }

    let decay = (-PLAYER_DRAG * drag_mul * dt).exp();
    vx *= decay;
    vy *= decay;

    let speed = (vx * vx + vy * vy).sqrt();
    if speed > max_speed {
        let scale = max_speed / speed;
        vx *= scale;
        vy *= scale;
    }

    let mut x = x + vx * dt;
    let mut y = y + vy * dt;

    if x < PLAYER_RADIUS {
        x = PLAYER_RADIUS;
        vx = 0.0;
    }
    if x > PITCH_WIDTH - PLAYER_RADIUS {
        x = PITCH_WIDTH - PLAYER_RADIUS;
        vx = 0.0;
    }
    if y < PLAYER_RADIUS {
        y = PLAYER_RADIUS;
        vy = 0.0;
    }
    if y > PITCH_HEIGHT - PLAYER_RADIUS {
        y = PITCH_HEIGHT - PLAYER_RADIUS;
        vy = 0.0;
    }

    (x, y, vx, vy)
}

/// Velocity imparted by a kick
/// Returns (vx, vy)
pub fn kick_velocity(
    angle: f64,
    base_power: f64,
    kick_power_mul: f64,
    metavision: bool,
) -> (f64, f64) {
    let mut power = base_power * kick_power_mul;
    if metavision {
        power *= METAVISION_POWER_MUL;
    }
    (angle.cos() * power, angle.sin() * power)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_directions() -> [MoveInput; 4] {
        [
            MoveInput { up: true, ..Default::default() },
            MoveInput { down: true, ..Default::default() },
            MoveInput { left: true, ..Default::default() },
            MoveInput { right: true, ..Default::default() },
        ]
    }

    #[test]
    fn ball_integration_is_deterministic() {
        let mut a = (1234.5, 678.9, 433.0, -291.0);
        let mut b = a;
        for _ in 0..10_000 {
            a = integrate_ball(a.0, a.1, a.2, a.3, PHYSICS_DT);
            b = integrate_ball(b.0, b.1, b.2, b.3, PHYSICS_DT);
        }
        assert_eq!(a.0.to_bits(), b.0.to_bits());
        assert_eq!(a.1.to_bits(), b.1.to_bits());
        assert_eq!(a.2.to_bits(), b.2.to_bits());
        assert_eq!(a.3.to_bits(), b.3.to_bits());
    }

    #[test]
    fn player_integration_is_deterministic() {
        let inputs = all_directions();
        let mut a = (800.0, 800.0, 0.0, 0.0);
        let mut b = a;
        for i in 0..10_000usize {
            let input = inputs[i % inputs.len()];
            a = integrate_player(a.0, a.1, a.2, a.3, input, 0.75, 1.5, PHYSICS_DT);
            b = integrate_player(b.0, b.1, b.2, b.3, input, 0.75, 1.5, PHYSICS_DT);
        }
        assert_eq!(a.0.to_bits(), b.0.to_bits());
        assert_eq!(a.2.to_bits(), b.2.to_bits());
    }

    #[test]
    fn ball_speed_never_increases_without_impulse() {
        let mut state = (1760.0, 800.0, 600.0, 150.0);
        let mut prev_speed = f64::INFINITY;
        for _ in 0..1000 {
            state = integrate_ball(state.0, state.1, state.2, state.3, PHYSICS_DT);
            let speed = (state.2 * state.2 + state.3 * state.3).sqrt();
            assert!(speed <= prev_speed + 1e-9);
            prev_speed = speed;
        }
        assert!(prev_speed < BALL_STOP_SPEED);
    }

    #[test]
    fn ball_stays_inside_pitch() {
        let mut state = (40.0, 40.0, -5000.0, -5000.0);
        for _ in 0..2000 {
            state = integrate_ball(state.0, state.1, state.2, state.3, PHYSICS_DT);
            assert!(state.0 >= BALL_RADIUS && state.0 <= PITCH_WIDTH - BALL_RADIUS);
            assert!(state.1 >= BALL_RADIUS && state.1 <= PITCH_HEIGHT - BALL_RADIUS);
        }
    }

    #[test]
    fn wall_bounce_reflects_into_interior() {
        // Moving hard left: after the clamp the ball must travel right at
        // BOUNCE times the post-drag speed.
        let (x, _, vx, _) = integrate_ball(BALL_RADIUS + 1.0, 800.0, -1000.0, 0.0, PHYSICS_DT);
        assert_eq!(x, BALL_RADIUS);
        assert!(vx > 0.0);
        let expected = 1000.0 * (-BALL_DRAG * PHYSICS_DT).exp() * BALL_BOUNCE;
        assert!((vx - expected).abs() < 1e-9);
    }

    #[test]
    fn player_caps_at_max_speed() {
        let input = MoveInput { right: true, ..Default::default() };
        let mut state = (200.0, 800.0, 0.0, 0.0);
        for _ in 0..600 {
            state = integrate_player(state.0, state.1, state.2, state.3, input, 1.0, 1.0, PHYSICS_DT);
        }
        let speed = (state.2 * state.2 + state.3 * state.3).sqrt();
        assert!(speed <= PLAYER_MAX_SPEED + 1e-9);
    }

    #[test]
    fn player_boundary_clamp_zeroes_velocity() {
        let input = MoveInput { left: true, ..Default::default() };
        let mut state = (PLAYER_RADIUS + 5.0, 800.0, -400.0, 0.0);
        for _ in 0..10 {
            state = integrate_player(state.0, state.1, state.2, state.3, input, 1.0, 1.0, PHYSICS_DT);
        }
        assert_eq!(state.0, PLAYER_RADIUS);
        assert_eq!(state.2, 0.0);
    }

    #[test]
    fn stat_multipliers() {
        assert_eq!(speed_multiplier(0), 1.0);
        assert_eq!(speed_multiplier(5), 1.5);
        assert_eq!(kick_power_multiplier(10), 2.0);
        assert_eq!(drag_multiplier(0), 1.0);
        assert_eq!(drag_multiplier(5), 0.75);
        // Floored: 15 dribbling would otherwise give 0.25
        assert_eq!(drag_multiplier(15), 0.5);
    }

    #[test]
    fn kick_velocity_applies_multipliers() {
        let (vx, vy) = kick_velocity(0.0, 1000.0, 1.5, false);
        assert!((vx - 1500.0).abs() < 1e-9);
        assert!(vy.abs() < 1e-9);

        let (mx, _) = kick_velocity(0.0, 1000.0, 1.5, true);
        assert!((mx - 1800.0).abs() < 1e-9);
    }
}
