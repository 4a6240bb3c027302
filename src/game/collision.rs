//! Collision resolution between players, ball, and static geometry

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::game::kernel::{BALL_RADIUS, PLAYER_RADIUS};
use crate::game::skills::{PowerShotWindow, SkillEngine};
use crate::game::state::{BallState, PlayerBody};
use crate::game::world::RectCollider;
use crate::ws::protocol::Team;

/// Elastic push applied to each player of an overlapping pair
pub const PLAYER_PUSH_IMPULSE: f64 = 150.0;
/// Ball must move at least this fast to knock players back
pub const KNOCKBACK_MIN_BALL_SPEED: f64 = 100.0;
/// Fraction of ball speed transferred as knockback
pub const KNOCKBACK_SCALE: f64 = 0.6;
/// Knockback ceiling outside a power shot window
pub const KNOCKBACK_MAX: f64 = 200.0;
/// Speed retained by the ball after bouncing off a player
pub const BALL_PLAYER_RESTITUTION: f64 = 0.6;
/// Margin inside which a phasing player counts as near the ball
pub const NEAR_BALL_MARGIN: f64 = 20.0;

/// Whether a player is close enough to the ball to lose phase-through
pub fn near_ball(player: &PlayerBody, ball: &BallState) -> bool {
    player.distance_to(ball.x, ball.y) < PLAYER_RADIUS + BALL_RADIUS + NEAR_BALL_MARGIN
}

/// Resolve player-player overlap for every pair
///
/// Spectators never collide; a phasing player is exempt while away from the
/// ball. Pairs separate by half the penetration each and receive an elastic
/// push along the contact normal.
pub fn resolve_player_pairs(
    players: &mut BTreeMap<Uuid, PlayerBody>,
    skills: &SkillEngine,
    ball: &BallState,
) {
    let ids: Vec<Uuid> = players.keys().copied().collect();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (a_id, b_id) = (ids[i], ids[j]);

            let skip = {
                let a = &players[&a_id];
                let b = &players[&b_id];
                let a_phased = skills.effects(a_id).phasing && !near_ball(a, ball);
                let b_phased = skills.effects(b_id).phasing && !near_ball(b, ball);
                a.is_spectator() || b.is_spectator() || a_phased || b_phased
            };
            if skip {
                continue;
            }

            let (ax, ay) = {
                let a = &players[&a_id];
                (a.x, a.y)
            };
            let (bx, by) = {
                let b = &players[&b_id];
                (b.x, b.y)
            };

            let dx = bx - ax;
            let dy = by - ay;
            let dist = (dx * dx + dy * dy).sqrt();
            let min_dist = PLAYER_RADIUS * 2.0;
            if dist >= min_dist {
                continue;
            }

            // Coincident centres get an arbitrary horizontal normal
            let (nx, ny) = if dist < 1e-6 { (1.0, 0.0) } else { (dx / dist, dy / dist) };
            let half_pen = (min_dist - dist) / 2.0;

            if let Some(a) = players.get_mut(&a_id) {
                a.x -= nx * half_pen;
                a.y -= ny * half_pen;
                a.vx -= nx * PLAYER_PUSH_IMPULSE;
                a.vy -= ny * PLAYER_PUSH_IMPULSE;
            }
            if let Some(b) = players.get_mut(&b_id) {
                b.x += nx * half_pen;
                b.y += ny * half_pen;
                b.vx += nx * PLAYER_PUSH_IMPULSE;
                b.vy += ny * PLAYER_PUSH_IMPULSE;
            }
        }
    }
}

/// Knock back players the moving ball runs into
///
/// `power_shot` is the open window of the ball's last kicker, if any; it
/// overrides the generic knockback magnitude for its 3 second duration.
pub fn apply_ball_knockback(
    players: &mut BTreeMap<Uuid, PlayerBody>,
    ball: &BallState,
    power_shot: Option<PowerShotWindow>,
) {
    if !ball.moving {
        return;
    }
    let speed = ball.speed();
    if speed <= KNOCKBACK_MIN_BALL_SPEED {
        return;
    }

    let magnitude = match power_shot {
        Some(window) => window.knockback,
        None => (speed * KNOCKBACK_SCALE).min(KNOCKBACK_MAX),
    };

    for player in players.values_mut() {
        if player.is_spectator() {
            continue;
        }
        let dx = player.x - ball.x;
        let dy = player.y - ball.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= PLAYER_RADIUS + BALL_RADIUS || dist < 1e-6 {
            continue;
        }
        player.vx += dx / dist * magnitude;
        player.vy += dy / dist * magnitude;
    }
}

/// Outcome of a ball-player contact
#[derive(Debug, Clone, Copy)]
pub struct BallContact {
    pub player: Uuid,
    pub team: Team,
    pub intercepted: bool,
}

/// Bounce the ball off the first player it overlaps
///
/// The ball reflects about the contact normal, keeps `retention` of its
/// speed, and is pushed just clear of the player. The touch chain shifts,
/// and a cross-team possession change reports an interception.
pub fn resolve_ball_player(
    ball: &mut BallState,
    players: &BTreeMap<Uuid, PlayerBody>,
    retention: f64,
    now: u64,
) -> Option<BallContact> {
    let contact = players.values().find(|p| {
        !p.is_spectator() && p.distance_to(ball.x, ball.y) < PLAYER_RADIUS + BALL_RADIUS
    })?;

    let dx = contact.x - ball.x;
    let dy = contact.y - ball.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if dist < 1e-6 { (1.0, 0.0) } else { (dx / dist, dy / dist) };

    let dot = ball.vx * nx + ball.vy * ny;
    ball.vx = (ball.vx - 2.0 * dot * nx) * retention;
    ball.vy = (ball.vy - 2.0 * dot * ny) * retention;
    ball.moving = ball.vx != 0.0 || ball.vy != 0.0;

    let overlap = PLAYER_RADIUS + BALL_RADIUS - dist;
    ball.x -= nx * (overlap + 1.0);
    ball.y -= ny * (overlap + 1.0);

    let previous = ball.last_touch;
    let previous_team = previous.and_then(|id| players.get(&id)).map(|p| p.team);
    let intercepted = previous != Some(contact.id)
        && previous_team.is_some_and(|t| t.is_on_pitch() && t != contact.team);

    let result = BallContact { player: contact.id, team: contact.team, intercepted };
    ball.register_touch(contact.id, now);
    Some(result)
}

/// Bounce the ball off the first static rectangle it overlaps
pub fn resolve_ball_rects(ball: &mut BallState, colliders: &[RectCollider], bounce: f64) {
    for rect in colliders {
        let (cx, cy) = rect.closest_point(ball.x, ball.y);
        let dx = ball.x - cx;
        let dy = ball.y - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= BALL_RADIUS {
            continue;
        }

        let (nx, ny) = if dist < 1e-6 {
            // Centre inside the rect: push along the vector from rect centre
            let (rcx, rcy) = rect.center();
            let ox = ball.x - rcx;
            let oy = ball.y - rcy;
            let len = (ox * ox + oy * oy).sqrt();
            if len < 1e-6 { (1.0, 0.0) } else { (ox / len, oy / len) }
        } else {
            (dx / dist, dy / dist)
        };

        let dot = ball.vx * nx + ball.vy * ny;
        ball.vx = (ball.vx - 2.0 * dot * nx) * bounce;
        ball.vy = (ball.vy - 2.0 * dot * ny) * bounce;

        let penetration = BALL_RADIUS - dist;
        ball.x += nx * (penetration + 1.0);
        ball.y += ny * (penetration + 1.0);
        break;
    }
}

/// Push spectators out of static rectangles along the shortest axis
pub fn resolve_spectator_walls(players: &mut BTreeMap<Uuid, PlayerBody>, colliders: &[RectCollider]) {
    for player in players.values_mut() {
        if !player.is_spectator() {
            continue;
        }
        for rect in colliders {
            let (cx, cy) = rect.closest_point(player.x, player.y);
            let dx = player.x - cx;
            let dy = player.y - cy;
            if dx * dx + dy * dy >= PLAYER_RADIUS * PLAYER_RADIUS {
                continue;
            }

            let (rcx, rcy) = rect.center();
            let pen_x = rect.width / 2.0 + PLAYER_RADIUS - (player.x - rcx).abs();
            let pen_y = rect.height / 2.0 + PLAYER_RADIUS - (player.y - rcy).abs();

            if pen_x < pen_y {
                player.x += pen_x * (player.x - rcx).signum();
                player.vx = 0.0;
            } else {
                player.y += pen_y * (player.y - rcy).signum();
                player.vy = 0.0;
            }
        }
    }
}
