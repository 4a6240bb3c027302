//! Mutable simulation state owned by the scheduler
//!
//! Everything here is mutated on the simulation loop only; ingress handlers
//! enqueue messages instead of touching these structures.

use std::collections::{BTreeMap, VecDeque};

use uuid::Uuid;

use crate::game::kernel::{MoveInput, PITCH_CENTER};
use crate::ws::protocol::{InputFrame, PlayerStats, Team};

/// Safety cap on queued inputs per player (~2 s at 60 Hz)
pub const INPUT_QUEUE_MAX: usize = 120;

/// History samples kept per entity (~1 s at 60 Hz)
pub const HISTORY_CAPACITY: usize = 60;

/// Authoritative ball state
#[derive(Debug, Clone)]
pub struct BallState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub moving: bool,
    pub last_touch: Option<Uuid>,
    pub previous_touch: Option<Uuid>,
    pub last_touch_at: u64,
    /// Bumped on every authoritative velocity replacement (kick, dribble,
    /// teleport, goal reset) so clients can discard stale predictions
    pub kick_sequence: u64,
    /// Simulation time of the last accepted kick, used for the dribble lockout
    pub last_kick_at: u64,
}

impl BallState {
    pub fn new() -> Self {
        Self {
            x: PITCH_CENTER.0,
            y: PITCH_CENTER.1,
            vx: 0.0,
            vy: 0.0,
            moving: false,
            last_touch: None,
            previous_touch: None,
            last_touch_at: 0,
            kick_sequence: 0,
            last_kick_at: 0,
        }
    }

    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Replace velocity with an authoritative impulse
    pub fn set_velocity(&mut self, vx: f64, vy: f64) {
        self.vx = vx;
        self.vy = vy;
        self.moving = vx != 0.0 || vy != 0.0;
        self.kick_sequence += 1;
    }

    /// Record a touch, shifting the possession chain
    pub fn register_touch(&mut self, player: Uuid, at: u64) {
        if self.last_touch != Some(player) {
            self.previous_touch = self.last_touch;
        }
        self.last_touch = Some(player);
        self.last_touch_at = at;
    }

    /// Teleport to pitch centre at rest (goal reset, game reset)
    pub fn reset_to_center(&mut self) {
        self.x = PITCH_CENTER.0;
        self.y = PITCH_CENTER.1;
        self.vx = 0.0;
        self.vy = 0.0;
        self.moving = false;
        self.last_touch = None;
        self.previous_touch = None;
        self.kick_sequence += 1;
    }
}

impl Default for BallState {
    fn default() -> Self {
        Self::new()
    }
}

/// One queued directional input
#[derive(Debug, Clone, Copy)]
pub struct QueuedInput {
    pub sequence: u32,
    pub input: MoveInput,
}

/// Bounded FIFO of pending inputs for one player
#[derive(Debug, Default)]
pub struct InputQueue {
    entries: VecDeque<QueuedInput>,
}

impl InputQueue {
    /// Append one frame. Stale sequences are dropped, a duplicate of the
    /// last queued sequence replaces it, and overflow drops the front.
    pub fn push(&mut self, frame: &InputFrame, last_processed: u32) -> bool {
        if frame.sequence <= last_processed {
            return false;
        }

        let input = MoveInput {
            up: frame.up,
            down: frame.down,
            left: frame.left,
            right: frame.right,
        };

        if let Some(back) = self.entries.back_mut() {
            if frame.sequence == back.sequence {
                back.input = input;
                return true;
            }
            if frame.sequence < back.sequence {
                return false;
            }
        }

        if self.entries.len() >= INPUT_QUEUE_MAX {
            self.entries.pop_front();
        }
        self.entries.push_back(QueuedInput { sequence: frame.sequence, input });
        true
    }

    /// Consume the oldest queued input
    pub fn pop(&mut self) -> Option<QueuedInput> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One position sample for lag compensation
#[derive(Debug, Clone, Copy)]
pub struct HistorySample {
    pub x: f64,
    pub y: f64,
    pub at: u64,
}

/// Ring of recent positions for lag-compensated validation
#[derive(Debug, Default)]
pub struct HistoryBuffer {
    samples: VecDeque<HistorySample>,
}

impl HistoryBuffer {
    pub fn push(&mut self, x: f64, y: f64, at: u64) {
        if self.samples.len() >= HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(HistorySample { x, y, at });
    }

    /// Position closest in time to `at`, or None when the requested time
    /// falls outside the rewind window ending at `now`
    pub fn rewind(&self, at: u64, now: u64, max_age_ms: u64) -> Option<(f64, f64)> {
        if at > now || now - at > max_age_ms {
            return None;
        }
        self.samples
            .iter()
            .min_by_key(|s| s.at.abs_diff(at))
            .map(|s| (s.x, s.y))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Authoritative per-player physics record
#[derive(Debug)]
pub struct PlayerBody {
    pub id: Uuid,
    pub display_name: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub team: Team,
    pub stats: PlayerStats,
    /// True once the player has assigned stats; false means 5/5/5 defaults
    /// and the client was told to prompt for assignment
    pub stats_assigned: bool,
    pub current_input: MoveInput,
    pub input_queue: InputQueue,
    pub last_processed_seq: u32,
    pub history: HistoryBuffer,
    /// Simulation time of this player's last accepted kick
    pub last_kick_at: Option<u64>,
}

impl PlayerBody {
    pub fn new(id: Uuid, display_name: String, x: f64, y: f64, stats: Option<PlayerStats>) -> Self {
        Self {
            id,
            display_name,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            team: Team::Unassigned,
            stats: stats.unwrap_or_else(PlayerStats::balanced),
            stats_assigned: stats.is_some(),
            current_input: MoveInput::default(),
            input_queue: InputQueue::default(),
            last_processed_seq: 0,
            history: HistoryBuffer::default(),
            last_kick_at: None,
        }
    }

    pub fn is_spectator(&self) -> bool {
        !self.team.is_on_pitch()
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Teleport, dropping momentum
    pub fn place_at(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.vx = 0.0;
        self.vy = 0.0;
    }
}

/// Everything the simulation loop owns and mutates
///
/// Players live in a BTreeMap so pair iteration order is stable across runs;
/// determinism of collision resolution depends on it.
#[derive(Debug, Default)]
pub struct SimulationState {
    pub ball: BallState,
    pub players: BTreeMap<Uuid, PlayerBody>,
    pub tick: u64,
    /// Simulation clock in milliseconds, advanced by the fixed step only
    pub now_ms: u64,
    pub ball_history: HistoryBuffer,
}

impl SimulationState {
    pub fn new(start_ms: u64) -> Self {
        Self {
            ball: BallState::new(),
            players: BTreeMap::new(),
            tick: 0,
            now_ms: start_ms,
            ball_history: HistoryBuffer::default(),
        }
    }

    pub fn on_pitch_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_spectator()).count()
    }

    pub fn team_count(&self, team: Team) -> usize {
        self.players.values().filter(|p| p.team == team).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u32) -> InputFrame {
        InputFrame { up: false, down: false, left: true, right: false, sequence }
    }

    #[test]
    fn queue_drops_stale_sequences() {
        let mut q = InputQueue::default();
        assert!(q.push(&frame(5), 4));
        assert!(!q.push(&frame(3), 4));
        assert!(!q.push(&frame(4), 4));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn queue_coalesces_duplicate_of_last() {
        let mut q = InputQueue::default();
        q.push(&frame(1), 0);
        let dup = InputFrame { up: true, down: false, left: false, right: false, sequence: 1 };
        assert!(q.push(&dup, 0));
        assert_eq!(q.len(), 1);
        assert!(q.pop().unwrap().input.up);
    }

    #[test]
    fn queue_overflow_drops_front() {
        let mut q = InputQueue::default();
        for seq in 1..=(INPUT_QUEUE_MAX as u32 + 10) {
            q.push(&frame(seq), 0);
        }
        assert_eq!(q.len(), INPUT_QUEUE_MAX);
        assert_eq!(q.pop().unwrap().sequence, 11);
    }

    #[test]
    fn history_rewind_respects_window() {
        let mut h = HistoryBuffer::default();
        for i in 0..30u64 {
            h.push(i as f64 * 10.0, 0.0, 1000 + i * 16);
        }
        let now = 1000 + 29 * 16;

        // 120 ms ago lands on a real sample
        let (x, _) = h.rewind(now - 120, now, 500).unwrap();
        assert!(x < 29.0 * 10.0);

        // Older than the window
        assert!(h.rewind(now - 600, now, 500).is_none());
        // Future timestamps rejected
        assert!(h.rewind(now + 50, now, 500).is_none());
    }

    #[test]
    fn history_is_bounded() {
        let mut h = HistoryBuffer::default();
        for i in 0..200u64 {
            h.push(0.0, 0.0, i);
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn touch_chain_shifts_on_new_toucher() {
        let mut ball = BallState::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        ball.register_touch(a, 100);
        assert_eq!(ball.last_touch, Some(a));
        assert_eq!(ball.previous_touch, None);

        // Same toucher again: chain unchanged
        ball.register_touch(a, 120);
        assert_eq!(ball.previous_touch, None);

        ball.register_touch(b, 140);
        assert_eq!(ball.last_touch, Some(b));
        assert_eq!(ball.previous_touch, Some(a));
    }

    #[test]
    fn kick_sequence_increases_on_velocity_replacement() {
        let mut ball = BallState::new();
        let s0 = ball.kick_sequence;
        ball.set_velocity(500.0, 0.0);
        ball.reset_to_center();
        assert_eq!(ball.kick_sequence, s0 + 2);
        assert!(!ball.moving);
    }
}
