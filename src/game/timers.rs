//! Scheduler-owned one-shot timers
//!
//! Gameplay timers (skill expiry, goal reset, selection deadlines) are
//! entries in a priority queue keyed on simulation milliseconds and drained
//! by the loop each step. Cancellation removes the payload and leaves a
//! tombstone in the heap, so wall-clock drift never touches gameplay and
//! tests can step time synthetically.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use uuid::Uuid;

use crate::ws::protocol::SkillId;

pub type TimerId = u64;

/// Payload fired when a timer comes due
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A timed skill effect ran out
    SkillExpired { player: Uuid, skill: SkillId },
    /// The lurking arm window closed without a second activation
    LurkingWindowClosed { player: Uuid },
    /// Ball and players return to spawn after a goal
    GoalReset,
    /// The current picker ran out of selection time
    SelectionDeadline { picker: Uuid },
}

impl TimerEvent {
    /// The player this event belongs to, for disconnect cancellation
    fn player(&self) -> Option<Uuid> {
        match self {
            TimerEvent::SkillExpired { player, .. } => Some(*player),
            TimerEvent::LurkingWindowClosed { player } => Some(*player),
            TimerEvent::GoalReset => None,
            TimerEvent::SelectionDeadline { picker } => Some(*picker),
        }
    }
}

/// Priority queue of pending one-shot timers with tombstone cancellation
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(u64, TimerId)>>,
    entries: HashMap<TimerId, TimerEvent>,
    next_id: TimerId,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at an absolute simulation time
    pub fn schedule(&mut self, fire_at: u64, event: TimerEvent) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((fire_at, id)));
        self.entries.insert(id, event);
        id
    }

    /// Cancel a pending timer; returns false when it already fired
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Cancel every pending timer owned by a player (disconnect)
    pub fn cancel_for_player(&mut self, player: Uuid) {
        self.entries.retain(|_, ev| ev.player() != Some(player));
    }

    /// Cancel everything (game reset)
    pub fn clear(&mut self) {
        self.heap.clear();
        self.entries.clear();
    }

    /// Pop the next due event, skipping tombstones
    pub fn pop_due(&mut self, now: u64) -> Option<TimerEvent> {
        while let Some(Reverse((fire_at, id))) = self.heap.peek().copied() {
            if fire_at > now {
                return None;
            }
            self.heap.pop();
            if let Some(event) = self.entries.remove(&id) {
                return Some(event);
            }
            // Tombstone: cancelled entry, keep draining
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_time_order() {
        let mut q = TimerQueue::new();
        let p = Uuid::new_v4();
        q.schedule(300, TimerEvent::GoalReset);
        q.schedule(100, TimerEvent::LurkingWindowClosed { player: p });

        assert!(q.pop_due(50).is_none());
        assert_eq!(q.pop_due(100), Some(TimerEvent::LurkingWindowClosed { player: p }));
        assert!(q.pop_due(100).is_none());
        assert_eq!(q.pop_due(400), Some(TimerEvent::GoalReset));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut q = TimerQueue::new();
        let p = Uuid::new_v4();
        let id = q.schedule(100, TimerEvent::SkillExpired { player: p, skill: SkillId::Metavision });
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert!(q.pop_due(1000).is_none());
    }

    #[test]
    fn cancel_for_player_leaves_global_timers() {
        let mut q = TimerQueue::new();
        let p = Uuid::new_v4();
        q.schedule(100, TimerEvent::SkillExpired { player: p, skill: SkillId::Slowdown });
        q.schedule(200, TimerEvent::GoalReset);

        q.cancel_for_player(p);
        assert_eq!(q.pop_due(1000), Some(TimerEvent::GoalReset));
        assert!(q.pop_due(1000).is_none());
    }

    #[test]
    fn same_instant_fires_in_schedule_order() {
        let mut q = TimerQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.schedule(100, TimerEvent::LurkingWindowClosed { player: a });
        q.schedule(100, TimerEvent::LurkingWindowClosed { player: b });

        assert_eq!(q.pop_due(100), Some(TimerEvent::LurkingWindowClosed { player: a }));
        assert_eq!(q.pop_due(100), Some(TimerEvent::LurkingWindowClosed { player: b }));
    }
}
