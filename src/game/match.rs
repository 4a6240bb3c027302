//! Match orchestration state: lobby, skill selection, active play
//!
//! The transitions themselves run inside the simulation loop (pitch.rs);
//! this module owns the bookkeeping and the pure pieces of it.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::game::timers::TimerId;
use crate::ws::protocol::{SkillId, Team};

/// Time each picker gets before the server auto-picks
pub const SELECTION_TURN_MS: u64 = 30_000;
/// Delay between a goal and the spawn reset
pub const GOAL_RESET_DELAY_MS: u64 = 3_000;

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Free team assignment and kickabout
    Lobby,
    /// Snake-order skill drafting
    SkillSelection,
    /// Clock running
    Active,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Lobby => "LOBBY",
            MatchStatus::SkillSelection => "SKILL_SELECTION",
            MatchStatus::Active => "ACTIVE",
        }
    }
}

/// Per-player scoring line for MVP and MMR computation
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPlayerStats {
    pub goals: u32,
    pub assists: u32,
    pub interceptions: u32,
}

impl MatchPlayerStats {
    pub fn mvp_score(&self) -> u32 {
        self.goals * 10 + self.assists * 5 + self.interceptions * 2
    }

    /// Achievement thresholds, each worth bonus MMR, capped at three
    pub fn feat_count(&self) -> u32 {
        let mut feats = 0;
        if self.goals >= 2 {
            feats += 1;
        }
        if self.assists >= 2 {
            feats += 1;
        }
        if self.interceptions >= 3 {
            feats += 1;
        }
        feats.min(3)
    }
}

/// Skill drafting state while `MatchStatus::SkillSelection`
#[derive(Debug)]
pub struct SelectionState {
    pub order: Vec<Uuid>,
    pub current: usize,
    pub available: Vec<SkillId>,
    pub deadline_timer: TimerId,
    pub deadline_at: u64,
}

impl SelectionState {
    pub fn current_picker(&self) -> Option<Uuid> {
        self.order.get(self.current).copied()
    }

    /// Remove a picked skill; the pool refills when more pickers than
    /// skills remain
    pub fn take_skill(&mut self, skill: SkillId) {
        self.available.retain(|&s| s != skill);
        if self.available.is_empty() {
            self.available = SkillId::ALL.to_vec();
        }
    }
}

/// Everything the orchestrator tracks for one match
#[derive(Debug)]
pub struct MatchState {
    pub status: MatchStatus,
    pub score_red: u32,
    pub score_blue: u32,
    pub clock_remaining_ms: u64,
    pub overtime: bool,
    pub selection: Option<SelectionState>,
    pub assigned_skills: HashMap<Uuid, SkillId>,
    pub stats: BTreeMap<Uuid, MatchPlayerStats>,
    pub goal_reset_pending: bool,
    /// Last whole second broadcast via the 1 Hz timer update
    pub last_broadcast_second: u64,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            status: MatchStatus::Lobby,
            score_red: 0,
            score_blue: 0,
            clock_remaining_ms: 0,
            overtime: false,
            selection: None,
            assigned_skills: HashMap::new(),
            stats: BTreeMap::new(),
            goal_reset_pending: false,
            last_broadcast_second: 0,
        }
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.clock_remaining_ms / 1000
    }

    pub fn stats_mut(&mut self, player: Uuid) -> &mut MatchPlayerStats {
        self.stats.entry(player).or_default()
    }

    /// Record a goal for a team, crediting scorer and optional assist
    pub fn record_goal(&mut self, team: Team, scorer: Option<Uuid>, assist: Option<Uuid>) {
        match team {
            Team::Red => self.score_red += 1,
            Team::Blue => self.score_blue += 1,
            _ => return,
        }
        if let Some(scorer) = scorer {
            self.stats_mut(scorer).goals += 1;
        }
        if let Some(assist) = assist {
            self.stats_mut(assist).assists += 1;
        }
    }

    /// Winning team, or None on a draw
    pub fn winner(&self) -> Option<Team> {
        match self.score_red.cmp(&self.score_blue) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Blue),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Highest MVP score; ties break on the stable stat-map order
    pub fn mvp(&self) -> Option<Uuid> {
        self.stats
            .iter()
            .max_by_key(|(_, s)| s.mvp_score())
            .filter(|(_, s)| s.mvp_score() > 0)
            .map(|(id, _)| *id)
    }

    /// Back to a clean lobby; team memberships are kept
    pub fn reset(&mut self) {
        self.status = MatchStatus::Lobby;
        self.score_red = 0;
        self.score_blue = 0;
        self.clock_remaining_ms = 0;
        self.overtime = false;
        self.selection = None;
        self.assigned_skills.clear();
        self.stats.clear();
        self.goal_reset_pending = false;
        self.last_broadcast_second = 0;
    }

    pub fn remove_player(&mut self, player: Uuid) {
        self.assigned_skills.remove(&player);
        self.stats.remove(&player);
        if let Some(selection) = self.selection.as_mut() {
            if let Some(pos) = selection.order.iter().position(|&p| p == player) {
                selection.order.remove(pos);
                if pos < selection.current {
                    selection.current -= 1;
                }
            }
        }
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Draft order interleaving the two teams, red first
pub fn selection_order(red: &[Uuid], blue: &[Uuid]) -> Vec<Uuid> {
    let mut order = Vec::with_capacity(red.len() + blue.len());
    let mut r = red.iter();
    let mut b = blue.iter();
    loop {
        match (r.next(), b.next()) {
            (None, None) => break,
            (red_pick, blue_pick) => {
                order.extend(red_pick);
                order.extend(blue_pick);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mvp_scoring_and_feats() {
        let line = MatchPlayerStats { goals: 2, assists: 1, interceptions: 3 };
        assert_eq!(line.mvp_score(), 31);
        assert_eq!(line.feat_count(), 2); // 2 goals, 3 interceptions

        let loaded = MatchPlayerStats { goals: 3, assists: 2, interceptions: 5 };
        assert_eq!(loaded.feat_count(), 3);
    }

    #[test]
    fn goal_recording_credits_scorer_and_assist() {
        let mut m = MatchState::new();
        let scorer = Uuid::new_v4();
        let assist = Uuid::new_v4();

        m.record_goal(Team::Blue, Some(scorer), Some(assist));
        assert_eq!(m.score_blue, 1);
        assert_eq!(m.stats[&scorer].goals, 1);
        assert_eq!(m.stats[&assist].assists, 1);
        assert_eq!(m.winner(), Some(Team::Blue));
    }

    #[test]
    fn mvp_requires_a_nonzero_line() {
        let mut m = MatchState::new();
        assert_eq!(m.mvp(), None);

        let p = Uuid::new_v4();
        m.stats_mut(p).interceptions = 1;
        assert_eq!(m.mvp(), Some(p));
    }

    #[test]
    fn selection_pool_refills_when_exhausted() {
        let mut sel = SelectionState {
            order: vec![],
            current: 0,
            available: vec![SkillId::Blink],
            deadline_timer: 0,
            deadline_at: 0,
        };
        sel.take_skill(SkillId::Blink);
        assert_eq!(sel.available.len(), SkillId::ALL.len());
    }

    #[test]
    fn selection_order_interleaves_teams() {
        let red: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let blue: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();

        let order = selection_order(&red, &blue);
        assert_eq!(order.len(), 5);
        assert_eq!(order[0], red[0]);
        assert_eq!(order[1], blue[0]);
        assert_eq!(order[2], red[1]);
        assert_eq!(order[4], red[2]);
    }

    #[test]
    fn removing_the_current_picker_keeps_index_valid() {
        let players: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut m = MatchState::new();
        m.selection = Some(SelectionState {
            order: players.clone(),
            current: 1,
            available: SkillId::ALL.to_vec(),
            deadline_timer: 0,
            deadline_at: 0,
        });

        m.remove_player(players[0]);
        let sel = m.selection.as_ref().unwrap();
        assert_eq!(sel.current, 0);
        assert_eq!(sel.current_picker(), Some(players[1]));
    }

    #[test]
    fn reset_returns_to_lobby() {
        let mut m = MatchState::new();
        m.status = MatchStatus::Active;
        m.score_red = 3;
        m.assigned_skills.insert(Uuid::new_v4(), SkillId::Blink);

        m.reset();
        assert_eq!(m.status, MatchStatus::Lobby);
        assert_eq!(m.score_red, 0);
        assert!(m.assigned_skills.is_empty());
    }
}
