//! Soccer stats repository
//!
//! The simulation talks to persistence through this surface only:
//! `find_stats_by_user_id`, `update_mmr`, `add_match_history`. This
//! implementation keeps everything in process memory; the production
//! deployment puts a database behind the same methods. Stat assignment
//! itself happens through external HTTP CRUD and lands here via `upsert`.

use std::sync::Mutex;

use dashmap::DashMap;
use uuid::Uuid;

use crate::store::mmr;
use crate::ws::protocol::{MmrUpdate, PlayerStats, Team};

/// Persisted per-player soccer record
#[derive(Debug, Clone)]
pub struct SoccerStatsRecord {
    pub user_id: Uuid,
    /// None until the player has assigned their 15 stat points
    pub stats: Option<PlayerStats>,
    pub mmr: i32,
    pub win_streak: u32,
    pub wins: u32,
    pub losses: u32,
}

impl SoccerStatsRecord {
    fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            stats: None,
            mmr: 1000,
            win_streak: 0,
            wins: 0,
            losses: 0,
        }
    }
}

/// One player's line in a match history record
#[derive(Debug, Clone)]
pub struct MatchHistoryLine {
    pub player: Uuid,
    pub team: Team,
    pub goals: u32,
    pub assists: u32,
    pub interceptions: u32,
    pub mvp: bool,
    pub mmr_delta: i32,
}

/// Finished-match record handed to persistence
#[derive(Debug, Clone)]
pub struct MatchHistoryEntry {
    pub finished_at: u64,
    pub score_red: u32,
    pub score_blue: u32,
    pub winner: Option<Team>,
    pub lines: Vec<MatchHistoryLine>,
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stats backend unavailable")]
    Unavailable,

    #[error("invalid stat allocation")]
    InvalidStats,
}

/// In-memory stats store
#[derive(Clone, Default)]
pub struct StatsStore {
    records: std::sync::Arc<DashMap<Uuid, SoccerStatsRecord>>,
    history: std::sync::Arc<Mutex<Vec<MatchHistoryEntry>>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-through lookup used on scene join
    pub fn find_stats_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SoccerStatsRecord>, StoreError> {
        Ok(self.records.get(&user_id).map(|r| r.clone()))
    }

    /// Create or replace a player's stat allocation
    pub fn upsert_stats(&self, user_id: Uuid, stats: PlayerStats) -> Result<(), StoreError> {
        if !stats.is_valid() {
            return Err(StoreError::InvalidStats);
        }
        self.records
            .entry(user_id)
            .or_insert_with(|| SoccerStatsRecord::new(user_id))
            .stats = Some(stats);
        Ok(())
    }

    /// Apply one match result to a player's rating
    pub fn update_mmr(
        &self,
        user_id: Uuid,
        won: bool,
        is_mvp: bool,
        feats: u32,
    ) -> Result<MmrUpdate, StoreError> {
        let mut record = self
            .records
            .entry(user_id)
            .or_insert_with(|| SoccerStatsRecord::new(user_id));

        if won {
            record.win_streak += 1;
            record.wins += 1;
        } else {
            record.win_streak = 0;
            record.losses += 1;
        }

        let delta = mmr::delta(won, record.win_streak, is_mvp, feats);
        let old_mmr = record.mmr;
        record.mmr += delta;

        Ok(MmrUpdate {
            player: user_id,
            old_mmr,
            new_mmr: record.mmr,
            delta,
        })
    }

    /// Append a finished match to the history log
    pub fn add_match_history(&self, entry: MatchHistoryEntry) -> Result<(), StoreError> {
        self.history
            .lock()
            .map_err(|_| StoreError::Unavailable)?
            .push(entry);
        Ok(())
    }

    /// Stored history (tests and admin queries)
    pub fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_player_has_no_stats() {
        let store = StatsStore::new();
        assert!(store.find_stats_by_user_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn upsert_rejects_invalid_allocation() {
        let store = StatsStore::new();
        let bad = PlayerStats { speed: 9, kick_power: 9, dribbling: 9 };
        assert!(matches!(store.upsert_stats(Uuid::new_v4(), bad), Err(StoreError::InvalidStats)));
    }

    #[test]
    fn mmr_streak_accumulates_and_resets() {
        let store = StatsStore::new();
        let p = Uuid::new_v4();

        for _ in 0..2 {
            store.update_mmr(p, true, false, 0).unwrap();
        }
        // Third straight win carries the streak bonus
        let third = store.update_mmr(p, true, false, 0).unwrap();
        assert_eq!(third.delta, 30);

        let loss = store.update_mmr(p, false, false, 0).unwrap();
        assert_eq!(loss.delta, -25);
        let record = store.find_stats_by_user_id(p).unwrap().unwrap();
        assert_eq!(record.win_streak, 0);
        assert_eq!(record.wins, 3);
        assert_eq!(record.losses, 1);
    }

    #[test]
    fn history_appends() {
        let store = StatsStore::new();
        store
            .add_match_history(MatchHistoryEntry {
                finished_at: 0,
                score_red: 2,
                score_blue: 1,
                winner: Some(Team::Red),
                lines: vec![],
            })
            .unwrap();
        assert_eq!(store.history_len(), 1);
    }
}
