//! Persistence interface for soccer stats, MMR, and match history

pub mod mmr;
pub mod stats;

pub use stats::{MatchHistoryEntry, MatchHistoryLine, SoccerStatsRecord, StatsStore, StoreError};
