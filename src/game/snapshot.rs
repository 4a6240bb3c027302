//! Snapshot building for network broadcast

use crate::game::r#match::MatchState;
use crate::game::skills::SkillEngine;
use crate::game::state::SimulationState;
use crate::ws::protocol::{BallSnapshot, PlayerInfo, PlayerSnapshot, ServerMsg};

/// Authoritative ball snapshot for the current tick
pub fn ball_snapshot(sim: &SimulationState) -> BallSnapshot {
    BallSnapshot {
        x: sim.ball.x,
        y: sim.ball.y,
        vx: sim.ball.vx,
        vy: sim.ball.vy,
        last_touch: sim.ball.last_touch,
        kick_sequence: sim.ball.kick_sequence,
        server_tick: sim.tick,
        timestamp: sim.now_ms,
    }
}

/// Per-player snapshot array with input acknowledgements
pub fn players_snapshot(sim: &SimulationState, skills: &SkillEngine) -> Vec<PlayerSnapshot> {
    sim.players
        .values()
        .map(|p| PlayerSnapshot {
            id: p.id,
            x: p.x,
            y: p.y,
            vx: p.vx,
            vy: p.vy,
            is_ghosted: skills.effects(p.id).phasing,
            is_spectator: p.is_spectator(),
            last_processed_sequence: p.last_processed_seq,
            timestamp: sim.now_ms,
        })
        .collect()
}

/// Roster for lobby queries and the game state sync reply
pub fn roster(sim: &SimulationState, match_state: &MatchState) -> Vec<PlayerInfo> {
    sim.players
        .values()
        .map(|p| PlayerInfo {
            id: p.id,
            display_name: p.display_name.clone(),
            team: p.team,
            stats: p.stats,
            skill: match_state.assigned_skills.get(&p.id).copied(),
        })
        .collect()
}

/// The pair of broadcast messages sent at network cadence
pub fn network_tick_messages(sim: &SimulationState, skills: &SkillEngine) -> (ServerMsg, ServerMsg) {
    (
        ServerMsg::BallState { ball: ball_snapshot(sim) },
        ServerMsg::PlayersUpdate { players: players_snapshot(sim, skills) },
    )
}
