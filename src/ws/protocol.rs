//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Team membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
    Spectator,
    #[serde(rename = "none")]
    Unassigned,
}

impl Team {
    /// The team awarded a goal scored into this team's zone
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
            other => other,
        }
    }

    /// True for red or blue
    pub fn is_on_pitch(self) -> bool {
        matches!(self, Team::Red | Team::Blue)
    }

    /// Attacking direction along the x axis (red plays left to right)
    pub fn attack_sign(self) -> f64 {
        match self {
            Team::Red => 1.0,
            Team::Blue => -1.0,
            _ => 0.0,
        }
    }
}

/// The six pickable skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillId {
    Slowdown,
    Blink,
    Metavision,
    NinjaStep,
    LurkingRadius,
    PowerShot,
}

impl SkillId {
    pub const ALL: [SkillId; 6] = [
        SkillId::Slowdown,
        SkillId::Blink,
        SkillId::Metavision,
        SkillId::NinjaStep,
        SkillId::LurkingRadius,
        SkillId::PowerShot,
    ];
}

/// Soccer stat allocation; the three values always sum to 15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub speed: u8,
    pub kick_power: u8,
    pub dribbling: u8,
}

impl PlayerStats {
    pub const TOTAL: u8 = 15;

    /// Even 5/5/5 split used when a player has no persisted stats
    pub fn balanced() -> Self {
        Self { speed: 5, kick_power: 5, dribbling: 5 }
    }

    pub fn is_valid(&self) -> bool {
        self.speed as u16 + self.kick_power as u16 + self.dribbling as u16 == Self::TOTAL as u16
    }
}

/// Facing direction for skill activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FacingDirection {
    pub fn unit_vector(self) -> (f64, f64) {
        match self {
            FacingDirection::Up => (0.0, -1.0),
            FacingDirection::Down => (0.0, 1.0),
            FacingDirection::Left => (-1.0, 0.0),
            FacingDirection::Right => (1.0, 0.0),
        }
    }
}

/// One frame of directional input with its client sequence number
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputFrame {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub sequence: u32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Register in a scene; SoccerMap joins the simulation
    PlayerJoin {
        x: f64,
        y: f64,
        scene: String,
    },

    /// Ordered batch of directional inputs, never downsampled by the client
    PlayerInputBatch {
        inputs: Vec<InputFrame>,
    },

    /// Kick attempt aimed at `angle` radians
    BallKick {
        angle: f64,
        kick_power: f64,
        /// Client capture time, used as a lag compensation hint only
        timestamp: Option<u64>,
        /// Echoed back in the kick event for client-side dedup
        local_kick_id: Option<u64>,
    },

    /// Dribble nudge; the client kinematics are advisory
    BallDribble {
        player_x: f64,
        player_y: f64,
        player_vx: f64,
        player_vy: f64,
        timestamp: Option<u64>,
    },

    /// Join a team in the lobby (omit for automatic balancing)
    AssignTeam {
        team: Option<Team>,
    },

    /// Reset the match back to the lobby
    ResetGame,

    /// Begin the skill selection phase
    StartGame,

    /// Shuffle all lobby players across red and blue
    RandomizeTeams,

    /// Pick a skill during the selection phase
    PickSkill {
        skill_id: SkillId,
    },

    /// Activate the assigned skill (or any skill while in the lobby)
    ActivateSkill {
        skill_id: SkillId,
        facing: Option<FacingDirection>,
    },

    /// Request/reply: full game state sync
    RequestGameState,

    /// Request/reply: skill cooldown/duration table
    RequestSkillConfig,

    /// Request/reply: connected player roster
    GetPlayers,

    /// Leave or enter the soccer scene
    SceneChange {
        new_scene: String,
        x: f64,
        y: f64,
    },

    /// Ping for latency measurement
    Ping {
        t: u64,
    },
}

/// Ball state as broadcast at network cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub last_touch: Option<Uuid>,
    pub kick_sequence: u64,
    pub server_tick: u64,
    pub timestamp: u64,
}

/// Per-player state as broadcast at network cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub is_ghosted: bool,
    pub is_spectator: bool,
    pub last_processed_sequence: u32,
    pub timestamp: u64,
}

/// Roster entry for lobby and request/reply queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub display_name: String,
    pub team: Team,
    pub stats: PlayerStats,
    pub skill: Option<SkillId>,
}

/// Cooldown/duration entry for the skill config reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfigEntry {
    pub id: SkillId,
    pub cooldown_ms: u64,
    pub duration_ms: u64,
}

/// Per-player MMR adjustment reported at game end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmrUpdate {
    pub player: Uuid,
    pub old_mmr: i32,
    pub new_mmr: i32,
    pub delta: i32,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection; `stats` is null until the player
    /// has assigned their soccer stats
    Welcome {
        user_id: Uuid,
        server_time: u64,
        stats: Option<PlayerStats>,
    },

    /// Authoritative ball snapshot
    BallState {
        ball: BallSnapshot,
    },

    /// Authoritative player snapshots with input acknowledgements
    PlayersUpdate {
        players: Vec<PlayerSnapshot>,
    },

    /// A kick was accepted; clients reconcile their prediction against it
    BallKicked {
        kicker: Uuid,
        kick_sequence: u64,
        local_kick_id: Option<u64>,
    },

    /// Possession changed across teams
    BallIntercepted {
        player: Uuid,
        team: Team,
    },

    /// A goal was scored
    GoalScored {
        scoring_team: Team,
        scorer: Option<Uuid>,
        assist: Option<Uuid>,
        score_red: u32,
        score_blue: u32,
    },

    /// A player was teleported back to their spawn
    PlayerReset {
        player: Uuid,
        x: f64,
        y: f64,
    },

    /// Team assignment result
    TeamAssigned {
        player: Uuid,
        team: Team,
    },

    /// Match returned to the lobby
    GameReset,

    /// Skill selection phase opened
    SelectionPhaseStarted {
        order: Vec<Uuid>,
        available: Vec<SkillId>,
        picker: Uuid,
        deadline_ms: u64,
    },

    /// Turn advanced to the next picker
    SelectionUpdate {
        picker: Uuid,
        available: Vec<SkillId>,
        deadline_ms: u64,
    },

    /// A skill was picked (auto is true for deadline auto-picks)
    SkillPicked {
        player: Uuid,
        skill_id: SkillId,
        auto: bool,
    },

    /// A player without a skill must pick one mid-game
    StartMidGamePick {
        player: Uuid,
        available: Vec<SkillId>,
    },

    /// A skill activation was accepted
    SkillActivated {
        player: Uuid,
        skill_id: SkillId,
    },

    /// A timed skill effect expired
    SkillEnded {
        player: Uuid,
        skill_id: SkillId,
    },

    /// A two-stage skill fired its payload (lurking intercept, power shot)
    SkillTriggered {
        player: Uuid,
        skill_id: SkillId,
    },

    /// Blink teleport with both endpoints for client-side effects
    BlinkActivated {
        player: Uuid,
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
    },

    /// The match left selection and went live
    GameStarted,

    /// Regulation ended in a tie; overtime granted
    Overtime {
        seconds: u64,
    },

    /// Whole-second match clock change (1 Hz)
    TimerUpdate {
        seconds_remaining: u64,
    },

    /// Match finished
    GameEnd {
        winner: Option<Team>,
        score_red: u32,
        score_blue: u32,
        mvp: Option<Uuid>,
        mmr_updates: Vec<MmrUpdate>,
    },

    /// Request/reply: full game state sync
    GameStateSync {
        status: String,
        score_red: u32,
        score_blue: u32,
        seconds_remaining: u64,
        overtime: bool,
        ball: BallSnapshot,
        players: Vec<PlayerInfo>,
    },

    /// Request/reply: skill cooldown/duration table
    SkillConfig {
        skills: Vec<SkillConfigEntry>,
    },

    /// Request/reply: connected player roster
    Players {
        players: Vec<PlayerInfo>,
    },

    /// Validation error for request/reply messages
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        t: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_round_trips() {
        let json = r#"{"type":"ball_kick","angle":0.5,"kick_power":1000.0,"timestamp":12345,"local_kick_id":7}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::BallKick { angle, kick_power, timestamp, local_kick_id } => {
                assert!((angle - 0.5).abs() < 1e-12);
                assert_eq!(kick_power, 1000.0);
                assert_eq!(timestamp, Some(12345));
                assert_eq!(local_kick_id, Some(7));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn team_serializes_to_snake_case() {
        assert_eq!(serde_json::to_string(&Team::Red).unwrap(), "\"red\"");
        assert_eq!(serde_json::to_string(&Team::Unassigned).unwrap(), "\"none\"");
        let t: Team = serde_json::from_str("\"spectator\"").unwrap();
        assert_eq!(t, Team::Spectator);
    }

    #[test]
    fn skill_id_serializes_to_snake_case() {
        assert_eq!(serde_json::to_string(&SkillId::NinjaStep).unwrap(), "\"ninja_step\"");
        let s: SkillId = serde_json::from_str("\"lurking_radius\"").unwrap();
        assert_eq!(s, SkillId::LurkingRadius);
    }

    #[test]
    fn stats_invariant() {
        assert!(PlayerStats::balanced().is_valid());
        assert!(!PlayerStats { speed: 10, kick_power: 10, dribbling: 10 }.is_valid());
    }

    #[test]
    fn server_msg_tagged_encoding() {
        let msg = ServerMsg::TimerUpdate { seconds_remaining: 299 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"timer_update\""));
    }
}
