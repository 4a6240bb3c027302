//! Game simulation modules

pub mod collision;
pub mod input;
pub mod kernel;
pub mod r#match;
pub mod pitch;
pub mod service;
pub mod skills;
pub mod snapshot;
pub mod state;
pub mod timers;
pub mod world;

pub use pitch::{GameConfig, SoccerGame};
pub use service::GameService;

use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, PlayerStats};

/// Scene name that routes a player into the soccer simulation
pub const SOCCER_SCENE: &str = "SoccerMap";

/// Message from the network layer into the simulation loop
///
/// Connection handlers only ever enqueue; all state mutation happens on the
/// loop when these are drained.
#[derive(Debug)]
pub enum IngressMsg {
    /// Player entered the soccer scene; stats were read through the
    /// repository before enqueueing (None means unassigned)
    Join {
        player: Uuid,
        display_name: String,
        x: f64,
        y: f64,
        stats: Option<PlayerStats>,
    },
    /// Player left the scene or disconnected
    Leave { player: Uuid },
    /// Any gameplay message from a connected player
    Command { player: Uuid, msg: ClientMsg },
}
