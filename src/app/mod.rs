//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::pitch::GameConfig;
use crate::game::world::StaticWorld;
use crate::game::GameService;
use crate::store::StatsStore;
use crate::ws::rooms::RoomHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: Arc<StaticWorld>,
    pub stats: StatsStore,
    pub room: Arc<RoomHub>,
    pub game: Arc<GameService>,
}

impl AppState {
    pub fn new(config: Config, world: StaticWorld) -> Self {
        let config = Arc::new(config);
        let world = Arc::new(world);
        let stats = StatsStore::new();
        let room = Arc::new(RoomHub::new());

        let game_config = GameConfig::from_config(&config, 0, 0);
        let game = Arc::new(GameService::new(
            game_config,
            world.clone(),
            stats.clone(),
            room.clone(),
        ));

        Self {
            config,
            world,
            stats,
            room,
            game,
        }
    }
}
