//! Simulation loop lifecycle
//!
//! The process runs at most one soccer simulation. Only a scene join starts
//! it; it stops itself when the scene empties, and leaves or commands that
//! arrive while no loop runs are dropped rather than spawning an empty one.
//! Start and stop are idempotent, guarded by a single running flag.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::pitch::{GameConfig, SoccerGame};
use crate::game::world::StaticWorld;
use crate::game::IngressMsg;
use crate::store::StatsStore;
use crate::util::time::unix_millis;
use crate::ws::rooms::RoomHub;

/// Handle through which the network layer reaches the simulation
pub struct GameService {
    cfg: GameConfig,
    world: Arc<StaticWorld>,
    stats: StatsStore,
    room: Arc<RoomHub>,
    running: Arc<AtomicBool>,
    player_count: Arc<AtomicUsize>,
    ingress: Mutex<Option<mpsc::Sender<IngressMsg>>>,
}

impl GameService {
    pub fn new(cfg: GameConfig, world: Arc<StaticWorld>, stats: StatsStore, room: Arc<RoomHub>) -> Self {
        Self {
            cfg,
            world,
            stats,
            room,
            running: Arc::new(AtomicBool::new(false)),
            player_count: Arc::new(AtomicUsize::new(0)),
            ingress: Mutex::new(None),
        }
    }

    /// Deliver a message to the loop
    ///
    /// Only a join may start a loop; anything else is dropped while none is
    /// running. The loop may also exit between obtaining a sender and
    /// sending (last player left); one retry covers that window.
    pub async fn send(&self, msg: IngressMsg) {
        let mut msg = msg;
        for _ in 0..2 {
            let starts_loop = matches!(msg, IngressMsg::Join { .. });
            let Some(tx) = self.sender(starts_loop) else {
                debug!("no simulation loop running, dropping non-join ingress");
                return;
            };
            match tx.send(msg).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    msg = returned;
                }
            }
        }
        warn!("dropping ingress message, simulation loop unavailable");
    }

    /// Current sender; spawns the loop only when `spawn_if_stopped` is set
    fn sender(&self, spawn_if_stopped: bool) -> Option<mpsc::Sender<IngressMsg>> {
        let mut guard = self.ingress.lock().expect("ingress lock poisoned");

        if self.running.load(Ordering::Acquire) {
            if let Some(tx) = guard.as_ref() {
                return Some(tx.clone());
            }
        }
        if !spawn_if_stopped {
            return None;
        }

        let mut cfg = self.cfg.clone();
        cfg.rng_seed = unix_millis();
        cfg.start_ms = unix_millis();

        let (game, tx) = SoccerGame::new(
            cfg,
            self.world.clone(),
            self.room.clone(),
            self.stats.clone(),
            self.running.clone(),
            self.player_count.clone(),
        );

        *guard = Some(tx.clone());
        self.running.store(true, Ordering::Release);
        tokio::spawn(game.run());
        info!("simulation loop spawned");

        Some(tx)
    }

    /// Whether a loop is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Players currently in the soccer scene
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}
