//! Room fan-out and per-player direct delivery

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Fan-out hub for the soccer scene
///
/// Broadcast messages reach every subscribed connection; direct messages
/// (request/reply, mid-game pick prompts) go to a single player's socket.
pub struct RoomHub {
    broadcast_tx: broadcast::Sender<ServerMsg>,
    direct: DashMap<Uuid, mpsc::UnboundedSender<ServerMsg>>,
}

impl RoomHub {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            broadcast_tx,
            direct: DashMap::new(),
        }
    }

    /// Subscribe to room-wide broadcasts
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    /// Register a connection's direct channel
    pub fn register(&self, player: Uuid, tx: mpsc::UnboundedSender<ServerMsg>) {
        self.direct.insert(player, tx);
    }

    /// Remove a connection's direct channel
    pub fn unregister(&self, player: Uuid) {
        self.direct.remove(&player);
    }

    /// Send to every connection in the room
    pub fn broadcast(&self, msg: ServerMsg) {
        let _ = self.broadcast_tx.send(msg);
    }

    /// Send to a single player's connection
    pub fn send_to(&self, player: Uuid, msg: ServerMsg) {
        if let Some(tx) = self.direct.get(&player) {
            let _ = tx.send(msg);
        }
    }

    pub fn connected(&self) -> usize {
        self.direct.len()
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}
