//! Game simulation modules

pub mod arena;
pub mod combat;
pub mod physics;
pub mod snapshot;

pub use arena::{Arena, ArenaHandle};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Identity assigned to a connection; becomes the player identity at
/// registration.
pub type PlayerId = Uuid;

/// Player intent received from a WebSocket connection
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub conn_id: PlayerId,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Events consumed by the arena task. Everything that mutates
/// simulation state arrives here, in order.
#[derive(Debug)]
pub enum ArenaEvent {
    /// A `set_dimensions` handshake. The first sender fixes the arena
    /// bounds; every sender is registered as a player.
    Handshake {
        conn_id: PlayerId,
        width: f32,
        height: f32,
        outbound: mpsc::UnboundedSender<ServerMsg>,
    },
    /// A `move` or `fire` intent
    Input(PlayerInput),
    /// Connection closed; the registry entry is dropped
    Disconnected { conn_id: PlayerId },
    /// A respawn timer elapsed
    RespawnDue { player_id: PlayerId },
}
