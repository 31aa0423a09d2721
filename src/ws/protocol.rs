//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::physics::Vec2;
use crate::game::PlayerId;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// One-time handshake. The first sender fixes the arena bounds;
    /// every sender is registered as a player.
    SetDimensions { width: f32, height: f32 },

    /// Absolute position request; clamped and applied if the sender is
    /// alive, then checked for melee contact.
    Move { position: Vec2 },

    /// Spawn a projectile. The direction is normalized server-side;
    /// zero directions are discarded.
    Fire { direction: Vec2 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Assigned identity, sent once right after the handshake
    Init { id: PlayerId },

    /// Full state snapshot, sent on every state change and every tick.
    /// No delta encoding; every snapshot is self-describing.
    Update {
        players: HashMap<PlayerId, PlayerView>,
        bullets: Vec<BulletView>,
    },
}

/// A player's visible fields in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub position: Vec2,
    pub size: f32,
    pub speed: f32,
    pub alive: bool,
    pub colour: String,
    pub score: u32,
}

/// A projectile in a snapshot. Ids are numeric on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}
