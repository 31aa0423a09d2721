//! Full-state snapshot building for broadcast

use std::collections::HashMap;

use crate::ws::protocol::{BulletView, PlayerView, ServerMsg};

use super::arena::PlayerState;
use super::combat::Projectile;
use super::PlayerId;

/// Build the complete `update` snapshot from the current simulation
/// state. Iteration order is irrelevant; receivers key by identity.
pub fn build_update(
    players: &HashMap<PlayerId, PlayerState>,
    projectiles: &[Projectile],
) -> ServerMsg {
    let players = players
        .iter()
        .map(|(id, p)| {
            (
                *id,
                PlayerView {
                    position: p.position,
                    size: p.size,
                    speed: p.speed,
                    alive: p.alive,
                    colour: p.colour.to_string(),
                    score: p.score,
                },
            )
        })
        .collect();

    let bullets = projectiles
        .iter()
        .map(|b| BulletView {
            id: b.id,
            x: b.position.x,
            y: b.position.y,
        })
        .collect();

    ServerMsg::Update { players, bullets }
}
