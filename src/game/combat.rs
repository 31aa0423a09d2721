//! Projectile flight: movement, wall bounces, expiry, hit detection

use super::physics::{Bounds, Vec2};
use super::PlayerId;

/// Projectile flight speed in pixels per second
pub const PROJECTILE_SPEED: f32 = 300.0;
/// Lifetime after which a projectile burns out
pub const PROJECTILE_LIFETIME: f32 = 4.0;
/// Window after firing during which a projectile cannot hurt its own
/// firer, so a fresh shot can clear the firer's collision circle
pub const SELF_HIT_GRACE: f32 = 0.5;

/// Active projectile in the arena
#[derive(Debug, Clone)]
pub struct Projectile {
    /// Monotonic counter, unique for the process lifetime
    pub id: u64,
    pub owner_id: PlayerId,
    pub position: Vec2,
    /// Unit direction vector
    pub direction: Vec2,
    /// Seconds since firing, accumulated from tick deltas
    pub age: f32,
}

impl Projectile {
    pub fn new(id: u64, owner_id: PlayerId, position: Vec2, direction: Vec2) -> Self {
        Self {
            id,
            owner_id,
            position,
            direction,
            age: 0.0,
        }
    }

    /// Advance along the current direction and reflect off arena walls.
    /// Edges are elastic: each axis inverts independently and the
    /// coordinate is clamped back onto the boundary.
    pub fn advance(&mut self, bounds: Bounds, dt: f32) {
        self.position.x += self.direction.x * PROJECTILE_SPEED * dt;
        self.position.y += self.direction.y * PROJECTILE_SPEED * dt;
        self.age += dt;

        if self.position.x <= 0.0 {
            self.direction.x = -self.direction.x;
            self.position.x = 0.0;
        } else if self.position.x >= bounds.width {
            self.direction.x = -self.direction.x;
            self.position.x = bounds.width;
        }

        if self.position.y <= 0.0 {
            self.direction.y = -self.direction.y;
            self.position.y = 0.0;
        } else if self.position.y >= bounds.height {
            self.direction.y = -self.direction.y;
            self.position.y = bounds.height;
        }
    }

    pub fn expired(&self) -> bool {
        self.age > PROJECTILE_LIFETIME
    }

    /// Whether the projectile is allowed to hurt this player yet.
    /// The owner is immune until the grace period has elapsed.
    pub fn can_hit(&self, player_id: PlayerId) -> bool {
        player_id != self.owner_id || self.age >= SELF_HIT_GRACE
    }

    /// Hit test against a player's collision circle (size is a diameter)
    pub fn hits(&self, center: Vec2, size: f32) -> bool {
        self.position.distance(center) < size / 2.0
    }
}
