//! Arena geometry: points, bounds clamping, and overlap tests

use serde::{Deserialize, Serialize};

/// A point or direction on the arena plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two points
    pub fn distance(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit-length copy of this vector; None for the zero vector
    pub fn normalized(self) -> Option<Vec2> {
        let len = self.length();
        if len > 0.0 {
            Some(Vec2::new(self.x / len, self.y / len))
        } else {
            None
        }
    }
}

/// Fixed rectangular world size, set once from the first client handshake
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    /// Clamp a point so a circle of the given radius stays fully inside
    /// the arena. A radius larger than the half-extent resolves to the
    /// far inset rather than panicking.
    pub fn clamp(&self, point: Vec2, radius: f32) -> Vec2 {
        Vec2 {
            x: point.x.max(radius).min(self.width - radius),
            y: point.y.max(radius).min(self.height - radius),
        }
    }
}

/// Melee overlap rule: centers closer than the sum of the two radii.
/// Sizes are diameters, so the threshold is the average of the sizes.
pub fn circles_overlap(a: Vec2, a_size: f32, b: Vec2, b_size: f32) -> bool {
    a.distance(b) < (a_size + b_size) / 2.0
}
