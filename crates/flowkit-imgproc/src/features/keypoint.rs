use serde::{Deserialize, Serialize};

/// A point in continuous image coordinates, `x` along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2d {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Point2d {
    /// Create a new point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance to another point.
    pub fn distance_squared(&self, other: &Point2d) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2d) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// A detected corner with its strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Location of the corner.
    pub point: Point2d,
    /// Corner strength, higher is better.
    pub score: f32,
}
