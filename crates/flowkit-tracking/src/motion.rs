//! Aggregation of point tracks into a single motion estimate.

use serde::{Deserialize, Serialize};

use crate::pyr_lk::Track;

/// How a mean motion vector is turned into a [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionScheme {
    /// Two buckets split on the sign of the angle: `Up` or `Down`.
    Legacy,
    /// Four sectors of 90 degrees centered on the axes.
    FourWay,
    /// Eight sectors of 45 degrees centered on the axes and diagonals.
    #[default]
    EightWay,
}

/// Coarse direction of motion in screen terms, `y` growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Toward the top of the image.
    Up,
    /// Toward the bottom of the image.
    Down,
    /// Toward the left of the image.
    Left,
    /// Toward the right of the image.
    Right,
    /// Toward the top left corner.
    UpLeft,
    /// Toward the top right corner.
    UpRight,
    /// Toward the bottom left corner.
    DownLeft,
    /// Toward the bottom right corner.
    DownRight,
    /// No direction, the motion vector is zero.
    Indeterminate,
}

impl Direction {
    /// Lower case label of the direction.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::UpLeft => "up-left",
            Direction::UpRight => "up-right",
            Direction::DownLeft => "down-left",
            Direction::DownRight => "down-right",
            Direction::Indeterminate => "indeterminate",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Classify a motion vector.
///
/// # Arguments
///
/// * `dx` - Horizontal motion, positive to the right.
/// * `dy` - Vertical motion, positive downward.
/// * `scheme` - The labelling scheme.
///
/// A zero vector is [`Direction::Indeterminate`] in every scheme.
pub fn classify(dx: f32, dy: f32, scheme: DirectionScheme) -> Direction {
    if dx == 0.0 && dy == 0.0 {
        return Direction::Indeterminate;
    }

    match scheme {
        DirectionScheme::Legacy => {
            let angle = motion_angle(dx, dy);
            if angle < 0.0 {
                Direction::Up
            } else if angle > 0.0 {
                Direction::Down
            } else {
                Direction::Indeterminate
            }
        }
        DirectionScheme::FourWay => {
            let sector = (dy.atan2(dx).to_degrees() / 90.0).round() as i32;
            match sector {
                0 => Direction::Right,
                1 => Direction::Down,
                -1 => Direction::Up,
                _ => Direction::Left,
            }
        }
        DirectionScheme::EightWay => {
            let sector = (dy.atan2(dx).to_degrees() / 45.0).round() as i32;
            match sector {
                0 => Direction::Right,
                1 => Direction::DownRight,
                2 => Direction::Down,
                3 => Direction::DownLeft,
                -1 => Direction::UpRight,
                -2 => Direction::Up,
                -3 => Direction::UpLeft,
                _ => Direction::Left,
            }
        }
    }
}

/// Angle of the reversed motion vector `atan2(-dy, -dx)`, in degrees.
///
/// Returns 0 for a zero vector. Signed zeros are negated like any other
/// value, so purely rightward motion with `dy == 0.0` gives -180 degrees.
pub fn motion_angle(dx: f32, dy: f32) -> f32 {
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    (-dy).atan2(-dx).to_degrees()
}

/// The aggregated motion between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEstimate {
    /// Mean horizontal displacement of the valid tracks.
    pub mean_dx: f32,
    /// Mean vertical displacement of the valid tracks.
    pub mean_dy: f32,
    /// Euclidean norm of the mean displacement.
    pub magnitude: f32,
    /// Angle of the reversed mean displacement in degrees, see [`motion_angle`].
    pub angle_degrees: f32,
    /// Direction label of the mean displacement.
    pub direction: Direction,
    /// Number of tracks that contributed to the mean.
    pub valid_count: usize,
    /// Number of tracks given to the aggregation.
    pub total_count: usize,
}

impl MotionEstimate {
    /// Aggregate tracks into a motion estimate.
    ///
    /// Only valid tracks contribute, all with the same weight. Returns `None`
    /// when no track is valid, which is distinct from an estimate with zero
    /// magnitude.
    pub fn from_tracks(tracks: &[Track], scheme: DirectionScheme) -> Option<Self> {
        let (sum_dx, sum_dy, valid_count) = tracks
            .iter()
            .filter(|t| t.is_valid())
            .fold((0.0f64, 0.0f64, 0usize), |(sx, sy, n), t| {
                (sx + t.dx as f64, sy + t.dy as f64, n + 1)
            });

        if valid_count == 0 {
            return None;
        }

        let mean_dx = (sum_dx / valid_count as f64) as f32;
        let mean_dy = (sum_dy / valid_count as f64) as f32;

        Some(Self {
            mean_dx,
            mean_dy,
            magnitude: mean_dx.hypot(mean_dy),
            angle_degrees: motion_angle(mean_dx, mean_dy),
            direction: classify(mean_dx, mean_dy, scheme),
            valid_count,
            total_count: tracks.len(),
        })
    }
}

/// Aggregate tracks into a motion estimate, see [`MotionEstimate::from_tracks`].
pub fn aggregate(tracks: &[Track], scheme: DirectionScheme) -> Option<MotionEstimate> {
    MotionEstimate::from_tracks(tracks, scheme)
}
