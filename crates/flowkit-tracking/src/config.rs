use flowkit_imgproc::{features::CornerDetector, parallel::ExecutionStrategy};
use serde::{Deserialize, Serialize};

use crate::{motion::DirectionScheme, pyr_lk::PyrLkParams, TrackingError};

/// Options of the motion estimation pipeline.
///
/// Every field has a default, so a partial JSON document only needs the values
/// it wants to change.
///
/// # Example
///
/// ```
/// use flowkit_tracking::MotionConfig;
///
/// let config = MotionConfig::from_json_str(r#"{ "max_candidates": 50 }"#).unwrap();
/// assert_eq!(config.max_candidates, 50);
/// assert_eq!(config.window_size, 15);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Upper bound on the number of tracked points.
    pub max_candidates: usize,
    /// Relative corner score threshold, as a fraction of the best score.
    pub min_quality: f32,
    /// Minimum spacing between selected corners, in pixels.
    pub min_separation: f32,
    /// Side of the square tracking window, in pixels. Must be odd.
    pub window_size: usize,
    /// Number of pyramid levels below the base.
    pub max_level: usize,
    /// Iteration cap of the solver at each level.
    pub max_iterations: usize,
    /// Convergence threshold on the displacement update, in pixels.
    pub epsilon: f32,
    /// Structure tensor window of the corner detector. Must be odd.
    pub block_size: usize,
    /// Smallest normalized eigenvalue of the tracking gradient matrix.
    pub min_eigen_threshold: f32,
    /// Largest mean absolute intensity difference of a valid track.
    pub max_residual: f32,
    /// Reject tracks that used up `max_iterations` without converging. On by default.
    pub require_convergence: bool,
    /// How the mean motion vector is turned into a direction label.
    pub direction_scheme: DirectionScheme,
    /// How the per point tracking is scheduled.
    #[serde(skip)]
    pub execution: ExecutionStrategy,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            max_candidates: 100,
            min_quality: 0.3,
            min_separation: 7.0,
            window_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            block_size: 3,
            min_eigen_threshold: 1e-4,
            max_residual: 12.0,
            require_convergence: true,
            direction_scheme: DirectionScheme::default(),
            execution: ExecutionStrategy::default(),
        }
    }
}

impl MotionConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, TrackingError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every option holds a usable value.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.max_candidates == 0 {
            return Err(invalid("max_candidates must be greater than zero"));
        }
        if !(self.min_quality.is_finite() && self.min_quality > 0.0 && self.min_quality <= 1.0) {
            return Err(invalid(format!(
                "min_quality must be in (0, 1], got {}",
                self.min_quality
            )));
        }
        if !(self.min_separation.is_finite() && self.min_separation >= 0.0) {
            return Err(invalid(format!(
                "min_separation must be a non negative number, got {}",
                self.min_separation
            )));
        }
        if self.window_size < 3 || self.window_size % 2 == 0 {
            return Err(invalid(format!(
                "window_size must be odd and at least 3, got {}",
                self.window_size
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be greater than zero"));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(invalid(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return Err(invalid(format!(
                "block_size must be odd, got {}",
                self.block_size
            )));
        }
        if !(self.min_eigen_threshold.is_finite() && self.min_eigen_threshold >= 0.0) {
            return Err(invalid(format!(
                "min_eigen_threshold must be a non negative number, got {}",
                self.min_eigen_threshold
            )));
        }
        if !(self.max_residual.is_finite() && self.max_residual > 0.0) {
            return Err(invalid(format!(
                "max_residual must be positive, got {}",
                self.max_residual
            )));
        }
        if self.execution == ExecutionStrategy::Fixed(0) {
            return Err(invalid("execution needs at least one thread"));
        }
        Ok(())
    }

    /// Set the maximum number of candidates.
    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Set the relative corner quality.
    pub fn with_min_quality(mut self, min_quality: f32) -> Self {
        self.min_quality = min_quality;
        self
    }

    /// Set the minimum corner spacing.
    pub fn with_min_separation(mut self, min_separation: f32) -> Self {
        self.min_separation = min_separation;
        self
    }

    /// Set the tracking window size.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the number of pyramid levels below the base.
    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        self
    }

    /// Set the convergence criteria of the solver.
    pub fn with_termination(mut self, max_iterations: usize, epsilon: f32) -> Self {
        self.max_iterations = max_iterations;
        self.epsilon = epsilon;
        self
    }

    /// Set the residual ceiling of a valid track.
    pub fn with_max_residual(mut self, max_residual: f32) -> Self {
        self.max_residual = max_residual;
        self
    }

    /// Require convergence for a track to be valid.
    pub fn with_require_convergence(mut self, require_convergence: bool) -> Self {
        self.require_convergence = require_convergence;
        self
    }

    /// Set the direction labelling scheme.
    pub fn with_direction_scheme(mut self, direction_scheme: DirectionScheme) -> Self {
        self.direction_scheme = direction_scheme;
        self
    }

    /// Set the execution strategy of the tracker.
    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = execution;
        self
    }

    /// Distance from the image border inside which a point cannot be tracked.
    ///
    /// The tracking window has to fit at the coarsest pyramid level, where a
    /// pixel covers `2^max_level` pixels of the base image.
    pub fn tracking_border(&self) -> usize {
        (self.window_size / 2 + 1) << self.max_level
    }

    /// The corner detector described by this configuration.
    ///
    /// Corners closer to the border than [`MotionConfig::tracking_border`] are
    /// not selected.
    pub fn corner_detector(&self) -> CornerDetector {
        CornerDetector::new(self.max_candidates, self.min_quality, self.min_separation)
            .with_block_size(self.block_size)
            .with_border(self.tracking_border())
    }

    /// The tracker parameters described by this configuration.
    pub fn tracker_params(&self) -> PyrLkParams {
        PyrLkParams {
            window_size: self.window_size,
            max_level: self.max_level,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
            min_eigen_threshold: self.min_eigen_threshold,
            max_residual: self.max_residual,
            require_convergence: self.require_convergence,
        }
    }
}

fn invalid(msg: impl Into<String>) -> TrackingError {
    TrackingError::InvalidConfig(msg.into())
}
