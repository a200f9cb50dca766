//! End to end motion estimation between two frames.

use flowkit_image::{Image, ImageDtype};
use flowkit_imgproc::{
    features::{Candidate, CornerDetector},
    pyramid::ImagePyramid,
};
use serde::{Deserialize, Serialize};

use crate::{
    motion::{aggregate, MotionEstimate},
    pyr_lk::{PyramidalLkTracker, Track},
    MotionConfig, TrackingError,
};

/// Everything computed for a pair of frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionOutput {
    /// Corners detected in the first frame, strongest first.
    pub candidates: Vec<Candidate>,
    /// One track per candidate, in the same order.
    pub tracks: Vec<Track>,
    /// The aggregated motion, `None` when no track is valid.
    pub estimate: Option<MotionEstimate>,
}

impl MotionOutput {
    /// Iterate over the tracks that contributed to the estimate.
    pub fn valid_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_valid())
    }
}

/// Estimates the dominant motion between two grayscale frames.
///
/// The pipeline detects corners in the first frame, tracks them into the
/// second one through image pyramids and averages the valid displacements.
/// It holds no state between calls.
#[derive(Debug, Clone)]
pub struct MotionPipeline {
    config: MotionConfig,
    detector: CornerDetector,
    tracker: PyramidalLkTracker,
}

impl MotionPipeline {
    /// Create a pipeline from a validated configuration.
    pub fn new(config: MotionConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        Ok(Self {
            detector: config.corner_detector(),
            tracker: PyramidalLkTracker::new(config.tracker_params()),
            config,
        })
    }

    /// The configuration of the pipeline.
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Estimate the motion from `frame1` to `frame2`.
    ///
    /// Integer frames are read on a 0 to 255 scale. Floating point frames whose
    /// samples all lie in `[0, 1]` are taken as normalized and scaled up to
    /// 0 to 255, so the intensity thresholds of the configuration apply to
    /// both conventions.
    ///
    /// # Errors
    ///
    /// Fails when the frames differ in size or are smaller than twice the
    /// tracking window in either dimension. Points that cannot be tracked are
    /// not errors, they show up as invalid tracks.
    pub fn estimate<T: ImageDtype>(
        &self,
        frame1: &Image<T, 1>,
        frame2: &Image<T, 1>,
    ) -> Result<MotionOutput, TrackingError> {
        if frame1.size() != frame2.size() {
            return Err(TrackingError::FrameSizeMismatch(
                frame1.size(),
                frame2.size(),
            ));
        }

        let min_dim = 2 * self.config.window_size;
        if frame1.width() < min_dim || frame1.height() < min_dim {
            return Err(TrackingError::FrameTooSmall(frame1.size(), min_dim));
        }

        let (frame1, frame2) = to_intensity(frame1, frame2)?;

        let candidates = self.detector.detect(&frame1)?;
        log::debug!("detected {} candidates", candidates.len());

        if candidates.is_empty() {
            log::info!("no candidates, no motion estimate");
            return Ok(MotionOutput {
                candidates,
                tracks: Vec::new(),
                estimate: None,
            });
        }

        let num_levels = self.config.max_level + 1;
        let pyramid1 = ImagePyramid::build(&frame1, num_levels, self.config.window_size)?;
        let pyramid2 = ImagePyramid::build(&frame2, num_levels, self.config.window_size)?;

        if pyramid1.len() < num_levels {
            log::warn!(
                "pyramid stopped at {} of {} levels for frames of size {}",
                pyramid1.len(),
                num_levels,
                frame1.size()
            );
        }
        log::debug!("built pyramids with {} levels", pyramid1.len());

        let tracks = self.tracker.track(
            &pyramid1,
            &pyramid2,
            &candidates,
            self.config.execution,
        )?;

        let valid = tracks.iter().filter(|t| t.is_valid()).count();
        log::debug!(
            "tracked {} points, {} valid, {} invalid",
            tracks.len(),
            valid,
            tracks.len() - valid
        );

        let estimate = aggregate(&tracks, self.config.direction_scheme);
        match &estimate {
            Some(e) => log::info!(
                "motion dx: {:.3} dy: {:.3} magnitude: {:.3} angle: {:.1} direction: {}",
                e.mean_dx,
                e.mean_dy,
                e.magnitude,
                e.angle_degrees,
                e.direction
            ),
            None => log::info!("no valid tracks, no motion estimate"),
        }

        Ok(MotionOutput {
            candidates,
            tracks,
            estimate,
        })
    }
}

/// Estimate the motion between two frames with the given configuration.
///
/// # Example
///
/// ```
/// use flowkit_image::Image;
/// use flowkit_tracking::{estimate_motion, MotionConfig};
///
/// let frame = Image::<u8, 1>::from_size_val([64, 64].into(), 100).unwrap();
/// let output = estimate_motion(&frame, &frame, &MotionConfig::default()).unwrap();
///
/// // a flat frame has nothing to track
/// assert!(output.candidates.is_empty());
/// assert!(output.estimate.is_none());
/// ```
pub fn estimate_motion<T: ImageDtype>(
    frame1: &Image<T, 1>,
    frame2: &Image<T, 1>,
    config: &MotionConfig,
) -> Result<MotionOutput, TrackingError> {
    MotionPipeline::new(config.clone())?.estimate(frame1, frame2)
}

// Both frames share one scale so their intensities stay comparable.
fn to_intensity<T: ImageDtype>(
    frame1: &Image<T, 1>,
    frame2: &Image<T, 1>,
) -> Result<(Image<f32, 1>, Image<f32, 1>), TrackingError> {
    let frame1_f32 = frame1.cast::<f32>()?;
    let frame2_f32 = frame2.cast::<f32>()?;

    if T::INTEGER {
        return Ok((frame1_f32, frame2_f32));
    }

    let max = frame1_f32
        .as_slice()
        .iter()
        .chain(frame2_f32.as_slice())
        .fold(0.0f32, |m, &v| m.max(v));

    if max > 0.0 && max <= 1.0 {
        log::debug!("frames hold normalized intensities, scaling to 0-255");
        return Ok((
            frame1.cast_and_scale::<f32>(255.0)?,
            frame2.cast_and_scale::<f32>(255.0)?,
        ));
    }

    Ok((frame1_f32, frame2_f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{motion::Direction, pyr_lk::TrackStatus};
    use flowkit_image::{ImageError, ImageSize};

    fn pattern(x: f32, y: f32) -> f32 {
        128.0
            + 40.0 * (0.11 * x + 0.05 * y).sin()
            + 40.0 * (0.07 * x - 0.13 * y).cos()
            + 30.0 * (0.17 * x).sin() * (0.19 * y).cos()
    }

    fn frame_u8(size: ImageSize, tx: f32, ty: f32) -> Result<Image<u8, 1>, ImageError> {
        let data = (0..size.height)
            .flat_map(|y| {
                (0..size.width).map(move |x| {
                    u8::from_f32(pattern(x as f32 - tx, y as f32 - ty))
                })
            })
            .collect();
        Image::new(size, data)
    }

    #[test]
    fn test_frame_size_mismatch() -> Result<(), TrackingError> {
        let frame1 = Image::<f32, 1>::from_size_val([64, 64].into(), 0.0)?;
        let frame2 = Image::<f32, 1>::from_size_val([64, 63].into(), 0.0)?;

        let pipeline = MotionPipeline::new(MotionConfig::default())?;
        let res = pipeline.estimate(&frame1, &frame2);
        assert!(matches!(res, Err(TrackingError::FrameSizeMismatch(_, _))));

        Ok(())
    }

    #[test]
    fn test_frame_too_small() -> Result<(), TrackingError> {
        let frame = Image::<f32, 1>::from_size_val([29, 64].into(), 0.0)?;

        let pipeline = MotionPipeline::new(MotionConfig::default())?;
        let res = pipeline.estimate(&frame, &frame);
        assert!(matches!(res, Err(TrackingError::FrameTooSmall(_, 30))));

        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let res = MotionPipeline::new(MotionConfig::default().with_window_size(0));
        assert!(matches!(res, Err(TrackingError::InvalidConfig(_))));
    }

    #[test]
    fn test_uniform_frames_no_estimate() -> Result<(), TrackingError> {
        let frame = Image::<u8, 1>::from_size_val([80, 60].into(), 42)?;
        let output = estimate_motion(&frame, &frame, &MotionConfig::default())?;

        assert!(output.candidates.is_empty());
        assert!(output.tracks.is_empty());
        assert_eq!(output.estimate, None);

        Ok(())
    }

    fn frame_normalized(size: ImageSize, tx: f32, ty: f32) -> Result<Image<f32, 1>, ImageError> {
        let data = (0..size.height)
            .flat_map(|y| {
                (0..size.width).map(move |x| pattern(x as f32 - tx, y as f32 - ty) / 255.0)
            })
            .collect();
        Image::new(size, data)
    }

    #[test]
    fn test_to_intensity_scales_normalized_frames() -> Result<(), TrackingError> {
        let frame = Image::<f32, 1>::new([2, 1].into(), vec![0.2, 1.0])?;
        let (a, b) = to_intensity(&frame, &frame)?;
        approx::assert_relative_eq!(a.as_slice()[0], 51.0, epsilon = 1e-4);
        approx::assert_relative_eq!(b.as_slice()[1], 255.0);

        // a frame already on the 0 to 255 scale is left alone
        let frame = Image::<f32, 1>::new([2, 1].into(), vec![0.5, 200.0])?;
        let (a, _) = to_intensity(&frame, &frame)?;
        assert_eq!(a.as_slice(), &[0.5, 200.0]);

        // dark integer frames are never rescaled
        let frame = Image::<u8, 1>::new([2, 1].into(), vec![0, 1])?;
        let (a, _) = to_intensity(&frame, &frame)?;
        assert_eq!(a.as_slice(), &[0.0, 1.0]);

        Ok(())
    }

    #[test]
    fn test_normalized_frames_translation() -> Result<(), TrackingError> {
        let size = [160, 140].into();
        let frame1 = frame_normalized(size, 0.0, 0.0)?;
        let frame2 = frame_normalized(size, -3.0, 2.0)?;

        let output = estimate_motion(&frame1, &frame2, &MotionConfig::default())?;
        assert!(output.valid_tracks().count() > 0);

        let Some(estimate) = output.estimate else {
            panic!("expected an estimate");
        };
        approx::assert_relative_eq!(estimate.mean_dx, -3.0, epsilon = 0.25);
        approx::assert_relative_eq!(estimate.mean_dy, 2.0, epsilon = 0.25);
        assert_eq!(estimate.direction, Direction::DownLeft);

        Ok(())
    }

    #[test]
    fn test_candidates_leave_room_for_the_window() -> Result<(), TrackingError> {
        let size: ImageSize = [160, 140].into();
        let frame1 = frame_u8(size, 0.0, 0.0)?;
        let frame2 = frame_u8(size, -3.0, 2.0)?;

        let config = MotionConfig::default();
        let border = config.tracking_border() as f32;
        let output = estimate_motion(&frame1, &frame2, &config)?;

        assert!(!output.candidates.is_empty());
        for c in &output.candidates {
            assert!(c.point.x >= border && c.point.x < size.width as f32 - border);
            assert!(c.point.y >= border && c.point.y < size.height as f32 - border);
        }
        assert!(output.valid_tracks().count() > 0);

        Ok(())
    }

    #[test]
    fn test_u8_frames_translation() -> Result<(), TrackingError> {
        let size = [160, 140].into();
        let frame1 = frame_u8(size, 0.0, 0.0)?;
        let frame2 = frame_u8(size, -3.0, 2.0)?;

        let output = estimate_motion(&frame1, &frame2, &MotionConfig::default())?;

        assert!(!output.candidates.is_empty());
        assert_eq!(output.tracks.len(), output.candidates.len());
        assert!(output.valid_tracks().count() > 0);
        assert!(output
            .valid_tracks()
            .all(|t| t.status == TrackStatus::Tracked));

        let Some(estimate) = output.estimate else {
            panic!("expected an estimate");
        };
        approx::assert_relative_eq!(estimate.mean_dx, -3.0, epsilon = 0.25);
        approx::assert_relative_eq!(estimate.mean_dy, 2.0, epsilon = 0.25);
        assert_eq!(estimate.direction, Direction::DownLeft);

        Ok(())
    }
}
