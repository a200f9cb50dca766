//! Pyramidal Lucas-Kanade tracking of sparse points.

use flowkit_image::Image;
use flowkit_imgproc::{
    features::{min_eigenvalue, Candidate, Point2d},
    filter::spatial_gradient_float,
    interpolation::{bilinear_interpolation, window_in_bounds},
    parallel::{ExecuteExt, ExecutionStrategy},
    pyramid::ImagePyramid,
};
use serde::{Deserialize, Serialize};

use crate::TrackingError;

/// Floor on the determinant of the normalized gradient matrix.
const DET_FLOOR: f32 = 1e-6;

/// Outcome of tracking a single point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    /// The point was tracked and its residual is acceptable.
    Tracked,
    /// The gradient matrix of the window is close to singular.
    SmallEigenvalue,
    /// The window left the image.
    OutOfBounds,
    /// The solver used up its iterations without converging.
    NotConverged,
    /// The final window differs too much between the frames.
    ResidualTooHigh,
}

/// A point followed from the first frame to the second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Location in the first frame.
    pub start: Point2d,
    /// Location in the second frame.
    pub end: Point2d,
    /// Horizontal displacement.
    pub dx: f32,
    /// Vertical displacement.
    pub dy: f32,
    /// Outcome of the tracking.
    pub status: TrackStatus,
    /// Mean absolute intensity difference over the final window.
    ///
    /// `None` when tracking stopped before the final window was compared.
    pub residual: Option<f32>,
    /// Number of solver iterations at the last level processed.
    pub iterations: usize,
    /// The last pyramid level processed, 0 when tracking reached full resolution.
    pub level: usize,
}

impl Track {
    /// Whether the track may be used to estimate motion.
    pub fn is_valid(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

/// Parameters of the pyramidal Lucas-Kanade tracker.
///
/// Intensity thresholds assume samples on a 0 to 255 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyrLkParams {
    /// Side of the square window, in pixels.
    pub window_size: usize,
    /// Deepest pyramid level used, 0 disables the coarse levels.
    pub max_level: usize,
    /// Iteration cap at each level.
    pub max_iterations: usize,
    /// The solver stops when the update is shorter than this, in pixels.
    pub epsilon: f32,
    /// Smallest eigenvalue of the gradient matrix divided by the window area.
    pub min_eigen_threshold: f32,
    /// Largest mean absolute intensity difference of a valid track.
    pub max_residual: f32,
    /// Reject tracks that did not converge at full resolution.
    ///
    /// On by default. Turning it off keeps tracks that used up their
    /// iterations as long as the residual stays under the ceiling.
    pub require_convergence: bool,
}

impl Default for PyrLkParams {
    fn default() -> Self {
        Self {
            window_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            min_eigen_threshold: 1e-4,
            max_residual: 12.0,
            require_convergence: true,
        }
    }
}

// Template window of the first frame with its gradients, sampled once per level.
struct Patch {
    values: Vec<f32>,
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
    gxx: f32,
    gxy: f32,
    gyy: f32,
}

struct LevelResult {
    dx: f32,
    dy: f32,
    iterations: usize,
    converged: bool,
}

/// Sparse pyramidal Lucas-Kanade tracker.
///
/// # Example
///
/// ```
/// use flowkit_image::Image;
/// use flowkit_imgproc::{features::{Candidate, Point2d}, parallel::ExecutionStrategy, pyramid::ImagePyramid};
/// use flowkit_tracking::{PyramidalLkTracker, PyrLkParams};
///
/// let image = Image::<f32, 1>::from_size_val([64, 64].into(), 10.0).unwrap();
/// let pyramid = ImagePyramid::build(&image, 3, 15).unwrap();
///
/// let candidates = [Candidate { point: Point2d::new(32.0, 32.0), score: 1.0 }];
///
/// let tracker = PyramidalLkTracker::new(PyrLkParams::default());
/// let tracks = tracker.track(&pyramid, &pyramid, &candidates, ExecutionStrategy::Serial).unwrap();
///
/// // nothing to track on a flat image
/// assert_eq!(tracks.len(), 1);
/// assert!(!tracks[0].is_valid());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PyramidalLkTracker {
    params: PyrLkParams,
}

impl PyramidalLkTracker {
    /// Create a tracker.
    pub fn new(params: PyrLkParams) -> Self {
        Self { params }
    }

    /// The tracker parameters.
    pub fn params(&self) -> &PyrLkParams {
        &self.params
    }

    /// Track candidates from the first pyramid to the second.
    ///
    /// Returns one [`Track`] per candidate in the same order. A failure on a
    /// single point is reported through its [`TrackStatus`] and never aborts
    /// the other points.
    ///
    /// # Arguments
    ///
    /// * `pyramid1` - Pyramid of the first frame.
    /// * `pyramid2` - Pyramid of the second frame.
    /// * `candidates` - Points to track, in first frame coordinates.
    /// * `strategy` - How the points are distributed over threads.
    ///
    /// # Errors
    ///
    /// Fails only when the gradients cannot be computed or the thread pool
    /// cannot be built.
    pub fn track(
        &self,
        pyramid1: &ImagePyramid,
        pyramid2: &ImagePyramid,
        candidates: &[Candidate],
        strategy: ExecutionStrategy,
    ) -> Result<Vec<Track>, TrackingError> {
        let num_levels = (self.params.max_level + 1)
            .min(pyramid1.len())
            .min(pyramid2.len());

        if candidates.is_empty() || num_levels == 0 {
            return Ok(Vec::new());
        }

        let mut gradients = Vec::with_capacity(num_levels);
        for level in &pyramid1.levels()[..num_levels] {
            let mut gx = Image::<f32, 1>::from_size_val(level.size(), 0.0)?;
            let mut gy = Image::<f32, 1>::from_size_val(level.size(), 0.0)?;
            spatial_gradient_float(level, &mut gx, &mut gy)?;
            gradients.push((gx, gy));
        }

        let levels1 = &pyramid1.levels()[..num_levels];
        let levels2 = &pyramid2.levels()[..num_levels];

        let tracks = candidates.map_with(strategy, |candidate| {
            self.track_point(candidate.point, levels1, levels2, &gradients)
        })?;

        Ok(tracks)
    }

    fn track_point(
        &self,
        start: Point2d,
        levels1: &[Image<f32, 1>],
        levels2: &[Image<f32, 1>],
        gradients: &[(Image<f32, 1>, Image<f32, 1>)],
    ) -> Track {
        let half = (self.params.window_size / 2) as i32;
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        let failed = |status, dx: f32, dy: f32, level: usize, iterations: usize| {
            // scale the partial displacement back to full resolution
            let scale = (1u32 << level) as f32;
            Track {
                start,
                end: Point2d::new(start.x + dx * scale, start.y + dy * scale),
                dx: dx * scale,
                dy: dy * scale,
                status,
                residual: None,
                iterations,
                level,
            }
        };

        for level in (0..levels1.len()).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let px = start.x * scale;
            let py = start.y * scale;

            let image1 = &levels1[level];
            let image2 = &levels2[level];
            let (grad_x, grad_y) = &gradients[level];

            if !window_in_bounds(image1, px, py, half as f32) {
                return failed(TrackStatus::OutOfBounds, dx, dy, level, 0);
            }

            let patch = sample_patch(image1, grad_x, grad_y, px, py, half);

            let area = patch.values.len() as f32;
            let (a, b, c) = (patch.gxx / area, patch.gxy / area, patch.gyy / area);
            if min_eigenvalue(a, b, c) < self.params.min_eigen_threshold
                || a * c - b * b < DET_FLOOR
            {
                return failed(TrackStatus::SmallEigenvalue, dx, dy, level, 0);
            }

            let result = match self.refine(&patch, image2, px, py, dx, dy, half) {
                Ok(result) => result,
                Err(iterations) => {
                    return failed(TrackStatus::OutOfBounds, dx, dy, level, iterations);
                }
            };

            dx = result.dx;
            dy = result.dy;

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
                continue;
            }

            let end = Point2d::new(start.x + dx, start.y + dy);
            if !window_in_bounds(image2, end.x, end.y, half as f32) {
                return failed(TrackStatus::OutOfBounds, dx, dy, 0, result.iterations);
            }

            let residual = window_residual(&patch, image2, end.x, end.y, half);

            let status = if self.params.require_convergence && !result.converged {
                TrackStatus::NotConverged
            } else if residual > self.params.max_residual {
                TrackStatus::ResidualTooHigh
            } else {
                TrackStatus::Tracked
            };

            return Track {
                start,
                end,
                dx,
                dy,
                status,
                residual: Some(residual),
                iterations: result.iterations,
                level: 0,
            };
        }

        // no level to process
        failed(TrackStatus::OutOfBounds, dx, dy, 0, 0)
    }

    // Iterates the linearized brightness constancy solve at one level.
    // Returns the number of iterations done if the window leaves the image.
    #[allow(clippy::too_many_arguments)]
    fn refine(
        &self,
        patch: &Patch,
        image2: &Image<f32, 1>,
        px: f32,
        py: f32,
        mut dx: f32,
        mut dy: f32,
        half: i32,
    ) -> Result<LevelResult, usize> {
        let det = patch.gxx * patch.gyy - patch.gxy * patch.gxy;
        let inv_det = 1.0 / det;
        let eps_sq = self.params.epsilon * self.params.epsilon;

        for iteration in 0..self.params.max_iterations {
            let qx = px + dx;
            let qy = py + dy;

            if !window_in_bounds(image2, qx, qy, half as f32) {
                return Err(iteration);
            }

            let mut bx = 0.0f32;
            let mut by = 0.0f32;
            let mut k = 0;
            for wy in -half..=half {
                for wx in -half..=half {
                    let [j] = bilinear_interpolation(image2, qx + wx as f32, qy + wy as f32);
                    let it = j - patch.values[k];
                    bx += patch.grad_x[k] * it;
                    by += patch.grad_y[k] * it;
                    k += 1;
                }
            }

            let delta_x = -inv_det * (patch.gyy * bx - patch.gxy * by);
            let delta_y = -inv_det * (patch.gxx * by - patch.gxy * bx);

            dx += delta_x;
            dy += delta_y;

            if delta_x * delta_x + delta_y * delta_y < eps_sq {
                return Ok(LevelResult {
                    dx,
                    dy,
                    iterations: iteration + 1,
                    converged: true,
                });
            }
        }

        Ok(LevelResult {
            dx,
            dy,
            iterations: self.params.max_iterations,
            converged: false,
        })
    }
}

fn sample_patch(
    image: &Image<f32, 1>,
    grad_x: &Image<f32, 1>,
    grad_y: &Image<f32, 1>,
    px: f32,
    py: f32,
    half: i32,
) -> Patch {
    let side = (2 * half + 1) as usize;
    let mut patch = Patch {
        values: Vec::with_capacity(side * side),
        grad_x: Vec::with_capacity(side * side),
        grad_y: Vec::with_capacity(side * side),
        gxx: 0.0,
        gxy: 0.0,
        gyy: 0.0,
    };

    for wy in -half..=half {
        for wx in -half..=half {
            let (u, v) = (px + wx as f32, py + wy as f32);
            let [value] = bilinear_interpolation(image, u, v);
            let [gx] = bilinear_interpolation(grad_x, u, v);
            let [gy] = bilinear_interpolation(grad_y, u, v);

            patch.gxx += gx * gx;
            patch.gxy += gx * gy;
            patch.gyy += gy * gy;

            patch.values.push(value);
            patch.grad_x.push(gx);
            patch.grad_y.push(gy);
        }
    }

    patch
}

fn window_residual(patch: &Patch, image2: &Image<f32, 1>, qx: f32, qy: f32, half: i32) -> f32 {
    let mut sum = 0.0f32;
    let mut k = 0;
    for wy in -half..=half {
        for wx in -half..=half {
            let [j] = bilinear_interpolation(image2, qx + wx as f32, qy + wy as f32);
            sum += (j - patch.values[k]).abs();
            k += 1;
        }
    }
    sum / patch.values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowkit_image::ImageError;

    fn texture(x: f32, y: f32) -> f32 {
        128.0
            + 40.0 * (0.11 * x + 0.05 * y).sin()
            + 40.0 * (0.07 * x - 0.13 * y).cos()
            + 30.0 * (0.17 * x).sin() * (0.19 * y).cos()
    }

    fn textured_frame(width: usize, height: usize, tx: f32, ty: f32) -> Result<Image<f32, 1>, ImageError> {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| texture(x as f32 - tx, y as f32 - ty)))
            .collect();
        Image::new([width, height].into(), data)
    }

    fn candidates(points: &[(f32, f32)]) -> Vec<Candidate> {
        points
            .iter()
            .map(|&(x, y)| Candidate {
                point: Point2d::new(x, y),
                score: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_track_identical_frames() -> Result<(), TrackingError> {
        let frame = textured_frame(120, 100, 0.0, 0.0)?;
        let pyramid = ImagePyramid::build(&frame, 3, 15)?;

        let tracker = PyramidalLkTracker::default();
        let tracks = tracker.track(
            &pyramid,
            &pyramid,
            &candidates(&[(60.0, 50.0), (40.0, 30.0), (80.0, 60.0)]),
            ExecutionStrategy::Serial,
        )?;

        assert_eq!(tracks.len(), 3);
        for track in tracks {
            assert_eq!(track.status, TrackStatus::Tracked);
            assert_eq!(track.dx, 0.0);
            assert_eq!(track.dy, 0.0);
            assert_eq!(track.residual, Some(0.0));
            assert_eq!(track.iterations, 1);
        }

        Ok(())
    }

    #[test]
    fn test_track_translation() -> Result<(), TrackingError> {
        let frame1 = textured_frame(160, 140, 0.0, 0.0)?;
        let frame2 = textured_frame(160, 140, 4.0, -2.5)?;
        let pyramid1 = ImagePyramid::build(&frame1, 3, 15)?;
        let pyramid2 = ImagePyramid::build(&frame2, 3, 15)?;

        let tracker = PyramidalLkTracker::new(PyrLkParams {
            max_iterations: 30,
            epsilon: 0.01,
            ..Default::default()
        });

        let points = [(80.0, 70.0), (60.0, 60.0), (100.0, 80.0), (70.0, 90.0)];
        let tracks = tracker.track(
            &pyramid1,
            &pyramid2,
            &candidates(&points),
            ExecutionStrategy::ParallelElements,
        )?;

        for (track, &(x, y)) in tracks.iter().zip(points.iter()) {
            assert_eq!(track.start, Point2d::new(x, y));
            assert!(track.is_valid(), "{track:?}");
            approx::assert_relative_eq!(track.dx, 4.0, epsilon = 0.1);
            approx::assert_relative_eq!(track.dy, -2.5, epsilon = 0.1);
            approx::assert_relative_eq!(track.end.x, x + track.dx);
            approx::assert_relative_eq!(track.end.y, y + track.dy);
        }

        Ok(())
    }

    #[test]
    fn test_track_flat_region_is_singular() -> Result<(), TrackingError> {
        let frame = Image::<f32, 1>::from_size_val([64, 64].into(), 90.0)?;
        let pyramid = ImagePyramid::build(&frame, 1, 15)?;

        let tracks = PyramidalLkTracker::default().track(
            &pyramid,
            &pyramid,
            &candidates(&[(32.0, 32.0)]),
            ExecutionStrategy::Serial,
        )?;

        assert_eq!(tracks[0].status, TrackStatus::SmallEigenvalue);
        assert!(!tracks[0].is_valid());

        Ok(())
    }

    #[test]
    fn test_track_near_border_is_out_of_bounds() -> Result<(), TrackingError> {
        let frame = textured_frame(64, 64, 0.0, 0.0)?;
        let pyramid = ImagePyramid::build(&frame, 1, 15)?;

        let tracks = PyramidalLkTracker::default().track(
            &pyramid,
            &pyramid,
            &candidates(&[(3.0, 30.0), (30.0, 62.0)]),
            ExecutionStrategy::Serial,
        )?;

        assert_eq!(tracks.len(), 2);
        for track in tracks {
            assert_eq!(track.status, TrackStatus::OutOfBounds);
            assert_eq!(track.residual, None);
        }

        Ok(())
    }

    #[test]
    fn test_failed_track_reads_back_from_json() -> Result<(), Box<dyn std::error::Error>> {
        let frame = textured_frame(64, 64, 0.0, 0.0)?;
        let pyramid = ImagePyramid::build(&frame, 1, 15)?;

        let tracks = PyramidalLkTracker::default().track(
            &pyramid,
            &pyramid,
            &candidates(&[(3.0, 30.0), (32.0, 32.0)]),
            ExecutionStrategy::Serial,
        )?;
        assert_eq!(tracks[0].status, TrackStatus::OutOfBounds);
        assert_eq!(tracks[1].status, TrackStatus::Tracked);

        let json = serde_json::to_string(&tracks)?;
        let decoded: Vec<Track> = serde_json::from_str(&json)?;
        assert_eq!(decoded, tracks);
        assert_eq!(decoded[0].residual, None);

        Ok(())
    }

    #[test]
    fn test_track_residual_ceiling() -> Result<(), TrackingError> {
        let frame1 = textured_frame(80, 80, 0.0, 0.0)?;
        let frame2 = textured_frame(80, 80, 1.5, 0.5)?;
        let pyramid1 = ImagePyramid::build(&frame1, 1, 15)?;
        let pyramid2 = ImagePyramid::build(&frame2, 1, 15)?;
        let points = candidates(&[(40.0, 40.0)]);

        let tracks = PyramidalLkTracker::default().track(
            &pyramid1,
            &pyramid2,
            &points,
            ExecutionStrategy::Serial,
        )?;
        assert_eq!(tracks[0].status, TrackStatus::Tracked);
        assert!(tracks[0].residual.is_some_and(|r| r > 0.0));

        // interpolation leaves a small residual that a strict ceiling rejects
        let strict = PyramidalLkTracker::new(PyrLkParams {
            max_residual: 1e-4,
            ..Default::default()
        });
        let tracks = strict.track(&pyramid1, &pyramid2, &points, ExecutionStrategy::Serial)?;
        assert_eq!(tracks[0].status, TrackStatus::ResidualTooHigh);

        Ok(())
    }

    #[test]
    fn test_track_iteration_cap_is_not_converged() -> Result<(), TrackingError> {
        let frame1 = textured_frame(80, 80, 0.0, 0.0)?;
        let frame2 = textured_frame(80, 80, 2.0, 1.0)?;
        let pyramid1 = ImagePyramid::build(&frame1, 3, 15)?;
        let pyramid2 = ImagePyramid::build(&frame2, 3, 15)?;
        let points = candidates(&[(40.0, 40.0)]);

        let params = PyrLkParams {
            max_iterations: 1,
            epsilon: 1e-6,
            ..Default::default()
        };
        assert!(params.require_convergence);

        let tracks = PyramidalLkTracker::new(params)
            .track(&pyramid1, &pyramid2, &points, ExecutionStrategy::Serial)?;
        assert_eq!(tracks[0].iterations, 1);
        assert_eq!(tracks[0].level, 0);
        assert_eq!(tracks[0].status, TrackStatus::NotConverged);
        assert!(tracks[0].residual.is_some());
        assert!(!tracks[0].is_valid());

        Ok(())
    }

    #[test]
    fn test_track_convergence_can_be_waived() -> Result<(), TrackingError> {
        let frame1 = textured_frame(80, 80, 0.0, 0.0)?;
        let frame2 = textured_frame(80, 80, 2.0, 1.0)?;
        let pyramid1 = ImagePyramid::build(&frame1, 1, 15)?;
        let pyramid2 = ImagePyramid::build(&frame2, 1, 15)?;
        let points = candidates(&[(40.0, 40.0)]);

        let lenient = PyramidalLkTracker::new(PyrLkParams {
            max_iterations: 1,
            epsilon: 1e-6,
            require_convergence: false,
            ..Default::default()
        });
        let tracks = lenient.track(&pyramid1, &pyramid2, &points, ExecutionStrategy::Serial)?;
        assert_eq!(tracks[0].iterations, 1);
        assert_ne!(tracks[0].status, TrackStatus::NotConverged);

        Ok(())
    }

    #[test]
    fn test_track_empty_candidates() -> Result<(), TrackingError> {
        let frame = textured_frame(64, 64, 0.0, 0.0)?;
        let pyramid = ImagePyramid::build(&frame, 2, 15)?;

        let tracks = PyramidalLkTracker::default().track(
            &pyramid,
            &pyramid,
            &[],
            ExecutionStrategy::default(),
        )?;
        assert!(tracks.is_empty());

        Ok(())
    }
}
