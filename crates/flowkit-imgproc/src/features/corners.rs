use flowkit_image::{Image, ImageError};
use std::cmp::Ordering;

use super::{min_eigen_response, Candidate, Point2d};

/// Shi-Tomasi style corner detector.
///
/// Candidates are the 3x3 local maxima of the minimal eigenvalue response whose
/// score is at least `min_quality` times the strongest response in the image.
/// They are picked greedily by descending score and any candidate closer than
/// `min_separation` to an already picked one is skipped. Corners closer than
/// `border` pixels to an image edge are never picked.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerDetector {
    /// Upper bound on the number of returned corners.
    pub max_candidates: usize,
    /// Fraction of the best score a corner must reach, in `(0, 1]`.
    pub min_quality: f32,
    /// Minimum euclidean distance between two returned corners, in pixels.
    pub min_separation: f32,
    /// Side of the window used to accumulate the structure tensor.
    pub block_size: usize,
    /// Width of the frame around the image where no corner is picked.
    ///
    /// The structure tensor window always imposes a margin of
    /// `block_size / 2 + 1`, a smaller border has no effect.
    pub border: usize,
}

impl Default for CornerDetector {
    fn default() -> Self {
        Self {
            max_candidates: 100,
            min_quality: 0.01,
            min_separation: 10.0,
            block_size: 3,
            border: 0,
        }
    }
}

impl CornerDetector {
    /// Create a detector with the default 3x3 structure tensor window.
    pub fn new(max_candidates: usize, min_quality: f32, min_separation: f32) -> Self {
        Self {
            max_candidates,
            min_quality,
            min_separation,
            ..Default::default()
        }
    }

    /// Set the structure tensor window size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the width of the frame where no corner is picked.
    pub fn with_border(mut self, border: usize) -> Self {
        self.border = border;
        self
    }

    /// Detect corners in a grayscale image.
    ///
    /// The result is sorted by descending score, ties broken by row then
    /// column, so the same image always yields the same sequence. An image
    /// without texture yields an empty sequence.
    ///
    /// # Errors
    ///
    /// Fails when `block_size` is even or zero.
    pub fn detect(&self, image: &Image<f32, 1>) -> Result<Vec<Candidate>, ImageError> {
        let mut response = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
        min_eigen_response(image, &mut response, self.block_size)?;

        let (cols, rows) = (image.cols(), image.rows());
        let inner = self.block_size / 2 + 1;
        let margin = inner.max(self.border);

        if self.max_candidates == 0 || cols <= 2 * margin || rows <= 2 * margin {
            return Ok(Vec::new());
        }

        let scores = response.as_slice();

        // the quality reference covers the whole valid response, border included
        let max_score = (inner..rows - inner)
            .flat_map(|y| (inner..cols - inner).map(move |x| scores[y * cols + x]))
            .fold(0.0f32, f32::max);

        if max_score <= 0.0 {
            return Ok(Vec::new());
        }

        let threshold = self.min_quality * max_score;

        let mut maxima = Vec::new();
        for y in margin..rows - margin {
            for x in margin..cols - margin {
                let score = scores[y * cols + x];
                if score <= 0.0 || score < threshold {
                    continue;
                }
                if is_local_max(scores, cols, x, y, score) {
                    maxima.push((score, x, y));
                }
            }
        }

        maxima.sort_by(|a, b| match b.0.total_cmp(&a.0) {
            Ordering::Equal => (a.2, a.1).cmp(&(b.2, b.1)),
            ord => ord,
        });

        let min_dist_sq = self.min_separation * self.min_separation;
        let mut selected: Vec<Candidate> = Vec::with_capacity(self.max_candidates);

        for (score, x, y) in maxima {
            if selected.len() >= self.max_candidates {
                break;
            }

            let point = Point2d::new(x as f32, y as f32);
            let too_close = selected
                .iter()
                .any(|c| c.point.distance_squared(&point) < min_dist_sq);

            if !too_close {
                selected.push(Candidate { point, score });
            }
        }

        Ok(selected)
    }
}

// the caller guarantees a one pixel border around (x, y)
fn is_local_max(scores: &[f32], cols: usize, x: usize, y: usize, score: f32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if (nx, ny) != (x, y) && scores[ny * cols + nx] > score {
                return false;
            }
        }
    }
    true
}
