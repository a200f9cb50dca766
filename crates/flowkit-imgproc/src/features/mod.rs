//! Corner detection for sparse tracking.
//!
//! The detector scores every pixel with the minimal eigenvalue of the local
//! structure tensor and keeps the strongest, well separated local maxima.
//!
//! # Examples
//!
//! ```
//! use flowkit_image::Image;
//! use flowkit_imgproc::features::CornerDetector;
//!
//! let image = Image::<f32, 1>::from_size_val([32, 32].into(), 0.0).unwrap();
//! let detector = CornerDetector::new(50, 0.01, 5.0);
//! let corners = detector.detect(&image).unwrap();
//!
//! // a flat image has no corners
//! assert!(corners.is_empty());
//! ```

mod keypoint;
pub use keypoint::*;

mod responses;
pub use responses::*;

mod corners;
pub use corners::*;
