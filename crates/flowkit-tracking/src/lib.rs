#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//! Flowkit-tracking follows sparse corners between two frames with a pyramidal
//! Lucas-Kanade solver and reduces the tracks to a single motion estimate.

mod config;
mod error;

pub mod motion;
pub mod pipeline;
pub mod pyr_lk;

pub use config::MotionConfig;
pub use error::TrackingError;
pub use motion::{aggregate, classify, Direction, DirectionScheme, MotionEstimate};
pub use pipeline::{estimate_motion, MotionOutput, MotionPipeline};
pub use pyr_lk::{PyrLkParams, PyramidalLkTracker, Track, TrackStatus};
