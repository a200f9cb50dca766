//! Pixel interpolation methods.
//!
//! Sub-pixel sampling used by the tracker when it extracts patches at
//! non-integer positions.

mod bilinear;

pub use bilinear::{bilinear_interpolation, window_in_bounds};
