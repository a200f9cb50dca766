use flowkit_image::{ImageError, ImageSize};
use flowkit_imgproc::parallel::ParallelError;

/// An error type for the tracking module.
#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    /// The two frames do not have the same size.
    #[error("Frame sizes do not match: first {0}, second {1}")]
    FrameSizeMismatch(ImageSize, ImageSize),

    /// A frame is too small for the configured tracking window.
    #[error("Frame of size {0} is too small, width and height must be at least {1}")]
    FrameTooSmall(ImageSize, usize),

    /// The configuration holds an unusable value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from an image operation.
    #[error(transparent)]
    ImageError(#[from] ImageError),

    /// Error while running the per point work.
    #[error(transparent)]
    ParallelError(#[from] ParallelError),

    /// Error while parsing a configuration.
    #[error("Failed to parse configuration")]
    ConfigParse(#[from] serde_json::Error),
}
