#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use flowkit_image as image;

#[doc(inline)]
pub use flowkit_imgproc as imgproc;

#[doc(inline)]
pub use flowkit_tracking as tracking;
