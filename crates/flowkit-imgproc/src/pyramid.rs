use crate::filter::{kernels, separable_filter};
use flowkit_image::{Image, ImageError, ImageSize};
use rayon::prelude::*;

/// Blur an image and then downsample it by two in each dimension.
///
/// The source is smoothed with the 5x5 binomial kernel and every other pixel
/// of the smoothed image is kept. The destination size must be the floor
/// division of the source size by two.
///
/// # Arguments
///
/// * `src` - The source image to be downsampled.
/// * `dst` - The destination image to store the result.
///
/// # Example
///
/// ```
/// use flowkit_image::{Image, ImageSize};
/// use flowkit_imgproc::pyramid::pyrdown;
///
/// let image = Image::<f32, 1>::from_size_val(
///     ImageSize {
///         width: 5,
///         height: 4,
///     },
///     1.0,
/// ).unwrap();
///
/// let mut downsampled = Image::<f32, 1>::from_size_val(
///     ImageSize {
///         width: 2,
///         height: 2,
///     },
///     0.0,
/// ).unwrap();
///
/// pyrdown(&image, &mut downsampled).unwrap();
/// ```
pub fn pyrdown<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    let expected_width = src.width() / 2;
    let expected_height = src.height() / 2;

    if dst.width() != expected_width || dst.height() != expected_height {
        return Err(ImageError::InvalidImageSize(
            expected_width,
            expected_height,
            dst.width(),
            dst.height(),
        ));
    }

    let kernel = kernels::pyramid_gaussian_kernel_1d();
    let mut blurred = Image::<f32, C>::from_size_val(src.size(), 0.0)?;
    separable_filter(src, &mut blurred, &kernel, &kernel)?;

    let src_row_len = src.cols() * C;
    let dst_cols = dst.cols();
    let blurred_data = blurred.as_slice();

    if dst_cols == 0 {
        return Ok(());
    }

    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_cols * C)
        .enumerate()
        .for_each(|(r, dst_row)| {
            let src_row = &blurred_data[2 * r * src_row_len..(2 * r + 1) * src_row_len];
            dst_row
                .chunks_exact_mut(C)
                .enumerate()
                .for_each(|(c, dst_pixel)| {
                    dst_pixel.copy_from_slice(&src_row[2 * c * C..(2 * c + 1) * C]);
                });
        });

    Ok(())
}

/// A Gaussian image pyramid of single channel float images.
///
/// `level(0)` is the original resolution and every following level halves the
/// width and height of the previous one (floor division).
#[derive(Clone, Debug)]
pub struct ImagePyramid {
    levels: Vec<Image<f32, 1>>,
}

impl ImagePyramid {
    /// Build a pyramid with up to `num_levels` levels.
    ///
    /// Construction stops early, without error, when the next level would be
    /// smaller than `min_size` pixels in either dimension. Level 0 is an owned
    /// copy of `image`.
    ///
    /// # Arguments
    ///
    /// * `image` - The full resolution image.
    /// * `num_levels` - The requested number of levels, including level 0.
    /// * `min_size` - The smallest width or height a downsampled level may have.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidPyramidLevels`] when `num_levels` is zero.
    pub fn build(
        image: &Image<f32, 1>,
        num_levels: usize,
        min_size: usize,
    ) -> Result<Self, ImageError> {
        if num_levels == 0 {
            return Err(ImageError::InvalidPyramidLevels(num_levels));
        }

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(image.clone());

        while levels.len() < num_levels {
            let prev = &levels[levels.len() - 1];
            let size = ImageSize {
                width: prev.width() / 2,
                height: prev.height() / 2,
            };

            if size.width < min_size.max(1) || size.height < min_size.max(1) {
                break;
            }

            let mut next = Image::<f32, 1>::from_size_val(size, 0.0)?;
            pyrdown(prev, &mut next)?;
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Number of levels actually built.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// A pyramid always holds at least the base level.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get a level of the pyramid, `None` past the coarsest level.
    pub fn level(&self, index: usize) -> Option<&Image<f32, 1>> {
        self.levels.get(index)
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[Image<f32, 1>] {
        &self.levels
    }
}
