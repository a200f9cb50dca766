use flowkit_image::{Image, ImageError};
use rayon::prelude::*;

/// A separable 2D filter that applies horizontal and vertical 1D correlations sequentially.
///
/// Samples outside the image replicate the nearest border pixel.
struct SeparableFilter<'a> {
    kernel_x: &'a [f32],
    kernel_y: &'a [f32],
    half_x: isize,
    half_y: isize,
}

impl<'a> SeparableFilter<'a> {
    fn new(kernel_x: &'a [f32], kernel_y: &'a [f32]) -> Result<Self, ImageError> {
        for kernel in [kernel_x, kernel_y] {
            if kernel.is_empty() || kernel.len() % 2 == 0 {
                return Err(ImageError::InvalidKernelLength(kernel.len()));
            }
        }

        Ok(Self {
            kernel_x,
            kernel_y,
            half_x: (kernel_x.len() / 2) as isize,
            half_y: (kernel_y.len() / 2) as isize,
        })
    }

    fn apply<const C: usize>(&self, src: &Image<f32, C>, dst: &mut Image<f32, C>) {
        let rows = src.rows();
        let cols = src.cols();
        let row_len = cols * C;
        let src_data = src.as_slice();
        let mut temp = vec![0.0f32; src_data.len()];

        // Horizontal
        temp.par_chunks_exact_mut(row_len)
            .zip(src_data.par_chunks_exact(row_len))
            .for_each(|(temp_row, src_row)| {
                for c in 0..cols {
                    let mut acc = [0.0f32; C];
                    for (i, &k) in self.kernel_x.iter().enumerate() {
                        let x = clamp_index(c as isize + i as isize - self.half_x, cols);
                        for (ch, acc_val) in acc.iter_mut().enumerate() {
                            *acc_val += src_row[x * C + ch] * k;
                        }
                    }
                    temp_row[c * C..(c + 1) * C].copy_from_slice(&acc);
                }
            });

        // Vertical
        dst.as_slice_mut()
            .par_chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(r, dst_row)| {
                dst_row.iter_mut().for_each(|v| *v = 0.0);
                for (i, &k) in self.kernel_y.iter().enumerate() {
                    let y = clamp_index(r as isize + i as isize - self.half_y, rows);
                    let temp_row = &temp[y * row_len..(y + 1) * row_len];
                    dst_row
                        .iter_mut()
                        .zip(temp_row.iter())
                        .for_each(|(d, &t)| *d += t * k);
                }
            });
    }
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Apply a separable filter to an image.
///
/// The kernels are correlated with the image (not flipped) and the border is
/// handled by replicating the outermost pixels.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel, odd length.
/// * `kernel_y` - The vertical kernel, odd length.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let filter = SeparableFilter::new(kernel_x, kernel_y)?;

    if src.as_slice().is_empty() {
        return Ok(());
    }

    filter.apply(src, dst);

    Ok(())
}
