use flowkit_image::{Image, ImageError};
use rayon::prelude::*;

use crate::filter::{box_blur, spatial_gradient_float};

/// Compute the minimal eigenvalue response of the structure tensor.
///
/// For every pixel the gradient products `Ix*Ix`, `Iy*Iy` and `Ix*Iy` are
/// averaged over a `block_size` x `block_size` window and the smaller
/// eigenvalue of the resulting 2x2 matrix is written to `dst`. Flat regions
/// and straight edges score near zero, corners score high.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `block_size` - The odd side length of the averaging window.
///
/// # Errors
///
/// Fails when the images differ in size or `block_size` is even or zero.
pub fn min_eigen_response(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    block_size: usize,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    if block_size == 0 || block_size % 2 == 0 {
        return Err(ImageError::InvalidKernelLength(block_size));
    }

    let mut dx = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    spatial_gradient_float(src, &mut dx, &mut dy)?;

    let mut dx2 = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dy2 = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dxy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;

    dx2.as_slice_mut()
        .par_iter_mut()
        .zip(dy2.as_slice_mut().par_iter_mut())
        .zip(dxy.as_slice_mut().par_iter_mut())
        .zip(dx.as_slice().par_iter().zip(dy.as_slice().par_iter()))
        .for_each(|(((dx2_pixel, dy2_pixel), dxy_pixel), (&gx, &gy))| {
            *dx2_pixel = gx * gx;
            *dy2_pixel = gy * gy;
            *dxy_pixel = gx * gy;
        });

    let mut dx2_blurred = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dy2_blurred = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dxy_blurred = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;

    box_blur(&dx2, &mut dx2_blurred, (block_size, block_size))?;
    box_blur(&dy2, &mut dy2_blurred, (block_size, block_size))?;
    box_blur(&dxy, &mut dxy_blurred, (block_size, block_size))?;

    dst.as_slice_mut()
        .par_iter_mut()
        .zip(dx2_blurred.as_slice().par_iter())
        .zip(dy2_blurred.as_slice().par_iter())
        .zip(dxy_blurred.as_slice().par_iter())
        .for_each(|(((dst_pixel, &a), &c), &b)| {
            *dst_pixel = min_eigenvalue(a, b, c);
        });

    Ok(())
}

/// Smaller eigenvalue of the symmetric matrix `[[a, b], [b, c]]`, clamped at zero.
#[inline]
pub fn min_eigenvalue(a: f32, b: f32, c: f32) -> f32 {
    let half_trace = 0.5 * (a + c);
    let half_diff = 0.5 * (a - c);
    let lambda = half_trace - (half_diff * half_diff + b * b).sqrt();
    lambda.max(0.0)
}
