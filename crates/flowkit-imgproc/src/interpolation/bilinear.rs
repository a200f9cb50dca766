use flowkit_image::Image;

/// Kernel for bilinear interpolation
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
///
/// # Returns
///
/// The interpolated pixel values.
///
/// PRECONDITION: `0 <= u <= cols - 1` and `0 <= v <= rows - 1`. Coordinates
/// past the last row or column are clamped to it.
pub fn bilinear_interpolation<const C: usize>(image: &Image<f32, C>, u: f32, v: f32) -> [f32; C] {
    let (rows, cols) = (image.rows(), image.cols());

    let iu = u.trunc() as usize;
    let iv = v.trunc() as usize;

    let iu0 = iu.min(cols - 1);
    let iv0 = iv.min(rows - 1);

    let frac_u = u.fract();
    let frac_v = v.fract();

    let frac_uu = 1.0 - frac_u;
    let frac_vv = 1.0 - frac_v;

    let w00 = frac_uu * frac_vv;
    let w01 = frac_u * frac_vv;
    let w10 = frac_uu * frac_v;
    let w11 = frac_u * frac_v;

    let iu1 = if iu0 + 1 < cols { iu0 + 1 } else { iu0 };
    let iv1 = if iv0 + 1 < rows { iv0 + 1 } else { iv0 };

    let base00 = (iv0 * cols + iu0) * C;
    let base01 = (iv0 * cols + iu1) * C;
    let base10 = (iv1 * cols + iu0) * C;
    let base11 = (iv1 * cols + iu1) * C;

    let data = image.as_slice();

    let mut pixel = [0.0; C];
    for (k, p) in pixel.iter_mut().enumerate() {
        *p = data[base00 + k] * w00
            + data[base01 + k] * w01
            + data[base10 + k] * w10
            + data[base11 + k] * w11;
    }

    pixel
}

/// Check that a square window of half size `half` centred at `(u, v)` only
/// touches samples inside the image.
///
/// # Arguments
///
/// * `image` - The image the window is sampled from.
/// * `u` - The x coordinate of the window centre.
/// * `v` - The y coordinate of the window centre.
/// * `half` - Half the window side; the window spans `[u - half, u + half]`.
pub fn window_in_bounds<const C: usize>(image: &Image<f32, C>, u: f32, v: f32, half: f32) -> bool {
    if !u.is_finite() || !v.is_finite() || image.cols() == 0 || image.rows() == 0 {
        return false;
    }

    let max_u = (image.cols() - 1) as f32;
    let max_v = (image.rows() - 1) as f32;

    u - half >= 0.0 && v - half >= 0.0 && u + half <= max_u && v + half <= max_v
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowkit_image::ImageError;

    #[test]
    fn test_bilinear_interpolation() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let image = Image::<f32, 1>::new(
            [2, 2].into(),
            vec![
                0.0, 1.0,
                2.0, 3.0,
            ],
        )?;

        assert_eq!(bilinear_interpolation(&image, 0.0, 0.0), [0.0]);
        assert_eq!(bilinear_interpolation(&image, 1.0, 1.0), [3.0]);
        approx::assert_relative_eq!(bilinear_interpolation(&image, 0.5, 0.5)[0], 1.5);
        approx::assert_relative_eq!(bilinear_interpolation(&image, 0.25, 0.0)[0], 0.25);
        approx::assert_relative_eq!(bilinear_interpolation(&image, 0.0, 0.75)[0], 1.5);

        Ok(())
    }

    #[test]
    fn test_bilinear_interpolation_multichannel() -> Result<(), ImageError> {
        let image = Image::<f32, 2>::new([2, 1].into(), vec![0.0, 10.0, 1.0, 20.0])?;
        let pixel = bilinear_interpolation(&image, 0.5, 0.0);
        approx::assert_relative_eq!(pixel[0], 0.5);
        approx::assert_relative_eq!(pixel[1], 15.0);
        Ok(())
    }

    #[test]
    fn test_window_in_bounds() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_val([20, 10].into(), 0.0)?;

        assert!(window_in_bounds(&image, 10.0, 5.0, 3.0));
        assert!(window_in_bounds(&image, 3.0, 3.0, 3.0));
        assert!(window_in_bounds(&image, 16.0, 6.0, 3.0));
        assert!(!window_in_bounds(&image, 2.9, 5.0, 3.0));
        assert!(!window_in_bounds(&image, 10.0, 6.5, 3.0));
        assert!(!window_in_bounds(&image, f32::NAN, 5.0, 3.0));

        Ok(())
    }
}
