/// Create a box blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
///
/// # Returns
///
/// A vector of the kernel.
pub fn box_blur_kernel_1d(kernel_size: usize) -> Vec<f32> {
    vec![1.0 / kernel_size as f32; kernel_size]
}

/// Create the 5-tap binomial kernel used to smooth pyramid levels before decimation.
///
/// The 2D kernel is the outer product of `[1, 4, 6, 4, 1] / 16` with itself.
pub fn pyramid_gaussian_kernel_1d() -> Vec<f32> {
    [1.0, 4.0, 6.0, 4.0, 1.0].iter().map(|&x| x / 16.0).collect()
}

/// Create the normalized 3x3 sobel kernel pair.
///
/// # Returns
///
/// A tuple `(derivative, smoothing)` of 1D kernels. Applying `derivative` along
/// one axis and `smoothing` along the other yields the image derivative in
/// intensity units per pixel.
pub fn normalized_sobel_kernel1d() -> ([f32; 3], [f32; 3]) {
    ([-0.5, 0.0, 0.5], [0.25, 0.5, 0.25])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_blur_kernel_1d() {
        let kernel = box_blur_kernel_1d(4);
        assert_eq!(kernel, vec![0.25; 4]);
    }

    #[test]
    fn test_pyramid_gaussian_kernel_1d() {
        let kernel = pyramid_gaussian_kernel_1d();
        assert_eq!(kernel, vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
        approx::assert_relative_eq!(kernel.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_normalized_sobel_kernel1d() {
        let (derivative, smoothing) = normalized_sobel_kernel1d();
        assert_eq!(derivative.iter().sum::<f32>(), 0.0);
        assert_eq!(smoothing.iter().sum::<f32>(), 1.0);
    }
}
