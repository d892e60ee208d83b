//! Separable blur filters.
//!
//! Both blurs run a horizontal pass and then a vertical pass over its
//! 8-bit result, using the replicate-border convolution engine. Every
//! channel, alpha included, is blurred.

use ndarray::Array3;

use super::convolution::{convolve_separable, Kernel1D};
use crate::error::Result;
use crate::image::ImageBuffer;

// ============================================================================
// Separable Blurs
// ============================================================================

/// Taps of the flat box kernel.
pub const BOX_BLUR_SIZE: usize = 9;

const GAUSSIAN_TAPS: [f64; 3] = [1.0, 2.0, 1.0];
const GAUSSIAN_DIVISOR: f64 = 4.0;

fn blur_with(image: &ImageBuffer, kernel: &Kernel1D) -> Result<ImageBuffer> {
    let blurred: Array3<u8> = convolve_separable(image.view(), kernel);
    ImageBuffer::from_array(blurred, image.alpha_channel())
}

/// 9-tap box blur, each weight `1/9`.
///
/// # Arguments
/// * `image` - Image with any channel count
///
/// # Returns
/// Blurred image with the same shape and alpha index
pub fn box_blur(image: &ImageBuffer) -> Result<ImageBuffer> {
    let kernel = Kernel1D::flat(BOX_BLUR_SIZE)?;
    blur_with(image, &kernel)
}

/// 3-tap `{1, 2, 1} / 4` Gaussian blur.
pub fn gaussian_blur(image: &ImageBuffer) -> Result<ImageBuffer> {
    let kernel = Kernel1D::normalized(&GAUSSIAN_TAPS, GAUSSIAN_DIVISOR)?;
    blur_with(image, &kernel)
}
