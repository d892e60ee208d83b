//! Channel utilities: grayscale reduction, single-channel conversion and
//! saturating image addition.
//!
//! ## Alpha Handling
//!
//! Averaging never includes the alpha channel:
//! - **Grayscale** copies alpha through unchanged.
//! - **To single channel** drops alpha.
//! - **From single channel** forces alpha to 255, the expanded image is
//!   fully opaque whatever the source alpha was.
//!
//! With no alpha channel every channel takes part in the average.

use ndarray::{Array3, ArrayView3};
use rayon::prelude::*;

use crate::image::color_channel_count;

// ============================================================================
// Color Averaging
// ============================================================================

/// Mean of the color channels of one pixel, truncated.
#[inline]
fn color_average(input: &ArrayView3<u8>, y: usize, x: usize, alpha: Option<usize>) -> u8 {
    let channels = input.dim().2;
    let count = color_channel_count(channels, alpha) as u32;
    if count == 0 {
        return 0;
    }
    let sum: u32 = (0..channels)
        .filter(|&c| alpha != Some(c))
        .map(|c| input[[y, x, c]] as u32)
        .sum();
    (sum / count).min(255) as u8
}

/// Replace every color channel with the pixel's color average.
///
/// # Arguments
/// * `input` - Image with any channel count (height, width, channels)
/// * `alpha` - Index of the alpha channel, excluded from the average
///
/// # Returns
/// Image with the same channel count; alpha copied through unchanged
pub fn grayscale(input: ArrayView3<u8>, alpha: Option<usize>) -> Array3<u8> {
    let (height, width, channels) = input.dim();

    let mut output = vec![0u8; height * width * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let gray = color_average(&input, y, x, alpha);
                for c in 0..channels {
                    row[x * channels + c] = if alpha == Some(c) {
                        input[[y, x, c]]
                    } else {
                        gray
                    };
                }
            }
        });

    to_array(output, (height, width, channels))
}

// ============================================================================
// Single-Channel Conversion
// ============================================================================

/// Reduce to a `(height, width, 1)` image of color averages.
///
/// # Arguments
/// * `input` - Image with any channel count (height, width, channels)
/// * `alpha` - Index of the alpha channel, dropped from the result
///
/// # Returns
/// Single-channel image (height, width, 1)
pub fn to_single_channel(input: ArrayView3<u8>, alpha: Option<usize>) -> Array3<u8> {
    let (height, width, _) = input.dim();

    let mut output = vec![0u8; height * width];
    output
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = color_average(&input, y, x, alpha);
            }
        });

    to_array(output, (height, width, 1))
}

/// Broadcast a single-channel image to `channels` channels.
///
/// # Arguments
/// * `input` - Single-channel image (height, width, 1)
/// * `channels` - Channel count of the result
/// * `alpha` - Alpha index of the result; that channel is set to 255
///
/// # Returns
/// Image (height, width, channels) with every color channel equal to the source
pub fn from_single_channel(
    input: ArrayView3<u8>,
    channels: usize,
    alpha: Option<usize>,
) -> Array3<u8> {
    let (height, width, _) = input.dim();

    let mut output = vec![0u8; height * width * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let value = input[[y, x, 0]];
                for c in 0..channels {
                    row[x * channels + c] = if alpha == Some(c) { 255 } else { value };
                }
            }
        });

    to_array(output, (height, width, channels))
}

// ============================================================================
// Image Addition
// ============================================================================

/// Per-sample sum of two same-shaped images, saturating at 255.
pub fn add_images(a: ArrayView3<u8>, b: ArrayView3<u8>) -> Array3<u8> {
    debug_assert_eq!(a.dim(), b.dim(), "add_images requires equal shapes");
    let mut output = a.to_owned();
    output.zip_mut_with(&b, |lhs, &rhs| *lhs = lhs.saturating_add(rhs));
    output
}

fn to_array(data: Vec<u8>, shape: (usize, usize, usize)) -> Array3<u8> {
    Array3::from_shape_vec(shape, data).expect("Shape mismatch in channel conversion output")
}
