//! Color inversion.

use ndarray::Array3;
use rayon::prelude::*;

use crate::error::{FilterError, Result};
use crate::image::ImageBuffer;

/// `255 - v` on every color channel; alpha passes through.
///
/// # Arguments
/// * `image` - Image with any channel count; its alpha index is honored
///
/// # Returns
/// Inverted image with the same shape and alpha index
pub fn invert(image: &ImageBuffer) -> Result<ImageBuffer> {
    let (width, height, channels) = (image.width(), image.height(), image.channels());
    let input = image.view();

    let mut output = vec![0u8; width * height * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                for c in 0..channels {
                    let v = input[[y, x, c]];
                    row[x * channels + c] = if image.is_alpha(c) { v } else { 255 - v };
                }
            }
        });

    let pixels = Array3::from_shape_vec((height, width, channels), output)
        .map_err(|e| FilterError::InvalidDimensions(e.to_string()))?;
    ImageBuffer::from_array(pixels, image.alpha_channel())
}
