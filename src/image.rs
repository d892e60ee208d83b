//! Owned interleaved 8-bit image buffers.
//!
//! ## Layout
//!
//! Pixels are stored row-major in an `Array3<u8>` of shape
//! `(height, width, channels)` with standard (C) layout, so the flat
//! buffer handed to and returned from the surrounding application is
//! exactly `width * height * channels` bytes long.
//!
//! | Channels | Default alpha | Typical format |
//! |----------|---------------|----------------|
//! | 1 | none | Grayscale8 |
//! | 3 | none | RGB8 |
//! | 4 | index 3 | RGBA8 |

use ndarray::{s, Array3, ArrayView1, ArrayView3};

use crate::error::{FilterError, Result};

/// Alpha index used when a 4-channel image does not say otherwise.
pub const DEFAULT_ALPHA_CHANNEL: usize = 3;

/// An owned, shape-checked image with an optional alpha channel index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pixels: Array3<u8>,
    alpha_channel: Option<usize>,
}

impl ImageBuffer {
    /// Wrap a raw interleaved buffer.
    ///
    /// Rejects zero-sized images and buffers whose length is not
    /// `width * height * channels`.
    pub fn new(data: Vec<u8>, width: usize, height: usize, channels: usize) -> Result<Self> {
        validate_shape(width, height, channels)?;
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(FilterError::InvalidDimensions(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        let pixels = Array3::from_shape_vec((height, width, channels), data)
            .map_err(|e| FilterError::InvalidDimensions(e.to_string()))?;
        Ok(Self {
            pixels,
            alpha_channel: default_alpha(channels),
        })
    }

    /// Take ownership of an existing array, normalizing it to standard layout.
    pub fn from_array(pixels: Array3<u8>, alpha_channel: Option<usize>) -> Result<Self> {
        let (height, width, channels) = pixels.dim();
        validate_shape(width, height, channels)?;
        validate_alpha(alpha_channel, channels)?;
        let pixels = if pixels.is_standard_layout() {
            pixels
        } else {
            pixels.as_standard_layout().into_owned()
        };
        Ok(Self {
            pixels,
            alpha_channel,
        })
    }

    /// An image where every pixel equals `pixel`.
    pub fn filled(width: usize, height: usize, pixel: &[u8]) -> Result<Self> {
        let channels = pixel.len();
        validate_shape(width, height, channels)?;
        let pixels = Array3::from_shape_fn((height, width, channels), |(_, _, c)| pixel[c]);
        Ok(Self {
            pixels,
            alpha_channel: default_alpha(channels),
        })
    }

    /// Override the alpha channel index (`None` means every channel is color).
    pub fn with_alpha_channel(mut self, alpha_channel: Option<usize>) -> Result<Self> {
        validate_alpha(alpha_channel, self.channels())?;
        self.alpha_channel = alpha_channel;
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn alpha_channel(&self) -> Option<usize> {
        self.alpha_channel
    }

    /// `true` if channel `c` is this image's alpha channel.
    #[inline]
    pub fn is_alpha(&self, c: usize) -> bool {
        self.alpha_channel == Some(c)
    }

    /// Number of channels that carry color (all but alpha).
    pub fn color_channel_count(&self) -> usize {
        color_channel_count(self.channels(), self.alpha_channel)
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn as_array(&self) -> &Array3<u8> {
        &self.pixels
    }

    /// All channel samples of the pixel at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> ArrayView1<'_, u8> {
        self.pixels.slice(s![y, x, ..])
    }

    /// Flat interleaved bytes.
    pub fn as_slice(&self) -> &[u8] {
        // Every constructor stores a standard-layout array.
        self.pixels.as_slice().unwrap_or_default()
    }

    pub fn into_array(self) -> Array3<u8> {
        self.pixels
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels.into_raw_vec_and_offset().0
    }

    /// Fails with `InvalidDimensions` unless `other` has the same shape.
    pub fn ensure_same_shape(&self, other: &ImageBuffer) -> Result<()> {
        if self.pixels.dim() != other.pixels.dim() {
            return Err(FilterError::InvalidDimensions(format!(
                "shape mismatch: {:?} vs {:?}",
                self.pixels.dim(),
                other.pixels.dim()
            )));
        }
        Ok(())
    }
}

/// Alpha index implied by a channel count when none is given.
pub fn default_alpha(channels: usize) -> Option<usize> {
    if channels == 4 {
        Some(DEFAULT_ALPHA_CHANNEL)
    } else {
        None
    }
}

pub(crate) fn color_channel_count(channels: usize, alpha_channel: Option<usize>) -> usize {
    match alpha_channel {
        Some(a) if a < channels => channels - 1,
        _ => channels,
    }
}

fn validate_shape(width: usize, height: usize, channels: usize) -> Result<()> {
    if width == 0 || height == 0 || channels == 0 {
        return Err(FilterError::InvalidDimensions(format!(
            "{width}x{height}x{channels} image is empty"
        )));
    }
    Ok(())
}

fn validate_alpha(alpha_channel: Option<usize>, channels: usize) -> Result<()> {
    match alpha_channel {
        Some(a) if a >= channels => Err(FilterError::InvalidDimensions(format!(
            "alpha channel {a} out of range for {channels} channels"
        ))),
        _ => Ok(()),
    }
}
