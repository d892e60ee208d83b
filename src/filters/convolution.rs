//! Convolution engine: separable 1D passes and square 2D kernels.
//!
//! All passes use a replicate-border policy: a sampled coordinate outside
//! the image is clamped to the nearest edge pixel, never wrapped and never
//! zero-padded. Sums are accumulated in `f64`, clipped to 0-255 and
//! truncated to an integer sample.
//!
//! Rows of the output are computed in parallel with Rayon; every output
//! sample depends only on the (immutable) source, so the result is
//! identical to a serial loop.

use ndarray::{Array3, ArrayView3};
use rayon::prelude::*;

use crate::error::{FilterError, Result};

/// Absorbs the representation error of weights such as 1/9 so that a
/// normalized kernel over a constant region truncates back to the same value.
const TRUNCATION_EPSILON: f64 = 1e-9;

/// Clip an accumulated sum to the 8-bit range and truncate it.
#[inline]
pub fn to_sample(total: f64) -> u8 {
    (total + TRUNCATION_EPSILON).clamp(0.0, 255.0) as u8
}

/// A 1D kernel of odd length, centered at `len / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel1D {
    weights: Vec<f64>,
}

impl Kernel1D {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(FilterError::InvalidKernel("1D kernel is empty".into()));
        }
        if weights.len() % 2 == 0 {
            return Err(FilterError::InvalidKernel(format!(
                "1D kernel length {} is even",
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    /// Every tap weighted `1 / size`.
    pub fn flat(size: usize) -> Result<Self> {
        Self::new(vec![1.0 / size as f64; size])
    }

    /// Integer taps divided by `divisor`, e.g. `{1, 2, 1} / 4`.
    pub fn normalized(taps: &[f64], divisor: f64) -> Result<Self> {
        Self::new(taps.iter().map(|t| t / divisor).collect())
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn half(&self) -> usize {
        self.weights.len() / 2
    }
}

/// A square `size x size` kernel stored row-major, centered at `size / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel2D {
    size: usize,
    weights: Vec<f64>,
}

impl Kernel2D {
    pub fn new(weights: Vec<f64>, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(FilterError::InvalidKernel("2D kernel size is zero".into()));
        }
        if weights.len() != size * size {
            return Err(FilterError::InvalidKernel(format!(
                "2D kernel of size {size} needs {} weights, got {}",
                size * size,
                weights.len()
            )));
        }
        Ok(Self { size, weights })
    }

    /// A 3x3 kernel from row-major weights.
    pub fn square3(weights: [f64; 9]) -> Self {
        Self {
            size: 3,
            weights: weights.to_vec(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn half(&self) -> usize {
        self.size / 2
    }

    /// Weight at kernel row `ky`, column `kx`.
    #[inline]
    pub fn at(&self, kx: usize, ky: usize) -> f64 {
        self.weights[ky * self.size + kx]
    }
}

#[inline]
fn clamp_coord(pos: usize, offset: usize, half: usize, len: usize) -> usize {
    (pos as isize + offset as isize - half as isize).clamp(0, len as isize - 1) as usize
}

/// Convolve along rows only.
pub fn convolve_horizontal(input: ArrayView3<u8>, kernel: &Kernel1D) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let half = kernel.half();

    let mut output = vec![0u8; height * width * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                for c in 0..channels {
                    let mut total = 0.0f64;
                    for (kx, &kv) in kernel.weights().iter().enumerate() {
                        let sx = clamp_coord(x, kx, half, width);
                        total += input[[y, sx, c]] as f64 * kv;
                    }
                    row[x * channels + c] = to_sample(total);
                }
            }
        });

    into_array(output, height, width, channels)
}

/// Convolve along columns only.
pub fn convolve_vertical(input: ArrayView3<u8>, kernel: &Kernel1D) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let half = kernel.half();

    let mut output = vec![0u8; height * width * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                for c in 0..channels {
                    let mut total = 0.0f64;
                    for (ky, &kv) in kernel.weights().iter().enumerate() {
                        let sy = clamp_coord(y, ky, half, height);
                        total += input[[sy, x, c]] as f64 * kv;
                    }
                    row[x * channels + c] = to_sample(total);
                }
            }
        });

    into_array(output, height, width, channels)
}

/// Horizontal pass followed by a vertical pass over its result.
///
/// Each pass is clipped and truncated to 8 bits before the next one runs.
pub fn convolve_separable(input: ArrayView3<u8>, kernel: &Kernel1D) -> Array3<u8> {
    let horizontal = convolve_horizontal(input, kernel);
    convolve_vertical(horizontal.view(), kernel)
}

/// Convolve with a square kernel in both axes at once.
pub fn convolve_2d(input: ArrayView3<u8>, kernel: &Kernel2D) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let size = kernel.size();
    let half = kernel.half();

    let mut output = vec![0u8; height * width * channels];
    output
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                for c in 0..channels {
                    let mut total = 0.0f64;
                    for ky in 0..size {
                        let sy = clamp_coord(y, ky, half, height);
                        for kx in 0..size {
                            let sx = clamp_coord(x, kx, half, width);
                            total += input[[sy, sx, c]] as f64 * kernel.at(kx, ky);
                        }
                    }
                    row[x * channels + c] = to_sample(total);
                }
            }
        });

    into_array(output, height, width, channels)
}

fn into_array(data: Vec<u8>, height: usize, width: usize, channels: usize) -> Array3<u8> {
    Array3::from_shape_vec((height, width, channels), data)
        .expect("Shape mismatch in convolution output")
}
