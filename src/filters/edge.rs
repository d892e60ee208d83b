//! Sobel gradient estimation for single-channel images.
//!
//! The horizontal and vertical responses are produced by the 2D
//! convolution engine, so they come out clipped to 0-255 like any other
//! convolution result. Magnitude and direction are derived from those
//! clipped 8-bit responses.

use std::f64::consts::PI;

use ndarray::{Array2, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::convolution::{convolve_2d, Kernel2D};
use super::grayscale::add_images;

// ============================================================================
// Sobel Operator
// ============================================================================

const SOBEL_X: [f64; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const SOBEL_Y: [f64; 9] = [1.0, 2.0, 1.0, 0.0, 0.0, 0.0, -1.0, -2.0, -1.0];

/// How `gx` and `gy` are combined into a magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeCombination {
    /// `min(gx + gy, 255)`.
    #[default]
    ClampedSum,
    /// `min(sqrt(gx^2 + gy^2), 255)`, truncated.
    Euclidean,
}

/// How the gradient angle is estimated from `gx` and `gy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionEstimate {
    /// `atan(gy / gx)` where `gy / gx` is the integer quotient of the 8-bit
    /// responses. Only a handful of angles (0, 45, 63, 71, ...) occur.
    #[default]
    QuotientArctan,
    /// `atan2(gy, gx)` on the same responses.
    Atan2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SobelOptions {
    pub magnitude: MagnitudeCombination,
    pub direction: DirectionEstimate,
}

/// Per-pixel gradient magnitude (0-255) and direction in whole degrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientField {
    pub magnitude: Array2<u8>,
    pub direction: Array2<u8>,
}

impl GradientField {
    pub fn width(&self) -> usize {
        self.magnitude.dim().1
    }

    pub fn height(&self) -> usize {
        self.magnitude.dim().0
    }
}

/// Gradient direction in degrees for one pixel.
///
/// A zero horizontal response maps to 90 degrees, or 0 when both
/// responses are zero.
pub fn gradient_direction(gx: u8, gy: u8, estimate: DirectionEstimate) -> u8 {
    if gx == 0 {
        return if gy == 0 { 0 } else { 90 };
    }
    let radians = match estimate {
        DirectionEstimate::QuotientArctan => ((gy / gx) as f64).atan(),
        DirectionEstimate::Atan2 => (gy as f64).atan2(gx as f64),
    };
    (radians * 180.0 / PI) as u8
}

/// Run the Sobel operator on a single-channel image.
///
/// `gx` and `gy` come from the 2D convolution engine and are therefore
/// clipped to 0-255 before they are combined.
///
/// # Arguments
/// * `input` - Single-channel image (height, width, 1)
/// * `options` - Magnitude and direction policies
///
/// # Returns
/// Gradient magnitude and direction, one value per pixel
pub fn sobel(input: ArrayView3<u8>, options: &SobelOptions) -> GradientField {
    let (height, width, _) = input.dim();
    let gx = convolve_2d(input, &Kernel2D::square3(SOBEL_X));
    let gy = convolve_2d(input, &Kernel2D::square3(SOBEL_Y));

    let magnitude = combine_magnitude(&gx, &gy, options.magnitude);

    let direction = Array2::from_shape_fn((height, width), |(y, x)| {
        gradient_direction(gx[[y, x, 0]], gy[[y, x, 0]], options.direction)
    });

    GradientField {
        magnitude,
        direction,
    }
}

fn combine_magnitude(gx: &Array3<u8>, gy: &Array3<u8>, policy: MagnitudeCombination) -> Array2<u8> {
    let (height, width, _) = gx.dim();
    match policy {
        MagnitudeCombination::ClampedSum => {
            let sum = add_images(gx.view(), gy.view());
            Array2::from_shape_fn((height, width), |(y, x)| sum[[y, x, 0]])
        }
        MagnitudeCombination::Euclidean => Array2::from_shape_fn((height, width), |(y, x)| {
            let h = gx[[y, x, 0]] as f64;
            let v = gy[[y, x, 0]] as f64;
            (h * h + v * v).sqrt().min(255.0) as u8
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_step(width: usize, height: usize, split: usize) -> Array3<u8> {
        Array3::from_shape_fn((height, width, 1), |(_, x, _)| if x < split { 0 } else { 40 })
    }

    #[test]
    fn test_flat_image_has_no_gradient() {
        let img = Array3::from_elem((5, 5, 1), 128u8);
        let field = sobel(img.view(), &SobelOptions::default());
        assert!(field.magnitude.iter().all(|&m| m == 0));
        assert!(field.direction.iter().all(|&d| d == 0));
    }

    #[test]
    fn test_vertical_step_is_horizontal_gradient() {
        let img = vertical_step(6, 5, 3);
        let field = sobel(img.view(), &SobelOptions::default());

        // gx = 4 * 40 = 160 on both sides of the step, gy = 0
        assert_eq!(field.magnitude[[2, 2]], 160);
        assert_eq!(field.magnitude[[2, 3]], 160);
        assert_eq!(field.magnitude[[2, 0]], 0);
        assert_eq!(field.direction[[2, 2]], 0);
    }

    #[test]
    fn test_negative_responses_are_clipped() {
        // Falling edge: gx would be negative, the engine clips it to 0.
        let img = Array3::from_shape_fn((5, 6, 1), |(_, x, _)| if x < 3 { 40 } else { 0 });
        let field = sobel(img.view(), &SobelOptions::default());
        assert!(field.magnitude.iter().all(|&m| m == 0));
    }

    #[test]
    fn test_direction_rules() {
        assert_eq!(gradient_direction(0, 0, DirectionEstimate::QuotientArctan), 0);
        assert_eq!(gradient_direction(0, 9, DirectionEstimate::QuotientArctan), 90);
        assert_eq!(gradient_direction(10, 10, DirectionEstimate::QuotientArctan), 45);
        // 20 / 10 = 2, atan(2) = 63.4 degrees
        assert_eq!(gradient_direction(10, 20, DirectionEstimate::QuotientArctan), 63);
        // 5 / 10 = 0 under integer division
        assert_eq!(gradient_direction(10, 5, DirectionEstimate::QuotientArctan), 0);
        // atan2(5, 10) = 26.56 degrees
        assert_eq!(gradient_direction(10, 5, DirectionEstimate::Atan2), 26);
    }

    #[test]
    fn test_magnitude_policies_differ() {
        // Rising diagonal corner so both responses are positive.
        let img = Array3::from_shape_fn((5, 5, 1), |(y, x, _)| if x >= 2 && y < 3 { 30 } else { 0 });
        let sum = sobel(img.view(), &SobelOptions::default());
        let norm = sobel(
            img.view(),
            &SobelOptions {
                magnitude: MagnitudeCombination::Euclidean,
                ..SobelOptions::default()
            },
        );

        let sum_exceeds_norm = (0..5).any(|y| {
            (0..5).any(|x| sum.magnitude[[y, x]] > norm.magnitude[[y, x]])
        });
        assert!(sum_exceeds_norm);
        assert!(sum
            .magnitude
            .iter()
            .zip(norm.magnitude.iter())
            .all(|(s, n)| s >= n));
    }

    #[test]
    fn test_options_parse_from_json() {
        let opts: SobelOptions = serde_json::from_str(r#"{"magnitude": "euclidean"}"#).unwrap();
        assert_eq!(opts.magnitude, MagnitudeCombination::Euclidean);
        assert_eq!(opts.direction, DirectionEstimate::QuotientArctan);
    }
}
