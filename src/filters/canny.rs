//! Canny edge detection.
//!
//! The pipeline runs these stages in order, with no early exit except
//! cancellation:
//!
//! 1. **Smooth** - separable `{5, 12, 15, 12, 5} / 49` blur of the source.
//! 2. **Gradient** - reduce to one channel and run Sobel.
//! 3. **Suppress** - non-maximum suppression along the gradient direction.
//! 4. **Classify** - double threshold into strong / weak / none.
//! 5. **Trace** - hysteresis: weak pixels touching strong ones become strong,
//!    repeated until nothing changes.
//! 6. **Finalize** - remaining weak pixels are dropped, yielding a binary map.
//! 7. **Expand** - broadcast back to the source channel count, alpha opaque.
//!
//! Each stage hands the next one a distinct type ([`GradientField`],
//! [`SuppressedMagnitude`], [`Array2<EdgeClass>`], [`EdgeMap`]) so the
//! meaning of a buffer never changes underneath it.

use std::time::Instant;

use log::debug;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use super::convolution::{convolve_separable, Kernel1D};
use super::edge::{sobel, GradientField, SobelOptions};
use super::grayscale::{from_single_channel, to_single_channel};
use crate::cancel::CancelToken;
use crate::error::{FilterError, Result};
use crate::image::ImageBuffer;

const SMOOTHING_TAPS: [f64; 5] = [5.0, 12.0, 15.0, 12.0, 5.0];
const SMOOTHING_DIVISOR: f64 = 49.0;

/// Worklist pops between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1 << 14;

/// Tri-state classification produced by the double threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EdgeClass {
    None = 0,
    Weak = 100,
    Strong = 255,
}

impl EdgeClass {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// How the hysteresis fixpoint is reached. Both give the same edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HysteresisStrategy {
    /// Flood outward from strong pixels with an explicit stack.
    #[default]
    Worklist,
    /// Rescan the interior until a pass promotes nothing.
    FullScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannyOptions {
    /// Magnitudes at or above this are strong edges.
    pub max_threshold: u8,
    /// Magnitudes at or above this (and below max) are weak candidates.
    pub min_threshold: u8,
    pub sobel: SobelOptions,
    pub hysteresis: HysteresisStrategy,
}

impl Default for CannyOptions {
    fn default() -> Self {
        Self {
            max_threshold: 80,
            min_threshold: 20,
            sobel: SobelOptions::default(),
            hysteresis: HysteresisStrategy::default(),
        }
    }
}

impl CannyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_threshold <= self.min_threshold {
            return Err(FilterError::InvalidThresholds {
                min: self.min_threshold,
                max: self.max_threshold,
            });
        }
        Ok(())
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannyStage {
    Smooth,
    Gradient,
    Suppress,
    Classify,
    Trace,
    Finalize,
    Expand,
}

/// Gradient magnitude after thinning; not yet classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressedMagnitude(pub Array2<u8>);

/// Final binary edge map: 255 for edge, 0 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap(pub Array2<u8>);

/// Search offset `(dx, dy)` for a gradient direction in degrees.
pub fn search_offset(direction: u8) -> (isize, isize) {
    match direction % 180 {
        23..=67 => (1, 1),
        68..=112 => (0, 1),
        113..=157 => (-1, 1),
        _ => (1, 0),
    }
}

/// Zero every magnitude that has a strictly greater in-bounds neighbor
/// along its search direction.
pub fn non_maximum_suppression(field: &GradientField) -> SuppressedMagnitude {
    let (height, width) = field.magnitude.dim();
    let magnitude = &field.magnitude;

    let at = |x: isize, y: isize| -> Option<u8> {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            None
        } else {
            Some(magnitude[[y as usize, x as usize]])
        }
    };

    let thinned = Array2::from_shape_fn((height, width), |(y, x)| {
        let center = magnitude[[y, x]];
        let (dx, dy) = search_offset(field.direction[[y, x]]);
        let (xi, yi) = (x as isize, y as isize);
        let behind = at(xi - dx, yi - dy);
        let ahead = at(xi + dx, yi + dy);
        if behind.is_some_and(|m| m > center) || ahead.is_some_and(|m| m > center) {
            0
        } else {
            center
        }
    });

    SuppressedMagnitude(thinned)
}

/// Double-threshold classification.
pub fn classify(suppressed: &SuppressedMagnitude, max_threshold: u8, min_threshold: u8) -> Array2<EdgeClass> {
    suppressed.0.mapv(|m| {
        if m >= max_threshold {
            EdgeClass::Strong
        } else if m >= min_threshold {
            EdgeClass::Weak
        } else {
            EdgeClass::None
        }
    })
}

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Promote weak pixels 8-connected to strong ones until a fixpoint.
///
/// Only interior pixels (not on the 1-pixel border) are ever promoted;
/// strong border pixels still seed their neighbors.
pub fn hysteresis(
    classes: &mut Array2<EdgeClass>,
    strategy: HysteresisStrategy,
    cancel: &CancelToken,
) -> Result<()> {
    match strategy {
        HysteresisStrategy::Worklist => trace_worklist(classes, cancel),
        HysteresisStrategy::FullScan => trace_full_scan(classes, cancel),
    }
}

fn is_interior(x: isize, y: isize, width: usize, height: usize) -> bool {
    x >= 1 && y >= 1 && x < width as isize - 1 && y < height as isize - 1
}

fn trace_worklist(classes: &mut Array2<EdgeClass>, cancel: &CancelToken) -> Result<()> {
    let (height, width) = classes.dim();
    let mut stack: Vec<(usize, usize)> = classes
        .indexed_iter()
        .filter(|(_, class)| **class == EdgeClass::Strong)
        .map(|((y, x), _)| (x, y))
        .collect();

    let mut promoted = 0usize;
    let mut pops = 0usize;
    while let Some((x, y)) = stack.pop() {
        pops += 1;
        if pops % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }
        for (dx, dy) in NEIGHBORS {
            let (nx, ny) = (x as isize + dx, y as isize + dy);
            if !is_interior(nx, ny, width, height) {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if classes[[ny, nx]] == EdgeClass::Weak {
                classes[[ny, nx]] = EdgeClass::Strong;
                promoted += 1;
                stack.push((nx, ny));
            }
        }
    }

    debug!("canny hysteresis (worklist): promoted {promoted} weak pixels");
    Ok(())
}

fn trace_full_scan(classes: &mut Array2<EdgeClass>, cancel: &CancelToken) -> Result<()> {
    let (height, width) = classes.dim();
    let mut passes = 0usize;

    loop {
        cancel.check()?;
        passes += 1;
        let mut changed = false;
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                if classes[[y, x]] != EdgeClass::Weak {
                    continue;
                }
                let touches_strong = NEIGHBORS.iter().any(|&(dx, dy)| {
                    let (nx, ny) = ((x as isize + dx) as usize, (y as isize + dy) as usize);
                    classes[[ny, nx]] == EdgeClass::Strong
                });
                if touches_strong {
                    classes[[y, x]] = EdgeClass::Strong;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    debug!("canny hysteresis (full scan): fixpoint after {passes} passes");
    Ok(())
}

/// Drop every pixel that is not strong.
pub fn finalize(classes: &Array2<EdgeClass>) -> EdgeMap {
    EdgeMap(classes.mapv(|class| match class {
        EdgeClass::Strong => 255,
        EdgeClass::Weak | EdgeClass::None => 0,
    }))
}

fn checkpoint(cancel: &CancelToken, stage: CannyStage, started: Instant) -> Result<()> {
    debug!("canny: {stage:?} done after {:?}", started.elapsed());
    cancel.check()
}

/// Single-channel binary edge map of `image`.
pub fn detect_edges(image: &ImageBuffer, options: &CannyOptions, cancel: &CancelToken) -> Result<EdgeMap> {
    options.validate()?;
    let started = Instant::now();
    let kernel = Kernel1D::normalized(&SMOOTHING_TAPS, SMOOTHING_DIVISOR)?;

    let smoothed = convolve_separable(image.view(), &kernel);
    checkpoint(cancel, CannyStage::Smooth, started)?;

    let gray = to_single_channel(smoothed.view(), image.alpha_channel());
    let field = sobel(gray.view(), &options.sobel);
    checkpoint(cancel, CannyStage::Gradient, started)?;

    let suppressed = non_maximum_suppression(&field);
    checkpoint(cancel, CannyStage::Suppress, started)?;

    let mut classes = classify(&suppressed, options.max_threshold, options.min_threshold);
    checkpoint(cancel, CannyStage::Classify, started)?;

    hysteresis(&mut classes, options.hysteresis, cancel)?;
    checkpoint(cancel, CannyStage::Trace, started)?;

    let edges = finalize(&classes);
    debug!("canny: {:?} done after {:?}", CannyStage::Finalize, started.elapsed());
    Ok(edges)
}

/// Full pipeline, re-expanded to the source image's channel layout.
pub fn canny(image: &ImageBuffer, options: &CannyOptions, cancel: &CancelToken) -> Result<ImageBuffer> {
    let EdgeMap(edges) = detect_edges(image, options, cancel)?;
    let single = edges.insert_axis(Axis(2));
    let expanded: Array3<u8> =
        from_single_channel(single.view(), image.channels(), image.alpha_channel());
    debug!("canny: {:?} done", CannyStage::Expand);
    ImageBuffer::from_array(expanded, image.alpha_channel())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes_from(rows: &[&[u8]]) -> Array2<EdgeClass> {
        let height = rows.len();
        let width = rows[0].len();
        Array2::from_shape_fn((height, width), |(y, x)| match rows[y][x] {
            255 => EdgeClass::Strong,
            100 => EdgeClass::Weak,
            _ => EdgeClass::None,
        })
    }

    fn values(classes: &Array2<EdgeClass>) -> Vec<u8> {
        classes.iter().map(|c| c.value()).collect()
    }

    #[test]
    fn test_search_offset_bins() {
        assert_eq!(search_offset(0), (1, 0));
        assert_eq!(search_offset(22), (1, 0));
        assert_eq!(search_offset(23), (1, 1));
        assert_eq!(search_offset(45), (1, 1));
        assert_eq!(search_offset(67), (1, 1));
        assert_eq!(search_offset(68), (0, 1));
        assert_eq!(search_offset(90), (0, 1));
        assert_eq!(search_offset(135), (-1, 1));
        assert_eq!(search_offset(158), (1, 0));
        assert_eq!(search_offset(180), (1, 0));
        assert_eq!(search_offset(225), (1, 1));
    }

    #[test]
    fn test_nms_thins_horizontal_ridge() {
        // Direction 0: compare left/right neighbors.
        let magnitude = Array2::from_shape_vec((1, 5), vec![10, 50, 90, 50, 10]).unwrap();
        let field = GradientField {
            direction: Array2::zeros((1, 5)),
            magnitude,
        };
        let SuppressedMagnitude(thin) = non_maximum_suppression(&field);
        assert_eq!(thin.iter().copied().collect::<Vec<_>>(), vec![0, 0, 90, 0, 0]);
    }

    #[test]
    fn test_nms_keeps_ties() {
        let magnitude = Array2::from_elem((3, 3), 40u8);
        let field = GradientField {
            direction: Array2::from_elem((3, 3), 90u8),
            magnitude: magnitude.clone(),
        };
        assert_eq!(non_maximum_suppression(&field).0, magnitude);
    }

    #[test]
    fn test_classify_boundaries() {
        let suppressed = SuppressedMagnitude(Array2::from_shape_vec((1, 5), vec![19, 20, 79, 80, 255]).unwrap());
        let classes = classify(&suppressed, 80, 20);
        assert_eq!(values(&classes), vec![0, 100, 100, 255, 255]);
    }

    #[test]
    fn test_hysteresis_promotes_connected_chain() {
        for strategy in [HysteresisStrategy::Worklist, HysteresisStrategy::FullScan] {
            let mut classes = classes_from(&[
                &[0, 0, 0, 0, 0, 0, 0],
                &[0, 255, 100, 0, 0, 0, 0],
                &[0, 0, 0, 100, 0, 0, 0],
                &[0, 0, 0, 0, 100, 100, 0],
                &[0, 0, 0, 0, 0, 0, 0],
            ]);
            hysteresis(&mut classes, strategy, &CancelToken::new()).unwrap();
            let edges = finalize(&classes).0;
            assert_eq!(edges[[1, 2]], 255, "{strategy:?}");
            assert_eq!(edges[[2, 3]], 255, "{strategy:?}");
            assert_eq!(edges[[3, 4]], 255, "{strategy:?}");
            assert_eq!(edges[[3, 5]], 255, "{strategy:?}");
        }
    }

    #[test]
    fn test_hysteresis_drops_isolated_weak() {
        for strategy in [HysteresisStrategy::Worklist, HysteresisStrategy::FullScan] {
            let mut classes = classes_from(&[
                &[0, 0, 0, 0, 0],
                &[0, 255, 0, 0, 0],
                &[0, 0, 0, 0, 0],
                &[0, 0, 0, 100, 0],
                &[0, 0, 0, 0, 0],
            ]);
            hysteresis(&mut classes, strategy, &CancelToken::new()).unwrap();
            let edges = finalize(&classes).0;
            assert_eq!(edges[[3, 3]], 0);
            assert_eq!(edges[[1, 1]], 255);
        }
    }

    #[test]
    fn test_hysteresis_never_promotes_border() {
        for strategy in [HysteresisStrategy::Worklist, HysteresisStrategy::FullScan] {
            let mut classes = classes_from(&[
                &[100, 100, 100],
                &[100, 255, 100],
                &[100, 100, 100],
            ]);
            hysteresis(&mut classes, strategy, &CancelToken::new()).unwrap();
            let edges = finalize(&classes).0;
            assert_eq!(edges.iter().filter(|&&v| v == 255).count(), 1);
        }
    }

    #[test]
    fn test_strategies_agree_on_noise() {
        // Deterministic pseudo-random tri-state pattern.
        let mut state = 12345u32;
        let mut classes = Array2::from_shape_fn((24, 31), |_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            match (state >> 16) % 7 {
                0 => EdgeClass::Strong,
                1..=3 => EdgeClass::Weak,
                _ => EdgeClass::None,
            }
        });
        let mut other = classes.clone();

        hysteresis(&mut classes, HysteresisStrategy::Worklist, &CancelToken::new()).unwrap();
        hysteresis(&mut other, HysteresisStrategy::FullScan, &CancelToken::new()).unwrap();

        assert_eq!(finalize(&classes), finalize(&other));
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        for size in [5usize, 8, 13] {
            let image = ImageBuffer::filled(size, size, &[90, 140, 200, 255]).unwrap();
            let result = canny(&image, &CannyOptions::default(), &CancelToken::new()).unwrap();
            assert_eq!(result.channels(), 4);
            for y in 0..size {
                for x in 0..size {
                    assert_eq!(result.pixel(x, y).to_vec(), vec![0, 0, 0, 255]);
                }
            }
        }
    }

    #[test]
    fn test_step_edge_is_detected_near_step() {
        // Dark left half, bright right half.
        let (width, height) = (12, 8);
        let mut data = Vec::with_capacity(width * height * 3);
        for _y in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 200 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let image = ImageBuffer::new(data, width, height, 3).unwrap();
        let EdgeMap(edges) = detect_edges(&image, &CannyOptions::default(), &CancelToken::new()).unwrap();

        let row = height / 2;
        let hits: Vec<usize> = (0..width).filter(|&x| edges[[row, x]] == 255).collect();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|&x| x >= width / 2 - 3 && x <= width / 2 + 2));
        assert!(edges.iter().all(|&v| v == 0 || v == 255));
    }

    /// 10x9 RGBA diagonal step: bright where `x - y > 4`, so both Sobel
    /// responses are positive along the boundary.
    fn diagonal_step() -> ImageBuffer {
        let (width, height) = (10, 9);
        let mut data = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let v: u8 = if x as isize - y as isize > 4 { 200 } else { 40 };
                data.extend_from_slice(&[v, v, v - 20, 255]);
            }
        }
        ImageBuffer::new(data, width, height, 4).unwrap()
    }

    #[test]
    fn test_diagonal_step_exact_edge_map() {
        #[rustfmt::skip]
        let expected: [[u8; 10]; 9] = [
            [0, 0, 0,   0, 255, 255, 255,   0,   0,   0],
            [0, 0, 0,   0, 255, 255, 255, 255, 255, 255],
            [0, 0, 0,   0,   0, 255, 255, 255, 255,   0],
            [0, 0, 0, 255, 255, 255, 255, 255, 255, 255],
            [0, 0, 0,   0, 255, 255, 255, 255, 255, 255],
            [0, 0, 0,   0,   0, 255, 255,   0, 255, 255],
            [0, 0, 0,   0,   0,   0, 255,   0,   0,   0],
            [0, 0, 0,   0,   0,   0,   0,   0,   0,   0],
            [0, 0, 0,   0,   0,   0,   0,   0,   0,   0],
        ];
        let expected = Array2::from_shape_fn((9, 10), |(y, x)| expected[y][x]);
        let image = diagonal_step();

        for strategy in [HysteresisStrategy::Worklist, HysteresisStrategy::FullScan] {
            let options = CannyOptions {
                hysteresis: strategy,
                ..CannyOptions::default()
            };
            let EdgeMap(edges) = detect_edges(&image, &options, &CancelToken::new()).unwrap();
            assert_eq!(edges, expected, "{strategy:?}");

            let expanded = canny(&image, &options, &CancelToken::new()).unwrap();
            assert_eq!(expanded.pixel(4, 0).to_vec(), vec![255, 255, 255, 255]);
            assert_eq!(expanded.pixel(0, 0).to_vec(), vec![0, 0, 0, 255]);
        }
    }

    #[test]
    fn test_diagonal_step_reaches_quotient_directions() {
        let image = diagonal_step();
        let kernel = Kernel1D::normalized(&SMOOTHING_TAPS, SMOOTHING_DIVISOR).unwrap();
        let smoothed = convolve_separable(image.view(), &kernel);
        let gray = to_single_channel(smoothed.view(), image.alpha_channel());
        let field = sobel(gray.view(), &SobelOptions::default());

        let mut directions: Vec<u8> = field.direction.iter().copied().collect();
        directions.sort_unstable();
        directions.dedup();
        for angle in [0, 45, 63, 71] {
            assert!(directions.contains(&angle), "missing {angle} in {directions:?}");
        }
    }

    #[test]
    fn test_full_scan_hysteresis_observes_cancel() {
        let mut classes = Array2::from_elem((40, 40), EdgeClass::Weak);
        classes[[1, 1]] = EdgeClass::Strong;
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = hysteresis(&mut classes, HysteresisStrategy::FullScan, &cancel);

        assert_eq!(result, Err(FilterError::Cancelled));
    }

    #[test]
    fn test_worklist_hysteresis_observes_cancel() {
        // One seed flooding a 298x298 weak interior pops far more than
        // CANCEL_CHECK_INTERVAL entries.
        let mut classes = Array2::from_elem((300, 300), EdgeClass::Weak);
        classes[[1, 1]] = EdgeClass::Strong;
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = hysteresis(&mut classes, HysteresisStrategy::Worklist, &cancel);

        assert_eq!(result, Err(FilterError::Cancelled));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let image = ImageBuffer::filled(5, 5, &[0, 0, 0, 255]).unwrap();
        let options = CannyOptions {
            max_threshold: 20,
            min_threshold: 20,
            ..CannyOptions::default()
        };
        let err = canny(&image, &options, &CancelToken::new()).unwrap_err();
        assert_eq!(err, FilterError::InvalidThresholds { min: 20, max: 20 });
    }

    #[test]
    fn test_cancelled_token_stops_pipeline() {
        let image = ImageBuffer::filled(6, 6, &[1, 2, 3, 255]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            canny(&image, &CannyOptions::default(), &cancel).unwrap_err(),
            FilterError::Cancelled
        );
    }

    #[test]
    fn test_options_defaults_fill_missing_fields() {
        let opts: CannyOptions = serde_json::from_str(r#"{"max_threshold": 120}"#).unwrap();
        assert_eq!(opts.max_threshold, 120);
        assert_eq!(opts.min_threshold, 20);
        assert_eq!(opts.hysteresis, HysteresisStrategy::Worklist);
    }
}
