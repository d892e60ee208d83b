//! Numeric primitives and the built-in filter transforms.
//!
//! ## Supported Formats
//!
//! All filters work on interleaved 8-bit images:
//!
//! | Format | Shape | Alpha |
//! |--------|-------|-------|
//! | Grayscale8 | (H, W, 1) | none |
//! | RGB8 | (H, W, 3) | none |
//! | RGBA8 | (H, W, 4) | index 3 (default) |
//!
//! ## Layers
//!
//! - **convolution** - 1D / 2D kernels with replicate borders
//! - **grayscale** - channel averaging, single-channel conversion, addition
//! - **edge** - Sobel gradient magnitude and direction
//! - **canny** - smoothing, suppression, double threshold, hysteresis
//! - **blur**, **invert** - the simple transforms built on the above
//!
//! Primitives assume pre-validated shapes; validation happens once when an
//! [`ImageBuffer`](crate::image::ImageBuffer) is built.

pub mod convolution;
pub mod grayscale;
pub mod edge;
pub mod canny;
pub mod blur;
pub mod invert;
