//! Pixel Filters
//!
//! An 8-bit image filtering engine: convolution blurs, inversion and Canny
//! edge detection over interleaved multi-channel buffers, selected by name
//! and run on a dedicated worker thread.
//!
//! ## Image Format
//! Images are row-major, interleaved `u8` buffers:
//! - **Grayscale**: (height, width, 1)
//! - **RGB**: (height, width, 3)
//! - **RGBA**: (height, width, 4) - alpha at index 3 unless overridden
//!
//! Every filter returns a new buffer with the same width, height and
//! channel count as its input.
//!
//! ## Filters
//! | Key | Transform |
//! |-----|-----------|
//! | `invert` | `255 - v` on color channels, alpha untouched |
//! | `box_blur` | separable 9-tap flat blur |
//! | `gaussian` | separable `{1, 2, 1} / 4` blur |
//! | `canny` | Canny edges, white on black, opaque |
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use pixel_filters::{FilterDispatcher, FilterRegistry, ImageBuffer};
//!
//! let dispatcher = FilterDispatcher::new(Arc::new(FilterRegistry::builtin()))?;
//! let image = ImageBuffer::filled(4, 4, &[10, 20, 30, 255])?;
//! dispatcher.submit("box_blur", &image)?;
//! let blurred = dispatcher.recv_event()?.into_result()?;
//! assert_eq!(blurred, image);
//! # Ok::<(), pixel_filters::FilterError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filters;
pub mod image;
pub mod registry;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use cancel::CancelToken;
pub use config::{DispatcherConfig, FilterConfig};
pub use dispatcher::{FilterDispatcher, FilterEvent, JobId};
pub use error::{FilterError, Result};
pub use filters::canny::{CannyOptions, HysteresisStrategy};
pub use filters::edge::{DirectionEstimate, MagnitudeCombination, SobelOptions};
pub use image::ImageBuffer;
pub use registry::{Filter, FilterRegistry};

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::image::{default_alpha, ImageBuffer};
    use crate::registry::FilterRegistry;
    use crate::{CancelToken, FilterError};

    fn to_py_err(err: FilterError) -> PyErr {
        match err {
            FilterError::UnknownFilter(_) => PyKeyError::new_err(err.to_string()),
            FilterError::InvalidDimensions(_)
            | FilterError::InvalidKernel(_)
            | FilterError::InvalidThresholds { .. }
            | FilterError::Config(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    /// Run a registered filter on an image (height, width, channels) as u8.
    ///
    /// Four-channel images treat channel 3 as alpha. The GIL is released
    /// while the filter runs.
    #[pyfunction]
    pub fn apply_filter<'py>(
        py: Python<'py>,
        name: &str,
        image: PyReadonlyArray3<'py, u8>,
    ) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let input = image.as_array().to_owned();
        let channels = input.dim().2;
        let source = ImageBuffer::from_array(input, default_alpha(channels)).map_err(to_py_err)?;
        let result = py
            .allow_threads(|| {
                FilterRegistry::shared().apply(name, &source, &CancelToken::new())
            })
            .map_err(to_py_err)?;
        Ok(result.into_array().into_pyarray(py))
    }

    /// Names accepted by `apply_filter`.
    #[pyfunction]
    pub fn filter_names() -> Vec<&'static str> {
        FilterRegistry::shared().names()
    }

    #[pymodule]
    pub fn pixel_filters(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(apply_filter, m)?)?;
        m.add_function(wrap_pyfunction!(filter_names, m)?)?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::pixel_filters;
