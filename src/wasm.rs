//! WebAssembly exports.
//!
//! These functions are exposed to JavaScript via wasm-bindgen and work on
//! flat interleaved byte arrays (length = width * height * channels).

use wasm_bindgen::prelude::*;

use crate::registry::FilterRegistry;
use crate::image::default_alpha;

/// Run a registered filter on a flat image buffer.
///
/// # Arguments
/// * `name` - Filter key: `"invert"`, `"box_blur"`, `"gaussian"` or `"canny"`
/// * `data` - Interleaved bytes
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - Channels per pixel (1, 3 or 4; 4 implies alpha at index 3)
///
/// # Returns
/// A new buffer of the same length, or an error message
#[wasm_bindgen]
pub fn apply_filter_wasm(
    name: &str,
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
) -> Result<Vec<u8>, JsValue> {
    FilterRegistry::shared()
        .apply_raw(name, data, width, height, channels, default_alpha(channels))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Names accepted by `apply_filter_wasm`.
#[wasm_bindgen]
pub fn filter_names_wasm() -> Vec<String> {
    FilterRegistry::shared()
        .names()
        .into_iter()
        .map(String::from)
        .collect()
}
