//! Filter variants and the name-keyed registry that selects them.
//!
//! The registry is built once and read-only afterwards, so one
//! `Arc<FilterRegistry>` can back any number of dispatchers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use log::debug;

use crate::cancel::CancelToken;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::blur::{box_blur, gaussian_blur};
use crate::filters::canny::{canny, CannyOptions};
use crate::filters::invert::invert;
use crate::image::ImageBuffer;

pub const INVERT: &str = "invert";
pub const BOX_BLUR: &str = "box_blur";
pub const GAUSSIAN: &str = "gaussian";
pub const CANNY: &str = "canny";

/// A stateless image transform.
///
/// Implementations return a freshly allocated image with the same width,
/// height and channel count as `source`, and never modify `source`.
pub trait Filter: Send + Sync {
    /// Registry key, e.g. `"box_blur"`.
    fn name(&self) -> &'static str;

    fn transform(&self, source: &ImageBuffer, cancel: &CancelToken) -> Result<ImageBuffer>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvertFilter;

impl Filter for InvertFilter {
    fn name(&self) -> &'static str {
        INVERT
    }

    fn transform(&self, source: &ImageBuffer, _cancel: &CancelToken) -> Result<ImageBuffer> {
        invert(source)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoxBlurFilter;

impl Filter for BoxBlurFilter {
    fn name(&self) -> &'static str {
        BOX_BLUR
    }

    fn transform(&self, source: &ImageBuffer, _cancel: &CancelToken) -> Result<ImageBuffer> {
        box_blur(source)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianBlurFilter;

impl Filter for GaussianBlurFilter {
    fn name(&self) -> &'static str {
        GAUSSIAN
    }

    fn transform(&self, source: &ImageBuffer, _cancel: &CancelToken) -> Result<ImageBuffer> {
        gaussian_blur(source)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CannyFilter {
    options: CannyOptions,
}

impl CannyFilter {
    pub fn new(options: CannyOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CannyOptions {
        &self.options
    }
}

impl Filter for CannyFilter {
    fn name(&self) -> &'static str {
        CANNY
    }

    fn transform(&self, source: &ImageBuffer, cancel: &CancelToken) -> Result<ImageBuffer> {
        canny(source, &self.options, cancel)
    }
}

/// Immutable map from filter name to variant.
pub struct FilterRegistry {
    filters: BTreeMap<&'static str, Box<dyn Filter>>,
}

impl FilterRegistry {
    /// A registry with no filters; add them with [`FilterRegistry::with_filter`].
    pub fn empty() -> Self {
        Self {
            filters: BTreeMap::new(),
        }
    }

    /// The four built-in filters with default settings.
    pub fn builtin() -> Self {
        Self::empty()
            .with_filter(InvertFilter)
            .with_filter(BoxBlurFilter)
            .with_filter(GaussianBlurFilter)
            .with_filter(CannyFilter::default())
    }

    /// Process-wide built-in registry, created on first use.
    pub fn shared() -> &'static FilterRegistry {
        static SHARED: OnceLock<FilterRegistry> = OnceLock::new();
        SHARED.get_or_init(FilterRegistry::builtin)
    }

    /// The built-in filters configured from `config`.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        Ok(Self::empty()
            .with_filter(InvertFilter)
            .with_filter(BoxBlurFilter)
            .with_filter(GaussianBlurFilter)
            .with_filter(CannyFilter::new(config.canny)?))
    }

    /// Add or replace the filter registered under `filter.name()`.
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.insert(filter.name(), Box::new(filter));
        self
    }

    /// The filter registered as `name` (case-sensitive).
    pub fn lookup(&self, name: &str) -> Result<&dyn Filter> {
        self.filters
            .get(name)
            .map(|filter| filter.as_ref())
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.keys().copied().collect()
    }

    /// Look up `name`, run it and check the output shape.
    pub fn apply(&self, name: &str, source: &ImageBuffer, cancel: &CancelToken) -> Result<ImageBuffer> {
        let filter = self.lookup(name)?;
        debug!(
            "applying {name} to {}x{}x{} image",
            source.width(),
            source.height(),
            source.channels()
        );
        let result = filter.transform(source, cancel)?;
        source.ensure_same_shape(&result).map_err(|e| {
            FilterError::ProcessingFailed(format!("{name} changed the image shape: {e}"))
        })?;
        Ok(result)
    }

    /// Raw-buffer entry point: validate, run `name`, return the new bytes.
    pub fn apply_raw(
        &self,
        name: &str,
        data: &[u8],
        width: usize,
        height: usize,
        channels: usize,
        alpha_channel: Option<usize>,
    ) -> Result<Vec<u8>> {
        self.lookup(name)?;
        let source = ImageBuffer::new(data.to_vec(), width, height, channels)?
            .with_alpha_channel(alpha_channel)?;
        Ok(self.apply(name, &source, &CancelToken::new())?.into_raw())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}
