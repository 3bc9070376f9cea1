//! Core types for inpainting operations

use crate::config::{HdStrategy, OutputFormat};
use crate::error::Result;
use crate::services::ImageIOService;
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Axis-aligned rectangle with half-open bounds `[left, right) × [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Create a box, returning `None` when it would be empty
    #[must_use]
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Option<Self> {
        (left < right && top < bottom).then_some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Integer center, rounded toward the top-left
    #[must_use]
    pub fn center(&self) -> (u32, u32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Whether `other` lies entirely inside this box
    #[must_use]
    pub fn covers(&self, other: &BoundingBox) -> bool {
        other.left >= self.left
            && other.right <= self.right
            && other.top >= self.top
            && other.bottom <= self.bottom
    }

    /// Clamp to `[0,width] × [0,height]`, returning `None` if nothing remains
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        Self::new(
            self.left.min(width),
            self.top.min(height),
            self.right.min(width),
            self.bottom.min(height),
        )
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}) x [{}, {})",
            self.left, self.right, self.top, self.bottom
        )
    }
}

/// Detailed timing breakdown for one inpainting call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Input validation, alpha detachment and mask binarization
    pub preparation_ms: u64,

    /// Time spent inside the inference adapter, summed over all calls
    pub inference_ms: u64,

    /// Number of inference adapter calls
    pub inference_calls: u32,

    /// Padding, cropping, resizing and stitching around inference
    pub compositing_ms: u64,

    /// Final image encoding (bytes and file variants only)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of total time spent in inference
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.preparation_ms
            + self.inference_ms
            + self.compositing_ms
            + self.image_encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(measured)
    }
}

/// Metadata describing how an image was processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// Backend that served inference
    pub backend_name: String,

    /// Pixel layout of the input (`gray`, `rgb`, `rgba`)
    pub input_layout: String,

    /// Number of masked pixels after binarization
    pub masked_pixels: u64,

    /// When processing finished
    pub processed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(backend_name: String) -> Self {
        Self {
            timings: ProcessingTimings::new(),
            backend_name,
            input_layout: "unknown".to_string(),
            masked_pixels: 0,
            processed_at: Utc::now(),
        }
    }
}

/// Result of an inpainting operation
#[derive(Debug, Clone)]
pub struct InpaintResult {
    /// Inpainted image, same dimensions and channel layout as the input
    pub image: DynamicImage,

    /// Path the dispatcher selected
    pub strategy: HdStrategy,

    /// Crop windows processed (Crop path only)
    pub regions: Vec<BoundingBox>,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Processing metadata
    pub metadata: ProcessingMetadata,

    /// Original input path (for logging purposes)
    pub input_path: Option<String>,
}

impl InpaintResult {
    #[must_use]
    pub fn new(
        image: DynamicImage,
        strategy: HdStrategy,
        regions: Vec<BoundingBox>,
        metadata: ProcessingMetadata,
    ) -> Self {
        let original_dimensions = image.dimensions();
        Self {
            image,
            strategy,
            regions,
            original_dimensions,
            metadata,
            input_path: None,
        }
    }

    #[must_use]
    pub fn with_input_path(mut self, input_path: String) -> Self {
        self.input_path = Some(input_path);
        self
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get detailed timing breakdown
    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Encode the result in the specified format
    ///
    /// # Errors
    /// - Encoder failures
    pub fn to_bytes(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        ImageIOService::encode(&self.image, format, quality)
    }

    /// Encode the result as PNG
    ///
    /// # Errors
    /// - Encoder failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes(OutputFormat::Png, 100)
    }

    /// Save in the specified format, recording the encode time
    ///
    /// # Errors
    /// - Parent directory cannot be created
    /// - Encoder or file write failures
    pub fn save<P: AsRef<Path>>(
        &mut self,
        path: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        let encode_start = instant::Instant::now();
        ImageIOService::save_image(&self.image, path.as_ref(), format, quality)?;
        self.metadata.timings.image_encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        let (width, height) = self.original_dimensions;
        format!(
            "{width}x{height} via {} ({} region(s), {} inference call(s), {}ms)",
            self.strategy,
            self.regions.len(),
            self.metadata.timings.inference_calls,
            self.metadata.timings.total_ms
        )
    }
}
