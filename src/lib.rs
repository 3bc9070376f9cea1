#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # IMG.LY Inpainting Library
//!
//! Removes objects from photographs: given an image and a mask marking the
//! region to remove, it fills the masked pixels with plausible content from
//! an ONNX inpainting model (such as LaMa) and leaves every other pixel
//! untouched.
//!
//! The model is treated as an opaque `infer(image, mask)` capability. The
//! library's own work is resolution management around it:
//!
//! - **Direct**: pad the whole image to the model stride and infer once
//! - **Crop**: infer on a margin-expanded window around each masked region and
//!   stitch the windows back (default for images above 800 px)
//! - **Resize**: downscale to a limit, infer, upscale and composite under the mask
//!
//! Alpha channels are detached before inference and reattached unchanged, and
//! gray, RGB and RGBA inputs come back in their original layout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_inpaint::{
//!     BackendConfig, BackendType, ExecutionProvider, HdStrategy, InpaintConfig, InpaintProcessor,
//!     ModelSpec,
//! };
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = InpaintConfig::builder()
//!     .hd_strategy(HdStrategy::Crop)
//!     .crop_margin(128)
//!     .build()?;
//! let backend_config = BackendConfig::builder()
//!     .execution_provider(ExecutionProvider::Auto)
//!     .model_spec(ModelSpec::external("models/lama.onnx"))
//!     .build();
//!
//! let processor =
//!     InpaintProcessor::from_backend_type(config, BackendType::Onnx, &backend_config)?;
//! let image = image::open("photo.jpg")?;
//! let mask = image::open("mask.png")?;
//! let mut result = processor.process(&image, &mask)?;
//! result.save("photo_clean.png", imgly_inpaint::OutputFormat::Png, 90)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface, progress bar and tracing setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`, `tracing-files`: extra log outputs for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! imgly-inpaint = { version = "0.1", default-features = false, features = ["onnx"] }
//! ```

pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use backends::*;
pub use batch::{
    BatchHandle, BatchItemFailure, BatchJob, BatchOptions, BatchOutcome, BatchProcessor,
    ErrorPolicy, ProcessedFile,
};
pub use config::{
    BackendConfig, BackendConfigBuilder, ExecutionProvider, HdStrategy, InpaintConfig,
    InpaintConfigBuilder, Interpolation, OutputFormat,
};
pub use error::{InpaintError, Result};
pub use inference::{InferenceBackend, SharedBackend};
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, OutputRange};
pub use pipeline::{AlphaCompositor, MaskRegionExtractor, PixelLayout, StrategyDispatcher};
pub use processor::{
    create_shared_backend, BackendFactory, BackendType, DefaultBackendFactory, InpaintProcessor,
};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{BoundingBox, InpaintResult, ProcessingMetadata, ProcessingTimings};
pub use utils::{ExecutionProviderManager, ProviderInfo, TensorConverter};

#[cfg(feature = "cli")]
pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingGuard, TracingOutput};

pub use tokio_util::sync::CancellationToken;

/// Inpaint a decoded image with a loaded backend
///
/// # Examples
/// ```rust
/// use image::{DynamicImage, GrayImage, Luma};
/// use imgly_inpaint::{inpaint_image, InpaintConfig, MockBackend, SharedBackend};
///
/// let backend = SharedBackend::new(MockBackend::solid_color([0, 0, 0]));
/// let image = DynamicImage::new_rgb8(64, 48);
/// let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 48, |x, _| {
///     Luma([if x < 8 { 255 } else { 0 }])
/// }));
///
/// let result = inpaint_image(&image, &mask, &InpaintConfig::default(), &backend).unwrap();
/// assert_eq!(result.dimensions(), (64, 48));
/// ```
pub fn inpaint_image(
    image: &image::DynamicImage,
    mask: &image::DynamicImage,
    config: &InpaintConfig,
    backend: &SharedBackend,
) -> Result<InpaintResult> {
    InpaintProcessor::new(config.clone(), backend.clone())?.process(image, mask)
}

/// Inpaint encoded image bytes and return a PNG
///
/// Suitable for network front ends: both inputs are sniffed by their magic
/// bytes and the mask is forced to grayscale.
///
/// ```rust,no_run
/// use imgly_inpaint::{inpaint_bytes, InpaintConfig, SharedBackend};
///
/// # fn example(backend: &SharedBackend, upload: &[u8], mask: &[u8]) -> anyhow::Result<()> {
/// let png = inpaint_bytes(upload, mask, &InpaintConfig::default(), backend)?;
/// std::fs::write("result.png", png)?;
/// # Ok(())
/// # }
/// ```
pub fn inpaint_bytes(
    image_bytes: &[u8],
    mask_bytes: &[u8],
    config: &InpaintConfig,
    backend: &SharedBackend,
) -> Result<Vec<u8>> {
    InpaintProcessor::new(config.clone(), backend.clone())?.process_bytes(image_bytes, mask_bytes)
}

/// Read an encoded image from an async stream and inpaint it off the async runtime
///
/// Inference runs on tokio's blocking pool so the caller's executor stays responsive.
///
/// ```rust,no_run
/// use imgly_inpaint::{inpaint_from_reader, InpaintConfig, SharedBackend};
/// use tokio::fs::File;
///
/// # async fn example(backend: SharedBackend, mask: Vec<u8>) -> anyhow::Result<()> {
/// let file = File::open("photo.jpg").await?;
/// let png = inpaint_from_reader(file, mask, InpaintConfig::default(), backend).await?;
/// # Ok(())
/// # }
/// ```
pub async fn inpaint_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    mask_bytes: Vec<u8>,
    config: InpaintConfig,
    backend: SharedBackend,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| InpaintError::processing(format!("Failed to read from stream: {e}")))?;

    let processor = InpaintProcessor::new(config, backend)?;
    tokio::task::spawn_blocking(move || processor.process_bytes(&buffer, &mask_bytes))
        .await
        .map_err(|e| InpaintError::internal(format!("Inpainting task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

    fn png(image: &DynamicImage) -> Vec<u8> {
        ImageIOService::encode(image, OutputFormat::Png, 90).unwrap()
    }

    #[test]
    fn test_inpaint_bytes_returns_png() {
        let backend = SharedBackend::new(MockBackend::solid_color([255, 0, 0]));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([0, 0, 255])));
        let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(16, 16, |x, y| {
            Luma([if x < 4 && y < 4 { 255 } else { 0 }])
        }));

        let bytes =
            inpaint_bytes(&png(&image), &png(&mask), &InpaintConfig::default(), &backend).unwrap();
        assert_eq!(
            services::detect_image_format(&bytes).unwrap(),
            image::ImageFormat::Png
        );
        let decoded = ImageIOService::decode_image(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([255, 0, 0]));
        assert_eq!(decoded.get_pixel(10, 10), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_inpaint_bytes_rejects_unknown_signature() {
        let backend = SharedBackend::new(MockBackend::identity());
        let result =
            inpaint_bytes(b"not an image", b"nor a mask", &InpaintConfig::default(), &backend);
        assert!(matches!(result, Err(InpaintError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_inpaint_from_reader() {
        let backend = SharedBackend::new(MockBackend::identity());
        let image = png(&DynamicImage::new_rgb8(8, 8));
        let mask = png(&DynamicImage::new_luma8(8, 8));

        let bytes = inpaint_from_reader(
            std::io::Cursor::new(image),
            mask,
            InpaintConfig::default(),
            backend,
        )
        .await
        .unwrap();
        assert!(!bytes.is_empty());
    }
}
