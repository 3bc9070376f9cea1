//! Inpainting processor
//!
//! [`InpaintProcessor`] is the entry point shared by the library functions,
//! the batch worker and the CLI. It validates inputs, separates alpha,
//! runs the configured HD strategy and restores the input's pixel layout.

use crate::{
    backends::MockBackend,
    config::{BackendConfig, HdStrategy, InpaintConfig},
    error::{InpaintError, Result},
    inference::{InferenceBackend, SharedBackend},
    pipeline::{
        regions::{binarize_mask, count_masked, mask_is_empty},
        select_strategy, AlphaCompositor, PipelineContext, PixelLayout, StrategyDispatcher,
    },
    services::{
        ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker,
        ProgressUpdate,
    },
    types::{InpaintResult, ProcessingMetadata, ProcessingTimings},
};
use image::{imageops, DynamicImage, GenericImageView, GrayImage};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, span, Level};

#[cfg(any(feature = "onnx", feature = "tract"))]
use crate::models::ModelManager;

/// Inference backend selectable at runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// ONNX Runtime (supports GPU acceleration)
    Onnx,
    /// Tract (pure Rust, CPU only)
    Tract,
    /// Deterministic stand-in, needs no model
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Creates backend instances by type
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend for the given configuration
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    /// - Model cannot be located
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &BackendConfig,
    ) -> Result<Box<dyn InferenceBackend>>;

    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends compiled into this build
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

/// Fill color of the mock backend selected through [`BackendType::Mock`]
pub const MOCK_FILL_COLOR: [u8; 3] = [128, 128, 128];

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &BackendConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        #[cfg(not(any(feature = "onnx", feature = "tract")))]
        let _ = config;

        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => {
                let manager = ModelManager::from_spec(&config.model_spec)?;
                Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(manager)))
            },
            #[cfg(feature = "tract")]
            BackendType::Tract => {
                let manager = ModelManager::from_spec(&config.model_spec)?;
                Ok(Box::new(crate::backends::TractBackend::with_model_manager(manager)))
            },
            BackendType::Mock => Ok(Box::new(MockBackend::solid_color(MOCK_FILL_COLOR))),
            #[cfg(not(all(feature = "onnx", feature = "tract")))]
            other => {
                Err(InpaintError::invalid_config(format!(
                    "{other} backend not compiled in; enable the '{other}' feature"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends.push(BackendType::Mock);
        backends
    }
}

/// Create, wrap and load a backend
///
/// # Errors
/// - Backend creation or model loading failures
pub fn create_shared_backend(
    factory: &dyn BackendFactory,
    backend_type: BackendType,
    config: &BackendConfig,
) -> Result<SharedBackend> {
    let backend = SharedBackend::from_boxed(factory.create_backend(backend_type, config)?);
    backend.initialize(config)?;
    Ok(backend)
}

/// Grow or shrink a mask to the image size when their aspect ratios agree within one pixel
fn match_mask_dimensions(mask: GrayImage, width: u32, height: u32) -> Result<GrayImage> {
    let (mask_w, mask_h) = mask.dimensions();
    if (mask_w, mask_h) == (width, height) {
        return Ok(mask);
    }

    let scaled_h =
        (u64::from(mask_h) * u64::from(width) + u64::from(mask_w) / 2) / u64::from(mask_w);
    if scaled_h.abs_diff(u64::from(height)) > 1 {
        return Err(InpaintError::invalid_mask(format!(
            "mask is {mask_w}x{mask_h} but image is {width}x{height}; aspect ratios differ"
        )));
    }

    debug!(mask_w, mask_h, width, height, "resizing mask to image size");
    Ok(imageops::resize(&mask, width, height, imageops::FilterType::Nearest))
}

/// Validate the image and turn `mask` into a binary mask of the same size
fn prepare_mask(image: &DynamicImage, mask: &DynamicImage) -> Result<(PixelLayout, GrayImage)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InpaintError::invalid_image(format!("image is {width}x{height}")));
    }
    let layout = PixelLayout::of(image)?;

    let (mask_w, mask_h) = mask.dimensions();
    if mask_w == 0 || mask_h == 0 {
        return Err(InpaintError::invalid_mask(format!("mask is {mask_w}x{mask_h}")));
    }
    let gray = match mask {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    };

    let matched = match_mask_dimensions(gray, width, height)?;
    Ok((layout, binarize_mask(&matched)))
}

/// Validates inputs and runs the inpainting pipeline against a shared backend
#[derive(Clone)]
pub struct InpaintProcessor {
    config: InpaintConfig,
    backend: SharedBackend,
    reporter: Arc<dyn ProgressReporter>,
}

impl InpaintProcessor {
    /// Create a processor around an already loaded backend
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: InpaintConfig, backend: SharedBackend) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Create the backend with [`DefaultBackendFactory`], load it and wrap it in a processor
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend creation or model loading failures
    pub fn from_backend_type(
        config: InpaintConfig,
        backend_type: BackendType,
        backend_config: &BackendConfig,
    ) -> Result<Self> {
        config.validate()?;
        let backend = create_shared_backend(&DefaultBackendFactory, backend_type, backend_config)?;
        Self::new(config, backend)
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Inpaint the masked pixels of `image`
    ///
    /// The output has the input's size and layout. Pixels outside the mask
    /// are returned unchanged and alpha is passed through untouched.
    ///
    /// # Errors
    /// - [`InpaintError::InvalidImage`] for a zero-sized image or unsupported layout
    /// - [`InpaintError::InvalidMask`] for a zero-sized or unmatchable mask
    /// - [`InpaintError::Inference`] when the backend fails
    pub fn process(&self, image: &DynamicImage, mask: &DynamicImage) -> Result<InpaintResult> {
        self.run(image, mask, None)
    }

    /// Like [`InpaintProcessor::process`], stopping between regions once `token` is cancelled
    ///
    /// # Errors
    /// - Same as [`InpaintProcessor::process`]
    /// - [`InpaintError::Cancelled`] when the token fires before the work is done
    pub fn process_with_cancellation(
        &self,
        image: &DynamicImage,
        mask: &DynamicImage,
        token: &CancellationToken,
    ) -> Result<InpaintResult> {
        self.run(image, mask, Some(token))
    }

    /// Decode both inputs, inpaint, and encode the result as PNG
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imgly_inpaint::{InpaintConfig, InpaintProcessor, MockBackend, SharedBackend};
    ///
    /// # fn example(photo: &[u8], mask: &[u8]) -> anyhow::Result<()> {
    /// let backend = SharedBackend::new(MockBackend::identity());
    /// let processor = InpaintProcessor::new(InpaintConfig::default(), backend)?;
    /// let png = processor.process_bytes(photo, mask)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - [`InpaintError::UnsupportedFormat`] for an unrecognized signature
    /// - Decode, validation, inference or encode failures
    pub fn process_bytes(&self, image_bytes: &[u8], mask_bytes: &[u8]) -> Result<Vec<u8>> {
        let image = ImageIOService::decode_image(image_bytes)?;
        let mask = DynamicImage::ImageLuma8(ImageIOService::decode_mask(mask_bytes)?);
        let result = self.process(&image, &mask)?;

        let encode_start = Instant::now();
        self.reporter
            .report_progress(ProgressUpdate::new(ProcessingStage::Encoding, encode_start));
        let bytes = result.to_png_bytes()?;
        debug!(
            encode_ms = encode_start.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "encoded PNG"
        );
        Ok(bytes)
    }

    /// Load an image file and inpaint it with `mask`
    ///
    /// # Errors
    /// - File read or decode failures
    /// - Validation or inference failures
    pub fn process_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        mask: &DynamicImage,
    ) -> Result<InpaintResult> {
        self.process_file_inner(input_path.as_ref(), mask, None)
    }

    /// [`InpaintProcessor::process_file`] with a cancellation token
    ///
    /// # Errors
    /// - Same as [`InpaintProcessor::process_file`]
    /// - [`InpaintError::Cancelled`]
    pub fn process_file_with_cancellation<P: AsRef<Path>>(
        &self,
        input_path: P,
        mask: &DynamicImage,
        token: &CancellationToken,
    ) -> Result<InpaintResult> {
        self.process_file_inner(input_path.as_ref(), mask, Some(token))
    }

    fn process_file_inner(
        &self,
        input_path: &Path,
        mask: &DynamicImage,
        cancel: Option<&CancellationToken>,
    ) -> Result<InpaintResult> {
        self.reporter
            .report_progress(ProgressUpdate::new(ProcessingStage::ImageLoading, Instant::now()));
        let image = ImageIOService::load_image(input_path)?;
        Ok(self
            .run(&image, mask, cancel)?
            .with_input_path(input_path.display().to_string()))
    }

    #[instrument(
        skip(self, image, mask, cancel),
        fields(
            backend = self.backend.name(),
            width = image.width(),
            height = image.height(),
            strategy = %self.config.hd_strategy
        )
    )]
    fn run(
        &self,
        image: &DynamicImage,
        mask: &DynamicImage,
        cancel: Option<&CancellationToken>,
    ) -> Result<InpaintResult> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let result = self.run_stages(image, mask, cancel, &mut tracker);
        match &result {
            Ok(result) => {
                info!(summary = %result.summary(), "inpainting complete");
                tracker.report_stage(ProcessingStage::Completed);
                tracker.report_completion(result.metadata.timings.clone());
            },
            Err(e) => tracker.report_error(&e.to_string()),
        }
        result
    }

    fn run_stages(
        &self,
        image: &DynamicImage,
        mask: &DynamicImage,
        cancel: Option<&CancellationToken>,
        tracker: &mut ProgressTracker,
    ) -> Result<InpaintResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let (width, height) = image.dimensions();

        let (layout, mask, color, envelope) = {
            let _span = span!(Level::DEBUG, "preparation", width, height).entered();
            let start = Instant::now();

            tracker.report_stage(ProcessingStage::MaskPreparation);
            let (layout, mask) = prepare_mask(image, mask)?;

            tracker.report_stage(ProcessingStage::AlphaExtraction);
            let (color, envelope) = AlphaCompositor::detach(image)?;

            timings.preparation_ms = start.elapsed().as_millis() as u64;
            (layout, mask, color, envelope)
        };
        let masked_pixels = count_masked(&mask);

        let (inpainted, strategy, regions) = if mask_is_empty(&mask) {
            debug!("mask is empty, returning input unchanged");
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(InpaintError::cancelled("cancelled before inference"));
                }
            }
            (color, select_strategy(&self.config, width, height), Vec::new())
        } else {
            let _span =
                span!(Level::INFO, "inference", backend = self.backend.name(), masked_pixels)
                    .entered();
            let start = Instant::now();

            let planned = select_strategy(&self.config, width, height);
            if planned == HdStrategy::Crop {
                tracker.report_stage(ProcessingStage::RegionExtraction);
            }
            tracker.report_stage_with_description(
                ProcessingStage::Inference,
                format!("Running {planned} inpainting on {width}x{height}"),
            );

            let mut ctx = PipelineContext::new(&self.config, &self.backend, cancel);
            let output = StrategyDispatcher::dispatch(&mut ctx, &color, &mask)?;
            let stats = ctx.stats();
            tracker.report_stage(ProcessingStage::Compositing);

            timings.inference_ms = stats.inference_ms;
            timings.inference_calls = stats.calls;
            timings.compositing_ms =
                (start.elapsed().as_millis() as u64).saturating_sub(stats.inference_ms);
            (output.image, output.strategy, output.windows)
        };

        tracker.report_stage(ProcessingStage::AlphaReattachment);
        let output = envelope.reattach(inpainted);
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        let mut metadata = ProcessingMetadata::new(self.backend.name().to_string());
        metadata.timings = timings;
        metadata.input_layout = layout.name().to_string();
        metadata.masked_pixels = masked_pixels;

        Ok(InpaintResult::new(output, strategy, regions, metadata))
    }
}

impl std::fmt::Debug for InpaintProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpaintProcessor")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockMode};
    use image::{Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProgressReporter {
        stages: Arc<Mutex<Vec<ProcessingStage>>>,
        errors: Arc<Mutex<Vec<ProcessingStage>>>,
    }

    impl ProgressReporter for MockProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: ProcessingTimings) {}

        fn report_error(&self, stage: ProcessingStage, _error: &str) {
            self.errors.lock().unwrap().push(stage);
        }
    }

    fn processor(mode: MockMode) -> InpaintProcessor {
        InpaintProcessor::new(InpaintConfig::default(), SharedBackend::new(MockBackend::new(mode)))
            .unwrap()
    }

    fn square_mask(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> DynamicImage {
        let (l, t, r, b) = rect;
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            if (l..r).contains(&x) && (t..b).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }

    #[test]
    fn test_direct_fill_only_touches_mask() {
        let processor = processor(MockMode::SolidColor([9, 9, 9]));
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([100, 110, 120])));
        let mask = square_mask(20, 10, (2, 2, 5, 5));

        let result = processor.process(&image, &mask).unwrap();
        assert_eq!(result.strategy, HdStrategy::Direct);
        assert_eq!(result.metadata.masked_pixels, 9);
        assert_eq!(result.metadata.timings.inference_calls, 1);

        let output = result.image.to_rgb8();
        assert_eq!(output.get_pixel(3, 3), &Rgb([9, 9, 9]));
        assert_eq!(output.get_pixel(10, 5), &Rgb([100, 110, 120]));
    }

    #[test]
    fn test_rgba_alpha_passes_through() {
        let processor = processor(MockMode::Invert);
        let rgba = RgbaImage::from_fn(8, 8, |x, y| Rgba([10, 20, 30, (x * 30 + y) as u8]));
        let image = DynamicImage::ImageRgba8(rgba.clone());
        let result = processor.process(&image, &square_mask(8, 8, (0, 0, 8, 8))).unwrap();

        let output = result.image.as_rgba8().unwrap();
        for (x, y, pixel) in output.enumerate_pixels() {
            assert_eq!(pixel[3], rgba.get_pixel(x, y)[3]);
            assert_eq!(pixel[0], 245);
        }
    }

    #[test]
    fn test_gray_layout_preserved() {
        let processor = processor(MockMode::SolidColor([200, 200, 200]));
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(6, 6, Luma([40])));
        let result = processor.process(&image, &square_mask(6, 6, (0, 0, 3, 3))).unwrap();

        let output = result.image.as_luma8().unwrap();
        assert_eq!(output.get_pixel(1, 1), &Luma([200]));
        assert_eq!(output.get_pixel(5, 5), &Luma([40]));
        assert_eq!(result.metadata.input_layout, "gray");
    }

    #[test]
    fn test_mask_resized_when_aspect_matches() {
        let processor = processor(MockMode::SolidColor([0, 0, 0]));
        let image = DynamicImage::new_rgb8(40, 20);
        let mask = square_mask(20, 10, (0, 0, 20, 10));
        let result = processor.process(&image, &mask).unwrap();
        assert_eq!(result.metadata.masked_pixels, 800);
    }

    #[test]
    fn test_invalid_inputs_rejected_before_inference() {
        let mock = MockBackend::identity();
        let history = mock.call_history();
        let processor =
            InpaintProcessor::new(InpaintConfig::default(), SharedBackend::new(mock)).unwrap();

        let image = DynamicImage::new_rgb8(40, 20);
        let result = processor.process(&image, &square_mask(20, 20, (0, 0, 1, 1)));
        assert!(matches!(result, Err(InpaintError::InvalidMask(_))));

        let result = processor.process(&image, &DynamicImage::new_luma8(0, 0));
        assert!(matches!(result, Err(InpaintError::InvalidMask(_))));

        let result =
            processor.process(&DynamicImage::new_rgb8(0, 5), &square_mask(1, 1, (0, 0, 1, 1)));
        assert!(matches!(result, Err(InpaintError::InvalidImage(_))));

        let result =
            processor.process(&DynamicImage::new_rgb16(4, 4), &square_mask(4, 4, (0, 0, 1, 1)));
        assert!(matches!(result, Err(InpaintError::InvalidImage(_))));

        assert!(history.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_mask_skips_backend() {
        let mock = MockBackend::failing();
        let processor =
            InpaintProcessor::new(InpaintConfig::default(), SharedBackend::new(mock)).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([1, 2, 3])));

        let result = processor.process(&image, &DynamicImage::new_luma8(10, 10)).unwrap();
        assert_eq!(result.image, image);
        assert_eq!(result.metadata.timings.inference_calls, 0);
    }

    #[test]
    fn test_backend_failure_is_inference_error() {
        let processor = processor(MockMode::Failing);
        let result =
            processor.process(&DynamicImage::new_rgb8(8, 8), &square_mask(8, 8, (1, 1, 2, 2)));
        assert!(matches!(result, Err(InpaintError::Inference(_))));
    }

    #[test]
    fn test_progress_stages_reported() {
        let reporter = MockProgressReporter::default();
        let stages = Arc::clone(&reporter.stages);
        let errors = Arc::clone(&reporter.errors);
        let processor = processor(MockMode::Identity).with_progress_reporter(Arc::new(reporter));

        processor
            .process(&DynamicImage::new_rgb8(8, 8), &square_mask(8, 8, (1, 1, 2, 2)))
            .unwrap();
        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&ProcessingStage::MaskPreparation));
        assert!(stages.contains(&ProcessingStage::Inference));
        assert_eq!(stages.last(), Some(&ProcessingStage::Completed));
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_token_stops_processing() {
        let processor = processor(MockMode::Identity);
        let token = CancellationToken::new();
        token.cancel();
        let result = processor.process_with_cancellation(
            &DynamicImage::new_rgb8(8, 8),
            &square_mask(8, 8, (1, 1, 2, 2)),
            &token,
        );
        assert!(matches!(result, Err(InpaintError::Cancelled(_))));
    }

    #[test]
    fn test_default_factory_builds_mock() {
        let factory = DefaultBackendFactory;
        assert!(factory.available_backends().contains(&BackendType::Mock));
        let backend =
            create_shared_backend(&factory, BackendType::Mock, &BackendConfig::default()).unwrap();
        assert_eq!(backend.name(), "mock");
        assert!(backend.is_initialized());
    }

    #[cfg(not(any(feature = "onnx", feature = "tract")))]
    #[test]
    fn test_factory_without_inference_features_rejects_model_backends() {
        let factory = DefaultBackendFactory;
        assert_eq!(factory.available_backends(), vec![BackendType::Mock]);
        for backend_type in [BackendType::Onnx, BackendType::Tract] {
            let result = factory.create_backend(backend_type, &BackendConfig::default());
            match result {
                Err(InpaintError::InvalidConfig(message)) => {
                    assert!(message.contains(&format!("'{backend_type}' feature")), "{message}");
                },
                other => panic!(
                    "expected InvalidConfig, got {:?}",
                    other.map(|b| b.name().to_string())
                ),
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = InpaintConfig::default();
        config.pad_modulo = 0;
        let result = InpaintProcessor::new(config, SharedBackend::new(MockBackend::identity()));
        assert!(matches!(result, Err(InpaintError::InvalidConfig(_))));
    }
}
