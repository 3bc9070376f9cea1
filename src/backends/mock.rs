//! Deterministic mock backend
//!
//! Stands in for a real model in tests, benchmarks and dry runs. No model
//! file is needed; every mode produces a predictable output from its input.

use crate::{
    config::BackendConfig,
    error::{InpaintError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, OutputRange},
    pipeline::regions::count_masked,
};
use image::{GrayImage, Rgb, RgbImage};
use instant::Duration;
use std::sync::{Arc, Mutex};

/// How the mock answers an inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Every output pixel has this color
    SolidColor([u8; 3]),
    /// Output equals the input image
    Identity,
    /// Output is the color-inverted input image
    Invert,
    /// Every call fails
    Failing,
    /// Calls succeed until this many have been made, then fail
    FailAfter(usize),
    /// Output is one pixel wider than the input
    WrongSize,
    /// Every output pixel is `[n, n, n]` on the n-th call, saturating at 255
    CallNumber,
}

/// One recorded inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCall {
    pub width: u32,
    pub height: u32,
    pub masked_pixels: u64,
}

/// Mock backend with a shared call history
#[derive(Debug, Clone)]
pub struct MockBackend {
    mode: MockMode,
    initialized: bool,
    should_fail_init: bool,
    call_history: Arc<Mutex<Vec<MockCall>>>,
}

impl MockBackend {
    #[must_use]
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            initialized: true,
            should_fail_init: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn solid_color(color: [u8; 3]) -> Self {
        Self::new(MockMode::SolidColor(color))
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new(MockMode::Identity)
    }

    #[must_use]
    pub fn invert() -> Self {
        Self::new(MockMode::Invert)
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::new(MockMode::Failing)
    }

    #[must_use]
    pub fn fail_after(successful_calls: usize) -> Self {
        Self::new(MockMode::FailAfter(successful_calls))
    }

    #[must_use]
    pub fn call_number() -> Self {
        Self::new(MockMode::CallNumber)
    }

    #[must_use]
    pub fn wrong_size() -> Self {
        Self::new(MockMode::WrongSize)
    }

    /// Start in the given initialization state
    #[must_use]
    pub fn with_initialized(mut self, initialized: bool) -> Self {
        self.initialized = initialized;
        self
    }

    /// Make [`InferenceBackend::initialize`] fail
    #[must_use]
    pub fn with_failing_init(mut self) -> Self {
        self.should_fail_init = true;
        self.initialized = false;
        self
    }

    /// Shared call history; stays valid after the backend is moved into a [`crate::SharedBackend`]
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<MockCall>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, image: &RgbImage, mask: &GrayImage) -> usize {
        let call = MockCall {
            width: image.width(),
            height: image.height(),
            masked_pixels: count_masked(mask),
        };
        match self.call_history.lock() {
            Ok(mut history) => {
                history.push(call);
                history.len()
            },
            Err(_) => 0,
        }
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&mut self, _config: &BackendConfig) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(InpaintError::model("mock backend configured to fail initialization"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        if !self.initialized {
            return Err(InpaintError::inference("mock backend not initialized"));
        }

        let call_number = self.record_call(image, mask);
        let (width, height) = image.dimensions();

        match self.mode {
            MockMode::SolidColor(color) => Ok(RgbImage::from_pixel(width, height, Rgb(color))),
            MockMode::Identity => Ok(image.clone()),
            MockMode::Invert => {
                let mut output = image.clone();
                for pixel in output.pixels_mut() {
                    for channel in &mut pixel.0 {
                        *channel = 255 - *channel;
                    }
                }
                Ok(output)
            },
            MockMode::Failing => Err(InpaintError::inference("mock inference failure")),
            MockMode::FailAfter(limit) if call_number > limit => Err(InpaintError::inference(
                format!("mock inference failure on call {call_number}"),
            )),
            MockMode::FailAfter(_) => Ok(image.clone()),
            MockMode::WrongSize => Ok(RgbImage::new(width + 1, height)),
            MockMode::CallNumber => {
                let shade = u8::try_from(call_number).unwrap_or(u8::MAX);
                Ok(RgbImage::from_pixel(width, height, Rgb([shade; 3])))
            },
        }
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock".to_string(),
            size_bytes: 0,
            output_range: OutputRange::Unit,
            path: None,
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn unload(&mut self) {
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_modes() {
        let image = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let mask = GrayImage::new(4, 4);

        let output = MockBackend::solid_color([1, 2, 3]).infer(&image, &mask).unwrap();
        assert!(output.pixels().all(|p| *p == Rgb([1, 2, 3])));

        let output = MockBackend::identity().infer(&image, &mask).unwrap();
        assert_eq!(output, image);

        let output = MockBackend::invert().infer(&image, &mask).unwrap();
        assert!(output.pixels().all(|p| *p == Rgb([245, 235, 225])));

        assert!(MockBackend::failing().infer(&image, &mask).is_err());
    }

    #[test]
    fn test_fail_after() {
        let image = RgbImage::new(2, 2);
        let mask = GrayImage::new(2, 2);
        let mut backend = MockBackend::fail_after(2);
        assert!(backend.infer(&image, &mask).is_ok());
        assert!(backend.infer(&image, &mask).is_ok());
        assert!(backend.infer(&image, &mask).is_err());
    }

    #[test]
    fn test_call_number_shades_each_call() {
        let image = RgbImage::new(3, 2);
        let mask = GrayImage::new(3, 2);
        let mut backend = MockBackend::call_number();
        for expected in 1..=3u8 {
            let output = backend.infer(&image, &mask).unwrap();
            assert!(output.pixels().all(|p| *p == Rgb([expected; 3])));
        }
    }

    #[test]
    fn test_call_history_records_dimensions() {
        let mut backend = MockBackend::identity();
        let history = backend.call_history();
        let mut mask = GrayImage::new(8, 16);
        mask.put_pixel(1, 1, Luma([255]));
        backend.infer(&RgbImage::new(8, 16), &mask).unwrap();

        let calls = history.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[MockCall {
                width: 8,
                height: 16,
                masked_pixels: 1
            }]
        );
    }

    #[test]
    fn test_initialization_lifecycle() {
        let mut backend = MockBackend::identity().with_initialized(false);
        assert!(!backend.is_initialized());
        assert!(backend.initialize(&BackendConfig::default()).unwrap().is_some());
        assert!(backend.initialize(&BackendConfig::default()).unwrap().is_none());
        backend.unload();
        assert!(!backend.is_initialized());

        let mut failing = MockBackend::identity().with_failing_init();
        assert!(failing.initialize(&BackendConfig::default()).is_err());
    }
}
