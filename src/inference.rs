//! Inference backend abstraction and the shared, serialized backend handle

use crate::config::BackendConfig;
use crate::error::{InpaintError, Result};
use crate::models::ModelInfo;
use image::{GrayImage, RgbImage};
use std::sync::{Arc, Mutex, MutexGuard};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inpainting inference backends
///
/// A backend receives an opaque RGB image and a binary mask of equal,
/// modulo-aligned dimensions and returns an RGB image of the same size.
/// Backends are not required to be re-entrant; share them through
/// [`SharedBackend`].
pub trait InferenceBackend: Send {
    /// Short name used in logs and metadata
    fn name(&self) -> &'static str;

    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Execution provider setup failures
    fn initialize(&mut self, config: &BackendConfig) -> Result<Option<Duration>>;

    /// Run inference on an image and mask pair
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor has an unexpected shape
    fn infer(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model manager not initialized
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Release the model and any device resources
    fn unload(&mut self) {}
}

/// Process-wide handle to one backend instance
///
/// Cloning the handle shares the backend. Every call takes the inner mutex, so
/// concurrent requests are queued rather than issued in parallel.
#[derive(Clone)]
pub struct SharedBackend {
    inner: Arc<Mutex<Box<dyn InferenceBackend>>>,
    name: &'static str,
}

impl SharedBackend {
    pub fn new<B: InferenceBackend + 'static>(backend: B) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    #[must_use]
    pub fn from_boxed(backend: Box<dyn InferenceBackend>) -> Self {
        let name = backend.name();
        Self {
            inner: Arc::new(Mutex::new(backend)),
            name,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn InferenceBackend>>> {
        self.inner.lock().map_err(|_| {
            InpaintError::internal(format!(
                "{} backend lock poisoned by a panicking caller",
                self.name
            ))
        })
    }

    /// Load the model
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn initialize(&self, config: &BackendConfig) -> Result<Option<Duration>> {
        let mut backend = self.lock()?;
        let load_time = backend.initialize(config)?;
        if let Some(load_time) = load_time {
            log::info!(
                "{} backend initialized in {:.0}ms",
                self.name,
                load_time.as_secs_f64() * 1000.0
            );
        }
        Ok(load_time)
    }

    /// Release the model; a later [`SharedBackend::initialize`] loads it again
    ///
    /// # Errors
    /// - Lock poisoned
    pub fn unload(&self) -> Result<()> {
        let mut backend = self.lock()?;
        backend.unload();
        log::debug!("{} backend unloaded", self.name);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock().map(|backend| backend.is_initialized()).unwrap_or(false)
    }

    /// # Errors
    /// - Backend has no model information
    pub fn model_info(&self) -> Result<ModelInfo> {
        self.lock()?.get_model_info()
    }

    /// Run one serialized inference call
    ///
    /// Any backend failure, and any output whose size differs from the input,
    /// is reported as [`InpaintError::Inference`].
    ///
    /// # Errors
    /// - Image and mask sizes differ
    /// - Backend not initialized
    /// - Backend failure or shape mismatch
    pub fn infer(&self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        if image.dimensions() != mask.dimensions() {
            return Err(InpaintError::inference(format!(
                "image {:?} and mask {:?} sizes differ",
                image.dimensions(),
                mask.dimensions()
            )));
        }

        let mut backend = self.lock()?;
        if !backend.is_initialized() {
            return Err(InpaintError::inference_error_with_backend(
                self.name,
                "model not loaded",
            ));
        }

        let output = backend.infer(image, mask).map_err(|e| match e {
            InpaintError::Inference(_) => e,
            other => InpaintError::inference_error_with_backend(self.name, &other.to_string()),
        })?;
        drop(backend);

        if output.dimensions() != image.dimensions() {
            return Err(InpaintError::inference_error_with_backend(
                self.name,
                &format!(
                    "shape mismatch: returned {:?} for input {:?}",
                    output.dimensions(),
                    image.dimensions()
                ),
            ));
        }
        Ok(output)
    }
}

impl std::fmt::Debug for SharedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBackend")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
