//! ONNX Runtime backend for inpainting models
//!
//! Feeds the model two positional inputs, an image tensor `[1, 3, H, W]` in
//! `[0, 1]` and a binary mask tensor `[1, 1, H, W]`, and decodes the first
//! output as an RGB image. Inputs arrive already padded to the model stride,
//! so any spatial size the graph accepts works.

use crate::config::{BackendConfig, ExecutionProvider};
use crate::error::{InpaintError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, OutputRange};
use crate::utils::TensorConverter;
use image::{GrayImage, RgbImage};
use instant::{Duration, Instant};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(8)
}

/// ONNX Runtime backend
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    output_range: OutputRange,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers as `(name, available, description)`
    ///
    /// # Examples
    /// ```rust
    /// use imgly_inpaint::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "yes" } else { "no" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Probing ONNX Runtime providers on {}/{} with {} cores",
            std::env::consts::OS,
            std::env::consts::ARCH,
            available_cores()
        );

        let cuda = cuda_available();
        let coreml = coreml_available();
        log::debug!("CUDA available: {cuda}, CoreML available: {coreml}");

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model_manager: Some(model_manager),
            ..Self::default()
        }
    }

    pub fn set_model_manager(&mut self, model_manager: ModelManager) {
        self.model_manager = Some(model_manager);
    }

    fn configure_providers(
        builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let mut providers = Vec::new();
        match provider {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::warn!("No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }

        if providers.is_empty() {
            return Ok(builder);
        }
        builder.with_execution_providers(providers).map_err(|e| {
            InpaintError::model(format!("Failed to set {provider} execution providers: {e}"))
        })
    }

    fn load_model(&mut self, config: &BackendConfig) -> Result<Duration> {
        let start = Instant::now();

        if self.model_manager.is_none() {
            self.model_manager = Some(ModelManager::from_spec(&config.model_spec)?);
        }
        let manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| InpaintError::internal("Model manager missing after insertion"))?;

        let model_data = manager.load_model()?;
        let info = manager.get_info()?;

        let builder = Session::builder()
            .map_err(|e| InpaintError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InpaintError::model(format!("Failed to set optimization level: {e}")))?;
        let builder = Self::configure_providers(builder, config.execution_provider)?;

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available_cores()
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available_cores() / 4).max(1)
        };

        let session = builder
            .with_parallel_execution(true)
            .map_err(|e| InpaintError::model(format!("Failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| InpaintError::model(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| InpaintError::model(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                InpaintError::model_error_with_context(
                    "create session from",
                    info.path.as_deref().unwrap_or_else(|| std::path::Path::new(&info.name)),
                    &e.to_string(),
                    &["check that the file is an inpainting model taking (image, mask) inputs"],
                )
            })?;

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::debug!(
            "ONNX session ready: model {} ({size_mb:.2} MB), provider {}, output range {:?}",
            info.name,
            config.execution_provider,
            info.output_range
        );
        log::debug!("ONNX threads: {intra_threads} intra / {inter_threads} inter");

        self.output_range = info.output_range;
        self.session = Some(session);
        self.initialized = true;
        Ok(start.elapsed())
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn initialize(&mut self, config: &BackendConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InpaintError::inference("ONNX session not initialized"))?;
        let (width, height) = image.dimensions();

        let start = Instant::now();
        let image_value = Value::from_array(TensorConverter::image_to_tensor(image))
            .map_err(|e| InpaintError::inference(format!("Failed to convert image tensor: {e}")))?;
        let mask_value = Value::from_array(TensorConverter::mask_to_tensor(mask))
            .map_err(|e| InpaintError::inference(format!("Failed to convert mask tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![image_value, mask_value])
            .map_err(|e| InpaintError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| InpaintError::inference("No output tensors found"))?
            .to_string();
        let output = outputs
            .get(&first_key)
            .ok_or_else(|| InpaintError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| InpaintError::inference(format!("Failed to extract output tensor: {e}")))?;

        let result = TensorConverter::tensor_to_image(&output, self.output_range, width, height);
        log::debug!(
            "ONNX inference on {width}x{height} took {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        result
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| InpaintError::model("Model manager not initialized"))?
            .get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn unload(&mut self) {
        self.session = None;
        self.initialized = false;
    }
}
