//! Tract backend for inpainting models
//!
//! Pure Rust inference with no native dependencies. Tract optimizes a graph
//! for concrete input shapes, so the parsed model is kept once and an
//! optimized plan is built per padded size. Only the most recently used
//! plans are kept, since each one holds its own repacked weights.

use crate::config::BackendConfig;
use crate::error::{InpaintError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, OutputRange};
use crate::utils::TensorConverter;
use image::{GrayImage, RgbImage};
use lru::LruCache;
use std::num::NonZeroUsize;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Optimized plans kept at once
pub const MAX_CACHED_PLANS: usize = 4;

/// Least-recently-used cache of per-shape plans
#[derive(Debug)]
struct PlanCache<P> {
    plans: LruCache<(u32, u32), P>,
}

impl<P> PlanCache<P> {
    fn new(capacity: usize) -> Self {
        Self {
            plans: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    fn len(&self) -> usize {
        self.plans.len()
    }

    fn clear(&mut self) {
        self.plans.clear();
    }

    /// Cached plan for `shape`, building it first if needed and evicting the oldest
    fn get_or_try_build<F>(&mut self, shape: (u32, u32), build: F) -> Result<&P>
    where
        F: FnOnce() -> Result<P>,
    {
        if !self.plans.contains(&shape) {
            if let Some((evicted, _)) = self.plans.push(shape, build()?) {
                log::debug!("Evicted Tract plan for {}x{}", evicted.0, evicted.1);
            }
        }
        self.plans
            .get(&shape)
            .ok_or_else(|| InpaintError::internal("Tract plan missing after insertion"))
    }
}

impl<P> Default for PlanCache<P> {
    fn default() -> Self {
        Self::new(MAX_CACHED_PLANS)
    }
}

/// Tract backend
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<InferenceModel>,
    plans: PlanCache<TractModel>,
    model_manager: Option<ModelManager>,
    output_range: OutputRange,
    initialized: bool,
}

impl TractBackend {
    /// Tract runs on the CPU only
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
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

    /// Number of input sizes with a cached plan
    #[must_use]
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
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

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("Loading {} ({size_mb:.2} MB) with Tract", info.name);

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| InpaintError::model(format!("Failed to load ONNX model: {e}")))?;

        self.model = Some(model);
        self.plans.clear();
        self.output_range = info.output_range;
        self.initialized = true;
        Ok(start.elapsed())
    }

    fn plan_for(&mut self, width: u32, height: u32) -> Result<&TractModel> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| InpaintError::inference("Tract model not initialized"))?;

        self.plans.get_or_try_build((width, height), || {
            let start = Instant::now();
            let (h, w) = (height as usize, width as usize);
            let image_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, h, w));
            let mask_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, h, w));
            let plan = model
                .clone()
                .with_input_fact(0, image_fact)
                .and_then(|m| m.with_input_fact(1, mask_fact))
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| {
                    InpaintError::inference(format!(
                        "Failed to build Tract plan for {width}x{height}: {e}"
                    ))
                })?;
            log::debug!(
                "Built Tract plan for {width}x{height} in {:.0}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
            Ok(plan)
        })
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn initialize(&mut self, config: &BackendConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let output_range = self.output_range;
        let plan = self.plan_for(width, height)?;

        let start = Instant::now();
        let image_tensor = Tensor::from(TensorConverter::image_to_tensor(image));
        let mask_tensor = Tensor::from(TensorConverter::mask_to_tensor(mask));

        let outputs = plan
            .run(tvec![image_tensor.into(), mask_tensor.into()])
            .map_err(|e| InpaintError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| InpaintError::inference("No output tensor found"))?
            .into_arc_tensor();
        let view = output.to_array_view::<f32>().map_err(|e| {
            InpaintError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let result = TensorConverter::tensor_to_image(&view, output_range, width, height);
        log::debug!(
            "Tract inference on {width}x{height} took {:.2}ms",
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
        self.model = None;
        self.plans.clear();
        self.initialized = false;
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;
    use crate::models::ModelSpec;

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.cached_plans(), 0);
        assert!(backend.get_model_info().is_err());
    }

    #[test]
    fn test_plan_cache_is_bounded() {
        let mut cache = PlanCache::default();
        let mut builds = 0;
        for size in 1..=20u32 {
            let plan = cache
                .get_or_try_build((size * 8, size * 8), || {
                    builds += 1;
                    Ok(size)
                })
                .unwrap();
            assert_eq!(*plan, size);
            assert!(cache.len() <= MAX_CACHED_PLANS);
        }
        assert_eq!(builds, 20);
        assert_eq!(cache.len(), MAX_CACHED_PLANS);
    }

    #[test]
    fn test_plan_cache_reuses_and_evicts_least_recent() {
        let mut cache = PlanCache::new(2);
        cache.get_or_try_build((8, 8), || Ok("a")).unwrap();
        cache.get_or_try_build((16, 8), || Ok("b")).unwrap();
        // Touch (8, 8) so (16, 8) becomes the eviction candidate
        assert_eq!(*cache.get_or_try_build((8, 8), || Ok("rebuilt")).unwrap(), "a");
        cache.get_or_try_build((24, 8), || Ok("c")).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get_or_try_build((8, 8), || Ok("rebuilt")).unwrap(), "a");
        assert_eq!(*cache.get_or_try_build((16, 8), || Ok("rebuilt")).unwrap(), "rebuilt");
    }

    #[test]
    fn test_failed_plan_build_is_not_cached() {
        let mut cache: PlanCache<u32> = PlanCache::default();
        let result = cache.get_or_try_build((8, 8), || Err(InpaintError::inference("bad shape")));
        assert!(result.is_err());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = TractBackend::new();
        let result = backend.infer(&RgbImage::new(8, 8), &GrayImage::new(8, 8));
        assert!(matches!(result, Err(InpaintError::Inference(_))));
    }

    #[test]
    fn test_initialize_requires_model() {
        let mut backend = TractBackend::new();
        assert!(backend.initialize(&BackendConfig::default()).is_err());

        let config = BackendConfig::builder()
            .model_spec(ModelSpec::external("/nonexistent/lama.onnx"))
            .build();
        assert!(backend.initialize(&config).is_err());
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_invalid_model_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let mut backend = TractBackend::new();
        let config = BackendConfig::builder()
            .model_spec(ModelSpec::external(&path))
            .build();
        assert!(matches!(backend.initialize(&config), Err(InpaintError::Model(_))));
    }

    #[test]
    fn test_list_providers() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].1);
    }
}
