//! Configuration types for inpainting operations

use crate::error::InpaintError;
use crate::models::ModelSpec;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// PNG, lossless with alpha
    #[default]
    Png,
    /// JPEG (no transparency, alpha is dropped)
    Jpeg,
    /// WebP, lossless with alpha
    WebP,
    /// TIFF with alpha
    Tiff,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
        }
    }
}

/// Policy for images larger than the model's comfortable working size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HdStrategy {
    /// Pad the whole image and run inference once
    Direct,
    /// Run inference on a margin-expanded crop around each masked region
    #[default]
    Crop,
    /// Downscale the whole image, run inference, upscale the result
    Resize,
}

impl std::fmt::Display for HdStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Crop => write!(f, "crop"),
            Self::Resize => write!(f, "resize"),
        }
    }
}

impl std::str::FromStr for HdStrategy {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "original" => Ok(Self::Direct),
            "crop" => Ok(Self::Crop),
            "resize" => Ok(Self::Resize),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown HD strategy '{other}'. Expected one of: direct, crop, resize"
            ))),
        }
    }
}

/// Interpolation used when scaling images in the Resize path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    #[default]
    Cubic,
    Lanczos,
}

impl Interpolation {
    /// Map to the `image` crate resampling filter
    #[must_use]
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Linear => FilterType::Triangle,
            Self::Cubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl std::str::FromStr for Interpolation {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            "lanczos" => Ok(Self::Lanczos),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown interpolation '{other}'. Expected one of: nearest, linear, cubic, lanczos"
            ))),
        }
    }
}

/// Upper bound for pad modulo; strides beyond this are not meaningful for any model
const MAX_PAD_MODULO: u32 = 512;

/// Pipeline configuration for inpainting
///
/// Built once (usually through [`InpaintConfig::builder`]) and read-only afterwards.
/// All fields have defaults, so a partial JSON document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InpaintConfig {
    /// HD strategy requested by the caller
    pub hd_strategy: HdStrategy,

    /// Pixels added on each side of a masked region before cropping
    pub crop_margin: u32,

    /// Longest image side above which the Crop strategy applies
    pub crop_trigger_size: u32,

    /// Longest image side above which the Resize strategy applies, and its target size
    pub resize_limit: u32,

    /// Stride the model requires for its input dimensions
    pub pad_modulo: u32,

    /// Pad both dimensions to the larger of the two
    pub pad_to_square: bool,

    /// Lower bound for padded dimensions, must be a multiple of `pad_modulo`
    pub min_size: Option<u32>,

    /// Filter used to downscale and upscale in the Resize path
    pub resize_interpolation: Interpolation,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            hd_strategy: HdStrategy::Crop,
            crop_margin: 196,
            crop_trigger_size: 800,
            resize_limit: 2048,
            pad_modulo: 8,
            pad_to_square: false,
            min_size: None,
            resize_interpolation: Interpolation::Cubic,
        }
    }
}

impl InpaintConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use imgly_inpaint::{HdStrategy, InpaintConfig};
    ///
    /// let config = InpaintConfig::builder()
    ///     .hd_strategy(HdStrategy::Resize)
    ///     .resize_limit(1024)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.resize_limit, 1024);
    /// ```
    #[must_use]
    pub fn builder() -> InpaintConfigBuilder {
        InpaintConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it
    ///
    /// Fields missing from the document take their default values.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Document is not valid JSON for this structure
    /// - Resulting configuration fails [`InpaintConfig::validate`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| InpaintError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&contents)
    }

    /// Parse a configuration from a JSON string and validate it
    ///
    /// # Errors
    /// - Invalid JSON or field types
    /// - Resulting configuration fails validation
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InpaintError::invalid_config(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - `pad_modulo`: 1-512
    /// - `min_size`: a positive multiple of `pad_modulo`
    /// - `resize_limit`: at least 1
    ///
    /// # Errors
    /// Returns `InpaintError::InvalidConfig` describing the first violated rule.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pad_modulo == 0 || self.pad_modulo > MAX_PAD_MODULO {
            return Err(InpaintError::config_value_error(
                "pad modulo",
                self.pad_modulo,
                "1-512",
                Some(8),
            ));
        }

        if let Some(min_size) = self.min_size {
            if min_size == 0 || min_size % self.pad_modulo != 0 {
                return Err(InpaintError::invalid_config(format!(
                    "Invalid min size: {min_size} must be a positive multiple of pad modulo {}",
                    self.pad_modulo
                )));
            }
        }

        if self.resize_limit == 0 {
            return Err(InpaintError::config_value_error(
                "resize limit",
                self.resize_limit,
                ">= 1",
                Some(2048),
            ));
        }

        Ok(())
    }
}

/// Builder for `InpaintConfig`
#[derive(Debug, Default)]
pub struct InpaintConfigBuilder {
    config: InpaintConfig,
}

impl InpaintConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from JSON)
    #[must_use]
    pub fn from_config(config: InpaintConfig) -> Self {
        Self { config }
    }

    /// Set HD strategy
    #[must_use]
    pub fn hd_strategy(mut self, strategy: HdStrategy) -> Self {
        self.config.hd_strategy = strategy;
        self
    }

    /// Set crop margin
    #[must_use]
    pub fn crop_margin(mut self, margin: u32) -> Self {
        self.config.crop_margin = margin;
        self
    }

    /// Set crop trigger size
    #[must_use]
    pub fn crop_trigger_size(mut self, size: u32) -> Self {
        self.config.crop_trigger_size = size;
        self
    }

    /// Set resize limit
    #[must_use]
    pub fn resize_limit(mut self, limit: u32) -> Self {
        self.config.resize_limit = limit;
        self
    }

    /// Set pad modulo
    #[must_use]
    pub fn pad_modulo(mut self, modulo: u32) -> Self {
        self.config.pad_modulo = modulo;
        self
    }

    /// Enable or disable square padding
    #[must_use]
    pub fn pad_to_square(mut self, square: bool) -> Self {
        self.config.pad_to_square = square;
        self
    }

    /// Set the minimum padded size
    #[must_use]
    pub fn min_size(mut self, min_size: Option<u32>) -> Self {
        self.config.min_size = min_size;
        self
    }

    /// Set the resize interpolation
    #[must_use]
    pub fn resize_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.config.resize_interpolation = interpolation;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - `pad_modulo` is zero or larger than 512
    /// - `min_size` is not a positive multiple of `pad_modulo`
    /// - `resize_limit` is zero
    pub fn build(self) -> crate::Result<InpaintConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for loading an inference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Model to load
    pub model_spec: ModelSpec,
}

impl BackendConfig {
    #[must_use]
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder::default()
    }
}

/// Builder for `BackendConfig`
#[derive(Debug, Default)]
pub struct BackendConfigBuilder {
    config: BackendConfig,
}

impl BackendConfigBuilder {
    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (inter = intra / 2, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Set the model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn build(self) -> BackendConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InpaintConfig::default();
        assert_eq!(config.hd_strategy, HdStrategy::Crop);
        assert_eq!(config.crop_margin, 196);
        assert_eq!(config.crop_trigger_size, 800);
        assert_eq!(config.resize_limit, 2048);
        assert_eq!(config.pad_modulo, 8);
        assert!(!config.pad_to_square);
        assert_eq!(config.min_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = InpaintConfig::builder()
            .hd_strategy(HdStrategy::Resize)
            .crop_margin(50)
            .resize_limit(1280)
            .pad_to_square(true)
            .min_size(Some(512))
            .build()
            .unwrap();

        assert_eq!(config.hd_strategy, HdStrategy::Resize);
        assert_eq!(config.crop_margin, 50);
        assert_eq!(config.resize_limit, 1280);
        assert!(config.pad_to_square);
        assert_eq!(config.min_size, Some(512));
    }

    #[test]
    fn test_min_size_must_be_multiple_of_modulo() {
        let result = InpaintConfig::builder().min_size(Some(510)).build();
        assert!(matches!(result, Err(InpaintError::InvalidConfig(_))));

        let result = InpaintConfig::builder()
            .pad_modulo(5)
            .min_size(Some(510))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_pad_modulo_rejected() {
        let mut config = InpaintConfig::default();
        config.pad_modulo = 0;
        assert!(matches!(
            config.validate(),
            Err(InpaintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_resize_limit_rejected() {
        let result = InpaintConfig::builder().resize_limit(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            InpaintConfig::from_json_str(r#"{"hd_strategy": "resize", "resize_limit": 1024}"#)
                .unwrap();
        assert_eq!(config.hd_strategy, HdStrategy::Resize);
        assert_eq!(config.resize_limit, 1024);
        assert_eq!(config.crop_margin, 196);
        assert_eq!(config.pad_modulo, 8);
    }

    #[test]
    fn test_invalid_json_config_rejected() {
        let result = InpaintConfig::from_json_str(r#"{"pad_modulo": 8, "min_size": 12}"#);
        assert!(matches!(result, Err(InpaintError::InvalidConfig(_))));

        let result = InpaintConfig::from_json_str("not json");
        assert!(matches!(result, Err(InpaintError::InvalidConfig(_))));
    }

    #[test]
    fn test_hd_strategy_parsing() {
        assert_eq!("crop".parse::<HdStrategy>().unwrap(), HdStrategy::Crop);
        assert_eq!("Resize".parse::<HdStrategy>().unwrap(), HdStrategy::Resize);
        assert_eq!("original".parse::<HdStrategy>().unwrap(), HdStrategy::Direct);
        assert!("tile".parse::<HdStrategy>().is_err());
        assert_eq!(HdStrategy::Direct.to_string(), "direct");
    }

    #[test]
    fn test_interpolation_filter_mapping() {
        assert_eq!(Interpolation::default(), Interpolation::Cubic);
        assert_eq!(Interpolation::Cubic.filter_type(), FilterType::CatmullRom);
        assert_eq!(Interpolation::Nearest.filter_type(), FilterType::Nearest);
        assert_eq!("bilinear".parse::<Interpolation>().unwrap(), Interpolation::Linear);
    }

    #[test]
    fn test_execution_provider_display() {
        assert_eq!(ExecutionProvider::default(), ExecutionProvider::Auto);
        assert_eq!(format!("{}", ExecutionProvider::Cpu), "cpu");
        assert_eq!(format!("{}", ExecutionProvider::CoreMl), "coreml");
    }

    #[test]
    fn test_backend_config_threads() {
        let config = BackendConfig::builder().num_threads(8).build();
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);

        let config = BackendConfig::builder().num_threads(1).build();
        assert_eq!(config.inter_threads, 1);

        let config = BackendConfig::builder().num_threads(0).build();
        assert_eq!(config.inter_threads, 0);
    }
}
