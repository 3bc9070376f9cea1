//! Model specification and loading

use crate::error::{InpaintError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up when a model source points at a directory
const MODEL_FILE_NAME: &str = "model.onnx";
/// Optional metadata file next to the model
const MODEL_METADATA_NAME: &str = "model.json";

/// Value range of the model's color output tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputRange {
    /// Output in [0, 1], scaled by 255 before clipping
    #[default]
    Unit,
    /// Output already in [0, 255]
    Byte,
}

impl std::str::FromStr for OutputRange {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unit" | "0-1" => Ok(Self::Unit),
            "byte" | "0-255" => Ok(Self::Byte),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown output range '{other}'. Expected 'unit' or 'byte'"
            ))),
        }
    }
}

/// Where a model comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelSource {
    /// No model configured; only backends without weights (mock) can initialize
    #[default]
    Unset,
    /// `.onnx` file, or a directory containing `model.onnx` and optionally `model.json`
    External(PathBuf),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Unset => "unset".to_string(),
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
        }
    }
}

/// Model specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Overrides the output range declared by model metadata
    pub output_range: Option<OutputRange>,
}

impl ModelSpec {
    /// Spec for an external model path
    pub fn external<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::External(path.into()),
            output_range: None,
        }
    }

    #[must_use]
    pub fn with_output_range(mut self, range: OutputRange) -> Self {
        self.output_range = Some(range);
        self
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub output_range: OutputRange,
    pub path: Option<PathBuf>,
}

/// Optional `model.json` contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ModelMetadata {
    name: Option<String>,
    output_range: Option<OutputRange>,
}

/// Model provider trait for loading models
pub trait ModelProvider: std::fmt::Debug + Send + Sync {
    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    fn load_model_data(&self) -> Result<Vec<u8>>;

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata cannot be read
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    fn get_model_path(&self) -> Result<PathBuf>;
}

/// Provider for models stored on the local filesystem
#[derive(Debug)]
pub struct ExternalModelProvider {
    model_file: PathBuf,
    metadata: ModelMetadata,
    output_range_override: Option<OutputRange>,
}

impl ExternalModelProvider {
    /// Create provider for an `.onnx` file or a model directory
    ///
    /// # Errors
    /// - Path does not exist
    /// - Directory has no `model.onnx`
    /// - `model.json` exists but cannot be parsed
    pub fn new<P: AsRef<Path>>(model_path: P, output_range: Option<OutputRange>) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            return Err(InpaintError::model_error_with_context(
                "locate",
                model_path,
                "path does not exist",
                &["pass an .onnx file or a directory containing model.onnx"],
            ));
        }

        let (model_file, metadata) = if model_path.is_dir() {
            let model_file = model_path.join(MODEL_FILE_NAME);
            if !model_file.is_file() {
                return Err(InpaintError::model_error_with_context(
                    "locate",
                    model_path,
                    "directory does not contain model.onnx",
                    &[],
                ));
            }
            let metadata = Self::read_metadata(&model_path.join(MODEL_METADATA_NAME))?;
            (model_file, metadata)
        } else {
            (model_path.to_path_buf(), ModelMetadata::default())
        };

        Ok(Self {
            model_file,
            metadata,
            output_range_override: output_range,
        })
    }

    fn read_metadata(path: &Path) -> Result<ModelMetadata> {
        if !path.is_file() {
            return Ok(ModelMetadata::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| InpaintError::file_io_error("read model metadata", path, &e))?;
        serde_json::from_str(&contents).map_err(|e| {
            InpaintError::model_error_with_context("parse metadata for", path, &e.to_string(), &[])
        })
    }

    fn output_range(&self) -> OutputRange {
        self.output_range_override
            .or(self.metadata.output_range)
            .unwrap_or_default()
    }
}

impl ModelProvider for ExternalModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        let bytes = std::fs::read(&self.model_file)
            .map_err(|e| InpaintError::file_io_error("read model file", &self.model_file, &e))?;
        if bytes.is_empty() {
            return Err(InpaintError::model_error_with_context(
                "load",
                &self.model_file,
                "file is empty",
                &["check that the download or copy completed"],
            ));
        }
        Ok(bytes)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let size_bytes = std::fs::metadata(&self.model_file)
            .map_err(|e| InpaintError::file_io_error("stat model file", &self.model_file, &e))?
            .len() as usize;

        let name = self.metadata.name.clone().unwrap_or_else(|| {
            self.model_file
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        });

        Ok(ModelInfo {
            name,
            size_bytes,
            output_range: self.output_range(),
            path: Some(self.model_file.clone()),
        })
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_file.clone())
    }
}

/// Model manager resolving a [`ModelSpec`] to a provider
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
}

impl ModelManager {
    /// Create a model manager from a model specification
    ///
    /// # Errors
    /// - The spec has no model source
    /// - The external model cannot be located or its metadata parsed
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        match &spec.source {
            ModelSource::Unset => Err(InpaintError::model(
                "No model configured. Pass a model path (e.g. --model big-lama.onnx)",
            )),
            ModelSource::External(path) => Ok(Self {
                provider: Box::new(ExternalModelProvider::new(path, spec.output_range)?),
            }),
        }
    }

    /// Create a model manager for an external model path
    ///
    /// # Errors
    /// - The model cannot be located or its metadata parsed
    pub fn with_external_model<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            provider: Box::new(ExternalModelProvider::new(model_path, None)?),
        })
    }

    /// Load the model bytes
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata cannot be read
    pub fn get_info(&self) -> Result<ModelInfo> {
        self.provider.get_model_info()
    }

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    pub fn get_model_path(&self) -> Result<PathBuf> {
        self.provider.get_model_path()
    }
}
