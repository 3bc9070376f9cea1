//! Error types for inpainting operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for inpainting operations
pub type Result<T> = std::result::Result<T, InpaintError>;

/// Error types for inpainting operations
#[derive(Error, Debug)]
pub enum InpaintError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Zero-sized image or unsupported pixel layout
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Zero-sized mask or a mask that cannot be matched to its image
    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    /// The inference adapter failed or returned an unusable result
    #[error("Inference error: {0}")]
    Inference(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Pipeline processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Processing was cancelled through a cancellation token
    #[error("Processing cancelled: {0}")]
    Cancelled(String),

    /// A batch halted on the given input
    #[error("Batch halted at '{}': {source}", path.display())]
    Batch {
        path: PathBuf,
        #[source]
        source: Box<InpaintError>,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InpaintError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new invalid mask error
    pub fn invalid_mask<S: Into<String>>(msg: S) -> Self {
        Self::InvalidMask(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create a model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {operation} model '{path_display}': {error}.{suggestion_text}"
        ))
    }

    /// Create an inference error naming the backend that raised it
    pub fn inference_error_with_backend(backend: &str, error: &str) -> Self {
        Self::Inference(format!("{backend} backend failed: {error}"))
    }

    /// Wrap an error raised while processing one batch input
    pub fn batch_item<P: Into<PathBuf>>(path: P, source: InpaintError) -> Self {
        Self::Batch {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error came from the inference adapter
    #[must_use]
    pub fn is_inference(&self) -> bool {
        match self {
            Self::Inference(_) => true,
            Self::Batch { source, .. } => source.is_inference(),
            _ => false,
        }
    }
}
