//! Inference backend implementations
//!
//! - ONNX Runtime backend (native runtime, GPU acceleration)
//! - Tract backend (pure Rust, CPU only)
//! - Mock backend (deterministic, no model file)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::{MockBackend, MockCall, MockMode};

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
