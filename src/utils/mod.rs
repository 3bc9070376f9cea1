//! Shared helpers for backends and the CLI

pub mod providers;
pub mod tensor;

pub use providers::{ExecutionProviderManager, ProviderInfo};
pub use tensor::TensorConverter;
