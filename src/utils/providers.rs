//! Parsing of `backend:provider` strings and provider discovery

use crate::{
    config::ExecutionProvider,
    error::{InpaintError, Result},
    processor::BackendType,
};

/// One selectable backend/provider combination
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

impl ProviderInfo {
    fn new(
        backend_type: BackendType,
        execution_provider: ExecutionProvider,
        available: bool,
        description: &str,
    ) -> Self {
        Self {
            name: ExecutionProviderManager::provider_to_string(backend_type, execution_provider),
            backend_type,
            execution_provider,
            available,
            description: description.to_string(),
        }
    }
}

pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse a provider string such as `onnx:cuda`, `tract:cpu` or `mock`
    ///
    /// A bare backend name selects that backend's default provider.
    ///
    /// # Examples
    /// ```rust
    /// use imgly_inpaint::utils::ExecutionProviderManager;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:auto")?;
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider name
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let (backend, provider) = match provider_str.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (provider_str, None),
        };

        let backend_type = match backend {
            "onnx" => BackendType::Onnx,
            "tract" => BackendType::Tract,
            "mock" => BackendType::Mock,
            _ => {
                return Err(InpaintError::invalid_config(format!(
                    "Unknown backend: {backend}. Supported backends: onnx, tract, mock"
                )))
            },
        };

        let Some(provider) = provider else {
            return Ok((backend_type, Self::default_provider_for_backend(backend_type)));
        };

        let execution_provider = match (backend_type, provider) {
            (BackendType::Onnx, "auto") => ExecutionProvider::Auto,
            (BackendType::Onnx, "cuda") => ExecutionProvider::Cuda,
            (BackendType::Onnx, "coreml") => ExecutionProvider::CoreMl,
            (_, "cpu") => ExecutionProvider::Cpu,
            (BackendType::Onnx, _) => {
                return Err(InpaintError::invalid_config(format!(
                    "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                )))
            },
            (other, _) => {
                return Err(InpaintError::invalid_config(format!(
                    "Unknown {other} provider: {provider}. Only 'cpu' is supported"
                )))
            },
        };
        Ok((backend_type, execution_provider))
    }

    /// Every combination the CLI accepts, with availability in this build
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;
            let available: std::collections::HashMap<String, bool> = OnnxBackend::list_providers()
                .into_iter()
                .map(|(name, available, _)| (name.to_lowercase(), available))
                .collect();
            let is = |name: &str| available.get(name).copied().unwrap_or(false);

            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Auto,
                available.values().any(|&a| a),
                "ONNX Runtime with auto-selected provider",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Cpu,
                is("cpu"),
                "ONNX Runtime CPU execution",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::Cuda,
                is("cuda"),
                "ONNX Runtime CUDA GPU acceleration",
            ));
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                ExecutionProvider::CoreMl,
                is("coreml"),
                "ONNX Runtime CoreML (Apple Silicon) acceleration",
            ));
        }

        #[cfg(not(feature = "onnx"))]
        for provider in [
            ExecutionProvider::Auto,
            ExecutionProvider::Cpu,
            ExecutionProvider::Cuda,
            ExecutionProvider::CoreMl,
        ] {
            providers.push(ProviderInfo::new(
                BackendType::Onnx,
                provider,
                false,
                "ONNX Runtime (feature disabled)",
            ));
        }

        providers.push(ProviderInfo::new(
            BackendType::Tract,
            ExecutionProvider::Cpu,
            cfg!(feature = "tract"),
            if cfg!(feature = "tract") {
                "Pure Rust CPU inference via Tract"
            } else {
                "Pure Rust CPU inference via Tract (feature disabled)"
            },
        ));

        providers.push(ProviderInfo::new(
            BackendType::Mock,
            ExecutionProvider::Cpu,
            true,
            "Deterministic stand-in that fills masked pixels with a solid color",
        ));

        providers
    }

    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    #[must_use]
    pub fn default_provider_for_backend(backend_type: BackendType) -> ExecutionProvider {
        match backend_type {
            BackendType::Onnx => ExecutionProvider::Auto,
            BackendType::Tract | BackendType::Mock => ExecutionProvider::Cpu,
        }
    }

    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}
