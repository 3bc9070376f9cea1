//! Conversion of CLI arguments into library configuration

use crate::cli::main_impl::{Cli, CliInterpolation, CliOutputFormat, CliOutputRange, CliStrategy};
use crate::{
    batch::{BatchOptions, ErrorPolicy},
    config::{
        BackendConfig, HdStrategy, InpaintConfig, InpaintConfigBuilder, Interpolation, OutputFormat,
    },
    error::InpaintError,
    models::{ModelSpec, OutputRange},
    processor::BackendType,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

/// Everything the CLI needs to build a processor and run a batch
#[derive(Debug)]
pub(crate) struct CliSettings {
    pub(crate) inpaint: InpaintConfig,
    pub(crate) backend_type: BackendType,
    pub(crate) backend: BackendConfig,
    pub(crate) batch: BatchOptions,
}

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Merge the optional JSON config file with command-line flags; flags win
    pub(crate) fn from_cli(cli: &Cli) -> Result<CliSettings> {
        let base = match &cli.config {
            Some(path) => InpaintConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => InpaintConfig::default(),
        };
        let inpaint = Self::apply_pipeline_flags(InpaintConfigBuilder::from_config(base), cli)
            .build()
            .context("Invalid pipeline configuration")?;

        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let model_spec = match &cli.model {
            Some(path) => {
                let spec = ModelSpec::external(path);
                match cli.output_range {
                    Some(range) => spec.with_output_range(range.into()),
                    None => spec,
                }
            },
            None if backend_type == BackendType::Mock => ModelSpec::default(),
            None => anyhow::bail!("--model is required for the {backend_type} backend"),
        };

        let backend = BackendConfig::builder()
            .execution_provider(execution_provider)
            .num_threads(cli.threads)
            .model_spec(model_spec)
            .build();

        let error_policy = if cli.skip_errors {
            ErrorPolicy::SkipOnError
        } else {
            ErrorPolicy::FailStop
        };
        let batch = BatchOptions::default()
            .with_error_policy(error_policy)
            .with_output_format(cli.format.into())
            .with_jpeg_quality(cli.jpeg_quality);

        Ok(CliSettings {
            inpaint,
            backend_type,
            backend,
            batch,
        })
    }

    fn apply_pipeline_flags(mut builder: InpaintConfigBuilder, cli: &Cli) -> InpaintConfigBuilder {
        if let Some(strategy) = cli.strategy {
            builder = builder.hd_strategy(strategy.into());
        }
        if let Some(margin) = cli.crop_margin {
            builder = builder.crop_margin(margin);
        }
        if let Some(trigger) = cli.crop_trigger_size {
            builder = builder.crop_trigger_size(trigger);
        }
        if let Some(limit) = cli.resize_limit {
            builder = builder.resize_limit(limit);
        }
        if let Some(modulo) = cli.pad_modulo {
            builder = builder.pad_modulo(modulo);
        }
        if cli.pad_to_square {
            builder = builder.pad_to_square(true);
        }
        if cli.min_size.is_some() {
            builder = builder.min_size(cli.min_size);
        }
        if let Some(interpolation) = cli.interpolation {
            builder = builder.resize_interpolation(interpolation.into());
        }
        builder
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;

        if !(1..=100).contains(&cli.jpeg_quality) {
            return Err(InpaintError::config_value_error(
                "JPEG quality",
                cli.jpeg_quality,
                "1-100",
                Some(90),
            ))
            .context("Invalid quality settings");
        }

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{pattern}'"))?;
        }

        if cli.mask.is_none() {
            anyhow::bail!("--mask is required when processing images");
        }

        Ok(())
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
            CliOutputFormat::Webp => Self::WebP,
            CliOutputFormat::Tiff => Self::Tiff,
        }
    }
}

impl From<CliStrategy> for HdStrategy {
    fn from(strategy: CliStrategy) -> Self {
        match strategy {
            CliStrategy::Direct => Self::Direct,
            CliStrategy::Crop => Self::Crop,
            CliStrategy::Resize => Self::Resize,
        }
    }
}

impl From<CliInterpolation> for Interpolation {
    fn from(interpolation: CliInterpolation) -> Self {
        match interpolation {
            CliInterpolation::Nearest => Self::Nearest,
            CliInterpolation::Linear => Self::Linear,
            CliInterpolation::Cubic => Self::Cubic,
            CliInterpolation::Lanczos => Self::Lanczos,
        }
    }
}

impl From<CliOutputRange> for OutputRange {
    fn from(range: CliOutputRange) -> Self {
        match range {
            CliOutputRange::Unit => Self::Unit,
            CliOutputRange::Byte => Self::Byte,
        }
    }
}
