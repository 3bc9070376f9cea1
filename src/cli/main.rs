//! Inpainting CLI tool
//!
//! Applies one mask to one or more images and writes the inpainted results.

use super::config::{CliConfigBuilder, CliSettings};
use super::progress::IndicatifProgressReporter;
use crate::{
    batch::{BatchJob, BatchProcessor},
    processor::{BackendType, InpaintProcessor},
    services::{ImageIOService, OutputFormatHandler, ProgressReporter},
    tracing_config::{spans, TracingConfig, TracingFormat},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::DynamicImage;
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif", "gif"];

/// Image inpainting CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-inpaint")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Vec<String>,

    /// Mask image; white pixels mark the region to fill
    #[arg(long, value_name = "MASK")]
    pub mask: Option<PathBuf>,

    /// Output file (single input) or directory (several inputs). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Strategy for large images
    #[arg(long, value_enum)]
    pub strategy: Option<CliStrategy>,

    /// Context margin around each masked region for the crop strategy
    #[arg(long)]
    pub crop_margin: Option<u32>,

    /// Longest side above which the crop strategy kicks in
    #[arg(long)]
    pub crop_trigger_size: Option<u32>,

    /// Longest side above which the resize strategy downscales
    #[arg(long)]
    pub resize_limit: Option<u32>,

    /// Stride the model input dimensions must be a multiple of
    #[arg(long)]
    pub pad_modulo: Option<u32>,

    /// Pad model inputs to a square
    #[arg(long)]
    pub pad_to_square: bool,

    /// Minimum model input side (multiple of the pad modulo)
    #[arg(long)]
    pub min_size: Option<u32>,

    /// Resampling filter for the resize strategy
    #[arg(long, value_enum)]
    pub interpolation: Option<CliInterpolation>,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Path to an ONNX inpainting model taking (image, mask)
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Value range of the model output
    #[arg(long, value_enum)]
    pub output_range: Option<CliOutputRange>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:cuda, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// JPEG quality (1-100)
    #[arg(short = 'q', long, default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Keep going when an image fails instead of stopping the batch
    #[arg(long)]
    pub skip_errors: bool,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Show pipeline stages for each image in the progress bar
    #[arg(long)]
    pub progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[cfg(feature = "tracing-json")]
    #[arg(long)]
    pub log_json: bool,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliStrategy {
    Direct,
    Crop,
    Resize,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliInterpolation {
    Nearest,
    Linear,
    Cubic,
    Lanczos,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputRange {
    /// Model emits values in [0, 1]
    Unit,
    /// Model emits values in [0, 255]
    Byte,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();
    let _tracing_guard = init_tracing(&cli, &session_id).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let settings = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let provider = ExecutionProviderManager::provider_to_string(
        settings.backend_type,
        settings.backend.execution_provider,
    );
    let session = spans::session(&session_id, &settings.backend_type.to_string(), &provider);

    run(cli, settings).instrument(session).await
}

async fn run(cli: Cli, settings: CliSettings) -> Result<()> {
    info!("Input(s): {}", cli.input.join(", "));
    info!("Pipeline: {:?}", settings.inpaint);

    let mask_path = cli.mask.as_deref().context("--mask is required")?;
    let mask = DynamicImage::ImageLuma8(
        ImageIOService::load_mask(mask_path)
            .with_context(|| format!("Failed to load mask {}", mask_path.display()))?,
    );

    let processor = create_processor(&settings)?;

    let start_time = Instant::now();
    let processed_count = process_inputs(&cli, &settings, &processor, mask).await?;
    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn init_tracing(cli: &Cli, session_id: &str) -> Result<crate::tracing_config::TracingGuard> {
    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_session_id(session_id);

    #[cfg(feature = "tracing-json")]
    if cli.log_json {
        config = config.with_format(TracingFormat::Json);
    }
    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::Both(path.clone()));
    }

    config.init()
}

fn create_processor(settings: &CliSettings) -> Result<InpaintProcessor> {
    let _loading = spans::model_loading(
        &settings.backend.model_spec.source.display_name(),
        &settings.backend.execution_provider.to_string(),
    )
    .entered();

    if settings.backend_type == BackendType::Mock {
        warn!("Using the mock backend; masked pixels are filled with a flat color");
    }
    let processor = InpaintProcessor::from_backend_type(
        settings.inpaint.clone(),
        settings.backend_type,
        &settings.backend,
    )
    .with_context(|| format!("Failed to create {} backend", settings.backend_type))?;

    if let Ok(info) = processor.backend().model_info() {
        info!("Model: {} ({:.1} MB)", info.name, info.size_bytes as f64 / (1024.0 * 1024.0));
    }
    Ok(processor)
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("==========================================");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nExecution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "available"
        } else {
            "not available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\nUsage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider tract:cpu    # Pure Rust Tract backend");
    println!("  --execution-provider mock         # No model; flat fill for pipeline checks");
}

async fn process_inputs(
    cli: &Cli,
    settings: &CliSettings,
    processor: &InpaintProcessor,
    mask: DynamicImage,
) -> Result<usize> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli.output.as_deref(), settings, processor, &mask);
    }

    let mut all_files = collect_inputs(&cli.input, cli.recursive, cli.pattern.as_deref())?;
    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }
    all_files.sort();
    info!("Found {} image file(s) to process", all_files.len());

    if let ([input], Some(output)) = (all_files.as_slice(), cli.output.as_deref()) {
        if !Path::new(output).is_dir() {
            return process_single_file(settings, processor, input, output, &mask);
        }
    }

    let mut options = settings.batch.clone();
    if let Some(output) = &cli.output {
        if output == "-" {
            anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
        }
        let output_dir = PathBuf::from(output);
        if output_dir.is_file() {
            anyhow::bail!(
                "Output path exists and is a file, not a directory: {}",
                output_dir.display()
            );
        }
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;
        options = options.with_output_dir(output_dir);
    }

    process_batch(processor, BatchJob::new(all_files, mask), options, cli.progress).await
}

async fn process_batch(
    processor: &InpaintProcessor,
    job: BatchJob,
    options: crate::batch::BatchOptions,
    show_stages: bool,
) -> Result<usize> {
    let file_count = job.inputs.len();
    let reporter = Arc::new(IndicatifProgressReporter::new(file_count, show_stages));
    let processor = if show_stages {
        processor.clone().with_progress_reporter(reporter.clone())
    } else {
        processor.clone()
    };

    let handle = BatchProcessor::new(processor).spawn(
        job,
        options,
        reporter.clone() as Arc<dyn ProgressReporter>,
        CancellationToken::new(),
    );

    let token = handle.cancellation_token().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current image");
            token.cancel();
        }
    });

    let outcome = handle
        .wait()
        .instrument(spans::batch_processing(file_count))
        .await?;
    interrupt.abort();
    reporter.finish(outcome.processed.len(), outcome.failed.len());

    for failure in &outcome.failed {
        error!("Failed to process {}: {}", failure.path.display(), failure.error);
    }
    if !outcome.failed.is_empty() && !outcome.halted {
        warn!(
            "Some files failed to process. Processed: {}, Failed: {}",
            outcome.processed.len(),
            outcome.failed.len()
        );
    }

    let processed = outcome.into_result().context("Batch processing stopped")?;
    Ok(processed.len())
}

fn process_single_file(
    settings: &CliSettings,
    processor: &InpaintProcessor,
    input: &Path,
    output: &str,
    mask: &DynamicImage,
) -> Result<usize> {
    let mut result = processor
        .process_file(input, mask)
        .with_context(|| format!("Failed to inpaint {}", input.display()))?;
    let options = &settings.batch;
    OutputFormatHandler::warn_if_alpha_dropped(&result.image, options.output_format);

    if output == "-" {
        let encode_start = Instant::now();
        let bytes = result.to_bytes(options.output_format, options.jpeg_quality)?;
        result.metadata.timings.image_encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        write_stdout(&bytes)?;
    } else {
        result
            .save(output, options.output_format, options.jpeg_quality)
            .with_context(|| format!("Failed to save {output}"))?;
    }
    log_timings(input, &result.metadata.timings);
    Ok(1)
}

fn process_stdin(
    output: Option<&str>,
    settings: &CliSettings,
    processor: &InpaintProcessor,
    mask: &DynamicImage,
) -> Result<usize> {
    info!("Reading image from stdin");
    let image_data = read_stdin()?;
    let image = ImageIOService::decode_image(&image_data).context(
        "Failed to decode stdin data. Supported formats: PNG, JPEG, WebP, TIFF, BMP, GIF",
    )?;

    let mut result = processor.process(&image, mask).context("Failed to inpaint stdin image")?;
    let options = &settings.batch;
    OutputFormatHandler::warn_if_alpha_dropped(&result.image, options.output_format);

    match output {
        Some(target) if target != "-" => {
            result
                .save(target, options.output_format, options.jpeg_quality)
                .with_context(|| format!("Failed to save {target}"))?;
            info!("Image saved to: {target}");
        },
        _ => {
            let bytes = result.to_bytes(options.output_format, options.jpeg_quality)?;
            write_stdout(&bytes)?;
            info!("Image written to stdout");
        },
    }
    Ok(1)
}

fn log_timings(input: &Path, timings: &crate::types::ProcessingTimings) {
    info!("Processing breakdown for {}:", input.display());
    info!("  ├─ Preparation: {}ms", timings.preparation_ms);
    info!(
        "  ├─ Inference: {}ms ({} call(s))",
        timings.inference_ms, timings.inference_calls
    );
    info!("  ├─ Compositing: {}ms", timings.compositing_ms);
    if let Some(encode_ms) = timings.image_encode_ms {
        info!("  ├─ Image Encode: {encode_ms}ms");
    }
    info!("  └─ Total: {}ms", timings.total_ms);
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(data).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Expand file and directory arguments into image files
fn collect_inputs(
    inputs: &[String],
    recursive: bool,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive, pattern)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let max_depth = if recursive { usize::MAX } else { 1 };

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if is_image_file(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    }
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}
