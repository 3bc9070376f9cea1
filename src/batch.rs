//! Batch inpainting over many files with one shared mask
//!
//! The batch runs on a blocking worker thread. Each completed item is
//! reported through [`ProgressReporter::report_batch_progress`]. The
//! [`ErrorPolicy`] decides whether a failing item stops the run, and a
//! [`CancellationToken`] stops it between items or between crop regions.

use crate::{
    config::OutputFormat,
    error::{InpaintError, Result},
    processor::InpaintProcessor,
    services::{
        BatchProcessingStats, BatchProgressUpdate, ImageIOService, OutputFormatHandler,
        ProcessingStage, ProgressReporter, ProgressUpdate,
    },
    types::ProcessingTimings,
};
use image::DynamicImage;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, span, warn, Level};

/// What to do when one item of a batch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first failure, keeping the results already written
    #[default]
    FailStop,
    /// Record the failure and continue with the next item
    SkipOnError,
}

/// Where and how batch results are written
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub error_policy: ErrorPolicy,
    /// Directory for results; `None` writes `<stem>_inpainted.<ext>` next to each input
    pub output_dir: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::FailStop,
            output_dir: None,
            output_format: OutputFormat::Png,
            jpeg_quality: 90,
        }
    }
}

impl BatchOptions {
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Output path for one input file
    #[must_use]
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        let extension = OutputFormatHandler::get_extension(self.output_format);

        match &self.output_dir {
            Some(dir) => dir.join(format!("{stem}.{extension}")),
            None => input.with_file_name(format!("{stem}_inpainted.{extension}")),
        }
    }
}

/// Input files sharing one mask
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub mask: DynamicImage,
}

impl BatchJob {
    #[must_use]
    pub fn new(inputs: Vec<PathBuf>, mask: DynamicImage) -> Self {
        Self { inputs, mask }
    }

    /// Build a job whose mask is read from a file
    ///
    /// # Errors
    /// - Mask file cannot be read or decoded
    pub fn with_mask_file<P: AsRef<Path>>(inputs: Vec<PathBuf>, mask_path: P) -> Result<Self> {
        let mask = ImageIOService::load_mask(mask_path)?;
        Ok(Self::new(inputs, DynamicImage::ImageLuma8(mask)))
    }
}

/// A successfully written result
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub summary: String,
    pub timings: ProcessingTimings,
}

#[derive(Debug)]
pub struct BatchItemFailure {
    pub path: PathBuf,
    pub error: InpaintError,
}

/// Everything a batch run produced
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed: Vec<ProcessedFile>,
    pub failed: Vec<BatchItemFailure>,
    /// Stopped early under [`ErrorPolicy::FailStop`]
    pub halted: bool,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.halted && !self.cancelled
    }

    /// Number of items that were attempted, whether they succeeded or not
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    /// Convert to the processed files, or the error that ended the batch
    ///
    /// Failures skipped under [`ErrorPolicy::SkipOnError`] do not turn the
    /// outcome into an error.
    ///
    /// # Errors
    /// - [`InpaintError::Batch`] wrapping the item that halted a fail-stop batch
    /// - [`InpaintError::Cancelled`] for a cancelled batch
    pub fn into_result(mut self) -> Result<Vec<ProcessedFile>> {
        if self.halted {
            return match self.failed.pop() {
                Some(failure) => Err(InpaintError::batch_item(failure.path, failure.error)),
                None => Err(InpaintError::internal("batch halted without a recorded failure")),
            };
        }
        if self.cancelled {
            return Err(InpaintError::cancelled(format!(
                "batch cancelled after {} item(s)",
                self.attempted()
            )));
        }
        Ok(self.processed)
    }
}

/// A batch running on a blocking worker
pub struct BatchHandle {
    join: JoinHandle<BatchOutcome>,
    cancel: CancellationToken,
}

impl BatchHandle {
    /// Ask the worker to stop before its next item or crop region
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the worker to finish
    ///
    /// # Errors
    /// - The worker thread panicked or was aborted
    pub async fn wait(self) -> Result<BatchOutcome> {
        self.join
            .await
            .map_err(|e| InpaintError::internal(format!("Batch worker failed: {e}")))
    }
}

/// Runs an [`InpaintProcessor`] over a [`BatchJob`]
#[derive(Clone, Debug)]
pub struct BatchProcessor {
    processor: InpaintProcessor,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(processor: InpaintProcessor) -> Self {
        Self { processor }
    }

    #[must_use]
    pub fn processor(&self) -> &InpaintProcessor {
        &self.processor
    }

    /// Start the batch on tokio's blocking pool
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        &self,
        job: BatchJob,
        options: BatchOptions,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> BatchHandle {
        let worker = self.clone();
        let token = cancel.clone();
        let join = tokio::task::spawn_blocking(move || {
            worker.run(&job, &options, reporter.as_ref(), &token)
        });
        BatchHandle { join, cancel }
    }

    /// Process every input in order on the calling thread
    pub fn run(
        &self,
        job: &BatchJob,
        options: &BatchOptions,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let total = job.inputs.len();
        let start = Instant::now();
        let mut outcome = BatchOutcome::default();
        info!(total, policy = ?options.error_policy, "starting batch");
        reporter.report_progress(ProgressUpdate::new(ProcessingStage::BatchInitialization, start));

        for (index, input) in job.inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(completed = outcome.attempted(), total, "batch cancelled");
                outcome.cancelled = true;
                break;
            }

            let _span = span!(Level::INFO, "batch_item", index, path = %input.display()).entered();
            match self.process_item(input, &job.mask, options, reporter, cancel) {
                Ok(file) => {
                    info!(output = %file.output.display(), "{}", file.summary);
                    outcome.processed.push(file);
                },
                Err(InpaintError::Cancelled(reason)) => {
                    warn!(%reason, "batch cancelled mid-item");
                    outcome.cancelled = true;
                    break;
                },
                Err(err) => {
                    error!(error = %err, "failed to inpaint {}", input.display());
                    reporter.report_error(
                        ProcessingStage::BatchItemProcessing,
                        &format!("Failed to process {}: {err}", input.display()),
                    );
                    outcome.failed.push(BatchItemFailure {
                        path: input.clone(),
                        error: err,
                    });
                    if options.error_policy == ErrorPolicy::FailStop {
                        outcome.halted = true;
                    }
                },
            }

            reporter.report_batch_progress(Self::progress_update(&outcome, total, input, start));
            if outcome.halted {
                warn!(remaining = total - index - 1, "stopping batch after failure");
                break;
            }
        }

        reporter.report_progress(ProgressUpdate::new(ProcessingStage::BatchFinalization, start));
        let elapsed = start.elapsed();
        info!(
            processed = outcome.processed.len(),
            failed = outcome.failed.len(),
            halted = outcome.halted,
            cancelled = outcome.cancelled,
            "batch finished in {:.2}s",
            elapsed.as_secs_f64()
        );
        outcome
    }

    fn process_item(
        &self,
        input: &Path,
        mask: &DynamicImage,
        options: &BatchOptions,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ProcessedFile> {
        let item_start = Instant::now();
        let mut result = self.processor.process_file_with_cancellation(input, mask, cancel)?;
        let output = options.output_path_for(input);
        OutputFormatHandler::warn_if_alpha_dropped(&result.image, options.output_format);
        reporter.report_progress(ProgressUpdate::new(ProcessingStage::FileSaving, item_start));
        result.save(&output, options.output_format, options.jpeg_quality)?;

        Ok(ProcessedFile {
            input: input.to_path_buf(),
            output,
            summary: result.summary(),
            timings: result.metadata.timings.clone(),
        })
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn progress_update(
        outcome: &BatchOutcome,
        total: usize,
        current: &Path,
        start: Instant,
    ) -> BatchProgressUpdate {
        let completed = outcome.attempted();
        let elapsed = start.elapsed().as_secs_f64();
        let processing_rate = if elapsed > 0.0 { completed as f64 / elapsed } else { 0.0 };
        let eta_seconds = (processing_rate > 0.0)
            .then(|| (total.saturating_sub(completed) as f64 / processing_rate) as u64);

        BatchProgressUpdate {
            total_progress: ProgressUpdate::new(ProcessingStage::BatchItemProcessing, start),
            stats: BatchProcessingStats {
                items_completed: completed,
                items_total: total,
                items_failed: outcome.failed.len(),
                current_item_name: current.display().to_string(),
                processing_rate,
                eta_seconds,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_next_to_input() {
        let options = BatchOptions::default();
        assert_eq!(
            options.output_path_for(Path::new("/photos/cat.jpg")),
            PathBuf::from("/photos/cat_inpainted.png")
        );
    }

    #[test]
    fn test_output_path_in_directory() {
        let options = BatchOptions::default()
            .with_output_dir("/out")
            .with_output_format(OutputFormat::Jpeg);
        assert_eq!(
            options.output_path_for(Path::new("/photos/cat.png")),
            PathBuf::from("/out/cat.jpg")
        );
    }

    #[test]
    fn test_halted_outcome_becomes_batch_error() {
        let outcome = BatchOutcome {
            failed: vec![BatchItemFailure {
                path: PathBuf::from("bad.png"),
                error: InpaintError::inference("boom"),
            }],
            halted: true,
            ..BatchOutcome::default()
        };
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err,
            InpaintError::Batch { ref path, .. } if path == Path::new("bad.png")
        ));
        assert!(err.is_inference());
    }

    #[test]
    fn test_skipped_failures_still_ok() {
        let outcome = BatchOutcome {
            failed: vec![BatchItemFailure {
                path: PathBuf::from("bad.png"),
                error: InpaintError::invalid_mask("size"),
            }],
            ..BatchOutcome::default()
        };
        assert!(!outcome.is_complete_success());
        assert!(outcome.into_result().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_outcome_is_error() {
        let outcome = BatchOutcome {
            cancelled: true,
            ..BatchOutcome::default()
        };
        assert!(matches!(outcome.into_result(), Err(InpaintError::Cancelled(_))));
    }

    #[test]
    fn test_default_policy_is_fail_stop() {
        assert_eq!(BatchOptions::default().error_policy, ErrorPolicy::FailStop);
    }
}
