//! Progress reporting
//!
//! Reporters are observers only: nothing they do can change a result.
//! Frontends implement [`ProgressReporter`] to render progress their own way.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Stages of one inpainting call, plus batch-level stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading the model into the backend
    Initialization,
    /// Decoding input bytes or files
    ImageLoading,
    /// Validating, resizing and binarizing the mask
    MaskPreparation,
    /// Splitting alpha from color
    AlphaExtraction,
    /// Finding masked regions and crop windows
    RegionExtraction,
    /// Running the model
    Inference,
    /// Pasting inferred pixels under the mask
    Compositing,
    /// Restoring alpha and the input layout
    AlphaReattachment,
    /// Encoding the output image
    Encoding,
    /// Writing the result to disk
    FileSaving,
    Completed,

    BatchInitialization,
    BatchItemProcessing,
    BatchFinalization,
}

impl ProcessingStage {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Initialization => "Initializing model and backend",
            Self::ImageLoading => "Loading input image",
            Self::MaskPreparation => "Preparing mask",
            Self::AlphaExtraction => "Separating alpha channel",
            Self::RegionExtraction => "Locating masked regions",
            Self::Inference => "Running inpainting inference",
            Self::Compositing => "Compositing result",
            Self::AlphaReattachment => "Restoring alpha channel",
            Self::Encoding => "Encoding output",
            Self::FileSaving => "Saving result",
            Self::Completed => "Processing completed",
            Self::BatchInitialization => "Initializing batch processing",
            Self::BatchItemProcessing => "Processing batch item",
            Self::BatchFinalization => "Finalizing batch processing",
        }
    }

    /// Nominal progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::Initialization => 5,
            Self::ImageLoading => 10,
            Self::MaskPreparation => 15,
            Self::AlphaExtraction => 20,
            Self::RegionExtraction => 25,
            Self::Inference => 70,
            Self::Compositing => 85,
            Self::AlphaReattachment => 92,
            Self::Encoding => 96,
            Self::FileSaving => 99,
            Self::Completed => 100,
            Self::BatchInitialization => 5,
            Self::BatchItemProcessing => 50,
            Self::BatchFinalization => 98,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
    /// Estimated time remaining (milliseconds, if available)
    pub eta_ms: Option<u64>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self::with_description(stage, stage.description().to_string(), start_time)
    }

    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            eta_ms: None,
            stage,
            description,
        }
    }

    #[must_use]
    pub fn with_eta(mut self, eta_ms: u64) -> Self {
        self.eta_ms = Some(eta_ms);
        self
    }
}

/// Running totals for a batch
#[derive(Debug, Clone, Default)]
pub struct BatchProcessingStats {
    /// Items finished so far, failed ones included
    pub items_completed: usize,
    pub items_total: usize,
    pub items_failed: usize,
    /// Path of the item that just finished
    pub current_item_name: String,
    /// Items per second
    pub processing_rate: f64,
    pub eta_seconds: Option<u64>,
}

impl BatchProcessingStats {
    /// Fraction of the batch done, in percent
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent_complete(&self) -> u8 {
        if self.items_total == 0 {
            return 100;
        }
        ((self.items_completed * 100) / self.items_total).min(100) as u8
    }
}

/// Batch progress with the stage of the overall run
#[derive(Debug, Clone)]
pub struct BatchProgressUpdate {
    pub total_progress: ProgressUpdate,
    pub stats: BatchProcessingStats,
}

/// Receives progress from single calls and batches
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    fn report_completion(&self, timings: ProcessingTimings);

    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Called once per finished batch item
    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        drop(update);
    }
}

/// Discards everything
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Logs progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            match update.eta_ms {
                Some(eta) => log::info!(
                    "[{}%] {} ({}ms elapsed, ~{}ms remaining)",
                    update.progress,
                    update.description,
                    update.elapsed_ms,
                    eta
                ),
                None => log::info!(
                    "[{}%] {} ({}ms elapsed)",
                    update.progress,
                    update.description,
                    update.elapsed_ms
                ),
            }
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("Inpainting completed in {}ms", timings.total_ms);
        if self.verbose {
            log::info!("  preparation: {}ms", timings.preparation_ms);
            log::info!(
                "  inference: {}ms over {} call(s)",
                timings.inference_ms,
                timings.inference_calls
            );
            log::info!("  compositing: {}ms", timings.compositing_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        let stats = &update.stats;
        log::info!(
            "[{}/{}] {} ({} failed)",
            stats.items_completed,
            stats.items_total,
            stats.current_item_name,
            stats.items_failed
        );
    }
}

/// Tracks elapsed time and the current stage for one call
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Arc::new(ConsoleProgressReporter::new(verbose)))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::with_description(stage, description, self.start_time));
    }

    pub fn report_completion(&self, timings: ProcessingTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the most recent stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Initialization);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
