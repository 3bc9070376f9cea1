//! Terminal progress bar for batch runs

use crate::services::{BatchProgressUpdate, ProcessingStage, ProgressReporter, ProgressUpdate};
use crate::types::ProcessingTimings;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// [`ProgressReporter`] drawing an indicatif bar, one tick per finished image
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
    show_stages: bool,
}

impl IndicatifProgressReporter {
    /// `show_stages` also prints per-image pipeline stages in the bar message
    pub(crate) fn new(total: usize, show_stages: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => log::debug!("falling back to default progress style: {e}"),
        }
        Self { bar, show_stages }
    }

    pub(crate) fn finish(&self, processed: usize, failed: usize) {
        self.bar
            .finish_with_message(format!("Completed! Processed: {processed}, Failed: {failed}"));
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.show_stages {
            self.bar.set_message(update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        if self.show_stages {
            self.bar.set_message(format!(
                "done in {}ms ({} inference call(s))",
                timings.total_ms, timings.inference_calls
            ));
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar.println(format!("✗ {}: {error}", stage.description()));
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        let stats = update.stats;
        self.bar.set_position(stats.items_completed as u64);

        let mut message = stats.current_item_name;
        if stats.items_failed > 0 {
            message.push_str(&format!(" ({} failed)", stats.items_failed));
        }
        if let Some(eta) = stats.eta_seconds {
            message.push_str(&format!(" eta {eta}s"));
        }
        self.bar.set_message(message);
    }
}
