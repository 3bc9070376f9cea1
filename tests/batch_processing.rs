//! Batch processing over real files on disk

mod common;

use common::{gradient_rgb, rect_mask, write_png, RecordingReporter};
use image::{DynamicImage, Rgb};
use imgly_inpaint::{
    services::{BatchProgressUpdate, ProcessingStage, ProgressReporter, ProgressUpdate},
    BatchJob, BatchOptions, BatchProcessor, CancellationToken, ErrorPolicy, ImageIOService,
    InpaintConfig, InpaintError, InpaintProcessor, MockBackend, ProcessingTimings, SharedBackend,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const FILL: [u8; 3] = [12, 200, 40];

fn batch_processor() -> BatchProcessor {
    let backend = SharedBackend::new(MockBackend::solid_color(FILL));
    BatchProcessor::new(InpaintProcessor::new(InpaintConfig::default(), backend).unwrap())
}

fn shared_mask() -> DynamicImage {
    DynamicImage::ImageLuma8(rect_mask(32, 24, &[(4, 4, 12, 12)]))
}

/// `a.png`, a corrupt `b.png` and `c.png`, in that order
fn inputs_with_corrupt_middle(dir: &Path) -> Vec<PathBuf> {
    let a = dir.join("a.png");
    let b = dir.join("b.png");
    let c = dir.join("c.png");
    write_png(&a, &DynamicImage::ImageRgb8(gradient_rgb(32, 24)));
    std::fs::write(&b, b"\x89PNG\r\n\x1a\ntruncated").unwrap();
    write_png(&c, &DynamicImage::ImageRgb8(gradient_rgb(32, 24)));
    vec![a, b, c]
}

fn valid_inputs(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("img_{i}.png"));
            write_png(&path, &DynamicImage::ImageRgb8(gradient_rgb(32, 24)));
            path
        })
        .collect()
}

#[test]
fn fail_stop_halts_at_first_failure() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let inputs = inputs_with_corrupt_middle(input_dir.path());
    let reporter = RecordingReporter::new();

    let outcome = batch_processor().run(
        &BatchJob::new(inputs.clone(), shared_mask()),
        &BatchOptions::default().with_output_dir(output_dir.path()),
        reporter.as_ref(),
        &CancellationToken::new(),
    );

    assert!(outcome.halted);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.processed.len(), 1);
    assert_eq!(outcome.processed[0].input, inputs[0]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].path, inputs[1]);
    assert_eq!(reporter.batch_update_count(), outcome.attempted());
    assert_eq!(reporter.errors.lock().unwrap().len(), 1);

    assert!(output_dir.path().join("a.png").exists());
    assert!(!output_dir.path().join("c.png").exists());

    let err = outcome.into_result().unwrap_err();
    match err {
        InpaintError::Batch { path, .. } => assert_eq!(path, inputs[1]),
        other => panic!("expected a batch error, got {other:?}"),
    }
}

#[test]
fn skip_on_error_continues_past_failures() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let inputs = inputs_with_corrupt_middle(input_dir.path());
    let reporter = RecordingReporter::new();

    let outcome = batch_processor().run(
        &BatchJob::new(inputs.clone(), shared_mask()),
        &BatchOptions::default()
            .with_error_policy(ErrorPolicy::SkipOnError)
            .with_output_dir(output_dir.path()),
        reporter.as_ref(),
        &CancellationToken::new(),
    );

    assert!(!outcome.halted);
    assert!(!outcome.is_complete_success());
    assert_eq!(outcome.attempted(), 3);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(reporter.batch_update_count(), 3);

    let last = reporter.batch_updates.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.stats.items_completed, 3);
    assert_eq!(last.stats.items_total, 3);
    assert_eq!(last.stats.items_failed, 1);

    let processed = outcome.into_result().unwrap();
    let outputs: Vec<_> = processed.iter().map(|f| f.output.clone()).collect();
    assert_eq!(
        outputs,
        vec![output_dir.path().join("a.png"), output_dir.path().join("c.png")]
    );

    let written = ImageIOService::load_image(&outputs[1]).unwrap().to_rgb8();
    assert_eq!(written.get_pixel(5, 5), &Rgb(FILL));
    assert_eq!(written.get_pixel(20, 20), gradient_rgb(32, 24).get_pixel(20, 20));
}

#[test]
fn results_default_to_siblings_of_inputs() {
    let input_dir = TempDir::new().unwrap();
    let inputs = valid_inputs(input_dir.path(), 2);

    let outcome = batch_processor().run(
        &BatchJob::new(inputs, shared_mask()),
        &BatchOptions::default(),
        &imgly_inpaint::NoOpProgressReporter,
        &CancellationToken::new(),
    );

    assert!(outcome.is_complete_success());
    assert!(input_dir.path().join("img_0_inpainted.png").exists());
    assert!(input_dir.path().join("img_1_inpainted.png").exists());
}

#[test]
fn pre_cancelled_batch_does_nothing() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let inputs = valid_inputs(input_dir.path(), 3);
    let token = CancellationToken::new();
    token.cancel();

    let reporter = RecordingReporter::new();
    let outcome = batch_processor().run(
        &BatchJob::new(inputs, shared_mask()),
        &BatchOptions::default().with_output_dir(output_dir.path()),
        reporter.as_ref(),
        &token,
    );

    assert!(outcome.cancelled);
    assert_eq!(outcome.attempted(), 0);
    assert_eq!(reporter.batch_update_count(), 0);
    assert_eq!(std::fs::read_dir(output_dir.path()).unwrap().count(), 0);
    assert!(matches!(outcome.into_result(), Err(InpaintError::Cancelled(_))));
}

/// Cancels the batch as soon as the first item is reported
struct CancelAfterFirst {
    token: CancellationToken,
}

impl ProgressReporter for CancelAfterFirst {
    fn report_progress(&self, _update: ProgressUpdate) {}
    fn report_completion(&self, _timings: ProcessingTimings) {}
    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
    fn report_batch_progress(&self, _update: BatchProgressUpdate) {
        self.token.cancel();
    }
}

#[test]
fn cancellation_stops_between_items() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let inputs = valid_inputs(input_dir.path(), 4);
    let token = CancellationToken::new();
    let reporter = CancelAfterFirst { token: token.clone() };

    let outcome = batch_processor().run(
        &BatchJob::new(inputs, shared_mask()),
        &BatchOptions::default().with_output_dir(output_dir.path()),
        &reporter,
        &token,
    );

    assert!(outcome.cancelled);
    assert_eq!(outcome.processed.len(), 1);
    assert!(outcome.failed.is_empty());
    assert!(output_dir.path().join("img_0.png").exists());
    assert!(!output_dir.path().join("img_1.png").exists());
}

#[tokio::test]
async fn spawned_batch_runs_off_the_runtime() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let inputs = valid_inputs(input_dir.path(), 3);
    let reporter = RecordingReporter::new();

    let handle = batch_processor().spawn(
        BatchJob::new(inputs, shared_mask()),
        BatchOptions::default().with_output_dir(output_dir.path()),
        reporter.clone(),
        CancellationToken::new(),
    );
    let outcome = handle.wait().await.unwrap();

    assert!(outcome.is_complete_success());
    assert_eq!(outcome.processed.len(), 3);
    assert_eq!(reporter.batch_update_count(), 3);
}

#[tokio::test]
async fn handle_cancel_before_start_cancels_batch() {
    let input_dir = TempDir::new().unwrap();
    let inputs = valid_inputs(input_dir.path(), 2);
    let token = CancellationToken::new();
    token.cancel();

    let handle = batch_processor().spawn(
        BatchJob::new(inputs, shared_mask()),
        BatchOptions::default(),
        Arc::new(imgly_inpaint::NoOpProgressReporter),
        token,
    );
    assert!(handle.cancellation_token().is_cancelled());

    let outcome = handle.wait().await.unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.processed.is_empty());
}

#[test]
fn mask_file_job_loads_grayscale_mask() {
    let dir = TempDir::new().unwrap();
    let mask_path = dir.path().join("mask.png");
    write_png(&mask_path, &shared_mask());

    let job = BatchJob::with_mask_file(vec![], &mask_path).unwrap();
    assert!(job.mask.as_luma8().is_some());
    assert_eq!((job.mask.width(), job.mask.height()), (32, 24));

    let missing = BatchJob::with_mask_file(vec![], dir.path().join("missing.png"));
    assert!(missing.is_err());
}
