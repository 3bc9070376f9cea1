//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imgly_inpaint::{
    services::{BatchProgressUpdate, ProcessingStage, ProgressReporter, ProgressUpdate},
    ImageIOService, OutputFormat, ProcessingTimings,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Deterministic non-uniform image so copied pixels are distinguishable
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
    })
}

/// Mask with the half-open rectangle `[left, right) x [top, bottom)` set
pub fn rect_mask(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let inside = rects
            .iter()
            .any(|&(l, t, r, b)| (l..r).contains(&x) && (t..b).contains(&y));
        Luma([if inside { 255 } else { 0 }])
    })
}

pub fn write_png(path: &Path, image: &DynamicImage) {
    let bytes = ImageIOService::encode(image, OutputFormat::Png, 90).unwrap();
    std::fs::write(path, bytes).unwrap();
}

/// Records every report for later assertions
#[derive(Default)]
pub struct RecordingReporter {
    pub stages: Mutex<Vec<ProcessingStage>>,
    pub errors: Mutex<Vec<String>>,
    pub batch_updates: Mutex<Vec<BatchProgressUpdate>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batch_update_count(&self) -> usize {
        self.batch_updates.lock().unwrap().len()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.stages.lock().unwrap().push(update.stage);
    }

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, error: &str) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        self.batch_updates.lock().unwrap().push(update);
    }
}
