//! Resolution management and compositing around the inference backend
//!
//! All three HD strategies funnel into [`PipelineContext::pad_forward`]:
//! pad to the model stride, infer, crop back, and keep inferred pixels only
//! where the mask is set. Each stage returns a new buffer; nothing is written
//! into a caller's buffer, so a failing stage never leaves partial output.

pub mod alpha;
pub mod regions;
pub mod resize;
pub mod size_ops;
pub mod strategy;
pub mod tiling;

pub use alpha::{AlphaCompositor, AlphaEnvelope, PixelLayout};
pub use regions::{binarize_mask, MaskRegionExtractor};
pub use resize::WholeImageResizeEngine;
pub use strategy::{select_strategy, DispatchOutput, StrategyDispatcher};
pub use tiling::{crop_window, TilingEngine};

use crate::config::InpaintConfig;
use crate::error::{InpaintError, Result};
use crate::inference::SharedBackend;
use image::{GrayImage, RgbImage};
use instant::Instant;
use size_ops::{crop_to, pad_to_modulo};
use tokio_util::sync::CancellationToken;

/// Inference call statistics for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub calls: u32,
    pub inference_ms: u64,
}

/// Per-call state shared by the strategy engines
pub struct PipelineContext<'a> {
    config: &'a InpaintConfig,
    backend: &'a SharedBackend,
    cancel: Option<&'a CancellationToken>,
    stats: InferenceStats,
}

impl<'a> PipelineContext<'a> {
    #[must_use]
    pub fn new(
        config: &'a InpaintConfig,
        backend: &'a SharedBackend,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            config,
            backend,
            cancel,
            stats: InferenceStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        self.config
    }

    #[must_use]
    pub fn stats(&self) -> InferenceStats {
        self.stats
    }

    /// Fail with [`InpaintError::Cancelled`] if cancellation was requested
    ///
    /// # Errors
    /// - The token is cancelled
    pub fn check_cancelled(&self, before: &str) -> Result<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => {
                Err(InpaintError::cancelled(format!("cancelled before {before}")))
            },
            _ => Ok(()),
        }
    }

    /// Pad, infer, crop back, and keep inferred pixels only under the mask
    ///
    /// `mask` must already be binary and the same size as `image`.
    ///
    /// # Errors
    /// - Invalid padding configuration
    /// - Inference failures
    pub fn pad_forward(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let config = self.config;

        let padded_image = pad_to_modulo(
            image,
            config.pad_modulo,
            config.pad_to_square,
            config.min_size,
        )?;
        let padded_mask = pad_to_modulo(
            mask,
            config.pad_modulo,
            config.pad_to_square,
            config.min_size,
        )?;

        let start = Instant::now();
        let inferred = self.backend.infer(&padded_image, &padded_mask)?;
        self.stats.calls += 1;
        self.stats.inference_ms += start.elapsed().as_millis() as u64;

        tracing::trace!(
            width,
            height,
            padded_width = padded_image.width(),
            padded_height = padded_image.height(),
            "inference call complete"
        );

        let cropped = crop_to(&inferred, width, height);
        Ok(composite_masked(image, &cropped, mask))
    }
}

/// Inferred pixels where `mask` is set, `original` pixels elsewhere
///
/// All three buffers must have the same dimensions.
#[must_use]
pub fn composite_masked(original: &RgbImage, inferred: &RgbImage, mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        if regions::is_masked(mask.get_pixel(x, y)[0]) {
            *inferred.get_pixel(x, y)
        } else {
            *original.get_pixel(x, y)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use image::{Luma, Rgb};

    #[test]
    fn test_composite_masked() {
        let original = RgbImage::from_pixel(2, 1, Rgb([1, 1, 1]));
        let inferred = RgbImage::from_pixel(2, 1, Rgb([9, 9, 9]));
        let mask = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let out = composite_masked(&original, &inferred, &mask);
        assert_eq!(out.get_pixel(0, 0), &Rgb([1, 1, 1]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([9, 9, 9]));
    }

    #[test]
    fn test_pad_forward_pads_to_stride_and_crops_back() {
        let mock = MockBackend::solid_color([200, 0, 0]);
        let history = mock.call_history();
        let backend = SharedBackend::new(mock);
        let config = InpaintConfig::default();
        let mut ctx = PipelineContext::new(&config, &backend, None);

        let image = RgbImage::from_pixel(13, 7, Rgb([5, 5, 5]));
        let mut mask = GrayImage::new(13, 7);
        mask.put_pixel(3, 3, Luma([255]));

        let out = ctx.pad_forward(&image, &mask).unwrap();
        assert_eq!(out.dimensions(), (13, 7));
        assert_eq!(out.get_pixel(3, 3), &Rgb([200, 0, 0]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([5, 5, 5]));
        assert_eq!(ctx.stats().calls, 1);

        let calls = history.lock().unwrap();
        assert_eq!((calls[0].width, calls[0].height), (16, 8));
    }

    #[test]
    fn test_cancelled_token_reported() {
        let backend = SharedBackend::new(MockBackend::identity());
        let config = InpaintConfig::default();
        let token = CancellationToken::new();
        let ctx = PipelineContext::new(&config, &backend, Some(&token));
        assert!(ctx.check_cancelled("tile 1").is_ok());
        token.cancel();
        assert!(matches!(
            ctx.check_cancelled("tile 1"),
            Err(InpaintError::Cancelled(_))
        ));
    }
}
