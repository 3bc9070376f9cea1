//! Resize strategy: inpaint a downscaled copy and restore untouched pixels

use super::regions::binarize_any_coverage;
use super::size_ops::resize_to_limit;
use super::{composite_masked, PipelineContext};
use crate::error::Result;
use image::{imageops, GrayImage, RgbImage};

pub struct WholeImageResizeEngine;

impl WholeImageResizeEngine {
    /// Downscale to the resize limit, inpaint, upscale to the original size
    ///
    /// Only masked pixels take the upscaled result; every other pixel is
    /// copied from `image`, so resampling never touches unmasked content.
    /// The mask boundary is a hard edge.
    ///
    /// # Errors
    /// - Padding or inference failures
    pub fn run(
        ctx: &mut PipelineContext<'_>,
        image: &RgbImage,
        mask: &GrayImage,
    ) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let limit = ctx.config().resize_limit;
        let interpolation = ctx.config().resize_interpolation;

        let small_image = resize_to_limit(image, limit, interpolation);
        let small_mask = binarize_any_coverage(&resize_to_limit(mask, limit, interpolation));
        tracing::debug!(
            width,
            height,
            scaled_width = small_image.width(),
            scaled_height = small_image.height(),
            "resize strategy"
        );

        let inpainted = ctx.pad_forward(&small_image, &small_mask)?;
        let upscaled = if inpainted.dimensions() == (width, height) {
            inpainted
        } else {
            imageops::resize(&inpainted, width, height, interpolation.filter_type())
        };

        Ok(composite_masked(image, &upscaled, mask))
    }
}
