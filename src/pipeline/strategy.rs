//! Chooses and runs one of the three HD strategies

use super::resize::WholeImageResizeEngine;
use super::tiling::TilingEngine;
use super::PipelineContext;
use crate::config::{HdStrategy, InpaintConfig};
use crate::error::Result;
use crate::types::BoundingBox;
use image::{GrayImage, RgbImage};

/// Path taken for an image of the given size
///
/// Crop and Resize only kick in once the longest side exceeds their
/// threshold; everything else runs Direct.
#[must_use]
pub fn select_strategy(config: &InpaintConfig, width: u32, height: u32) -> HdStrategy {
    let longest = width.max(height);
    match config.hd_strategy {
        HdStrategy::Crop if longest > config.crop_trigger_size => HdStrategy::Crop,
        HdStrategy::Resize if longest > config.resize_limit => HdStrategy::Resize,
        _ => HdStrategy::Direct,
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOutput {
    pub image: RgbImage,
    pub strategy: HdStrategy,
    /// Crop windows, empty unless the Crop path ran
    pub windows: Vec<BoundingBox>,
}

pub struct StrategyDispatcher;

impl StrategyDispatcher {
    /// Run the selected strategy on an opaque image and its binary mask
    ///
    /// # Errors
    /// - Cancellation requested
    /// - Padding or inference failures
    pub fn dispatch(
        ctx: &mut PipelineContext<'_>,
        image: &RgbImage,
        mask: &GrayImage,
    ) -> Result<DispatchOutput> {
        let (width, height) = image.dimensions();
        let strategy = select_strategy(ctx.config(), width, height);
        tracing::debug!(%strategy, width, height, "dispatching");

        ctx.check_cancelled("inference")?;

        let (image, windows) = match strategy {
            HdStrategy::Crop => {
                let output = TilingEngine::run(ctx, image, mask)?;
                (output.image, output.windows)
            },
            HdStrategy::Resize => (WholeImageResizeEngine::run(ctx, image, mask)?, Vec::new()),
            HdStrategy::Direct => (ctx.pad_forward(image, mask)?, Vec::new()),
        };

        Ok(DispatchOutput {
            image,
            strategy,
            windows,
        })
    }
}
