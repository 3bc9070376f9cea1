//! Crop strategy: inpaint a margin-expanded window around each masked region

use super::regions::MaskRegionExtractor;
use super::PipelineContext;
use crate::error::Result;
use crate::types::BoundingBox;
use image::{imageops, GrayImage, RgbImage};

/// Crop window for one region
///
/// The window is centered on the region and `margin` larger on every side.
/// Extent lost to clamping at one image edge spills over to the opposite
/// edge, so regions near a border still get about `margin` pixels of context.
/// The window always covers the region itself.
#[must_use]
pub fn crop_window(
    region: &BoundingBox,
    image_width: u32,
    image_height: u32,
    margin: u32,
) -> BoundingBox {
    let (img_w, img_h) = (i64::from(image_width), i64::from(image_height));
    let margin = i64::from(margin);

    let cx = (i64::from(region.left) + i64::from(region.right)) / 2;
    let cy = (i64::from(region.top) + i64::from(region.bottom)) / 2;
    let w = i64::from(region.width()) + 2 * margin;
    let h = i64::from(region.height()) + 2 * margin;

    let (raw_l, raw_r) = (cx - w / 2, cx + w / 2);
    let (raw_t, raw_b) = (cy - h / 2, cy + h / 2);

    let mut l = raw_l.max(0);
    let mut r = raw_r.min(img_w);
    let mut t = raw_t.max(0);
    let mut b = raw_b.min(img_h);

    if raw_l < 0 {
        r += -raw_l;
    }
    if raw_r > img_w {
        l -= raw_r - img_w;
    }
    if raw_t < 0 {
        b += -raw_t;
    }
    if raw_b > img_h {
        t -= raw_b - img_h;
    }

    let l = l.max(0).min(i64::from(region.left));
    let r = r.min(img_w).max(i64::from(region.right));
    let t = t.max(0).min(i64::from(region.top));
    let b = b.min(img_h).max(i64::from(region.bottom));

    BoundingBox {
        left: l as u32,
        top: t as u32,
        right: r as u32,
        bottom: b as u32,
    }
}

/// Output of the Crop strategy
#[derive(Debug, Clone)]
pub struct TilingOutput {
    pub image: RgbImage,
    pub windows: Vec<BoundingBox>,
}

/// Crop → infer → stitch over every masked region
pub struct TilingEngine;

impl TilingEngine {
    /// Inpaint each region in its own crop and paste the results into a copy of `image`
    ///
    /// Crops are always taken from the untouched input. Each paste writes only
    /// its own window; where windows overlap the later one wins. Cancellation
    /// is checked before every region.
    ///
    /// # Errors
    /// - Cancellation requested between regions
    /// - Padding or inference failures
    pub fn run(
        ctx: &mut PipelineContext<'_>,
        image: &RgbImage,
        mask: &GrayImage,
    ) -> Result<TilingOutput> {
        let (width, height) = image.dimensions();
        let margin = ctx.config().crop_margin;
        let regions = MaskRegionExtractor::boxes_from_mask(mask);
        tracing::debug!(regions = regions.len(), margin, "crop strategy");

        let mut canvas = image.clone();
        let mut windows = Vec::with_capacity(regions.len());

        for (index, region) in regions.iter().enumerate() {
            ctx.check_cancelled(&format!("region {} of {}", index + 1, regions.len()))?;

            let window = crop_window(region, width, height, margin);
            tracing::debug!(%region, %window, "inpainting crop");

            let tile =
                imageops::crop_imm(image, window.left, window.top, window.width(), window.height())
                    .to_image();
            let tile_mask =
                imageops::crop_imm(mask, window.left, window.top, window.width(), window.height())
                    .to_image();

            let inpainted = ctx.pad_forward(&tile, &tile_mask)?;
            imageops::replace(
                &mut canvas,
                &inpainted,
                i64::from(window.left),
                i64::from(window.top),
            );
            windows.push(window);
        }

        Ok(TilingOutput {
            image: canvas,
            windows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::config::InpaintConfig;
    use crate::error::InpaintError;
    use crate::inference::SharedBackend;
    use image::{Luma, Rgb};
    use tokio_util::sync::CancellationToken;

    fn bbox(l: u32, t: u32, r: u32, b: u32) -> BoundingBox {
        BoundingBox::new(l, t, r, b).unwrap()
    }

    #[test]
    fn test_window_centered_with_margin() {
        let window = crop_window(&bbox(462, 334, 562, 434), 1024, 768, 50);
        assert_eq!(window, bbox(412, 284, 612, 484));
    }

    #[test]
    fn test_window_spills_over_at_top_left() {
        // Raw window [-40, 60) x [-40, 60) moves its lost extent to the far side
        let window = crop_window(&bbox(0, 0, 20, 20), 500, 400, 40);
        assert_eq!(window, bbox(0, 0, 100, 100));
    }

    #[test]
    fn test_window_spills_over_at_bottom_right() {
        let window = crop_window(&bbox(480, 380, 500, 400), 500, 400, 40);
        assert_eq!(window, bbox(400, 300, 500, 400));
    }

    #[test]
    fn test_window_clamped_when_image_too_small() {
        let window = crop_window(&bbox(10, 10, 20, 20), 30, 30, 196);
        assert_eq!(window, bbox(0, 0, 30, 30));
    }

    #[test]
    fn test_window_covers_odd_region_without_margin() {
        let region = bbox(0, 0, 3, 3);
        let window = crop_window(&region, 10, 10, 0);
        assert!(window.covers(&region));
    }

    #[test]
    fn test_tiles_only_touch_their_windows() {
        let backend = SharedBackend::new(MockBackend::solid_color([0, 255, 0]));
        let config = InpaintConfig::builder().crop_margin(4).build().unwrap();
        let mut ctx = PipelineContext::new(&config, &backend, None);

        let image = RgbImage::from_pixel(64, 64, Rgb([50, 50, 50]));
        let mut mask = GrayImage::new(64, 64);
        for y in 10..14 {
            for x in 10..14 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 50..52 {
            for x in 40..44 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let output = TilingEngine::run(&mut ctx, &image, &mask).unwrap();
        assert_eq!(output.windows.len(), 2);
        assert_eq!(ctx.stats().calls, 2);
        for (x, y, pixel) in output.image.enumerate_pixels() {
            let expected = if mask.get_pixel(x, y)[0] == 255 {
                Rgb([0, 255, 0])
            } else {
                Rgb([50, 50, 50])
            };
            assert_eq!(*pixel, expected, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn test_cancellation_between_tiles() {
        let backend = SharedBackend::new(MockBackend::identity());
        let config = InpaintConfig::default();
        let token = CancellationToken::new();
        token.cancel();
        let mut ctx = PipelineContext::new(&config, &backend, Some(&token));

        let image = RgbImage::new(32, 32);
        let mut mask = GrayImage::new(32, 32);
        mask.put_pixel(5, 5, Luma([255]));

        let result = TilingEngine::run(&mut ctx, &image, &mask);
        assert!(matches!(result, Err(InpaintError::Cancelled(_))));
        assert_eq!(ctx.stats().calls, 0);
    }
}
