//! Mask binarization and region extraction

use crate::types::BoundingBox;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours_with_threshold, BorderType};

/// Mask values at or above this are masked
pub const MASK_THRESHOLD: u8 = 128;

/// Value written for masked pixels in a binarized mask
pub const MASKED: u8 = 255;

#[inline]
#[must_use]
pub fn is_masked(value: u8) -> bool {
    value >= MASK_THRESHOLD
}

/// Threshold a mask at 128 into `{0, 255}`
#[must_use]
pub fn binarize_mask(mask: &GrayImage) -> GrayImage {
    binarize_with(mask, is_masked)
}

/// Treat any non-zero value as masked
///
/// Used after downscaling a binary mask, where thin strokes survive only as
/// low intermediate values.
#[must_use]
pub fn binarize_any_coverage(mask: &GrayImage) -> GrayImage {
    binarize_with(mask, |value| value > 0)
}

fn binarize_with(mask: &GrayImage, masked: impl Fn(u8) -> bool) -> GrayImage {
    let mut binary = mask.clone();
    for pixel in binary.pixels_mut() {
        *pixel = Luma([if masked(pixel[0]) { MASKED } else { 0 }]);
    }
    binary
}

#[must_use]
pub fn count_masked(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| is_masked(p[0])).count() as u64
}

#[must_use]
pub fn mask_is_empty(mask: &GrayImage) -> bool {
    !mask.pixels().any(|p| is_masked(p[0]))
}

/// Derives bounding boxes of masked regions
pub struct MaskRegionExtractor;

impl MaskRegionExtractor {
    /// One box per external contour of masked pixels
    ///
    /// Holes and anything nested inside a hole belong to the enclosing
    /// component and produce no box of their own. Boxes come out in the order
    /// their contours are first met by a raster scan, and are clamped to the
    /// mask bounds.
    #[must_use]
    pub fn boxes_from_mask(mask: &GrayImage) -> Vec<BoundingBox> {
        let (width, height) = mask.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        find_contours_with_threshold::<u32>(mask, MASK_THRESHOLD - 1)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let mut points = contour.points.iter();
                let first = points.next()?;
                let (mut min_x, mut min_y, mut max_x, mut max_y) =
                    (first.x, first.y, first.x, first.y);
                for point in points {
                    min_x = min_x.min(point.x);
                    min_y = min_y.min(point.y);
                    max_x = max_x.max(point.x);
                    max_y = max_y.max(point.y);
                }
                BoundingBox::new(min_x, min_y, max_x + 1, max_y + 1)?.clamp_to(width, height)
            })
            .collect()
    }
}
