//! Alpha detachment and reattachment around the opaque pipeline

use crate::error::{InpaintError, Result};
use image::{imageops, DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

/// Pixel layouts accepted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray,
    Rgb,
    Rgba,
}

impl PixelLayout {
    /// Layout of a decoded image
    ///
    /// # Errors
    /// - Anything other than 8-bit gray, RGB or RGBA
    pub fn of(image: &DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(_) => Ok(Self::Gray),
            DynamicImage::ImageRgb8(_) => Ok(Self::Rgb),
            DynamicImage::ImageRgba8(_) => Ok(Self::Rgba),
            other => Err(InpaintError::invalid_image(format!(
                "unsupported pixel layout {:?}; expected 8-bit gray, RGB or RGBA",
                other.color()
            ))),
        }
    }

    #[must_use]
    pub fn channel_count(self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Gray => "gray",
            Self::Rgb => "rgb",
            Self::Rgba => "rgba",
        }
    }
}

/// What was taken off an image before inpainting, needed to restore its layout
#[derive(Debug, Clone)]
pub struct AlphaEnvelope {
    layout: PixelLayout,
    alpha: Option<GrayImage>,
}

impl AlphaEnvelope {
    #[must_use]
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    #[must_use]
    pub fn alpha(&self) -> Option<&GrayImage> {
        self.alpha.as_ref()
    }

    /// Restore the original layout around an opaque result
    ///
    /// Alpha values are copied verbatim. If the result size differs from the
    /// detached alpha, the alpha plane is resized with nearest-neighbour first.
    #[must_use]
    pub fn reattach(self, color: RgbImage) -> DynamicImage {
        match (self.layout, self.alpha) {
            (PixelLayout::Gray, _) => DynamicImage::ImageLuma8(rgb_to_gray(&color)),
            (PixelLayout::Rgb, _) => DynamicImage::ImageRgb8(color),
            (PixelLayout::Rgba, Some(alpha)) => {
                let alpha = if alpha.dimensions() == color.dimensions() {
                    alpha
                } else {
                    imageops::resize(
                        &alpha,
                        color.width(),
                        color.height(),
                        imageops::FilterType::Nearest,
                    )
                };
                DynamicImage::ImageRgba8(merge_alpha(&color, &alpha))
            },
            (PixelLayout::Rgba, None) => DynamicImage::ImageRgb8(color).into_rgba8().into(),
        }
    }
}

/// Splits images into an opaque color buffer and an [`AlphaEnvelope`]
pub struct AlphaCompositor;

impl AlphaCompositor {
    /// Detach alpha (if any) and widen gray to RGB
    ///
    /// # Errors
    /// - Unsupported pixel layout
    pub fn detach(image: &DynamicImage) -> Result<(RgbImage, AlphaEnvelope)> {
        let layout = PixelLayout::of(image)?;
        let (color, alpha) = match image {
            DynamicImage::ImageLuma8(gray) => (gray_to_rgb(gray), None),
            DynamicImage::ImageRgba8(rgba) => {
                let (color, alpha) = split_alpha(rgba);
                (color, Some(alpha))
            },
            _ => (image.to_rgb8(), None),
        };
        Ok((color, AlphaEnvelope { layout, alpha }))
    }
}

/// Split an RGBA buffer into color and alpha planes
#[must_use]
pub fn split_alpha(rgba: &RgbaImage) -> (RgbImage, GrayImage) {
    let (width, height) = rgba.dimensions();
    let mut color = RgbImage::new(width, height);
    let mut alpha = GrayImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        color.put_pixel(x, y, Rgb([r, g, b]));
        alpha.put_pixel(x, y, Luma([a]));
    }
    (color, alpha)
}

/// Combine color and an equally sized alpha plane
#[must_use]
pub fn merge_alpha(color: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(color.width(), color.height(), |x, y| {
        let Rgb([r, g, b]) = *color.get_pixel(x, y);
        Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
    })
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0];
        Rgb([value, value, value])
    })
}

/// Rec. 709 luma in integer arithmetic, exact when `r == g == b`
#[must_use]
pub fn rgb_to_gray(color: &RgbImage) -> GrayImage {
    GrayImage::from_fn(color.width(), color.height(), |x, y| {
        let Rgb([r, g, b]) = *color.get_pixel(x, y);
        let luma = (u32::from(r) * 2126 + u32::from(g) * 7152 + u32::from(b) * 722 + 5000) / 10_000;
        Luma([luma as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_rgba(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, 77, ((x * 31 + y * 17) % 256) as u8])
        })
    }

    #[test]
    fn test_split_merge_preserves_pixels() {
        let rgba = checker_rgba(9, 5);
        let (color, alpha) = split_alpha(&rgba);
        assert_eq!(merge_alpha(&color, &alpha), rgba);
    }

    #[test]
    fn test_alpha_survives_color_changes() {
        let rgba = checker_rgba(16, 12);
        let (color, envelope) =
            AlphaCompositor::detach(&DynamicImage::ImageRgba8(rgba.clone())).unwrap();
        assert_eq!(envelope.layout(), PixelLayout::Rgba);

        let repainted = RgbImage::from_pixel(color.width(), color.height(), Rgb([255, 0, 0]));
        let restored = envelope.reattach(repainted).into_rgba8();
        for (restored, original) in restored.pixels().zip(rgba.pixels()) {
            assert_eq!(restored[3], original[3]);
            assert_eq!(&restored.0[..3], &[255, 0, 0]);
        }
    }

    #[test]
    fn test_alpha_resized_with_nearest_when_sizes_differ() {
        let alpha = GrayImage::from_raw(2, 1, vec![10, 200]).unwrap();
        let envelope = AlphaEnvelope {
            layout: PixelLayout::Rgba,
            alpha: Some(alpha),
        };
        let restored = envelope.reattach(RgbImage::new(4, 2)).into_rgba8();
        assert_eq!(restored.dimensions(), (4, 2));
        assert!(restored.pixels().all(|p| p[3] == 10 || p[3] == 200));
        assert_eq!(restored.get_pixel(0, 1)[3], 10);
        assert_eq!(restored.get_pixel(3, 0)[3], 200);
    }

    #[test]
    fn test_rgb_passes_through() {
        let rgb = RgbImage::from_pixel(3, 3, Rgb([1, 2, 3]));
        let (color, envelope) =
            AlphaCompositor::detach(&DynamicImage::ImageRgb8(rgb.clone())).unwrap();
        assert!(envelope.alpha().is_none());
        assert_eq!(envelope.reattach(color), DynamicImage::ImageRgb8(rgb));
    }

    #[test]
    fn test_gray_round_trip_is_exact() {
        let gray = GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]));
        let (color, envelope) =
            AlphaCompositor::detach(&DynamicImage::ImageLuma8(gray.clone())).unwrap();
        assert_eq!(envelope.layout().channel_count(), 1);
        assert_eq!(envelope.reattach(color), DynamicImage::ImageLuma8(gray));
    }

    #[test]
    fn test_unsupported_layouts_rejected() {
        let luma_alpha = DynamicImage::new_luma_a8(4, 4);
        assert!(matches!(
            AlphaCompositor::detach(&luma_alpha),
            Err(InpaintError::InvalidImage(_))
        ));

        let deep = DynamicImage::new_rgb16(4, 4);
        assert!(matches!(PixelLayout::of(&deep), Err(InpaintError::InvalidImage(_))));
    }
}
