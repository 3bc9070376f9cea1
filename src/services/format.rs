//! Output format conversion

use crate::config::OutputFormat;
use image::{DynamicImage, ImageFormat};

/// Maps [`OutputFormat`] onto extensions, encoders and pixel layouts
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// File extension without the dot
    ///
    /// # Examples
    /// ```rust
    /// use imgly_inpaint::{services::OutputFormatHandler, config::OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    #[must_use]
    pub fn image_format(format: OutputFormat) -> ImageFormat {
        match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }

    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }

    /// Convert to a layout the target encoder accepts
    ///
    /// JPEG gets RGB. The WebP encoder only takes RGB or RGBA, so gray
    /// images are widened. Everything else passes through unchanged.
    #[must_use]
    pub fn prepare_for_format(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
        match (format, image) {
            (OutputFormat::Jpeg, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
            (OutputFormat::WebP, DynamicImage::ImageLuma8(_)) => {
                DynamicImage::ImageRgb8(image.to_rgb8())
            },
            _ => image.clone(),
        }
    }

    /// Output format for a file extension, if known
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<OutputFormat> {
        match extension.to_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::WebP),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            _ => None,
        }
    }

    /// Warn when alpha in the result will be lost on encode
    pub fn warn_if_alpha_dropped(image: &DynamicImage, format: OutputFormat) {
        if image.color().has_alpha() && !Self::supports_transparency(format) {
            log::warn!(
                "{format} output does not support transparency; alpha channel will be dropped"
            );
        }
    }
}
