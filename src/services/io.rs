//! Image decoding and encoding for the byte and file entry points

use crate::{
    config::OutputFormat,
    error::{InpaintError, Result},
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";
const BMP_MAGIC: &[u8] = b"BM";
const TIFF_LE_MAGIC: &[u8] = &[b'I', b'I', 0x2A, 0x00];
const TIFF_BE_MAGIC: &[u8] = &[b'M', b'M', 0x00, 0x2A];

/// Sniff the container format from leading bytes
///
/// # Errors
/// - The signature is not PNG, JPEG, BMP, GIF, WebP or TIFF
pub fn detect_image_format(bytes: &[u8]) -> Result<ImageFormat> {
    let format = if bytes.starts_with(PNG_MAGIC) {
        ImageFormat::Png
    } else if bytes.starts_with(JPEG_MAGIC) {
        ImageFormat::Jpeg
    } else if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
        ImageFormat::Gif
    } else if bytes.starts_with(BMP_MAGIC) {
        ImageFormat::Bmp
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ImageFormat::WebP
    } else if bytes.starts_with(TIFF_LE_MAGIC) || bytes.starts_with(TIFF_BE_MAGIC) {
        ImageFormat::Tiff
    } else {
        let head: Vec<String> = bytes.iter().take(8).map(|b| format!("{b:02x}")).collect();
        return Err(InpaintError::unsupported_format(format!(
            "unrecognized image signature [{}]",
            head.join(" ")
        )));
    };
    Ok(format)
}

/// Convert decoded layouts the pipeline does not accept to their 8-bit equivalent
#[must_use]
pub fn normalize_depth(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            image
        },
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            DynamicImage::ImageRgb8(image.to_rgb8())
        },
        other => {
            log::debug!("normalizing {:?} to RGBA8", other.color());
            DynamicImage::ImageRgba8(other.to_rgba8())
        },
    }
}

/// Stateless codec helpers
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from bytes, sniffing the format from its signature
    ///
    /// # Errors
    /// - Unrecognized signature
    /// - Corrupt data for the detected format
    pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
        let format = detect_image_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(normalize_depth(image))
    }

    /// Decode a mask from bytes and force it to single-channel gray
    ///
    /// # Errors
    /// - Unrecognized signature
    /// - Corrupt data for the detected format
    pub fn decode_mask(bytes: &[u8]) -> Result<GrayImage> {
        let format = detect_image_format(bytes)?;
        Ok(image::load_from_memory_with_format(bytes, format)?.to_luma8())
    }

    /// Load an image file
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imgly_inpaint::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("photo.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| InpaintError::file_io_error("read image", path, &e))?;
        Self::decode_image(&bytes)
    }

    /// Load a mask file as single-channel gray
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not a supported image
    pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| InpaintError::file_io_error("read mask", path, &e))?;
        Self::decode_mask(&bytes)
    }

    /// Encode an image in the given format
    ///
    /// `quality` applies to JPEG only. JPEG output drops alpha.
    ///
    /// # Errors
    /// - Encoder failure
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        match format {
            OutputFormat::Jpeg => {
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100))
                    .encode_image(&rgb)
                    .map_err(|e| InpaintError::processing(format!("Failed to encode JPEG: {e}")))?;
            },
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => {
                let prepared = super::OutputFormatHandler::prepare_for_format(image, format);
                prepared
                    .write_to(&mut cursor, super::OutputFormatHandler::image_format(format))
                    .map_err(|e| {
                        InpaintError::processing(format!("Failed to encode {format}: {e}"))
                    })?;
            },
        }
        Ok(buffer)
    }

    /// Encode and write an image, creating parent directories as needed
    ///
    /// # Errors
    /// - Directory creation or write failure
    /// - Encoder failure
    pub fn save_image(
        image: &DynamicImage,
        path: &Path,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| InpaintError::file_io_error("create output directory", parent, &e))?;
        }
        let bytes = Self::encode(image, format, quality)?;
        std::fs::write(path, bytes)
            .map_err(|e| InpaintError::file_io_error("write image", path, &e))?;
        log::debug!("saved {} as {format}", path.display());
        Ok(())
    }

    /// Whether the extension names a format this crate can decode
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp" | "gif"
                )
            })
    }
}
