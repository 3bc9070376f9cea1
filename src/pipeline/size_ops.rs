//! Geometric helpers: modulo padding, crop-back and downscale-to-limit
//!
//! Everything here is generic over 8-bit pixel types so the same code pads
//! color images, masks and alpha planes.

use crate::config::Interpolation;
use crate::error::{InpaintError, Result};
use image::{imageops, ImageBuffer, Pixel};

/// 8-bit image buffer of any pixel layout
pub type Buffer<P> = ImageBuffer<P, Vec<u8>>;

/// Smallest multiple of `modulo` that is `>= x`
///
/// Returns `x` unchanged when it is already a multiple, or when `modulo` is zero.
#[must_use]
pub fn ceil_modulo(x: u32, modulo: u32) -> u32 {
    if modulo == 0 || x % modulo == 0 {
        x
    } else {
        (x / modulo + 1) * modulo
    }
}

/// Dimensions produced by [`pad_to_modulo`]
///
/// # Errors
/// - `modulo` is zero
/// - `min_size` is not a multiple of `modulo`
pub fn padded_dimensions(
    width: u32,
    height: u32,
    modulo: u32,
    square: bool,
    min_size: Option<u32>,
) -> Result<(u32, u32)> {
    if modulo == 0 {
        return Err(InpaintError::config_value_error("pad modulo", 0, "1-512", Some(8)));
    }

    let mut out_width = ceil_modulo(width, modulo);
    let mut out_height = ceil_modulo(height, modulo);

    if let Some(min_size) = min_size {
        if min_size % modulo != 0 {
            return Err(InpaintError::invalid_config(format!(
                "min size {min_size} is not a multiple of pad modulo {modulo}"
            )));
        }
        out_width = out_width.max(min_size);
        out_height = out_height.max(min_size);
    }

    if square {
        let side = out_width.max(out_height);
        out_width = side;
        out_height = side;
    }

    Ok((out_width, out_height))
}

/// Symmetric reflection of index `i` into `[0, len)`, edge pixel included.
///
/// `abc` extends as `abc|cba|abc|...`, so any pad size is defined even for `len == 1`.
fn reflect_index(i: u32, len: u32) -> u32 {
    let period = u64::from(len) * 2;
    let m = u64::from(i) % period;
    if m < u64::from(len) {
        m as u32
    } else {
        (period - 1 - m) as u32
    }
}

/// Pad an image at its bottom/right edges to a multiple of `modulo`
///
/// The original content stays at the origin, so [`crop_to`] with the original
/// dimensions restores it exactly.
///
/// # Errors
/// - Zero-sized input
/// - Invalid `modulo` / `min_size` combination
pub fn pad_to_modulo<P>(
    image: &Buffer<P>,
    modulo: u32,
    square: bool,
    min_size: Option<u32>,
) -> Result<Buffer<P>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InpaintError::invalid_image(format!(
            "cannot pad a {width}x{height} buffer"
        )));
    }

    let (out_width, out_height) = padded_dimensions(width, height, modulo, square, min_size)?;
    if (out_width, out_height) == (width, height) {
        return Ok(image.clone());
    }

    Ok(ImageBuffer::from_fn(out_width, out_height, |x, y| {
        *image.get_pixel(reflect_index(x, width), reflect_index(y, height))
    }))
}

/// Crop `[0, width) × [0, height)` from the origin
#[must_use]
pub fn crop_to<P>(image: &Buffer<P>, width: u32, height: u32) -> Buffer<P>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    imageops::crop_imm(image, 0, 0, width, height).to_image()
}

/// Target size for [`resize_to_limit`]
///
/// The longer side becomes `limit`; the shorter side is scaled by the same
/// ratio and rounded half-up, never below one pixel.
#[must_use]
pub fn scaled_dimensions(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= limit {
        return (width, height);
    }

    let ratio = f64::from(limit) / f64::from(longest);
    let scale = |side: u32| ((f64::from(side) * ratio + 0.5).floor() as u32).clamp(1, limit);
    (scale(width), scale(height))
}

/// Proportionally downscale so the longer side equals `limit`
///
/// Returns an unchanged copy when the image already fits.
#[must_use]
pub fn resize_to_limit<P>(image: &Buffer<P>, limit: u32, interpolation: Interpolation) -> Buffer<P>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = image.dimensions();
    let (new_width, new_height) = scaled_dimensions(width, height, limit);
    if (new_width, new_height) == (width, height) {
        return image.clone();
    }
    imageops::resize(image, new_width, new_height, interpolation.filter_type())
}
