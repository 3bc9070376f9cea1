//! Conversion between image buffers and NCHW `f32` tensors

use crate::error::{InpaintError, Result};
use crate::models::OutputRange;
use image::{GrayImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD, Ix4};

/// Tensor layout helpers shared by the ONNX and Tract backends
pub struct TensorConverter;

impl TensorConverter {
    /// RGB image as a `[1, 3, H, W]` tensor with values in `[0, 1]`
    #[must_use]
    pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
        let (width, height) = image.dimensions();
        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0
        })
    }

    /// Mask as a `[1, 1, H, W]` tensor: 1.0 where the mask is non-zero, 0.0 elsewhere
    #[must_use]
    pub fn mask_to_tensor(mask: &GrayImage) -> Array4<f32> {
        let (width, height) = mask.dimensions();
        Array4::from_shape_fn((1, 1, height as usize, width as usize), |(_, _, y, x)| {
            if mask.get_pixel(x as u32, y as u32)[0] > 0 {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Decode a `[1, 3, H, W]` model output into an RGB image
    ///
    /// Values are scaled according to `range`, clipped to `[0, 255]` and truncated.
    ///
    /// # Errors
    /// - Output is not four-dimensional
    /// - Output shape is not `[1, 3, height, width]`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tensor_to_image(
        output: &ArrayViewD<'_, f32>,
        range: OutputRange,
        width: u32,
        height: u32,
    ) -> Result<RgbImage> {
        let output = output.view().into_dimensionality::<Ix4>().map_err(|_| {
            InpaintError::inference(format!(
                "expected 4D output tensor, got shape {:?}",
                output.shape()
            ))
        })?;

        let expected = [1, 3, height as usize, width as usize];
        if output.shape() != expected {
            return Err(InpaintError::inference(format!(
                "shape mismatch: output {:?}, expected {expected:?}",
                output.shape()
            )));
        }

        let scale = match range {
            OutputRange::Unit => 255.0,
            OutputRange::Byte => 1.0,
        };
        let to_byte = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

        Ok(RgbImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb([
                to_byte(output[[0, 0, y, x]]),
                to_byte(output[[0, 1, y, x]]),
                to_byte(output[[0, 2, y, x]]),
            ])
        }))
    }
}
