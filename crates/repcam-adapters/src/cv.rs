//! Conversions between OpenCV BGR matrices and RGB images.

use anyhow::{Context, Result};
use image::RgbImage;
use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;

/// Copies a continuous 8-bit BGR matrix into an RGB image.
pub fn bgr_to_rgb(mat: &Mat) -> Result<RgbImage> {
    let width = u32::try_from(mat.cols()).context("Negative frame width")?;
    let height = u32::try_from(mat.rows()).context("Negative frame height")?;
    let mut data = mat.data_bytes()?.to_vec();
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
    RgbImage::from_vec(width, height, data).context("Video frame has unexpected layout")
}

/// Builds an 8-bit BGR matrix from an RGB image.
pub fn rgb_to_bgr(image: &RgbImage) -> Result<Mat> {
    let rows = i32::try_from(image.height()).context("Frame too tall")?;
    let cols = i32::try_from(image.width()).context("Frame too wide")?;
    let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0))?;
    for (dst, src) in mat.data_bytes_mut()?.chunks_exact_mut(3).zip(image.pixels()) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }
    Ok(mat)
}
