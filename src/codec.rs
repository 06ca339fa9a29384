//! JPEG encoding and still-image writing for RGB8 frames.

use crate::errors::CameraError;
use crate::types::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

fn check_complete(frame: &Frame) -> Result<(), CameraError> {
    if frame.is_complete() {
        return Ok(());
    }
    Err(CameraError::EncodeFailure(format!(
        "frame buffer of {} bytes does not match {}x{} RGB",
        frame.data.len(),
        frame.width,
        frame.height
    )))
}

fn write_jpeg<W: Write>(frame: &Frame, quality: u8, writer: W) -> Result<(), CameraError> {
    let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
    encoder
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CameraError::EncodeFailure(format!("JPEG encoding failed: {}", e)))
}

/// Encode `frame` as JPEG. `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CameraError> {
    check_complete(frame)?;
    let mut jpeg = Vec::with_capacity(frame.data.len() / 8);
    write_jpeg(frame, quality, &mut jpeg)?;
    Ok(jpeg)
}

/// Write `frame` at full resolution. `.jpg`/`.jpeg` use the default JPEG
/// quality; other extensions pick their format from the extension.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<(), CameraError> {
    check_complete(frame)?;

    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_jpeg(frame, DEFAULT_JPEG_QUALITY, &mut writer)?;
            writer.flush()?;
            Ok(())
        }
        Ok(format) => image::save_buffer_with_format(
            path,
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
            format,
        )
        .map_err(|e| CameraError::EncodeFailure(format!("Failed to write image: {}", e))),
        Err(e) => Err(CameraError::InvalidArgument(format!(
            "unsupported image path {}: {}",
            path.display(),
            e
        ))),
    }
}
