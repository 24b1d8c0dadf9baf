// ============================================================================
// IMAGE I/O: decoding with a deadline, encoding for export and payloads
// ============================================================================

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::canvas::PixelBuffer;
use crate::error::{EditError, EditResult};

/// Default deadline for decoding a single overlay image.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(8);

/// Default JPEG quality for exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
        }
    }

    /// Parse a format name or file extension. Unknown names give `None`.
    pub fn from_name(name: &str) -> Option<SaveFormat> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            _ => None,
        }
    }

    /// Infer from the output path's extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> SaveFormat {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SaveFormat::from_name)
            .unwrap_or_default()
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode any supported image format into an RGBA buffer.
pub fn decode_image(bytes: &[u8]) -> EditResult<PixelBuffer> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| EditError::DecodeFailed(e.to_string()))?;
    Ok(PixelBuffer::from_image(img.to_rgba8()))
}

/// Decode on a worker thread, giving up after `timeout`.
///
/// A decode that misses the deadline keeps running on its thread until it
/// finishes; its result is dropped.
pub fn decode_with_timeout(bytes: impl Into<Arc<[u8]>>, timeout: Duration) -> EditResult<PixelBuffer> {
    let bytes: Arc<[u8]> = bytes.into();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(decode_image(&bytes));
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EditError::DecodeFailed(format!(
            "decode did not finish within {:.1}s",
            timeout.as_secs_f32()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(EditError::DecodeFailed("decoder thread exited".to_string()))
        }
    }
}

pub fn load_image_file(path: &Path) -> EditResult<PixelBuffer> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode `image` in `format` into any writer.
pub fn encode_to<W: Write>(
    image: &PixelBuffer,
    writer: &mut W,
    format: SaveFormat,
    quality: u8,
) -> EditResult<()> {
    let (w, h) = image.dimensions();
    match format {
        SaveFormat::Png => {
            PngEncoder::new(writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.as_image().clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), w, h, ColorType::Rgb8)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(writer);
            encoder.encode(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(writer).encode(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
    }
    Ok(())
}

/// Encode and write an image to a file.
pub fn encode_and_write(
    image: &PixelBuffer,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> EditResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_to(image, &mut writer, format, quality)?;
    writer.flush()?;
    Ok(())
}

/// Lossless in-memory PNG, used for provider payloads.
pub fn encode_png(image: &PixelBuffer) -> EditResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_to(image, &mut out, SaveFormat::Png, 100)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PixelBuffer {
        let mut buf = PixelBuffer::filled(4, 3, [0, 0, 255, 255]);
        buf.set_pixel(1, 1, [255, 0, 0, 0]);
        buf
    }

    #[test]
    fn png_keeps_pixels_exactly() {
        let bytes = encode_png(&sample()).unwrap();
        assert_eq!(decode_image(&bytes).unwrap(), sample());
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(decode_image(b"not an image"), Err(EditError::DecodeFailed(_))));
        assert!(matches!(
            decode_with_timeout(b"nope".to_vec(), Duration::from_secs(2)),
            Err(EditError::DecodeFailed(_))
        ));
    }

    /// Large enough that decoding takes far longer than a nanosecond.
    fn large_png() -> Vec<u8> {
        let mut buf = PixelBuffer::new(1024, 1024);
        for (i, px) in buf.as_raw_mut().chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[(i % 251) as u8, (i / 1024 % 253) as u8, (i * 7 % 256) as u8, 255]);
        }
        encode_png(&buf).unwrap()
    }

    #[test]
    fn missed_deadline_is_a_decode_failure() {
        let err = decode_with_timeout(large_png(), Duration::from_nanos(1)).unwrap_err();
        assert!(matches!(err, EditError::DecodeFailed(ref msg) if msg.contains("did not finish")));
    }

    #[test]
    fn decode_with_timeout_returns_pixels() {
        let bytes = encode_png(&sample()).unwrap();
        let buf = decode_with_timeout(bytes, DEFAULT_DECODE_TIMEOUT).unwrap();
        assert_eq!(buf.dimensions(), (4, 3));
    }

    #[test]
    fn format_inference() {
        assert_eq!(SaveFormat::from_path(Path::new("out.JPEG")), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("out.tga")), SaveFormat::Tga);
        assert_eq!(SaveFormat::from_path(Path::new("out")), SaveFormat::Png);
        assert_eq!(SaveFormat::from_name("gif"), None);
        assert_eq!(SaveFormat::Jpeg.extension(), "jpg");
    }

    #[test]
    fn jpeg_export_writes_a_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.jpg");
        encode_and_write(&sample(), &path, SaveFormat::Jpeg, DEFAULT_JPEG_QUALITY).unwrap();
        let back = load_image_file(&path).unwrap();
        assert_eq!(back.dimensions(), (4, 3));
        assert!(!back.has_transparency());
    }
}
