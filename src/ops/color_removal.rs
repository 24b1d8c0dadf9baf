use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::canvas::PixelBuffer;
use crate::io::decode_with_timeout;
use crate::{log_info, log_warn};

/// Per-channel distance (out of 255) below which a pixel counts as background.
pub const KEY_TOLERANCE: u8 = 30;

/// What [`key_background`] did to the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The background colour was keyed out; `cleared` pixels became transparent.
    Keyed { cleared: usize },
    /// The image already carried transparency and was left untouched.
    AlreadyTransparent,
    /// Zero-sized image, nothing to sample.
    Empty,
}

/// Background keyer: makes a uniform background colour transparent.
///
/// 1. If any pixel already has alpha < 255 the image is returned untouched, so
///    running the keyer on its own output is a no-op.
/// 2. Otherwise the top-left pixel's RGB is taken as the background colour.
/// 3. Every pixel whose R, G and B each differ from it by less than
///    `tolerance` gets alpha 0. RGB is preserved.
///
/// This is a colour key, not segmentation: foreground regions that happen to
/// match the background colour are cleared as well.
pub fn key_background(pixels: &mut PixelBuffer, tolerance: u8) -> KeyOutcome {
    if pixels.width() == 0 || pixels.height() == 0 {
        return KeyOutcome::Empty;
    }
    if pixels.has_transparency() {
        return KeyOutcome::AlreadyTransparent;
    }

    let bg = pixels.pixel(0, 0);
    let tol = tolerance as i16;
    let cleared = pixels
        .as_raw_mut()
        .par_chunks_exact_mut(4)
        .map(|px| {
            let dr = (px[0] as i16 - bg[0] as i16).abs();
            let dg = (px[1] as i16 - bg[1] as i16).abs();
            let db = (px[2] as i16 - bg[2] as i16).abs();
            if dr < tol && dg < tol && db < tol {
                px[3] = 0;
                1
            } else {
                0
            }
        })
        .sum::<usize>();

    KeyOutcome::Keyed { cleared }
}

// -- Overlay ingestion -------------------------------------------------------

/// An overlay after the keying step.
#[derive(Clone, Debug)]
pub enum KeyedOverlay {
    /// Decoded and background removed.
    Keyed(PixelBuffer),
    /// Decoded; already transparent (or empty) so left as-is.
    Unchanged(PixelBuffer),
    /// Decoding failed or timed out: the caller gets the original bytes back.
    Original(Arc<[u8]>),
}

impl KeyedOverlay {
    pub fn pixels(&self) -> Option<&PixelBuffer> {
        match self {
            KeyedOverlay::Keyed(p) | KeyedOverlay::Unchanged(p) => Some(p),
            KeyedOverlay::Original(_) => None,
        }
    }

    pub fn into_pixels(self) -> Option<PixelBuffer> {
        match self {
            KeyedOverlay::Keyed(p) | KeyedOverlay::Unchanged(p) => Some(p),
            KeyedOverlay::Original(_) => None,
        }
    }
}

/// Decode an overlay (bounded by `timeout`) and key its background.
/// Never fails: decode errors fall back to the untouched source bytes.
pub fn key_overlay(bytes: impl Into<Arc<[u8]>>, timeout: Duration, tolerance: u8) -> KeyedOverlay {
    let bytes: Arc<[u8]> = bytes.into();
    let mut pixels = match decode_with_timeout(Arc::clone(&bytes), timeout) {
        Ok(p) => p,
        Err(e) => {
            log_warn!("Overlay keying skipped, using original bytes: {}", e);
            return KeyedOverlay::Original(bytes);
        }
    };

    match key_background(&mut pixels, tolerance) {
        KeyOutcome::Keyed { cleared } => {
            log_info!(
                "Keyed overlay {}x{}: {} background pixels cleared",
                pixels.width(),
                pixels.height(),
                cleared
            );
            KeyedOverlay::Keyed(pixels)
        }
        KeyOutcome::AlreadyTransparent | KeyOutcome::Empty => {
            log_info!("Overlay {}x{} already transparent, passed through", pixels.width(), pixels.height());
            KeyedOverlay::Unchanged(pixels)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::encode_png;

    #[test]
    fn two_by_two_white_background() {
        let mut buf = PixelBuffer::filled(2, 2, [255, 255, 255, 255]);
        buf.set_pixel(1, 1, [10, 10, 10, 255]);

        let outcome = key_background(&mut buf, KEY_TOLERANCE);

        assert_eq!(outcome, KeyOutcome::Keyed { cleared: 3 });
        assert_eq!(buf.pixel(0, 0), [255, 255, 255, 0]);
        assert_eq!(buf.pixel(1, 0), [255, 255, 255, 0]);
        assert_eq!(buf.pixel(0, 1), [255, 255, 255, 0]);
        assert_eq!(buf.pixel(1, 1), [10, 10, 10, 255]);
    }

    #[test]
    fn tolerance_is_strict_per_channel() {
        let mut buf = PixelBuffer::filled(3, 1, [100, 100, 100, 255]);
        buf.set_pixel(1, 0, [129, 71, 100, 255]); // inside on every channel
        buf.set_pixel(2, 0, [130, 100, 100, 255]); // exactly 30 on red: kept
        key_background(&mut buf, KEY_TOLERANCE);
        assert_eq!(buf.pixel(1, 0)[3], 0);
        assert_eq!(buf.pixel(2, 0)[3], 255);
    }

    #[test]
    fn keying_is_idempotent() {
        let mut buf = PixelBuffer::filled(4, 4, [0, 200, 0, 255]);
        buf.set_pixel(2, 2, [200, 0, 0, 255]);
        key_background(&mut buf, KEY_TOLERANCE);
        let once = buf.clone();

        assert_eq!(key_background(&mut buf, KEY_TOLERANCE), KeyOutcome::AlreadyTransparent);
        assert_eq!(buf, once);
    }

    #[test]
    fn existing_transparency_is_never_double_processed() {
        let mut buf = PixelBuffer::filled(2, 2, [255, 255, 255, 255]);
        buf.set_pixel(1, 1, [255, 255, 255, 200]);
        let before = buf.clone();
        assert_eq!(key_background(&mut buf, KEY_TOLERANCE), KeyOutcome::AlreadyTransparent);
        assert_eq!(buf, before);
    }

    #[test]
    fn undecodable_overlay_falls_back_to_original_bytes() {
        let raw: Vec<u8> = b"definitely not a png".to_vec();
        match key_overlay(raw.clone(), Duration::from_secs(2), KEY_TOLERANCE) {
            KeyedOverlay::Original(bytes) => assert_eq!(&bytes[..], &raw[..]),
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn slow_decode_falls_back_to_original_bytes() {
        let mut art = PixelBuffer::new(1024, 1024);
        for (i, px) in art.as_raw_mut().chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[(i % 241) as u8, (i / 1024 % 239) as u8, 40, 255]);
        }
        let raw = encode_png(&art).unwrap();

        match key_overlay(raw.clone(), Duration::from_nanos(1), KEY_TOLERANCE) {
            KeyedOverlay::Original(bytes) => assert_eq!(&bytes[..], &raw[..]),
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn decodable_overlay_is_keyed() {
        let mut logo = PixelBuffer::filled(3, 3, [250, 250, 250, 255]);
        logo.set_pixel(1, 1, [0, 0, 120, 255]);
        let bytes = encode_png(&logo).unwrap();

        let keyed = key_overlay(bytes, Duration::from_secs(5), KEY_TOLERANCE);
        assert!(matches!(keyed, KeyedOverlay::Keyed(_)));
        let px = keyed.into_pixels().unwrap();
        assert_eq!(px.pixel(0, 0)[3], 0);
        assert_eq!(px.pixel(1, 1), [0, 0, 120, 255]);
    }
}
