// ============================================================================
// CANVAS: pixel buffers, hole masks and native-space regions
// ============================================================================

use image::{GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EditError, EditResult};

/// Owned RGBA8 raster, row-major. `samples.len() == width * height * 4`
/// always holds because the backing `RgbaImage` enforces it.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: RgbaImage::new(width, height) }
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self { image: RgbaImage::from_pixel(width, height, Rgba(rgba)) }
    }

    /// Wrap raw RGBA samples. Fails fast when the length does not match.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> EditResult<Self> {
        let len = samples.len();
        if len != width as usize * height as usize * 4 {
            return Err(EditError::InvalidBuffer { width, height, channels: 4, len });
        }
        RgbaImage::from_raw(width, height, samples)
            .map(|image| Self { image })
            .ok_or(EditError::InvalidBuffer { width, height, channels: 4, len })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        self.image.put_pixel(x, y, Rgba(rgba));
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// True if any sample has alpha below 255.
    pub fn has_transparency(&self) -> bool {
        self.image
            .as_raw()
            .par_chunks_exact(4)
            .any(|px| px[3] < 255)
    }
}

// ============================================================================
// HOLE MASK
// ============================================================================

/// Binary per-pixel "to be healed" flags in native space (>0 = hole).
#[derive(Clone, Debug, PartialEq)]
pub struct HoleMask {
    mask: GrayImage,
}

impl HoleMask {
    /// All-false mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self { mask: GrayImage::new(width, height) }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    #[inline]
    pub fn is_hole(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y).0[0] > 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, hole: bool) {
        self.mask.put_pixel(x, y, Luma([if hole { 255 } else { 0 }]));
    }

    /// Wrap row-major flag bytes (>0 = hole).
    pub fn from_raw(width: u32, height: u32, flags: Vec<u8>) -> EditResult<Self> {
        let len = flags.len();
        if len != width as usize * height as usize {
            return Err(EditError::InvalidBuffer { width, height, channels: 1, len });
        }
        GrayImage::from_raw(width, height, flags)
            .map(|mask| Self { mask })
            .ok_or(EditError::InvalidBuffer { width, height, channels: 1, len })
    }

    /// Mark every pixel of `rect` (clipped to the mask) as a hole.
    pub fn fill_rect(&mut self, left: u32, top: u32, width: u32, height: u32) {
        let right = left.saturating_add(width).min(self.width());
        let bottom = top.saturating_add(height).min(self.height());
        for y in top..bottom {
            for x in left..right {
                self.set(x, y, true);
            }
        }
    }

    pub fn hole_count(&self) -> usize {
        self.mask.as_raw().iter().filter(|&&v| v > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.mask.as_raw().iter().any(|&v| v > 0)
    }

    /// Flat row-major flags, one per pixel.
    pub fn to_flags(&self) -> Vec<bool> {
        self.mask.as_raw().iter().map(|&v| v > 0).collect()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.mask
    }
}

// ============================================================================
// REGION
// ============================================================================

/// Axis-aligned rectangle in native pixel coordinates.
/// Serialises as `{left, top, width, height}`, the shape healing providers accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ============================================================================
// PIXEL HELPERS
// ============================================================================

/// Normal "source over" blend of two straight-alpha pixels.
pub fn blend_over(base: [u8; 4], top: [u8; 4]) -> [u8; 4] {
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 {
        return top;
    }

    let base_a = base[3] as f32 / 255.0;
    let top_a = top[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Read a mark's pixel at fractional pixel-index coordinates.
///
/// The compositor calls this once per covered output pixel when a mark is
/// scaled or rotated. Taps outside the mark count as fully transparent, so
/// unclamped coordinates fade the mark's border out.
pub fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let (fx, fy) = (x - x.floor(), y - y.floor());
    let (col, row) = (x.floor() as i64, y.floor() as i64);

    let tap = |dx: i64, dy: i64| -> [f32; 4] {
        let (sx, sy) = (col + dx, row + dy);
        if sx < 0 || sy < 0 {
            return [0.0; 4];
        }
        match img.get_pixel_checked(sx as u32, sy as u32) {
            Some(p) => p.0.map(f32::from),
            None => [0.0; 4],
        }
    };

    let weights = [
        ((0, 0), (1.0 - fx) * (1.0 - fy)),
        ((1, 0), fx * (1.0 - fy)),
        ((0, 1), (1.0 - fx) * fy),
        ((1, 1), fx * fy),
    ];
    let mut acc = [0.0f32; 4];
    for ((dx, dy), w) in weights {
        if w == 0.0 {
            continue;
        }
        let p = tap(dx, dy);
        for c in 0..4 {
            acc[c] += p[c] * w;
        }
    }
    acc.map(|v| v.round().clamp(0.0, 255.0) as u8)
}
