// ============================================================================
// MARK TRANSFORMS: placement, move / resize / rotate, native mapping
// ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::PixelBuffer;
use crate::error::{EditError, EditResult};
use crate::viewport::{DisplayRect, Point};

/// Smallest width or height (display px) a mark can be resized to.
pub const MIN_MARK_SIZE: f32 = 5.0;

/// Default bounding square a freshly added mark is fitted into.
pub const DEFAULT_MARK_MAX_SIZE: f32 = 150.0;

/// Display-space position of the first added mark; later marks are staggered.
pub const MARK_ORIGIN: f32 = 50.0;
pub const MARK_STAGGER: f32 = 30.0;

/// A user-placed overlay with its display-space transform.
///
/// Scale is never stored: any interactive resize is baked straight into
/// `width`/`height`. Rotation is in degrees, clockwise, about the top-left
/// corner `(x, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mark {
    pub id: Uuid,
    pub pixels: PixelBuffer,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
}

/// Transform reported by the interactive layer at the end of a drag/resize.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkTransform {
    pub x: f32,
    pub y: f32,
    #[serde(default = "unit_scale")]
    pub scale_x: f32,
    #[serde(default = "unit_scale")]
    pub scale_y: f32,
    #[serde(default)]
    pub rotation: f32,
}

fn unit_scale() -> f32 {
    1.0
}

/// A mark's placement on the native pixel grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NativePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
}

impl Mark {
    pub fn new(pixels: PixelBuffer, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            pixels,
            x,
            y,
            width: width.max(MIN_MARK_SIZE),
            height: height.max(MIN_MARK_SIZE),
            rotation: 0.0,
        }
    }

    /// New mark sized to fit a `max_size` square (aspect kept) and placed at
    /// the `index`-th staggered slot.
    pub fn fitted(pixels: PixelBuffer, index: usize, max_size: f32) -> EditResult<Self> {
        let (w, h) = pixels.dimensions();
        if w == 0 || h == 0 || max_size.is_nan() || max_size <= 0.0 {
            return Err(EditError::DegenerateGeometry);
        }
        let ratio = (max_size / w as f32).min(max_size / h as f32);
        let offset = MARK_ORIGIN + MARK_STAGGER * index as f32;
        Ok(Self::new(pixels, offset, offset, w as f32 * ratio, h as f32 * ratio))
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Bake a scale factor into the size. Each side is floored at
    /// [`MIN_MARK_SIZE`].
    pub fn resize(&mut self, scale_x: f32, scale_y: f32) {
        self.width = (self.width * scale_x.abs()).max(MIN_MARK_SIZE);
        self.height = (self.height * scale_y.abs()).max(MIN_MARK_SIZE);
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees.rem_euclid(360.0);
    }

    pub fn rotate_by(&mut self, degrees: f32) {
        self.set_rotation(self.rotation + degrees);
    }

    /// Apply an end-of-gesture transform: position and rotation are taken
    /// as-is, scale is baked into the size.
    pub fn apply_transform(&mut self, t: MarkTransform) {
        self.move_to(t.x, t.y);
        self.resize(t.scale_x, t.scale_y);
        self.set_rotation(t.rotation);
    }

    /// Inverse-rotate a display point into the mark's local frame.
    pub fn to_local(&self, p: Point) -> Point {
        let (s, c) = self.rotation.to_radians().sin_cos();
        let dx = p.x - self.x;
        let dy = p.y - self.y;
        Point::new(dx * c + dy * s, -dx * s + dy * c)
    }

    /// Hit test in display space.
    pub fn contains(&self, p: Point) -> bool {
        let local = self.to_local(p);
        local.x >= 0.0 && local.y >= 0.0 && local.x < self.width && local.y < self.height
    }

    /// Map this mark onto the native grid behind `rect`.
    pub fn native_placement(&self, rect: &DisplayRect, native_w: u32) -> EditResult<NativePlacement> {
        let scale = rect.scale_to_native(native_w)?;
        let origin = rect.to_native(Point::new(self.x, self.y), native_w)?;
        Ok(NativePlacement {
            x: origin.x,
            y: origin.y,
            width: self.width * scale,
            height: self.height * scale,
            rotation: self.rotation,
        })
    }
}

impl NativePlacement {
    /// The four corners, clockwise from the origin.
    pub fn corners(&self) -> [Point; 4] {
        let (s, c) = self.rotation.to_radians().sin_cos();
        let at = |lx: f32, ly: f32| Point::new(self.x + lx * c - ly * s, self.y + lx * s + ly * c);
        [at(0.0, 0.0), at(self.width, 0.0), at(self.width, self.height), at(0.0, self.height)]
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` of the rotated box.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.corners().iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }
}
