// ============================================================================
// VIEWPORT: display space <-> native space mapping
// ============================================================================
//
// Display space is the floating-point coordinate system of the on-screen
// canvas. The base image is letterboxed into it; `DisplayRect` records where.
// Native space is the base image's own pixel grid.

use serde::{Deserialize, Serialize};

use crate::error::{EditError, EditResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Where the native image is drawn inside the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    /// Native pixels per display unit (uniform on both axes).
    pub fn scale_to_native(&self, native_w: u32) -> EditResult<f32> {
        if self.width <= 0.0 || !self.width.is_finite() || native_w == 0 {
            return Err(EditError::DegenerateGeometry);
        }
        Ok(native_w as f32 / self.width)
    }

    /// Display-space point to native-space point.
    pub fn to_native(&self, p: Point, native_w: u32) -> EditResult<Point> {
        let scale = self.scale_to_native(native_w)?;
        Ok(Point::new((p.x - self.x) * scale, (p.y - self.y) * scale))
    }

    /// Native-space point back to display space.
    pub fn to_display(&self, p: Point, native_w: u32) -> EditResult<Point> {
        let scale = self.scale_to_native(native_w)?;
        Ok(Point::new(p.x / scale + self.x, p.y / scale + self.y))
    }
}

/// Free-function form of [`DisplayRect::to_native`].
pub fn to_native(p: Point, rect: &DisplayRect, native_w: u32, native_h: u32) -> EditResult<Point> {
    if native_h == 0 {
        return Err(EditError::DegenerateGeometry);
    }
    rect.to_native(p, native_w)
}

/// Aspect-preserving letterbox fit of a `native_w × native_h` image into a
/// `container_w × container_h` canvas, centred on the axis it does not fill.
pub fn fit_rect(container_w: f32, container_h: f32, native_w: u32, native_h: u32) -> EditResult<DisplayRect> {
    if container_w <= 0.0
        || container_h <= 0.0
        || !container_w.is_finite()
        || !container_h.is_finite()
        || native_w == 0
        || native_h == 0
    {
        return Err(EditError::DegenerateGeometry);
    }

    let container_ratio = container_w / container_h;
    let img_ratio = native_w as f32 / native_h as f32;

    let rect = if container_ratio > img_ratio {
        // Height-bound: pillarbox left/right
        let h = container_h;
        let w = h * img_ratio;
        DisplayRect { x: (container_w - w) / 2.0, y: 0.0, width: w, height: h }
    } else {
        // Width-bound: letterbox top/bottom
        let w = container_w;
        let h = w / img_ratio;
        DisplayRect { x: 0.0, y: (container_h - h) / 2.0, width: w, height: h }
    };
    Ok(rect)
}
