// ============================================================================
// MASK RASTERIZER: free-hand removal strokes -> native hole mask + region
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{HoleMask, Region};
use crate::error::{EditError, EditResult};
use crate::viewport::{DisplayRect, Point};

/// Padding (native px) added on every side of the stroke bounding box.
pub const REGION_PADDING: f32 = 10.0;

/// One finished free-hand stroke in display space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub stroke_width: f32,
}

/// The stroke currently being drawn. Points are only ever appended; the
/// accumulator is turned into an immutable [`Stroke`] on pointer-up.
#[derive(Clone, Debug)]
pub struct StrokeSession {
    points: Vec<Point>,
    stroke_width: f32,
}

impl StrokeSession {
    pub fn begin(at: Point, stroke_width: f32) -> Self {
        Self { points: vec![at], stroke_width }
    }

    pub fn extend(&mut self, p: Point) {
        self.points.push(p);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    pub fn finish(self) -> Stroke {
        Stroke { points: self.points, stroke_width: self.stroke_width }
    }
}

/// Output of [`rasterize_strokes`].
#[derive(Clone, Debug)]
pub struct RasterizedHole {
    pub mask: HoleMask,
    pub region: Region,
}

/// A stroke segment (or dot when `a == b`) in native space.
#[derive(Clone, Copy, Debug)]
struct Capsule {
    a: Point,
    b: Point,
    radius: f32,
}

impl Capsule {
    fn min_y(&self) -> f32 {
        self.a.y.min(self.b.y) - self.radius
    }

    fn max_y(&self) -> f32 {
        self.a.y.max(self.b.y) + self.radius
    }

    /// Distance from `(px, py)` to the segment centre line.
    #[inline]
    fn distance(&self, px: f32, py: f32) -> f32 {
        let dx = self.b.x - self.a.x;
        let dy = self.b.y - self.a.y;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq <= f32::EPSILON {
            0.0
        } else {
            (((px - self.a.x) * dx + (py - self.a.y) * dy) / len_sq).clamp(0.0, 1.0)
        };
        let cx = self.a.x + t * dx;
        let cy = self.a.y + t * dy;
        ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
    }
}

/// Rasterize display-space strokes into a native-space hole mask.
///
/// Each polyline is drawn as a union of capsules of radius
/// `stroke_width * scale / 2`, which gives round caps and round joins. A pixel
/// is a hole when its centre lies within the radius; the pixel containing each
/// stroke point is always a hole so thin strokes never vanish. The region is
/// the bounding box of the stroked geometry, padded by [`REGION_PADDING`] and
/// clamped to the image.
///
/// Returns [`EditError::EmptyRegion`] when there is nothing to heal.
pub fn rasterize_strokes(
    strokes: &[Stroke],
    rect: &DisplayRect,
    native_w: u32,
    native_h: u32,
) -> EditResult<RasterizedHole> {
    if native_w == 0 || native_h == 0 {
        return Err(EditError::DegenerateGeometry);
    }
    let scale = rect.scale_to_native(native_w)?;

    let mut capsules: Vec<Capsule> = Vec::new();
    let mut anchors: Vec<Point> = Vec::new();
    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);

    for stroke in strokes {
        if stroke.points.is_empty() {
            continue;
        }
        let radius = (stroke.stroke_width * scale / 2.0).max(0.0);
        let native: Vec<Point> = stroke
            .points
            .iter()
            .map(|&p| rect.to_native(p, native_w))
            .collect::<EditResult<_>>()?;

        for p in &native {
            min_x = min_x.min(p.x - radius);
            min_y = min_y.min(p.y - radius);
            max_x = max_x.max(p.x + radius);
            max_y = max_y.max(p.y + radius);
        }

        if native.len() == 1 {
            capsules.push(Capsule { a: native[0], b: native[0], radius });
        } else {
            capsules.extend(native.windows(2).map(|w| Capsule { a: w[0], b: w[1], radius }));
        }
        anchors.extend(native);
    }

    if capsules.is_empty() {
        return Err(EditError::EmptyRegion);
    }

    let w = native_w as usize;
    let mut flags = vec![0u8; w * native_h as usize];

    flags.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let cy = y as f32 + 0.5;
        for cap in &capsules {
            if cy < cap.min_y() || cy > cap.max_y() {
                continue;
            }
            let x0 = (cap.a.x.min(cap.b.x) - cap.radius).floor().max(0.0) as usize;
            let x1 = ((cap.a.x.max(cap.b.x) + cap.radius).ceil().max(0.0) as usize).min(w);
            for (x, slot) in row.iter_mut().enumerate().take(x1).skip(x0) {
                if *slot == 0 && cap.distance(x as f32 + 0.5, cy) <= cap.radius {
                    *slot = 255;
                }
            }
        }
    });

    for p in &anchors {
        if p.x >= 0.0 && p.y >= 0.0 && p.x < native_w as f32 && p.y < native_h as f32 {
            flags[p.y as usize * w + p.x as usize] = 255;
        }
    }

    let left = (min_x - REGION_PADDING).floor().clamp(0.0, native_w as f32) as u32;
    let top = (min_y - REGION_PADDING).floor().clamp(0.0, native_h as f32) as u32;
    let right = (max_x + REGION_PADDING).ceil().clamp(0.0, native_w as f32) as u32;
    let bottom = (max_y + REGION_PADDING).ceil().clamp(0.0, native_h as f32) as u32;
    let region = Region {
        left,
        top,
        width: right.saturating_sub(left),
        height: bottom.saturating_sub(top),
    };

    let mask = HoleMask::from_raw(native_w, native_h, flags)?;
    if region.is_empty() || mask.is_empty() {
        return Err(EditError::EmptyRegion);
    }

    Ok(RasterizedHole { mask, region })
}
