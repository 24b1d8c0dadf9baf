// ============================================================================
// COMPOSITOR: flatten the working image and its marks at native resolution
// ============================================================================

use rayon::prelude::*;

use crate::canvas::{PixelBuffer, bilinear_sample, blend_over};
use crate::error::EditResult;
use crate::ops::transform::{Mark, NativePlacement};
use crate::viewport::DisplayRect;

/// Flatten `base` and `marks` (bottom to top) into a new native-size buffer.
///
/// Mark transforms are display-space; they are rescaled by
/// `base.width / rect.width` so the output does not depend on how large the
/// editing viewport happened to be.
pub fn flatten(base: &PixelBuffer, marks: &[Mark], rect: &DisplayRect) -> EditResult<PixelBuffer> {
    let mut out = base.clone();
    for mark in marks {
        let placement = mark.native_placement(rect, base.width())?;
        draw_mark(&mut out, &mark.pixels, &placement);
    }
    Ok(out)
}

/// Resample `pixels` into `dst` under `placement` and blend it on top.
///
/// Inverse mapping: each destination pixel centre is rotated back into the
/// mark's local frame and, when it lands inside the box, bilinearly sampled
/// from the source.
pub fn draw_mark(dst: &mut PixelBuffer, pixels: &PixelBuffer, placement: &NativePlacement) {
    let (src_w, src_h) = pixels.dimensions();
    let (dst_w, dst_h) = dst.dimensions();
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return;
    }
    if placement.width <= 0.0 || placement.height <= 0.0 {
        return;
    }

    let (min_x, min_y, max_x, max_y) = placement.bounds();
    let x0 = min_x.floor().max(0.0) as usize;
    let y0 = min_y.floor().max(0.0) as usize;
    let x1 = (max_x.ceil().max(0.0) as usize).min(dst_w as usize);
    let y1 = (max_y.ceil().max(0.0) as usize).min(dst_h as usize);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let (s, c) = placement.rotation.to_radians().sin_cos();
    let sx_scale = src_w as f32 / placement.width;
    let sy_scale = src_h as f32 / placement.height;
    let max_sx = (src_w - 1) as f32;
    let max_sy = (src_h - 1) as f32;
    let src = pixels.as_image();
    let row_bytes = dst_w as usize * 4;

    dst.as_raw_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - placement.y;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - placement.x;
                let lx = dx * c + dy * s;
                let ly = -dx * s + dy * c;
                if lx < 0.0 || ly < 0.0 || lx >= placement.width || ly >= placement.height {
                    continue;
                }

                // Clamp to the source so box edges stay crisp.
                let u = (lx * sx_scale - 0.5).clamp(0.0, max_sx);
                let v = (ly * sy_scale - 0.5).clamp(0.0, max_sy);
                let top = bilinear_sample(src, u, v);

                let p = x * 4;
                let under = [row[p], row[p + 1], row[p + 2], row[p + 3]];
                row[p..p + 4].copy_from_slice(&blend_over(under, top));
            }
        });
}
