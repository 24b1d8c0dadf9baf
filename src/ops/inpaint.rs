// ============================================================================
// Local healing: neighbour-mean diffusion fill
// ============================================================================
//
// Fallback used when no remote healing provider is configured. It is a
// low-fidelity blur fill, not texture synthesis: hole pixels take the mean
// colour of their known 8-neighbours, and colour creeps inward pass by pass.
//
// The result is fully determined by the input: the scan is row-major, the
// hole bitmap is updated in place during the scan (a pixel resolved earlier in
// a pass already counts as known for the pixels after it), and means are
// rounded half-up in integer arithmetic.

use crate::canvas::{HoleMask, PixelBuffer};
use crate::error::{EditError, EditResult};

/// Upper bound on full scans over the hole.
pub const MAX_PASSES: usize = 20;

/// Known neighbours needed before a filled pixel stops being a hole.
pub const RESOLVE_NEIGHBOURS: u32 = 3;

/// After this pass index any filled pixel is resolved, so deep interiors with
/// few known neighbours still converge.
pub const RELAX_AFTER_PASS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffusionReport {
    /// Scans performed, including the final scan that changed nothing.
    pub passes: usize,
    /// Pixels still marked as holes when the fill stopped.
    pub unresolved: usize,
}

/// Heal `src` inside `hole_mask`, returning a new buffer.
/// Pixels outside the mask are byte-identical to `src`; written pixels are
/// forced fully opaque.
pub fn fill_region_diffusion(src: &PixelBuffer, hole_mask: &HoleMask) -> EditResult<(PixelBuffer, DiffusionReport)> {
    if src.dimensions() != hole_mask.dimensions() {
        return Err(EditError::InvalidMask {
            image: src.dimensions(),
            mask: hole_mask.dimensions(),
        });
    }
    let mut out = src.clone();
    let report = diffuse_in_place(&mut out, hole_mask.to_flags());
    Ok((out, report))
}

fn diffuse_in_place(img: &mut PixelBuffer, mut hole: Vec<bool>) -> DiffusionReport {
    let (w, h) = (img.width() as usize, img.height() as usize);

    // Only the hole's bounding box can change; scanning it in row-major
    // order is the same as scanning the whole image.
    let Some((min_x, min_y, max_x, max_y)) = hole_bounds(&hole, w) else {
        return DiffusionReport { passes: 0, unresolved: 0 };
    };

    let data = img.as_raw_mut();
    let mut passes = 0;

    for pass in 0..MAX_PASSES {
        passes = pass + 1;
        let mut changed = false;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let idx = y * w + x;
                if !hole[idx] {
                    continue;
                }

                let (mut r, mut g, mut b, mut count) = (0u32, 0u32, 0u32, 0u32);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                            continue;
                        }
                        let n_idx = ny as usize * w + nx as usize;
                        if hole[n_idx] {
                            continue;
                        }
                        let p = n_idx * 4;
                        r += data[p] as u32;
                        g += data[p + 1] as u32;
                        b += data[p + 2] as u32;
                        count += 1;
                    }
                }

                if count == 0 {
                    continue;
                }

                let p = idx * 4;
                data[p] = ((r + count / 2) / count) as u8;
                data[p + 1] = ((g + count / 2) / count) as u8;
                data[p + 2] = ((b + count / 2) / count) as u8;
                data[p + 3] = 255;
                if count >= RESOLVE_NEIGHBOURS || pass > RELAX_AFTER_PASS {
                    hole[idx] = false;
                }
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    DiffusionReport {
        passes,
        unresolved: hole.iter().filter(|&&v| v).count(),
    }
}

fn hole_bounds(hole: &[bool], w: usize) -> Option<(usize, usize, usize, usize)> {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for (i, _) in hole.iter().enumerate().filter(|(_, v)| **v) {
        let (x, y) = (i % w, i / w);
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}
