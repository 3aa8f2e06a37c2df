//! Adaptive quantization field and control-loop field operators
//!
//! `adaptive_quantization_map` seeds the per-block quant field from local
//! activity of the luminance plane: smooth regions mask nothing and need
//! finer steps, textured regions tolerate coarser ones. The remaining
//! helpers aggregate perceptual distance maps to block resolution and nudge
//! individual field entries during the search.

use crate::consts::BLOCK_DIM;
use crate::image::ImageF;

/// Per-block initial quant multipliers from the luminance plane.
///
/// Activity is the mean squared forward difference inside each block; the
/// map is a smooth, monotonically decreasing function of it.
#[must_use]
pub fn adaptive_quantization_map(luma: &ImageF, block_dim: usize) -> ImageF {
    let block_xsize = luma.xsize().div_ceil(block_dim);
    let block_ysize = luma.ysize().div_ceil(block_dim);
    let mut map = ImageF::new(block_xsize, block_ysize);
    for by in 0..block_ysize {
        for bx in 0..block_xsize {
            let x1 = ((bx + 1) * block_dim).min(luma.xsize());
            let y1 = ((by + 1) * block_dim).min(luma.ysize());
            let mut acc = 0.0f32;
            let mut count = 0u32;
            for y in by * block_dim..y1 {
                let row = luma.row(y);
                for x in bx * block_dim..x1 {
                    if x + 1 < luma.xsize() {
                        let d = row[x + 1] - row[x];
                        acc += d * d;
                        count += 1;
                    }
                    if y + 1 < luma.ysize() {
                        let d = luma.row(y + 1)[x] - row[x];
                        acc += d * d;
                        count += 1;
                    }
                }
            }
            let activity = if count > 0 { (acc / count as f32).sqrt() } else { 0.0 };
            let v = (1e-3 + activity).ln();
            map.set(bx, by, (-0.2 * (v + 4.0)).exp().clamp(0.5, 2.0));
        }
    }
    map
}

/// Maximum of the distance map over each block, with `margin` extra pixels
/// of overlap into the neighbors.
#[must_use]
pub fn tile_dist_map(distmap: &ImageF, tile_size: usize, margin: usize) -> ImageF {
    let tile_xsize = distmap.xsize().div_ceil(tile_size);
    let tile_ysize = distmap.ysize().div_ceil(tile_size);
    let mut out = ImageF::new(tile_xsize, tile_ysize);
    for tile_y in 0..tile_ysize {
        for tile_x in 0..tile_xsize {
            let y_min = (tile_size * tile_y).saturating_sub(margin);
            let x_min = (tile_size * tile_x).saturating_sub(margin);
            let y_max = (tile_size * (tile_y + 1) + margin).min(distmap.ysize());
            let x_max = (tile_size * (tile_x + 1) + margin).min(distmap.xsize());
            let mut max_dist = 0.0f32;
            for y in y_min..y_max {
                let row = distmap.row(y);
                for &v in &row[x_min..x_max] {
                    max_dist = max_dist.max(v);
                }
            }
            out.set(tile_x, tile_y, max_dist);
        }
    }
    out
}

/// For every pixel within `local_radius` of a peak, the Chebyshev distance
/// to the *nearest* peak; elsewhere -1. A peak is a value exceeding
/// `(1 - peak_weight) * peak_min + peak_weight * local_max`.
#[must_use]
pub fn dist_to_peak_map(
    field: &ImageF,
    peak_min: f32,
    local_radius: usize,
    peak_weight: f32,
) -> ImageF {
    let mut result = ImageF::filled(field.xsize(), field.ysize(), -1.0);
    for y0 in 0..field.ysize() {
        for x0 in 0..field.xsize() {
            let x_min = x0.saturating_sub(local_radius);
            let y_min = y0.saturating_sub(local_radius);
            let x_max = (x0 + 1 + local_radius).min(field.xsize());
            let y_max = (y0 + 1 + local_radius).min(field.ysize());
            let mut local_max = peak_min;
            for y in y_min..y_max {
                for &v in &field.row(y)[x_min..x_max] {
                    local_max = local_max.max(v);
                }
            }
            if field.get(x0, y0) > (1.0 - peak_weight) * peak_min + peak_weight * local_max {
                for y in y_min..y_max {
                    for x in x_min..x_max {
                        let dist = (y.abs_diff(y0)).max(x.abs_diff(x0)) as f32;
                        let cur = result.get(x, y);
                        if cur < 0.0 || cur > dist {
                            result.set(x, y, dist);
                        }
                    }
                }
            }
        }
    }
    result
}

/// One Newton-style step on 1/q toward more quantization resolution, clamped
/// to `quant_max`. Returns false once the value is pinned at the ceiling.
pub fn adjust_quant_val(q: &mut f32, d: f32, factor: f32, quant_max: f32) -> bool {
    if *q >= 0.999 * quant_max {
        return false;
    }
    let inv_q = 1.0 / *q;
    let adj_inv_q = inv_q - factor / (d + 1.0);
    *q = 1.0 / adj_inv_q.max(1.0 / quant_max);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::image_min_max;

    #[test]
    fn test_flat_plane_gives_uniform_map() {
        let luma = ImageF::filled(32, 32, 0.25);
        let map = adaptive_quantization_map(&luma, BLOCK_DIM);
        let (lo, hi) = image_min_max(&map);
        assert_eq!(lo, hi, "map must be uniform on flat input");
    }

    #[test]
    fn test_textured_block_gets_coarser_quant() {
        let mut luma = ImageF::filled(16, 8, 0.0);
        for y in 0..8 {
            for x in 8..16 {
                luma.set(x, y, if (x + y) % 2 == 0 { 0.4 } else { -0.4 });
            }
        }
        let map = adaptive_quantization_map(&luma, BLOCK_DIM);
        assert!(
            map.get(1, 0) < map.get(0, 0),
            "textured {} vs flat {}",
            map.get(1, 0),
            map.get(0, 0)
        );
    }

    #[test]
    fn test_tile_dist_map_takes_max() {
        let mut distmap = ImageF::new(16, 16);
        distmap.set(11, 5, 3.5);
        let tiles = tile_dist_map(&distmap, 8, 0);
        assert_eq!(tiles.get(1, 0), 3.5);
        assert_eq!(tiles.get(0, 0), 0.0);
    }

    #[test]
    fn test_tile_dist_map_margin_bleeds() {
        let mut distmap = ImageF::new(16, 8);
        distmap.set(8, 0, 2.0);
        let tiles = tile_dist_map(&distmap, 8, 1);
        // With one pixel of margin the left tile sees the peak at x = 8.
        assert_eq!(tiles.get(0, 0), 2.0);
    }

    #[test]
    fn test_dist_to_peak_is_minimum_chebyshev() {
        let mut field = ImageF::new(9, 1);
        field.set(1, 0, 5.0);
        field.set(5, 0, 5.0);
        let map = dist_to_peak_map(&field, 1.0, 2, 0.0);
        // x = 3 is two steps from both peaks; the smaller write wins.
        assert_eq!(map.get(3, 0), 2.0);
        assert_eq!(map.get(1, 0), 0.0);
        assert_eq!(map.get(8, 0), -1.0);
    }

    #[test]
    fn test_adjust_quant_val() {
        let mut q = 1.0f32;
        assert!(adjust_quant_val(&mut q, 1.0, 0.2, 5.0));
        assert!(q > 1.0, "q must grow, got {}", q);
        let mut pinned = 4.999f32;
        assert!(!adjust_quant_val(&mut pinned, 1.0, 0.2, 5.0));
    }
}
