//! DC coefficient prediction
//!
//! DC values double as an image preview and are coded separately. Each pixel
//! is predicted from immediately adjacent causal neighbors by one of 8 fixed
//! predictors; subtracting the prediction leaves a residual distribution with
//! far lower entropy. The predictor is selected per pixel from information
//! both sides already share: for luminance, the predictor that performed best
//! on the decoded N and W neighbors; for the chroma pair, the predictor that
//! best reproduces the already reconstructed luminance at the same position.
//!
//! All arithmetic is wrapping, so `expand(shrink(x)) == x` holds for every
//! input; legal DC magnitudes never wrap in practice.

use crate::image::{Image3S, ImageS, Rect};

const NUM_PREDICTORS: usize = 8;

#[inline]
fn med(n: i32, w: i32, nw: i32) -> i32 {
    let lo = n.min(w);
    let hi = n.max(w);
    (n + w - nw).clamp(lo, hi)
}

/// The 8 fixed predictors over the N, W, NE, NW neighbors.
#[inline]
fn predictors(n: i32, w: i32, ne: i32, nw: i32) -> [i32; NUM_PREDICTORS] {
    [
        (n + w) >> 1,
        n,
        w,
        med(n, w, nw),
        ne,
        (w + nw) >> 1,
        (n + ne) >> 1,
        (n + w + ne + nw) >> 2,
    ]
}

/// Clamped accessor over the causal (already reconstructed) region.
/// `xsize` is the logical region width; scratch images may be wider.
#[inline]
fn at(img: &ImageS, xsize: usize, x: isize, y: isize) -> i32 {
    let x = x.clamp(0, xsize as isize - 1) as usize;
    let y = y.max(0) as usize;
    i32::from(img.row(y)[x])
}

/// Prediction for position (x, y) given a reconstructed plane, using
/// predictor `which`. Positions on the first row/column fall back to the
/// single available neighbor.
#[inline]
fn predict_one(recon: &ImageS, xsize: usize, x: usize, y: usize, which: usize) -> i32 {
    if y == 0 {
        if x == 0 {
            return 0;
        }
        return at(recon, xsize, x as isize - 1, 0);
    }
    if x == 0 {
        return at(recon, xsize, 0, y as isize - 1);
    }
    let n = at(recon, xsize, x as isize, y as isize - 1);
    let w = at(recon, xsize, x as isize - 1, y as isize);
    let ne = at(recon, xsize, x as isize + 1, y as isize - 1);
    let nw = at(recon, xsize, x as isize - 1, y as isize - 1);
    predictors(n, w, ne, nw)[which]
}

/// Chooses the predictor with the least total absolute error at the N and W
/// positions of `(x, y)`; both are fully decoded on either side.
fn select_predictor_y(recon: &ImageS, xsize: usize, x: usize, y: usize) -> usize {
    debug_assert!(x > 0 && y > 0);
    let mut best = 0usize;
    let mut best_cost = i32::MAX;
    for which in 0..NUM_PREDICTORS {
        let cost_w = (predict_one(recon, xsize, x - 1, y, which)
            - at(recon, xsize, x as isize - 1, y as isize))
        .abs();
        let cost_n = (predict_one(recon, xsize, x, y - 1, which)
            - at(recon, xsize, x as isize, y as isize - 1))
        .abs();
        let cost = cost_w + cost_n;
        if cost < best_cost {
            best_cost = cost;
            best = which;
        }
    }
    best
}

/// Chooses the predictor that best reproduces the reconstructed luminance at
/// `(x, y)` itself.
fn select_predictor_xb(luma: &ImageS, xsize: usize, x: usize, y: usize) -> usize {
    debug_assert!(x > 0 && y > 0);
    let actual = at(luma, xsize, x as isize, y as isize);
    let mut best = 0usize;
    let mut best_cost = i32::MAX;
    for which in 0..NUM_PREDICTORS {
        let cost = (predict_one(luma, xsize, x, y, which) - actual).abs();
        if cost < best_cost {
            best_cost = cost;
            best = which;
        }
    }
    best
}

/// Predicts `in_y` within `rect` and stores residuals starting at (0, 0).
pub fn shrink_y(rect: &Rect, in_y: &ImageS, residuals: &mut ImageS) {
    let (xsize, ysize) = (rect.xsize(), rect.ysize());
    debug_assert!(residuals.xsize() >= xsize && residuals.ysize() >= ysize);
    // The reconstruction equals the input; predictor selection still has to
    // run on it so the decoder agrees.
    let mut recon = ImageS::new(xsize, ysize);
    for y in 0..ysize {
        let src = &in_y.row(rect.y0() + y)[rect.x0()..rect.x0() + xsize];
        recon.row_mut(y).copy_from_slice(src);
    }
    for y in 0..ysize {
        for x in 0..xsize {
            let which = if x > 0 && y > 0 {
                select_predictor_y(&recon, xsize, x, y)
            } else {
                0
            };
            let pred = predict_one(&recon, xsize, x, y, which);
            let actual = i32::from(recon.row(y)[x]);
            residuals.row_mut(y)[x] = (actual as i16).wrapping_sub(pred as i16);
        }
    }
}

/// Reconstructs the values whose residuals `shrink_y` produced; `rect` must
/// match the shrink call. Output is written to (0, 0) of `tmp_expanded`.
pub fn expand_y(rect: &Rect, residuals: &ImageS, tmp_expanded: &mut ImageS) {
    let (xsize, ysize) = (rect.xsize(), rect.ysize());
    debug_assert!(tmp_expanded.xsize() >= xsize && tmp_expanded.ysize() >= ysize);
    for y in 0..ysize {
        for x in 0..xsize {
            let which = if x > 0 && y > 0 {
                select_predictor_y(tmp_expanded, xsize, x, y)
            } else {
                0
            };
            let pred = predict_one(tmp_expanded, xsize, x, y, which);
            let value = (pred as i16).wrapping_add(residuals.row(y)[x]);
            tmp_expanded.row_mut(y)[x] = value;
        }
    }
}

/// Prediction over the interleaved X/B plane: channel `c` of pixel `x`
/// lives at column `2 * x + c`. `xsize` is the pixel (pair) count per row.
#[inline]
fn predict_pair(recon: &ImageS, xsize: usize, x: usize, y: usize, c: usize, which: usize) -> i32 {
    if y == 0 {
        if x == 0 {
            return 0;
        }
        return i32::from(recon.row(0)[2 * (x - 1) + c]);
    }
    if x == 0 {
        return i32::from(recon.row(y - 1)[c]);
    }
    let n = i32::from(recon.row(y - 1)[2 * x + c]);
    let w = i32::from(recon.row(y)[2 * (x - 1) + c]);
    let ne = if x + 1 < xsize {
        i32::from(recon.row(y - 1)[2 * (x + 1) + c])
    } else {
        n
    };
    let nw = i32::from(recon.row(y - 1)[2 * (x - 1) + c]);
    predictors(n, w, ne, nw)[which]
}

/// Stores residuals of predicting the interleaved X/B pairs in `xb`, with
/// the predictor chosen per pixel from the already expanded luminance.
pub fn shrink_xb(rect: &Rect, luma: &ImageS, xb: &ImageS, residuals: &mut ImageS) {
    let (xsize, ysize) = (rect.xsize(), rect.ysize());
    debug_assert!(xb.xsize() >= 2 * xsize && xb.ysize() >= ysize);
    debug_assert!(residuals.xsize() >= 2 * xsize && residuals.ysize() >= ysize);
    for y in 0..ysize {
        for x in 0..xsize {
            let which = if x > 0 && y > 0 {
                select_predictor_xb(luma, xsize, x, y)
            } else {
                0
            };
            for c in 0..2 {
                let pred = predict_pair(xb, xsize, x, y, c, which);
                let actual = xb.row(y)[2 * x + c];
                residuals.row_mut(y)[2 * x + c] = actual.wrapping_sub(pred as i16);
            }
        }
    }
}

/// Inverse of `shrink_xb` over a `xsize * ysize` region.
pub fn expand_xb(
    xsize: usize,
    ysize: usize,
    luma: &ImageS,
    residuals: &ImageS,
    tmp_expanded: &mut ImageS,
) {
    debug_assert!(tmp_expanded.xsize() >= 2 * xsize && tmp_expanded.ysize() >= ysize);
    for y in 0..ysize {
        for x in 0..xsize {
            let which = if x > 0 && y > 0 {
                select_predictor_xb(luma, xsize, x, y)
            } else {
                0
            };
            for c in 0..2 {
                let pred = predict_pair(tmp_expanded, xsize, x, y, c, which);
                let value = (pred as i16).wrapping_add(residuals.row(y)[2 * x + c]);
                tmp_expanded.row_mut(y)[2 * x + c] = value;
            }
        }
    }
}

/// Predicts `rect` within `dc` and stores the residuals of all three planes
/// into `tmp_residuals` starting at (0, 0).
pub fn shrink_dc(rect: &Rect, dc: &Image3S, tmp_residuals: &mut Image3S) {
    let (xsize, ysize) = (rect.xsize(), rect.ysize());

    {
        let res_y = tmp_residuals.plane_mut(1);
        shrink_y(rect, dc.plane(1), res_y);
    }

    // Luminance is consumed as reconstructed values, i.e. the input itself.
    let mut luma = ImageS::new(xsize, ysize);
    for y in 0..ysize {
        luma.row_mut(y)
            .copy_from_slice(&dc.plane(1).row(rect.y0() + y)[rect.x0()..rect.x0() + xsize]);
    }

    let mut xb = ImageS::new(2 * xsize, ysize);
    for y in 0..ysize {
        let row_x = dc.plane(0).row(rect.y0() + y);
        let row_b = dc.plane(2).row(rect.y0() + y);
        let dst = xb.row_mut(y);
        for x in 0..xsize {
            dst[2 * x] = row_x[rect.x0() + x];
            dst[2 * x + 1] = row_b[rect.x0() + x];
        }
    }
    let mut xb_res = ImageS::new(2 * xsize, ysize);
    shrink_xb(rect, &luma, &xb, &mut xb_res);
    for y in 0..ysize {
        let src = xb_res.row(y);
        let row_x = tmp_residuals.plane_mut(0).row_mut(y);
        for x in 0..xsize {
            row_x[x] = src[2 * x];
        }
        let row_b = tmp_residuals.plane_mut(2).row_mut(y);
        for x in 0..xsize {
            row_b[x] = src[2 * x + 1];
        }
    }
}

/// Replaces the prediction residuals in `rect` of `dc` (as produced by
/// `shrink_dc`) with reconstructed DC values. The `tmp_*` images are
/// thread-local scratch of at least `rect` size (2x width for xz) and must
/// not be shared across workers. The same `rect` passed to `shrink_dc` must
/// be passed here.
pub fn expand_dc(
    rect: &Rect,
    dc: &mut Image3S,
    tmp_y: &mut ImageS,
    tmp_xz_residuals: &mut ImageS,
    tmp_xz_expanded: &mut ImageS,
) {
    let (xsize, ysize) = (rect.xsize(), rect.ysize());
    debug_assert!(tmp_y.xsize() >= xsize && tmp_y.ysize() >= ysize);

    {
        let res_rect = Rect::new(0, 0, xsize, ysize);
        let mut res_y = ImageS::new(xsize, ysize);
        for y in 0..ysize {
            res_y
                .row_mut(y)
                .copy_from_slice(&dc.plane(1).row(rect.y0() + y)[rect.x0()..rect.x0() + xsize]);
        }
        expand_y(&res_rect, &res_y, tmp_y);
    }
    for y in 0..ysize {
        dc.plane_mut(1).row_mut(rect.y0() + y)[rect.x0()..rect.x0() + xsize]
            .copy_from_slice(&tmp_y.row(y)[..xsize]);
    }

    for y in 0..ysize {
        let row_x = dc.plane(0).row(rect.y0() + y);
        let row_b = dc.plane(2).row(rect.y0() + y);
        let dst = tmp_xz_residuals.row_mut(y);
        for x in 0..xsize {
            dst[2 * x] = row_x[rect.x0() + x];
            dst[2 * x + 1] = row_b[rect.x0() + x];
        }
    }
    expand_xb(xsize, ysize, tmp_y, tmp_xz_residuals, tmp_xz_expanded);
    for y in 0..ysize {
        let src = tmp_xz_expanded.row(y);
        let row_x = dc.plane_mut(0).row_mut(rect.y0() + y);
        for x in 0..xsize {
            row_x[rect.x0() + x] = src[2 * x];
        }
        let row_b = dc.plane_mut(2).row_mut(rect.y0() + y);
        for x in 0..xsize {
            row_b[rect.x0() + x] = src[2 * x + 1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_plane(xsize: usize, ysize: usize, seed: u64) -> ImageS {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut img = ImageS::new(xsize, ysize);
        for y in 0..ysize {
            for x in 0..xsize {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                img.set(x, y, ((state >> 33) as i16) % 2000);
            }
        }
        img
    }

    #[test]
    fn test_y_roundtrip_exact() {
        for (xs, ys) in [(1, 1), (7, 1), (1, 9), (16, 16), (29, 13)] {
            let input = test_plane(xs, ys, 42);
            let rect = Rect::new(0, 0, xs, ys);
            let mut residuals = ImageS::new(xs, ys);
            shrink_y(&rect, &input, &mut residuals);
            let mut expanded = ImageS::new(xs, ys);
            expand_y(&rect, &residuals, &mut expanded);
            for y in 0..ys {
                assert_eq!(input.row(y), &expanded.row(y)[..xs], "row {} of {}x{}", y, xs, ys);
            }
        }
    }

    #[test]
    fn test_y_roundtrip_with_offset_rect() {
        let input = test_plane(24, 20, 7);
        let rect = Rect::new(8, 4, 10, 9);
        let mut residuals = ImageS::new(10, 9);
        shrink_y(&rect, &input, &mut residuals);
        let mut expanded = ImageS::new(10, 9);
        expand_y(&Rect::new(0, 0, 10, 9), &residuals, &mut expanded);
        for y in 0..9 {
            assert_eq!(
                &input.row(rect.y0() + y)[8..18],
                &expanded.row(y)[..10],
                "row {}",
                y
            );
        }
    }

    #[test]
    fn test_smooth_input_gives_small_residuals() {
        let mut input = ImageS::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                input.set(x, y, (10 * x + 11 * y) as i16);
            }
        }
        let rect = Rect::new(0, 0, 16, 16);
        let mut residuals = ImageS::new(16, 16);
        shrink_y(&rect, &input, &mut residuals);
        // Interior of a plane is perfectly predictable by the gradient
        // predictor once selection has neighbors to learn from.
        for y in 2..16 {
            for x in 2..16 {
                assert!(
                    residuals.get(x, y).abs() <= 1,
                    "residual {} at ({},{})",
                    residuals.get(x, y),
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_dc_roundtrip_exact() {
        let (xs, ys) = (13, 11);
        let mut dc = Image3S::new(xs, ys);
        for c in 0..3 {
            let plane = test_plane(xs, ys, 100 + c as u64);
            for y in 0..ys {
                dc.plane_mut(c).row_mut(y).copy_from_slice(plane.row(y));
            }
        }
        let orig = dc.clone();
        let rect = Rect::new(0, 0, xs, ys);
        let mut residuals = Image3S::new(xs, ys);
        shrink_dc(&rect, &dc, &mut residuals);

        // Decoder sees only the residuals.
        let mut decoded = residuals.clone();
        let mut tmp_y = ImageS::new(xs, ys);
        let mut tmp_xz_res = ImageS::new(2 * xs, ys);
        let mut tmp_xz_exp = ImageS::new(2 * xs, ys);
        expand_dc(&rect, &mut decoded, &mut tmp_y, &mut tmp_xz_res, &mut tmp_xz_exp);
        for c in 0..3 {
            for y in 0..ys {
                assert_eq!(
                    orig.plane_row(c, y),
                    decoded.plane_row(c, y),
                    "plane {} row {}",
                    c,
                    y
                );
            }
        }
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        let mut dc = Image3S::new(4, 4);
        for c in 0..3 {
            for y in 0..4 {
                for x in 0..4 {
                    dc.plane_mut(c).set(x, y, if (x + y) % 2 == 0 { i16::MAX } else { i16::MIN });
                }
            }
        }
        let orig = dc.clone();
        let rect = Rect::new(0, 0, 4, 4);
        let mut residuals = Image3S::new(4, 4);
        shrink_dc(&rect, &dc, &mut residuals);
        let mut decoded = residuals.clone();
        let mut tmp_y = ImageS::new(4, 4);
        let mut tmp_xz_res = ImageS::new(8, 4);
        let mut tmp_xz_exp = ImageS::new(8, 4);
        expand_dc(&rect, &mut decoded, &mut tmp_y, &mut tmp_xz_res, &mut tmp_xz_exp);
        for c in 0..3 {
            for y in 0..4 {
                assert_eq!(orig.plane_row(c, y), decoded.plane_row(c, y));
            }
        }
    }
}
