//! Coefficient computation and image reconstruction
//!
//! `compute_coefficients` runs the forward transform, removes the Y
//! correlation from the chroma planes per tile, and quantizes; DC and AC are
//! carried separately. `recon_opsin_image` is the exact mirror and is shared
//! by the encoder's control loop and the decoder, so the loop always
//! measures what the decoder will actually produce.

use crate::consts::{BLOCK_DIM, BLOCK_SIZE, TILE_IN_BLOCKS};
use crate::ctan::{ytob_factor, ytox_factor, ColorTransform};
use crate::dct::{transposed_scaled_dct, transposed_scaled_idct};
use crate::entropy::compute_block_context;
use crate::gaborish::convolve_gaborish;
use crate::header::{Header, FLAG_GABORISH, FLAG_SMOOTH_DC_PRED};
use crate::image::{Image3B, Image3F, Image3S, ImageF};
use crate::quantizer::Quantizer;

/// Quantized transform output plus the derived block contexts.
#[derive(Debug, Clone)]
pub struct QuantizedCoeffs {
    /// Per-block quantized DC, one value per block.
    pub dc: Image3S,
    /// Quantized AC coefficients in block layout; the DC slot mirrors `dc`.
    pub ac: Image3S,
    /// Per-channel block coding contexts, derived from `dc`.
    pub block_ctx: Image3B,
}

impl QuantizedCoeffs {
    /// Zeroed coefficients for a block grid, contexts not yet derived.
    #[must_use]
    pub fn new(block_xsize: usize, block_ysize: usize) -> Self {
        Self {
            dc: Image3S::new(block_xsize, block_ysize),
            ac: Image3S::new(block_xsize * BLOCK_SIZE, block_ysize),
            block_ctx: Image3B::new(block_xsize, block_ysize),
        }
    }
}

#[inline]
fn quantize(value: f32, step: f32) -> i16 {
    ((value / step).round() as i32).clamp(-32767, 32767) as i16
}

#[inline]
fn tile_of(block: usize) -> usize {
    block / TILE_IN_BLOCKS
}

/// Transforms and quantizes a centered opsin image.
///
/// Luminance is quantized first; its dequantized coefficients are what the
/// tile correlation scalars subtract from the chroma planes, matching the
/// decoder exactly.
#[must_use]
pub fn compute_coefficients(
    opsin: &Image3F,
    quantizer: &Quantizer,
    ctan: &ColorTransform,
) -> QuantizedCoeffs {
    let dct = transposed_scaled_dct(opsin);
    let block_xsize = dct.xsize() / BLOCK_SIZE;
    let block_ysize = dct.ysize();
    let mut out = QuantizedCoeffs::new(block_xsize, block_ysize);

    // Dequantized Y coefficients, needed for the chroma subtraction.
    let mut y_deq = ImageF::new(dct.xsize(), dct.ysize());
    for by in 0..block_ysize {
        let coef_row = dct.plane_row(1, by);
        let raw_row = quantizer.raw_quant_field().row(by);
        let deq_row = y_deq.row_mut(by);
        let ac_row = out.ac.plane_row_mut(1, by);
        let dc_row = out.dc.plane_row_mut(1, by);
        for bx in 0..block_xsize {
            let base = bx * BLOCK_SIZE;
            let dc_step = quantizer.dc_step(1);
            let dc_q = quantize(coef_row[base], dc_step);
            dc_row[bx] = dc_q;
            ac_row[base] = dc_q;
            deq_row[base] = f32::from(dc_q) * dc_step;
            for k in 1..BLOCK_SIZE {
                let step = quantizer.ac_step(1, k, raw_row[bx]);
                let q = quantize(coef_row[base + k], step);
                ac_row[base + k] = q;
                deq_row[base + k] = f32::from(q) * step;
            }
        }
    }

    // Chroma planes code the residual against scaled Y.
    for (c, map, dc_scalar, factor) in [
        (0usize, &ctan.ytox_map, ctan.ytox_dc, ytox_factor as fn(i32) -> f32),
        (2usize, &ctan.ytob_map, ctan.ytob_dc, ytob_factor as fn(i32) -> f32),
    ] {
        for by in 0..block_ysize {
            let coef_row = dct.plane_row(c, by);
            let raw_row = quantizer.raw_quant_field().row(by);
            let deq_row = y_deq.row(by);
            let map_row = map.row(tile_of(by).min(map.ysize() - 1));
            let ac_row = out.ac.plane_row_mut(c, by);
            let dc_row = out.dc.plane_row_mut(c, by);
            for bx in 0..block_xsize {
                let base = bx * BLOCK_SIZE;
                let tile_k = map_row[tile_of(bx).min(map_row.len() - 1)];
                let dc_step = quantizer.dc_step(c);
                let dc_residual = coef_row[base] - factor(dc_scalar) * deq_row[base];
                let dc_q = quantize(dc_residual, dc_step);
                dc_row[bx] = dc_q;
                ac_row[base] = dc_q;
                for k in 1..BLOCK_SIZE {
                    let step = quantizer.ac_step(c, k, raw_row[bx]);
                    let residual = coef_row[base + k] - factor(tile_k) * deq_row[base + k];
                    ac_row[base + k] = quantize(residual, step);
                }
            }
        }
    }

    out.block_ctx = compute_block_context(&out.dc);
    out
}

/// Dequantizes one channel into coefficient space, adding back the scaled Y
/// for the chroma planes.
fn dequantize_channel(
    c: usize,
    qcoeffs: &QuantizedCoeffs,
    quantizer: &Quantizer,
    ctan: &ColorTransform,
    y_deq: Option<&ImageF>,
    out: &mut ImageF,
) {
    let block_xsize = qcoeffs.dc.xsize();
    let (map, dc_scalar, factor): (Option<&crate::image::ImageI>, i32, fn(i32) -> f32) = match c {
        0 => (Some(&ctan.ytox_map), ctan.ytox_dc, ytox_factor),
        2 => (Some(&ctan.ytob_map), ctan.ytob_dc, ytob_factor),
        _ => (None, 0, ytox_factor),
    };
    for by in 0..qcoeffs.dc.ysize() {
        let ac_row = qcoeffs.ac.plane_row(c, by);
        let raw_row = quantizer.raw_quant_field().row(by);
        let dst = out.row_mut(by);
        for bx in 0..block_xsize {
            let base = bx * BLOCK_SIZE;
            let dc_step = quantizer.dc_step(c);
            dst[base] = f32::from(ac_row[base]) * dc_step;
            for k in 1..BLOCK_SIZE {
                let step = quantizer.ac_step(c, k, raw_row[bx]);
                dst[base + k] = f32::from(ac_row[base + k]) * step;
            }
            if let (Some(map), Some(y_deq)) = (map, y_deq) {
                let map_row = map.row(tile_of(by).min(map.ysize() - 1));
                let tile_k = map_row[tile_of(bx).min(map_row.len() - 1)];
                let y_row = y_deq.row(by);
                dst[base] += factor(dc_scalar) * y_row[base];
                for k in 1..BLOCK_SIZE {
                    dst[base + k] += factor(tile_k) * y_row[base + k];
                }
            }
        }
    }
}

/// Replaces the constant-per-block DC contribution with a mean-preserving
/// bilinear surface between block centers.
fn smooth_dc_surface(dc_plane: &crate::image::ImageS, dc_step: f32, pixels: &mut ImageF) {
    let (bx, by) = (dc_plane.xsize(), dc_plane.ysize());
    let (xsize, ysize) = (pixels.xsize(), pixels.ysize());
    // Interpolated surface in pixel units (values are idct DC levels / 8).
    let mut surface = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let fy = (y as f32 + 0.5) / BLOCK_DIM as f32 - 0.5;
        let y0 = (fy.floor().max(0.0) as usize).min(by - 1);
        let y1 = (y0 + 1).min(by - 1);
        let wy = (fy - fy.floor()).clamp(0.0, 1.0);
        let row = surface.row_mut(y);
        for (x, v) in row.iter_mut().enumerate() {
            let fx = (x as f32 + 0.5) / BLOCK_DIM as f32 - 0.5;
            let x0 = (fx.floor().max(0.0) as usize).min(bx - 1);
            let x1 = (x0 + 1).min(bx - 1);
            let wx = (fx - fx.floor()).clamp(0.0, 1.0);
            let d00 = f32::from(dc_plane.get(x0, y0));
            let d10 = f32::from(dc_plane.get(x1, y0));
            let d01 = f32::from(dc_plane.get(x0, y1));
            let d11 = f32::from(dc_plane.get(x1, y1));
            let interp = d00 * (1.0 - wx) * (1.0 - wy)
                + d10 * wx * (1.0 - wy)
                + d01 * (1.0 - wx) * wy
                + d11 * wx * wy;
            *v = interp * dc_step / BLOCK_DIM as f32;
        }
    }
    // Per block: swap the flat DC level for the surface, preserving the mean
    // so the coded DC stays authoritative.
    for block_y in 0..by {
        for block_x in 0..bx {
            let mut mean = 0.0f32;
            for dy in 0..BLOCK_DIM {
                let row = surface.row(block_y * BLOCK_DIM + dy);
                for dx in 0..BLOCK_DIM {
                    mean += row[block_x * BLOCK_DIM + dx];
                }
            }
            mean /= BLOCK_SIZE as f32;
            // The flat level is already present from the IDCT; only the
            // zero-mean ripple of the surface is added.
            for dy in 0..BLOCK_DIM {
                let src = surface.row(block_y * BLOCK_DIM + dy);
                let dst = pixels.row_mut(block_y * BLOCK_DIM + dy);
                for dx in 0..BLOCK_DIM {
                    let x = block_x * BLOCK_DIM + dx;
                    dst[x] += src[x] - mean;
                }
            }
        }
    }
}

/// Reconstructs the centered opsin image from quantized coefficients.
#[must_use]
pub fn recon_opsin_image(
    header: &Header,
    qcoeffs: &QuantizedCoeffs,
    quantizer: &Quantizer,
    ctan: &ColorTransform,
) -> Image3F {
    let block_xsize = qcoeffs.dc.xsize();
    let block_ysize = qcoeffs.dc.ysize();
    let mut coefs = Image3F::new(block_xsize * BLOCK_SIZE, block_ysize);

    let mut y_deq = ImageF::new(coefs.xsize(), coefs.ysize());
    dequantize_channel(1, qcoeffs, quantizer, ctan, None, &mut y_deq);
    for by in 0..block_ysize {
        coefs.plane_row_mut(1, by).copy_from_slice(y_deq.row(by));
    }
    {
        let mut plane = ImageF::new(coefs.xsize(), coefs.ysize());
        dequantize_channel(0, qcoeffs, quantizer, ctan, Some(&y_deq), &mut plane);
        for by in 0..block_ysize {
            coefs.plane_row_mut(0, by).copy_from_slice(plane.row(by));
        }
        dequantize_channel(2, qcoeffs, quantizer, ctan, Some(&y_deq), &mut plane);
        for by in 0..block_ysize {
            coefs.plane_row_mut(2, by).copy_from_slice(plane.row(by));
        }
    }

    let mut opsin = transposed_scaled_idct(&coefs);

    if header.has(FLAG_SMOOTH_DC_PRED) {
        for c in 0..3 {
            let dc_step = quantizer.dc_step(c);
            let mut plane = opsin.plane(c).clone();
            smooth_dc_surface(qcoeffs.dc.plane(c), dc_step, &mut plane);
            *opsin.plane_mut(c) = plane;
        }
    }

    if header.has(FLAG_GABORISH) {
        convolve_gaborish(&mut opsin);
    }

    opsin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageS;
    use crate::types::QuantTemplate;

    fn test_setup(xsize: usize, ysize: usize) -> (Image3F, Quantizer, ColorTransform) {
        let mut opsin = Image3F::new(xsize, ysize);
        for c in 0..3 {
            for y in 0..ysize {
                for x in 0..xsize {
                    let v = ((x * 3 + y * 5 + c * 11) % 32) as f32 / 64.0 - 0.25;
                    opsin.plane_mut(c).set(x, y, v * 0.4);
                }
            }
        }
        let mut quantizer = Quantizer::new(QuantTemplate::Hq, xsize / 8, ysize / 8);
        quantizer.set_quant(4.0);
        let ctan = ColorTransform::new(xsize, ysize);
        (opsin, quantizer, ctan)
    }

    #[test]
    fn test_coefficients_roundtrip_accuracy() {
        let (opsin, quantizer, ctan) = test_setup(32, 24);
        let qcoeffs = compute_coefficients(&opsin, &quantizer, &ctan);
        let header = Header::default();
        let recon = recon_opsin_image(&header, &qcoeffs, &quantizer, &ctan);
        let mut max_err = 0.0f32;
        for c in 0..3 {
            for y in 0..24 {
                for x in 0..32 {
                    let err = (recon.plane_row(c, y)[x] - opsin.plane_row(c, y)[x]).abs();
                    max_err = max_err.max(err);
                }
            }
        }
        // At quant 4.0 the HQ steps keep the error well below one Y step.
        assert!(max_err < 0.02, "max reconstruction error {}", max_err);
    }

    #[test]
    fn test_flat_image_quantizes_to_dc_only() {
        let mut opsin = Image3F::new(16, 16);
        opsin.plane_mut(1).fill(0.123);
        let mut quantizer = Quantizer::new(QuantTemplate::Default, 2, 2);
        quantizer.set_quant(1.0);
        let ctan = ColorTransform::new(16, 16);
        let qcoeffs = compute_coefficients(&opsin, &quantizer, &ctan);
        for by in 0..2 {
            for bx in 0..2 {
                for k in 1..BLOCK_SIZE {
                    assert_eq!(
                        qcoeffs.ac.plane_row(1, by)[bx * BLOCK_SIZE + k],
                        0,
                        "AC {} must be zero for a flat plane",
                        k
                    );
                }
            }
            assert_ne!(qcoeffs.dc.plane_row(1, by)[0], 0);
        }
    }

    #[test]
    fn test_exact_ctan_correlation_zeroes_chroma() {
        // B exactly proportional to Y: with the matching ytob scalar the
        // B residual quantizes to zero except DC.
        let mut opsin = Image3F::new(16, 8);
        for y in 0..8 {
            for x in 0..16 {
                let v = ((x * 7 + y * 3) % 16) as f32 / 40.0;
                opsin.plane_mut(1).set(x, y, v);
                opsin.plane_mut(2).set(x, y, v); // k = 128: B = Y
            }
        }
        let mut quantizer = Quantizer::new(QuantTemplate::Default, 2, 1);
        quantizer.set_quant(4.0);
        let mut ctan = ColorTransform::new(16, 8);
        ctan.ytob_dc = 128;
        ctan.ytob_map.fill(128);
        let qcoeffs = compute_coefficients(&opsin, &quantizer, &ctan);
        let mut nonzero = 0;
        for bx in 0..2 {
            for k in 1..BLOCK_SIZE {
                if qcoeffs.ac.plane_row(2, 0)[bx * BLOCK_SIZE + k] != 0 {
                    nonzero += 1;
                }
            }
        }
        // Quantization of Y introduces tiny residuals at most.
        assert!(nonzero <= 4, "{} nonzero B coefficients", nonzero);

        let header = Header::default();
        let recon = recon_opsin_image(&header, &qcoeffs, &quantizer, &ctan);
        for y in 0..8 {
            for x in 0..16 {
                let err = (recon.plane_row(2, y)[x] - opsin.plane_row(2, y)[x]).abs();
                assert!(err < 0.02, "B error {} at ({},{})", err, x, y);
            }
        }
    }

    #[test]
    fn test_smooth_dc_preserves_block_means() {
        let mut dc = ImageS::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                dc.set(x, y, (x * 40 + y * 10) as i16);
            }
        }
        let dc_step = 0.01f32;
        let mut pixels = ImageF::new(24, 24);
        // Start from the flat IDCT levels.
        for by in 0..3 {
            for bx in 0..3 {
                let flat = f32::from(dc.get(bx, by)) * dc_step / 8.0;
                for dy in 0..8 {
                    for dx in 0..8 {
                        pixels.set(bx * 8 + dx, by * 8 + dy, flat);
                    }
                }
            }
        }
        let before_mean: Vec<f32> = (0..9)
            .map(|i| {
                let (bx, by) = (i % 3, i / 3);
                let mut m = 0.0;
                for dy in 0..8 {
                    for dx in 0..8 {
                        m += pixels.get(bx * 8 + dx, by * 8 + dy);
                    }
                }
                m / 64.0
            })
            .collect();
        smooth_dc_surface(&dc, dc_step, &mut pixels);
        for (i, &expected) in before_mean.iter().enumerate() {
            let (bx, by) = (i % 3, i / 3);
            let mut m = 0.0;
            for dy in 0..8 {
                for dx in 0..8 {
                    m += pixels.get(bx * 8 + dx, by * 8 + dy);
                }
            }
            m /= 64.0;
            assert!((m - expected).abs() < 1e-5, "block {} mean {} vs {}", i, m, expected);
        }
        // The interior is no longer constant per block.
        assert!((pixels.get(11, 12) - pixels.get(12, 12)).abs() > 1e-7);
    }
}
