//! Opsin color transform
//!
//! Linear RGB is pushed through a cone absorbance matrix, a signed cube root
//! per channel, and a scaled opponent mix into XYB: X is red-minus-green, Y
//! is brightness, B is blue. The inverse undoes the scaled mix, cubes, and
//! applies the stored inverse matrix. Coding happens on centered values;
//! `centered_opsin_to_srgb` restores the center, inverts, and quantizes to
//! bytes.

use rayon::prelude::*;

use crate::consts::{
    INVERSE_OPSIN_ABSORBANCE_MATRIX, OPSIN_ABSORBANCE_MATRIX, OPSIN_SCALE_G, OPSIN_SCALE_R,
    SRGB8_TO_LINEAR, XYB_CENTER,
};
use crate::image::{Image3B, Image3F};

/// sRGB transfer function, byte to linear.
#[inline]
#[must_use]
pub fn srgb8_to_linear(v: u8) -> f32 {
    SRGB8_TO_LINEAR[v as usize]
}

/// Linear intensity to the sRGB byte domain (unclamped float).
#[inline]
#[must_use]
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn signed_cbrt(v: f32) -> f32 {
    if v < 0.0 {
        -(-v).cbrt()
    } else {
        v.cbrt()
    }
}

#[inline]
fn signed_cube(v: f32) -> f32 {
    if v < 0.0 {
        -(-v).powi(3)
    } else {
        v.powi(3)
    }
}

/// Linear RGB to XYB, one pixel.
#[inline]
#[must_use]
pub fn linear_to_xyb(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let m = &OPSIN_ABSORBANCE_MATRIX;
    let mixed_r = signed_cbrt(m[0] * r + m[1] * g + m[2] * b);
    let mixed_g = signed_cbrt(m[3] * r + m[4] * g + m[5] * b);
    let mixed_b = signed_cbrt(m[6] * r + m[7] * g + m[8] * b);

    (
        (OPSIN_SCALE_R * mixed_r - OPSIN_SCALE_G * mixed_g) * 0.5,
        (OPSIN_SCALE_R * mixed_r + OPSIN_SCALE_G * mixed_g) * 0.5,
        mixed_b,
    )
}

/// XYB back to linear RGB, one pixel.
#[inline]
#[must_use]
pub fn xyb_to_linear(x: f32, y: f32, b: f32) -> (f32, f32, f32) {
    let mixed_r = signed_cube((y + x) / OPSIN_SCALE_R);
    let mixed_g = signed_cube((y - x) / OPSIN_SCALE_G);
    let mixed_b = signed_cube(b);

    let m = &INVERSE_OPSIN_ABSORBANCE_MATRIX;
    (
        m[0] * mixed_r + m[1] * mixed_g + m[2] * mixed_b,
        m[3] * mixed_r + m[4] * mixed_g + m[5] * mixed_b,
        m[6] * mixed_r + m[7] * mixed_g + m[8] * mixed_b,
    )
}

/// Converts sRGB bytes to the opsin XYB representation.
#[must_use]
pub fn opsin_dynamics_image(srgb: &Image3B) -> Image3F {
    let (xsize, ysize) = (srgb.xsize(), srgb.ysize());
    let mut opsin = Image3F::new(xsize, ysize);
    let (px, py, pb) = opsin.planes_mut();
    let stride = px.stride;
    px.data
        .par_chunks_mut(stride)
        .zip(py.data.par_chunks_mut(stride))
        .zip(pb.data.par_chunks_mut(stride))
        .enumerate()
        .for_each(|(y, ((row_x, row_y), row_b))| {
            let row_r = srgb.plane_row(0, y);
            let row_g = srgb.plane_row(1, y);
            let row_bl = srgb.plane_row(2, y);
            for ix in 0..xsize {
                let (x, yy, b) = linear_to_xyb(
                    srgb8_to_linear(row_r[ix]),
                    srgb8_to_linear(row_g[ix]),
                    srgb8_to_linear(row_bl[ix]),
                );
                row_x[ix] = x;
                row_y[ix] = yy;
                row_b[ix] = b;
            }
        });
    opsin
}

/// Converts a linear RGB image to opsin XYB.
#[must_use]
pub fn opsin_dynamics_image_linear(linear: &Image3F) -> Image3F {
    let (xsize, ysize) = (linear.xsize(), linear.ysize());
    let mut opsin = Image3F::new(xsize, ysize);
    for y in 0..ysize {
        for ix in 0..xsize {
            let (x, yy, b) = linear_to_xyb(
                linear.plane_row(0, y)[ix],
                linear.plane_row(1, y)[ix],
                linear.plane_row(2, y)[ix],
            );
            opsin.plane_row_mut(0, y)[ix] = x;
            opsin.plane_row_mut(1, y)[ix] = yy;
            opsin.plane_row_mut(2, y)[ix] = b;
        }
    }
    opsin
}

/// Converts an (uncentered) opsin image back to linear RGB.
#[must_use]
pub fn linear_from_opsin(opsin: &Image3F) -> Image3F {
    let (xsize, ysize) = (opsin.xsize(), opsin.ysize());
    let mut linear = Image3F::new(xsize, ysize);
    for y in 0..ysize {
        for ix in 0..xsize {
            let (r, g, b) = xyb_to_linear(
                opsin.plane_row(0, y)[ix],
                opsin.plane_row(1, y)[ix],
                opsin.plane_row(2, y)[ix],
            );
            linear.plane_row_mut(0, y)[ix] = r;
            linear.plane_row_mut(1, y)[ix] = g;
            linear.plane_row_mut(2, y)[ix] = b;
        }
    }
    linear
}

/// Subtracts the gamut center so coded values straddle zero.
pub fn center_opsin_values(opsin: &mut Image3F) {
    for c in 0..3 {
        let center = XYB_CENTER[c];
        let plane = opsin.plane_mut(c);
        for y in 0..plane.ysize() {
            for v in plane.row_mut(y) {
                *v -= center;
            }
        }
    }
}

/// 4x4 ordered-dither offsets in byte units, zero mean.
#[rustfmt::skip]
const DITHER_OFFSETS: [f32; 16] = [
    -0.46875, 0.03125, -0.34375, 0.15625,
    0.28125, -0.21875, 0.40625, -0.09375,
    -0.28125, 0.21875, -0.40625, 0.09375,
    0.46875, -0.03125, 0.34375, -0.15625,
];

/// Converts a centered opsin image to sRGB bytes, optionally dithering the
/// byte quantization.
pub fn centered_opsin_to_srgb(opsin: &Image3F, dither: bool, srgb: &mut Image3B) {
    let (xsize, ysize) = (opsin.xsize(), opsin.ysize());
    debug_assert_eq!(srgb.xsize(), xsize);
    debug_assert_eq!(srgb.ysize(), ysize);
    for y in 0..ysize {
        for ix in 0..xsize {
            let (r, g, b) = xyb_to_linear(
                opsin.plane_row(0, y)[ix] + XYB_CENTER[0],
                opsin.plane_row(1, y)[ix] + XYB_CENTER[1],
                opsin.plane_row(2, y)[ix] + XYB_CENTER[2],
            );
            let offset = if dither {
                DITHER_OFFSETS[(y % 4) * 4 + ix % 4]
            } else {
                0.0
            };
            for (c, v) in [r, g, b].into_iter().enumerate() {
                let byte = (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0 + offset).round();
                srgb.plane_row_mut(c, y)[ix] = byte.clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_table_matches_transfer() {
        for v in 0..=255u8 {
            let linear = srgb8_to_linear(v);
            let back = (linear_to_srgb(linear) * 255.0).round() as i32;
            assert!((back - i32::from(v)).abs() <= 1, "byte {} -> {}", v, back);
        }
    }

    #[test]
    fn test_opsin_roundtrip_within_two_levels() {
        for r in (0..=255).step_by(17) {
            for g in (0..=255).step_by(17) {
                for b in (0..=255).step_by(17) {
                    let (x, y, z) = linear_to_xyb(
                        srgb8_to_linear(r as u8),
                        srgb8_to_linear(g as u8),
                        srgb8_to_linear(b as u8),
                    );
                    let (lr, lg, lb) = xyb_to_linear(x, y, z);
                    for (orig, lin) in [(r, lr), (g, lg), (b, lb)] {
                        let back = (linear_to_srgb(lin.clamp(0.0, 1.0)) * 255.0).round() as i32;
                        assert!(
                            (back - orig as i32).abs() <= 2,
                            "({},{},{}) channel {} -> {}",
                            r, g, b, orig, back
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_gray_has_near_zero_x() {
        // The opponent scales differ slightly, so gray keeps a residual X
        // bounded by (scale_r - scale_g) / 2.
        for gray in [0u8, 64, 128, 192, 255] {
            let v = srgb8_to_linear(gray);
            let (x, _, _) = linear_to_xyb(v, v, v);
            assert!(x.abs() < 2e-3, "X = {} for gray {}", x, gray);
        }
    }

    #[test]
    fn test_center_straddles_zero() {
        let mut img = Image3F::new(2, 1);
        for c in 0..3 {
            let (x, y, b) = linear_to_xyb(0.0, 0.0, 0.0);
            img.plane_row_mut(c, 0)[0] = [x, y, b][c];
            let (x, y, b) = linear_to_xyb(1.0, 1.0, 1.0);
            img.plane_row_mut(c, 0)[1] = [x, y, b][c];
        }
        center_opsin_values(&mut img);
        // Black and white must land on opposite sides of zero in Y.
        assert!(img.plane_row(1, 0)[0] < 0.0);
        assert!(img.plane_row(1, 0)[1] > 0.0);
    }

    #[test]
    fn test_centered_roundtrip_image() {
        let mut srgb = Image3B::new(4, 4);
        for c in 0..3 {
            for y in 0..4 {
                for x in 0..4 {
                    srgb.plane_row_mut(c, y)[x] = (40 * (c + 1) + 16 * x + 4 * y) as u8;
                }
            }
        }
        let mut opsin = opsin_dynamics_image(&srgb);
        center_opsin_values(&mut opsin);
        let mut back = Image3B::new(4, 4);
        centered_opsin_to_srgb(&opsin, false, &mut back);
        for c in 0..3 {
            for y in 0..4 {
                for x in 0..4 {
                    let a = i32::from(srgb.plane_row(c, y)[x]);
                    let b = i32::from(back.plane_row(c, y)[x]);
                    assert!((a - b).abs() <= 2, "plane {} ({},{}): {} vs {}", c, x, y, a, b);
                }
            }
        }
    }
}
