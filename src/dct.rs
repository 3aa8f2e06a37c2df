//! 8x8 transposed scaled DCT
//!
//! The 1-D basis is orthogonal (`A * A^T = I`), so the inverse transform is
//! the transpose and `idct(dct(x)) == x` up to float rounding. Output blocks
//! are written transposed: coefficient `(u, v)` (horizontal frequency `u`)
//! lands at linear offset `u * 8 + v`. Residual scale factors are absorbed
//! into the dequantization matrices, giving `DC = 8 * mean`.

use rayon::prelude::*;
use wide::f32x8;

use crate::consts::{BLOCK_DIM, BLOCK_SIZE};
use crate::image::Image3F;

/// Orthogonal 1-D DCT-II basis, rows indexed by frequency.
#[rustfmt::skip]
const DCT_BASIS: [[f32; 8]; 8] = [
    [0.353553391, 0.353553391, 0.353553391, 0.353553391, 0.353553391, 0.353553391, 0.353553391, 0.353553391],
    [0.490392640, 0.415734806, 0.277785117, 0.097545161, -0.097545161, -0.277785117, -0.415734806, -0.490392640],
    [0.461939766, 0.191341716, -0.191341716, -0.461939766, -0.461939766, -0.191341716, 0.191341716, 0.461939766],
    [0.415734806, -0.097545161, -0.490392640, -0.277785117, 0.277785117, 0.490392640, 0.097545161, -0.415734806],
    [0.353553391, -0.353553391, -0.353553391, 0.353553391, 0.353553391, -0.353553391, -0.353553391, 0.353553391],
    [0.277785117, -0.490392640, 0.097545161, 0.415734806, -0.415734806, -0.097545161, 0.490392640, -0.277785117],
    [0.191341716, -0.461939766, 0.461939766, -0.191341716, -0.191341716, 0.461939766, -0.461939766, 0.191341716],
    [0.097545161, -0.277785117, 0.415734806, -0.490392640, 0.490392640, -0.415734806, 0.277785117, -0.097545161],
];

/// `out[u] = sum_x basis[u][x] * input[x]`, all eight frequencies at once.
#[inline]
fn dct1d(input: &[f32; 8]) -> [f32; 8] {
    let mut acc = f32x8::splat(0.0);
    for (x, &v) in input.iter().enumerate() {
        let col = f32x8::from([
            DCT_BASIS[0][x],
            DCT_BASIS[1][x],
            DCT_BASIS[2][x],
            DCT_BASIS[3][x],
            DCT_BASIS[4][x],
            DCT_BASIS[5][x],
            DCT_BASIS[6][x],
            DCT_BASIS[7][x],
        ]);
        acc += col * f32x8::splat(v);
    }
    acc.to_array()
}

/// `out[x] = sum_u basis[u][x] * input[u]` (the transpose, i.e. the inverse).
#[inline]
fn idct1d(input: &[f32; 8]) -> [f32; 8] {
    let mut acc = f32x8::splat(0.0);
    for (u, &v) in input.iter().enumerate() {
        acc += f32x8::from(DCT_BASIS[u]) * f32x8::splat(v);
    }
    acc.to_array()
}

/// Forward DCT of one row-major 8x8 block into the transposed layout.
pub fn dct8x8(block: &[f32; BLOCK_SIZE], coefs: &mut [f32; BLOCK_SIZE]) {
    // Columns first: tmp[v][x] holds vertical frequency v across columns x.
    let mut tmp = [[0.0f32; 8]; 8];
    for x in 0..BLOCK_DIM {
        let col = [
            block[x],
            block[8 + x],
            block[16 + x],
            block[24 + x],
            block[32 + x],
            block[40 + x],
            block[48 + x],
            block[56 + x],
        ];
        let f = dct1d(&col);
        for v in 0..BLOCK_DIM {
            tmp[v][x] = f[v];
        }
    }
    // Rows second, writing transposed: (u, v) at u * 8 + v.
    for v in 0..BLOCK_DIM {
        let f = dct1d(&tmp[v]);
        for u in 0..BLOCK_DIM {
            coefs[u * 8 + v] = f[u];
        }
    }
}

/// Inverse of `dct8x8`.
pub fn idct8x8(coefs: &[f32; BLOCK_SIZE], block: &mut [f32; BLOCK_SIZE]) {
    let mut tmp = [[0.0f32; 8]; 8];
    for v in 0..BLOCK_DIM {
        let mut freq = [0.0f32; 8];
        for u in 0..BLOCK_DIM {
            freq[u] = coefs[u * 8 + v];
        }
        tmp[v] = idct1d(&freq);
    }
    for x in 0..BLOCK_DIM {
        let col = [
            tmp[0][x],
            tmp[1][x],
            tmp[2][x],
            tmp[3][x],
            tmp[4][x],
            tmp[5][x],
            tmp[6][x],
            tmp[7][x],
        ];
        let s = idct1d(&col);
        for y in 0..BLOCK_DIM {
            block[y * 8 + x] = s[y];
        }
    }
}

/// Transforms every 8x8 block of every plane into the coefficient layout:
/// the output has `xsize = 64 * block_xsize` and one row per block row.
///
/// # Panics
/// Panics if the image dimensions are not multiples of 8.
#[must_use]
pub fn transposed_scaled_dct(img: &Image3F) -> Image3F {
    assert_eq!(img.xsize() % BLOCK_DIM, 0);
    assert_eq!(img.ysize() % BLOCK_DIM, 0);
    let block_xsize = img.xsize() / BLOCK_DIM;
    let block_ysize = img.ysize() / BLOCK_DIM;
    let mut out = Image3F::new(block_xsize * BLOCK_SIZE, block_ysize);
    for c in 0..3 {
        let plane_in = img.plane(c);
        let plane_out = out.plane_mut(c);
        let stride = plane_out.stride;
        plane_out
            .data
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(by, out_row)| {
                let mut block = [0.0f32; BLOCK_SIZE];
                let mut coefs = [0.0f32; BLOCK_SIZE];
                for bx in 0..block_xsize {
                    for dy in 0..BLOCK_DIM {
                        let src = plane_in.row(by * BLOCK_DIM + dy);
                        block[dy * 8..dy * 8 + 8]
                            .copy_from_slice(&src[bx * BLOCK_DIM..bx * BLOCK_DIM + 8]);
                    }
                    dct8x8(&block, &mut coefs);
                    out_row[bx * BLOCK_SIZE..(bx + 1) * BLOCK_SIZE].copy_from_slice(&coefs);
                }
            });
    }
    out
}

/// Inverse of `transposed_scaled_dct`.
#[must_use]
pub fn transposed_scaled_idct(coefs: &Image3F) -> Image3F {
    assert_eq!(coefs.xsize() % BLOCK_SIZE, 0);
    let block_xsize = coefs.xsize() / BLOCK_SIZE;
    let block_ysize = coefs.ysize();
    let mut out = Image3F::new(block_xsize * BLOCK_DIM, block_ysize * BLOCK_DIM);
    for c in 0..3 {
        let plane_in = coefs.plane(c);
        let plane_out = out.plane_mut(c);
        let stride = plane_out.stride;
        plane_out
            .data
            .par_chunks_mut(stride * BLOCK_DIM)
            .enumerate()
            .for_each(|(by, out_rows)| {
                let mut block = [0.0f32; BLOCK_SIZE];
                let mut coefs_block = [0.0f32; BLOCK_SIZE];
                let src = plane_in.row(by);
                for bx in 0..block_xsize {
                    coefs_block.copy_from_slice(&src[bx * BLOCK_SIZE..(bx + 1) * BLOCK_SIZE]);
                    idct8x8(&coefs_block, &mut block);
                    for dy in 0..BLOCK_DIM {
                        out_rows[dy * stride + bx * BLOCK_DIM..dy * stride + bx * BLOCK_DIM + 8]
                            .copy_from_slice(&block[dy * 8..dy * 8 + 8]);
                    }
                }
            });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_is_dc_only() {
        let block = [0.25f32; BLOCK_SIZE];
        let mut coefs = [0.0f32; BLOCK_SIZE];
        dct8x8(&block, &mut coefs);
        assert!((coefs[0] - 8.0 * 0.25).abs() < 1e-5, "DC = {}", coefs[0]);
        for (k, &c) in coefs.iter().enumerate().skip(1) {
            assert!(c.abs() < 1e-5, "AC[{}] = {}", k, c);
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let mut block = [0.0f32; BLOCK_SIZE];
        for (i, v) in block.iter_mut().enumerate() {
            *v = ((i * 7919) % 100) as f32 / 100.0 - 0.5;
        }
        let mut coefs = [0.0f32; BLOCK_SIZE];
        let mut back = [0.0f32; BLOCK_SIZE];
        dct8x8(&block, &mut coefs);
        idct8x8(&coefs, &mut back);
        for i in 0..BLOCK_SIZE {
            assert!(
                (block[i] - back[i]).abs() < 1e-5,
                "index {}: {} vs {}",
                i, block[i], back[i]
            );
        }
    }

    #[test]
    fn test_horizontal_edge_lands_in_column_frequencies() {
        // A block varying only along x must excite only v == 0 coefficients.
        let mut block = [0.0f32; BLOCK_SIZE];
        for y in 0..8 {
            for x in 0..8 {
                block[y * 8 + x] = if x < 4 { -0.5 } else { 0.5 };
            }
        }
        let mut coefs = [0.0f32; BLOCK_SIZE];
        dct8x8(&block, &mut coefs);
        for u in 0..8 {
            for v in 1..8 {
                assert!(
                    coefs[u * 8 + v].abs() < 1e-5,
                    "(u={}, v={}) = {}",
                    u, v, coefs[u * 8 + v]
                );
            }
        }
        assert!(coefs[8].abs() > 0.1, "fundamental missing");
    }

    #[test]
    fn test_image_roundtrip() {
        let mut img = Image3F::new(24, 16);
        for c in 0..3 {
            for y in 0..16 {
                for x in 0..24 {
                    img.plane_row_mut(c, y)[x] =
                        ((x * 31 + y * 17 + c * 7) % 64) as f32 / 64.0 - 0.5;
                }
            }
        }
        let coefs = transposed_scaled_dct(&img);
        assert_eq!(coefs.xsize(), 3 * BLOCK_SIZE);
        assert_eq!(coefs.ysize(), 2);
        let back = transposed_scaled_idct(&coefs);
        for c in 0..3 {
            for y in 0..16 {
                for x in 0..24 {
                    let a = img.plane_row(c, y)[x];
                    let b = back.plane_row(c, y)[x];
                    assert!((a - b).abs() < 1e-4, "plane {} ({},{}): {} vs {}", c, x, y, a, b);
                }
            }
        }
    }
}
