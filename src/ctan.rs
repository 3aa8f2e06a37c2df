//! Cross-channel correlation (ctan)
//!
//! Chroma planes correlate strongly with luminance in the DCT domain. For
//! each tile the encoder votes over all 256 candidate scalars for the one
//! that zeroes out the most B (resp. X) coefficients once the scaled Y
//! coefficient is subtracted, and falls back to the whole-image DC decision
//! unless the tile decision is clearly better. Only two small integer maps
//! and two scalars are transmitted.

use crate::bitstream::{BitReader, BitWriter};
use crate::consts::{BLOCK_SIZE, DEQUANT_MATRIX_DEFAULT, TILE_IN_BLOCKS};
use crate::error::Result;
use crate::image::{Image3F, ImageI};

/// Per-tile Y-to-B and Y-to-X decorrelation scalars plus the DC decisions.
#[derive(Debug, Clone)]
pub struct ColorTransform {
    pub ytob_map: ImageI,
    pub ytox_map: ImageI,
    pub ytob_dc: i32,
    pub ytox_dc: i32,
}

/// Default Y-to-B scalar: mild positive correlation.
const DEFAULT_YTOB: i32 = 120;
/// Default Y-to-X scalar: no correlation (the map is centered at 128).
const DEFAULT_YTOX: i32 = 128;

fn tiles_for(pixels: usize) -> usize {
    pixels.div_ceil(8).div_ceil(TILE_IN_BLOCKS)
}

impl ColorTransform {
    /// Identity transform for an image of the given pixel dimensions.
    #[must_use]
    pub fn new(xsize: usize, ysize: usize) -> Self {
        let tx = tiles_for(xsize);
        let ty = tiles_for(ysize);
        Self {
            ytob_map: ImageI::filled(tx, ty, DEFAULT_YTOB),
            ytox_map: ImageI::filled(tx, ty, DEFAULT_YTOX),
            ytob_dc: DEFAULT_YTOB,
            ytox_dc: DEFAULT_YTOX,
        }
    }

    pub fn encode(&self, writer: &mut BitWriter) {
        writer.write(8, self.ytob_dc as u32);
        writer.write(8, self.ytox_dc as u32);
        for map in [&self.ytob_map, &self.ytox_map] {
            for y in 0..map.ysize() {
                for &v in map.row(y) {
                    writer.write(8, v as u32);
                }
            }
        }
    }

    pub fn decode(reader: &mut BitReader<'_>, xsize: usize, ysize: usize) -> Result<Self> {
        let mut out = Self::new(xsize, ysize);
        out.ytob_dc = reader.read(8)? as i32;
        out.ytox_dc = reader.read(8)? as i32;
        for map in [&mut out.ytob_map, &mut out.ytox_map] {
            for y in 0..map.ysize() {
                for x in 0..map.xsize() {
                    let v = reader.read(8)? as i32;
                    map.set(x, y, v);
                }
            }
        }
        Ok(out)
    }
}

/// Scalar applied to Y before subtraction from B.
#[inline]
#[must_use]
pub fn ytob_factor(k: i32) -> f32 {
    k as f32 / 128.0
}

/// Scalar applied to Y before subtraction from X.
#[inline]
#[must_use]
pub fn ytox_factor(k: i32) -> f32 {
    (k - 128) as f32 / 256.0
}

fn index_of_maximum(counts: &[u32; 256]) -> i32 {
    let mut best = 0usize;
    for (i, &v) in counts.iter().enumerate() {
        if v > counts[best] {
            best = i;
        }
    }
    best as i32
}

/// Tallies, for every candidate, how many coefficients in the window fall
/// below the zeroing threshold. `shift` recenters the candidate (128 for
/// ytox, 0 for ytob). DC slots (offset 0 mod 64) are skipped.
#[allow(clippy::too_many_arguments)]
fn count_zeros(
    dct: &Image3F,
    chroma_plane: usize,
    qm: &[f32; BLOCK_SIZE],
    scale: f32,
    thresh: f32,
    shift: i32,
    x_range: (usize, usize),
    y_range: (usize, usize),
    counts: &mut [u32; 256],
) {
    for y in y_range.0..y_range.1 {
        let row_y = dct.plane_row(1, y);
        let row_c = dct.plane_row(chroma_plane, y);
        for x in x_range.0..x_range.1 {
            if x % BLOCK_SIZE == 0 {
                continue;
            }
            let scaled_c = scale * row_c[x] * qm[x % BLOCK_SIZE];
            let scaled_y = row_y[x] * qm[x % BLOCK_SIZE];
            for (k, count) in counts.iter_mut().enumerate() {
                if (scaled_c - (k as i32 - shift) as f32 * scaled_y).abs() < thresh {
                    *count += 1;
                }
            }
        }
    }
}

fn find_correlation(
    dct: &Image3F,
    chroma_plane: usize,
    scale: f32,
    thresh: f32,
    shift: i32,
    fallback_margin: u32,
    map: &mut ImageI,
    dc: &mut i32,
) {
    let mut qm = [0.0f32; BLOCK_SIZE];
    for (k, q) in qm.iter_mut().enumerate() {
        *q = 1.0 / DEQUANT_MATRIX_DEFAULT[chroma_plane][k];
    }

    let mut global = [0u32; 256];
    count_zeros(
        dct,
        chroma_plane,
        &qm,
        scale,
        thresh,
        shift,
        (0, dct.xsize()),
        (0, dct.ysize()),
        &mut global,
    );
    *dc = index_of_maximum(&global);

    for tile_y in 0..map.ysize() {
        for tile_x in 0..map.xsize() {
            let y0 = tile_y * TILE_IN_BLOCKS;
            let x0 = tile_x * TILE_IN_BLOCKS * BLOCK_SIZE;
            let y1 = (y0 + TILE_IN_BLOCKS).min(dct.ysize());
            let x1 = (x0 + TILE_IN_BLOCKS * BLOCK_SIZE).min(dct.xsize());
            let mut counts = [0u32; 256];
            count_zeros(
                dct,
                chroma_plane,
                &qm,
                scale,
                thresh,
                shift,
                (x0, x1),
                (y0, y1),
                &mut counts,
            );
            let mut best = index_of_maximum(&counts);
            // Revert to the whole-image decision unless the tile is clearly
            // better.
            if counts[best as usize] - counts[*dc as usize] <= fallback_margin {
                best = *dc;
            }
            map.set(tile_x, tile_y, best);
        }
    }
}

/// Finds per-tile and whole-image Y-to-B scalars from a coefficient image.
pub fn find_best_y_to_b_correlation(dct: &Image3F, ytob_map: &mut ImageI, ytob_dc: &mut i32) {
    const Y_TO_B_SCALE: f32 = 128.0;
    const ZERO_THRESH: f32 = Y_TO_B_SCALE * 0.7;
    find_correlation(dct, 2, Y_TO_B_SCALE, ZERO_THRESH, 0, 10, ytob_map, ytob_dc);
}

/// Finds per-tile and whole-image Y-to-X scalars from a coefficient image.
pub fn find_best_y_to_x_correlation(dct: &Image3F, ytox_map: &mut ImageI, ytox_dc: &mut i32) {
    const Y_TO_X_SCALE: f32 = 256.0;
    const ZERO_THRESH: f32 = Y_TO_X_SCALE * 0.65;
    find_correlation(dct, 0, Y_TO_X_SCALE, ZERO_THRESH, 128, 0, ytox_map, ytox_dc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitReader, BitWriter};

    /// Coefficient image with B = k * Y / 128 exactly, DC slots excluded.
    fn synthetic_dct(k: i32, block_rows: usize, block_cols: usize) -> Image3F {
        let mut dct = Image3F::new(block_cols * BLOCK_SIZE, block_rows);
        for y in 0..block_rows {
            for x in 0..dct.xsize() {
                if x % BLOCK_SIZE == 0 {
                    continue;
                }
                let yval = ((x * 13 + y * 7) % 40) as f32 * 10.0 - 200.0;
                dct.plane_row_mut(1, y)[x] = yval * DEQUANT_MATRIX_DEFAULT[2][x % BLOCK_SIZE];
                dct.plane_row_mut(2, y)[x] =
                    k as f32 / 128.0 * yval * DEQUANT_MATRIX_DEFAULT[2][x % BLOCK_SIZE];
            }
        }
        dct
    }

    #[test]
    fn test_exact_correlation_is_recovered() {
        for k in [0, 64, 120, 255] {
            let dct = synthetic_dct(k, 8, 8);
            let mut map = ImageI::new(1, 1);
            let mut dc = 0;
            find_best_y_to_b_correlation(&dct, &mut map, &mut dc);
            assert_eq!(dc, k, "global decision for k = {}", k);
            assert_eq!(map.get(0, 0), k, "tile decision for k = {}", k);
        }
    }

    #[test]
    fn test_tile_falls_back_to_dc_decision() {
        // Zero coefficients give every candidate the same vote count, so the
        // tile cannot beat the whole-image decision by more than the margin.
        let dct = Image3F::new(BLOCK_SIZE * 8, 8);
        let mut map = ImageI::new(1, 1);
        let mut dc = 0;
        find_best_y_to_b_correlation(&dct, &mut map, &mut dc);
        assert_eq!(map.get(0, 0), dc);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut ct = ColorTransform::new(130, 70);
        ct.ytob_dc = 77;
        ct.ytox_dc = 140;
        ct.ytob_map.set(1, 0, 33);
        ct.ytox_map.set(0, 1, 200);
        let mut w = BitWriter::new();
        ct.encode(&mut w);
        let bytes = w.into_bytes();
        let back = ColorTransform::decode(&mut BitReader::new(&bytes), 130, 70).unwrap();
        assert_eq!(back.ytob_dc, 77);
        assert_eq!(back.ytox_dc, 140);
        assert_eq!(back.ytob_map.get(1, 0), 33);
        assert_eq!(back.ytox_map.get(0, 1), 200);
        assert_eq!(back.ytob_map.xsize(), ct.ytob_map.xsize());
    }

    #[test]
    fn test_factors() {
        assert_eq!(ytob_factor(128), 1.0);
        assert_eq!(ytox_factor(128), 0.0);
        assert_eq!(ytox_factor(0), -0.5);
    }
}
