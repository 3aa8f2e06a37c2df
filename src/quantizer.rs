//! Quantizer state and dequantization matrices
//!
//! The per-block AC quant field and the scalar DC step are kept in integer
//! raw units of 1/64 so encoder and decoder agree exactly. The float field
//! driven by the control loop is converted through `set_quant_field`, which
//! doubles as the loop's fixed-point detector.

use crate::bitstream::{BitReader, BitWriter};
use crate::consts::{
    BLOCK_SIZE, DC_DEQUANT_DEFAULT, DC_DEQUANT_HQ, DEQUANT_MATRIX_DEFAULT, DEQUANT_MATRIX_HQ,
};
use crate::error::{Error, Result};
use crate::image::{ImageF, ImageI};
use crate::types::QuantTemplate;

/// Raw integer units per 1.0 of quant field value.
pub const QUANT_FIELD_UNITS: f32 = 64.0;

// Residuals of raw values are entropy coded in 15-bit magnitude classes.
const MAX_RAW_QUANT: i32 = 0x7fff;

/// Returns the AC dequantization matrix for a template and channel.
#[inline]
#[must_use]
pub fn dequant_matrix(template: QuantTemplate, c: usize) -> &'static [f32; BLOCK_SIZE] {
    match template {
        QuantTemplate::Default => &DEQUANT_MATRIX_DEFAULT[c],
        QuantTemplate::Hq => &DEQUANT_MATRIX_HQ[c],
    }
}

#[inline]
fn dc_dequant(template: QuantTemplate, c: usize) -> f32 {
    match template {
        QuantTemplate::Default => DC_DEQUANT_DEFAULT[c],
        QuantTemplate::Hq => DC_DEQUANT_HQ[c],
    }
}

fn quantize_field_value(q: f32) -> i32 {
    ((q * QUANT_FIELD_UNITS).round() as i32).clamp(1, MAX_RAW_QUANT)
}

/// Per-image quantization state.
#[derive(Debug, Clone)]
pub struct Quantizer {
    template: QuantTemplate,
    raw_dc: i32,
    raw_quant_field: ImageI,
}

impl Quantizer {
    /// Creates a quantizer with a uniform 1.0 field.
    #[must_use]
    pub fn new(template: QuantTemplate, block_xsize: usize, block_ysize: usize) -> Self {
        Self {
            template,
            raw_dc: QUANT_FIELD_UNITS as i32,
            raw_quant_field: ImageI::filled(block_xsize, block_ysize, QUANT_FIELD_UNITS as i32),
        }
    }

    #[inline]
    #[must_use]
    pub fn template(&self) -> QuantTemplate {
        self.template
    }

    #[inline]
    #[must_use]
    pub fn block_xsize(&self) -> usize {
        self.raw_quant_field.xsize()
    }

    #[inline]
    #[must_use]
    pub fn block_ysize(&self) -> usize {
        self.raw_quant_field.ysize()
    }

    #[inline]
    #[must_use]
    pub fn raw_dc(&self) -> i32 {
        self.raw_dc
    }

    #[inline]
    #[must_use]
    pub fn raw_quant_field(&self) -> &ImageI {
        &self.raw_quant_field
    }

    /// Direct access for the AC decoder, which reconstructs the field from
    /// the token stream.
    pub fn raw_quant_field_mut(&mut self) -> &mut ImageI {
        &mut self.raw_quant_field
    }

    /// Effective global step multiplier; grows as quality drops.
    #[must_use]
    pub fn scale(&self) -> f32 {
        QUANT_FIELD_UNITS / self.raw_dc as f32
    }

    /// Sets a uniform quant value for DC and every block.
    pub fn set_quant(&mut self, q: f32) -> bool {
        let raw = quantize_field_value(q);
        let mut changed = self.raw_dc != raw;
        self.raw_dc = raw;
        for y in 0..self.raw_quant_field.ysize() {
            for v in self.raw_quant_field.row_mut(y) {
                if *v != raw {
                    *v = raw;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Installs a DC quant and a per-block AC field. Returns whether any raw
    /// value actually changed, which the control loop uses as its fixed-point
    /// detector.
    pub fn set_quant_field(&mut self, quant_dc: f32, field: &ImageF) -> bool {
        assert_eq!(field.xsize(), self.raw_quant_field.xsize());
        assert_eq!(field.ysize(), self.raw_quant_field.ysize());
        let raw_dc = quantize_field_value(quant_dc);
        let mut changed = self.raw_dc != raw_dc;
        self.raw_dc = raw_dc;
        for y in 0..field.ysize() {
            let src = field.row(y);
            let dst = self.raw_quant_field.row_mut(y);
            for x in 0..field.xsize() {
                let raw = quantize_field_value(src[x]);
                if dst[x] != raw {
                    dst[x] = raw;
                    changed = true;
                }
            }
        }
        changed
    }

    /// The float view of the current state, for search restarts.
    #[must_use]
    pub fn get_quant_field(&self) -> (f32, ImageF) {
        let mut field = ImageF::new(self.block_xsize(), self.block_ysize());
        for y in 0..field.ysize() {
            let src = self.raw_quant_field.row(y);
            let dst = field.row_mut(y);
            for x in 0..src.len() {
                dst[x] = src[x] as f32 / QUANT_FIELD_UNITS;
            }
        }
        (self.raw_dc as f32 / QUANT_FIELD_UNITS, field)
    }

    /// Dequantization step of AC coefficient `k` in channel `c` for a block
    /// with raw quant `raw_q`.
    #[inline]
    #[must_use]
    pub fn ac_step(&self, c: usize, k: usize, raw_q: i32) -> f32 {
        dequant_matrix(self.template, c)[k] * QUANT_FIELD_UNITS / raw_q as f32
    }

    /// Dequantization step of the DC coefficient in channel `c`.
    #[inline]
    #[must_use]
    pub fn dc_step(&self, c: usize) -> f32 {
        dc_dequant(self.template, c) * QUANT_FIELD_UNITS / self.raw_dc as f32
    }

    /// Writes the scalar quantizer state; the field travels with the AC
    /// token stream.
    pub fn encode(&self, writer: &mut BitWriter) {
        writer.write(16, self.raw_dc as u32);
    }

    /// Reads the scalar state written by `encode`.
    pub fn decode(
        reader: &mut BitReader<'_>,
        template: QuantTemplate,
        block_xsize: usize,
        block_ysize: usize,
    ) -> Result<Self> {
        let raw_dc = reader.read(16)? as i32;
        if raw_dc < 1 {
            return Err(Error::MalformedBitstream { reason: "zero DC quant" });
        }
        Ok(Self {
            template,
            raw_dc,
            raw_quant_field: ImageI::filled(block_xsize, block_ysize, QUANT_FIELD_UNITS as i32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_quant_field_change_detection() {
        let mut q = Quantizer::new(QuantTemplate::Hq, 4, 3);
        let field = ImageF::filled(4, 3, 1.5);
        assert!(q.set_quant_field(1.0, &field));
        // Identical values: no change reported.
        assert!(!q.set_quant_field(1.0, &field));
        // Sub-resolution perturbation rounds to the same raw value.
        let field2 = ImageF::filled(4, 3, 1.5 + 0.25 / QUANT_FIELD_UNITS);
        assert!(!q.set_quant_field(1.0, &field2));
        assert!(q.set_quant_field(1.25, &field));
    }

    #[test]
    fn test_field_roundtrip() {
        let mut q = Quantizer::new(QuantTemplate::Default, 2, 2);
        let mut field = ImageF::new(2, 2);
        field.set(0, 0, 0.5);
        field.set(1, 0, 1.0);
        field.set(0, 1, 2.0);
        field.set(1, 1, 4.0);
        q.set_quant_field(1.5, &field);
        let (dc, back) = q.get_quant_field();
        assert!((dc - 1.5).abs() < 1e-6);
        for y in 0..2 {
            for x in 0..2 {
                assert!((back.get(x, y) - field.get(x, y)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_steps_scale_inversely_with_quant() {
        let mut q = Quantizer::new(QuantTemplate::Default, 1, 1);
        q.set_quant(1.0);
        let base = q.ac_step(1, 9, q.raw_quant_field().get(0, 0));
        q.set_quant(2.0);
        let finer = q.ac_step(1, 9, q.raw_quant_field().get(0, 0));
        assert!((base / finer - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_clamping() {
        let mut q = Quantizer::new(QuantTemplate::Default, 1, 1);
        q.set_quant(0.0);
        assert_eq!(q.raw_dc(), 1);
        q.set_quant(1e9);
        assert_eq!(q.raw_dc(), 0x7fff);
    }
}
