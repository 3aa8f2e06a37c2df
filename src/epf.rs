//! Edge-preserving denoise filter
//!
//! A small guided filter over the reconstructed opsin image: each pixel is
//! replaced by a weighted 3x3 average, with weights falling off as the
//! luminance difference to the center grows. The falloff scale follows the
//! quantizer, so coarser quantization gets more smoothing while real edges
//! (differences far above one quantization step) survive.

use crate::image::Image3F;
use crate::quantizer::Quantizer;

const EPF_MUL_SCALE: f32 = 10000.0;
const EPF_MUL: u32 = 256;
const SIGMA_SHIFT: u32 = 4;
const SIGMA_STEP: f32 = 0.006;

/// Smooths `opsin` in place with strength derived from the quantizer scale.
pub fn do_denoise(quantizer: &Quantizer, opsin: &mut Image3F) {
    let sigma =
        quantizer.scale() * (EPF_MUL_SCALE / ((EPF_MUL << SIGMA_SHIFT) as f32)) * SIGMA_STEP;
    let inv_sigma2 = 1.0 / (sigma * sigma);
    let (xsize, ysize) = (opsin.xsize(), opsin.ysize());
    let guide = opsin.plane(1).clone();
    let src = opsin.clone();
    for y in 0..ysize {
        for x in 0..xsize {
            let center = guide.get(x, y);
            let mut weight_sum = 0.0f32;
            let mut acc = [0.0f32; 3];
            for dy in -1i32..=1 {
                let sy = (y as i32 + dy).clamp(0, ysize as i32 - 1) as usize;
                for dx in -1i32..=1 {
                    let sx = (x as i32 + dx).clamp(0, xsize as i32 - 1) as usize;
                    let d = guide.get(sx, sy) - center;
                    let weight = 1.0 / (1.0 + d * d * inv_sigma2);
                    weight_sum += weight;
                    for (c, a) in acc.iter_mut().enumerate() {
                        *a += weight * src.plane_row(c, sy)[sx];
                    }
                }
            }
            for (c, a) in acc.iter().enumerate() {
                opsin.plane_row_mut(c, y)[x] = a / weight_sum;
            }
        }
    }
}
