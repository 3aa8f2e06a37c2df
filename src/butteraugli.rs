//! Perceptual distance comparator
//!
//! A compact butteraugli-style metric: both images are taken to the opsin
//! opponent space, split into low and high frequency bands by a small
//! Gaussian blur, and compared with per-channel weights. High-frequency
//! error is scaled by the asymmetry parameter when energy is added rather
//! than removed, and attenuated where the reference is already busy
//! (masking). The scalar distance is the maximum of the per-pixel diffmap.
//!
//! The rest of the codec depends only on this module's interface: given two
//! images, produce a scalar distance and a per-pixel diffmap.

use crate::image::{Image3B, Image3F, ImageF};
use crate::opsin::{linear_from_opsin, opsin_dynamics_image_linear, srgb8_to_linear};

const W_LF: [f32; 3] = [4.0, 1.0, 0.25];
const W_HF: [f32; 2] = [6.0, 1.5];
const MASK_MUL: f32 = 24.0;
const MASK_DC_MUL: f32 = 8.0;
const GLOBAL_SCALE: f32 = 340.0;

/// 7-tap Gaussian blur, sigma ~1.6, applied separably with mirrored edges.
fn blur(plane: &ImageF) -> ImageF {
    const KERNEL: [f32; 7] = [0.0333, 0.1055, 0.2227, 0.2770, 0.2227, 0.1055, 0.0333];
    let (xsize, ysize) = (plane.xsize(), plane.ysize());
    let mut tmp = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let src = plane.row(y);
        let dst = tmp.row_mut(y);
        for x in 0..xsize {
            let mut acc = 0.0f32;
            for (k, &w) in KERNEL.iter().enumerate() {
                let sx = (x as isize + k as isize - 3)
                    .clamp(0, xsize as isize - 1) as usize;
                acc += w * src[sx];
            }
            dst[x] = acc;
        }
    }
    let mut out = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let dst = out.row_mut(y);
        for (k, &w) in KERNEL.iter().enumerate() {
            let sy = (y as isize + k as isize - 3).clamp(0, ysize as isize - 1) as usize;
            let src = tmp.row(sy);
            for x in 0..xsize {
                dst[x] += w * src[x];
            }
        }
    }
    out
}

/// Frequency-split psychovisual representation of one image.
struct PsychoImage {
    lf: Image3F,
    hf: [ImageF; 2],
}

fn psycho_image(xyb: &Image3F) -> PsychoImage {
    let lf = Image3F::from_planes(blur(xyb.plane(0)), blur(xyb.plane(1)), blur(xyb.plane(2)));
    let mut hf = [
        ImageF::new(xyb.xsize(), xyb.ysize()),
        ImageF::new(xyb.xsize(), xyb.ysize()),
    ];
    for (c, hf_plane) in hf.iter_mut().enumerate() {
        for y in 0..xyb.ysize() {
            let full = xyb.plane_row(c, y);
            let low = lf.plane_row(c, y);
            let dst = hf_plane.row_mut(y);
            for x in 0..xyb.xsize() {
                dst[x] = full[x] - low[x];
            }
        }
    }
    PsychoImage { lf, hf }
}

fn linear_from_srgb_window(srgb: &Image3B, xsize: usize, ysize: usize) -> Image3F {
    debug_assert!(xsize <= srgb.xsize() && ysize <= srgb.ysize());
    let mut linear = Image3F::new(xsize, ysize);
    for c in 0..3 {
        for y in 0..ysize {
            let src = srgb.plane_row(c, y);
            let dst = linear.plane_row_mut(c, y);
            for x in 0..xsize {
                dst[x] = srgb8_to_linear(src[x]);
            }
        }
    }
    linear
}

/// Pure reduction of a diffmap to the scalar distance.
#[must_use]
pub fn butteraugli_score_from_diffmap(distmap: &ImageF) -> f32 {
    let mut max = 0.0f32;
    for y in 0..distmap.ysize() {
        for &v in distmap.row(y) {
            max = max.max(v);
        }
    }
    max
}

/// Compares reconstructions against a fixed reference image.
pub struct ButteraugliComparator {
    xsize: usize,
    ysize: usize,
    hf_asymmetry: f32,
    reference: PsychoImage,
    mask_hf: ImageF,
    distance: f32,
    distmap: ImageF,
}

impl ButteraugliComparator {
    /// Builds a comparator from an (uncentered) opsin reference; the image
    /// is linearized internally.
    #[must_use]
    pub fn new(opsin: &Image3F, hf_asymmetry: f32) -> Self {
        // Round-trip through linear RGB mirrors what the decoder output
        // will have gone through.
        let linear = linear_from_opsin(opsin);
        Self::from_linear(&linear, hf_asymmetry)
    }

    /// Builds a comparator from an sRGB byte reference.
    #[must_use]
    pub fn from_srgb(srgb: &Image3B, hf_asymmetry: f32) -> Self {
        let linear = linear_from_srgb_window(srgb, srgb.xsize(), srgb.ysize());
        Self::from_linear(&linear, hf_asymmetry)
    }

    fn from_linear(linear: &Image3F, hf_asymmetry: f32) -> Self {
        let (xsize, ysize) = (linear.xsize(), linear.ysize());
        let xyb = opsin_dynamics_image_linear(linear);
        let reference = psycho_image(&xyb);
        // Masking potential: blurred magnitude of the reference's own
        // high-frequency luminance.
        let mut activity = ImageF::new(xsize, ysize);
        for y in 0..ysize {
            let hf_y = reference.hf[1].row(y);
            let dst = activity.row_mut(y);
            for x in 0..xsize {
                dst[x] = hf_y[x].abs();
            }
        }
        let mask_hf = blur(&activity);
        Self {
            xsize,
            ysize,
            hf_asymmetry,
            reference,
            mask_hf,
            distance: 0.0,
            distmap: ImageF::new(xsize, ysize),
        }
    }

    #[inline]
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    #[inline]
    #[must_use]
    pub fn distmap(&self) -> &ImageF {
        &self.distmap
    }

    /// Compares a candidate sRGB image (at least as large as the reference;
    /// the top-left window is used) and updates distance and diffmap.
    pub fn compare(&mut self, srgb: &Image3B) {
        let linear = linear_from_srgb_window(srgb, self.xsize, self.ysize);
        let xyb = opsin_dynamics_image_linear(&linear);
        let candidate = psycho_image(&xyb);

        for y in 0..self.ysize {
            let mask_row = self.mask_hf.row(y);
            let row = self.distmap.row_mut(y);
            for x in 0..self.xsize {
                let mut d_lf = 0.0f32;
                for c in 0..3 {
                    let diff = candidate.lf.plane_row(c, y)[x] - self.reference.lf.plane_row(c, y)[x];
                    d_lf += W_LF[c] * diff * diff;
                }
                let mut d_hf = 0.0f32;
                for c in 0..2 {
                    let r = self.reference.hf[c].row(y)[x];
                    let d = candidate.hf[c].row(y)[x];
                    let mut diff = d - r;
                    // Added energy is worse than removed energy.
                    if d.abs() > r.abs() {
                        diff *= self.hf_asymmetry;
                    } else {
                        diff /= self.hf_asymmetry;
                    }
                    d_hf += W_HF[c] * diff * diff;
                }
                let mask = 1.0 / (1.0 + MASK_MUL * mask_row[x]);
                row[x] = GLOBAL_SCALE * (d_lf + mask * d_hf).sqrt();
            }
        }
        self.distance = butteraugli_score_from_diffmap(&self.distmap);
    }

    /// Produces per-channel masking fields for AC and DC error tolerance.
    pub fn mask(&self, mask: &mut Image3F, mask_dc: &mut Image3F) {
        *mask = Image3F::new(self.xsize, self.ysize);
        *mask_dc = Image3F::new(self.xsize, self.ysize);
        for c in 0..3 {
            for y in 0..self.ysize {
                let act = self.mask_hf.row(y);
                let row_ac = mask.plane_row_mut(c, y);
                let row_dc = mask_dc.plane_row_mut(c, y);
                for x in 0..self.xsize {
                    row_ac[x] = 1.0 / (1.0 + MASK_MUL * act[x]);
                    row_dc[x] = 1.0 / (1.0 + MASK_DC_MUL * act[x]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_srgb(xsize: usize, ysize: usize) -> Image3B {
        let mut img = Image3B::new(xsize, ysize);
        for c in 0..3 {
            for y in 0..ysize {
                for x in 0..xsize {
                    img.plane_row_mut(c, y)[x] = ((x * 200) / xsize + 20 + c * 5) as u8;
                }
            }
        }
        img
    }

    #[test]
    fn test_identical_images_have_zero_distance() {
        let srgb = gradient_srgb(32, 24);
        let mut cmp = ButteraugliComparator::from_srgb(&srgb, 1.0);
        cmp.compare(&srgb);
        assert!(cmp.distance() < 1e-3, "distance {}", cmp.distance());
    }

    #[test]
    fn test_distance_grows_with_error() {
        let srgb = gradient_srgb(32, 32);
        let mut cmp = ButteraugliComparator::from_srgb(&srgb, 1.0);

        let mut small = srgb.clone();
        for y in 12..20 {
            for x in 12..20 {
                let v = small.plane_row(1, y)[x];
                small.plane_mut(1).set(x, y, v.saturating_add(3));
            }
        }
        cmp.compare(&small);
        let d_small = cmp.distance();

        let mut large = srgb.clone();
        for y in 12..20 {
            for x in 12..20 {
                let v = large.plane_row(1, y)[x];
                large.plane_mut(1).set(x, y, v.saturating_add(25));
            }
        }
        cmp.compare(&large);
        let d_large = cmp.distance();

        assert!(d_small > 0.0);
        assert!(
            d_large > 2.0 * d_small,
            "distances {} vs {}",
            d_small, d_large
        );
    }

    #[test]
    fn test_diffmap_localizes_error() {
        let srgb = gradient_srgb(48, 48);
        let mut cmp = ButteraugliComparator::from_srgb(&srgb, 1.0);
        let mut distorted = srgb.clone();
        for y in 30..38 {
            for x in 30..38 {
                distorted.plane_mut(1).set(x, y, 255);
            }
        }
        cmp.compare(&distorted);
        let inside = cmp.distmap().get(34, 34);
        let outside = cmp.distmap().get(5, 5);
        assert!(
            inside > 10.0 * (outside + 1e-6),
            "inside {} outside {}",
            inside, outside
        );
    }

    #[test]
    fn test_padded_candidate_window() {
        let srgb = gradient_srgb(20, 10);
        let mut cmp = ButteraugliComparator::from_srgb(&srgb, 1.0);
        // Candidate padded out to block multiples; padding must be ignored.
        let mut padded = Image3B::new(24, 16);
        for c in 0..3 {
            for y in 0..10 {
                for x in 0..20 {
                    padded.plane_mut(c).set(x, y, srgb.plane_row(c, y)[x]);
                }
            }
        }
        cmp.compare(&padded);
        assert!(cmp.distance() < 1e-3);
    }

    #[test]
    fn test_asymmetry_penalizes_added_detail() {
        let srgb = gradient_srgb(32, 32);
        let mut added = srgb.clone();
        for y in 8..24 {
            for x in 8..24 {
                let v = i16::from(added.plane_row(1, y)[x]);
                let delta = if (x + y) % 2 == 0 { 6 } else { -6 };
                added.plane_mut(1).set(x, y, (v + delta).clamp(0, 255) as u8);
            }
        }
        let mut cmp_sym = ButteraugliComparator::from_srgb(&srgb, 1.0);
        cmp_sym.compare(&added);
        let d_sym = cmp_sym.distance();
        let mut cmp_asym = ButteraugliComparator::from_srgb(&srgb, 2.0);
        cmp_asym.compare(&added);
        let d_asym = cmp_asym.distance();
        assert!(d_asym > d_sym, "{} vs {}", d_asym, d_sym);
    }
}
