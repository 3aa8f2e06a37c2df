//! Photon noise modeling and synthesis
//!
//! The encoder measures how noisy the flat regions of the image are, fits a
//! three-parameter intensity-to-strength curve, and ships only those three
//! numbers. The decoder regenerates visually equivalent grain from a seeded
//! generator instead of spending bits on encoding the original noise.

use crate::bitstream::{BitReader, BitWriter};
use crate::consts::{XYB_CENTER, XYB_RANGE};
use crate::error::Result;
use crate::image::{Image3F, ImageF};

/// Parameters of `strength(x) = alpha * x^gamma + beta`, clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoiseParams {
    pub alpha: f32,
    pub gamma: f32,
    pub beta: f32,
}

impl NoiseParams {
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.alpha == 0.0 && self.gamma == 0.0 && self.beta == 0.0
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Xorshift128+ generator; the decoder reseeds it identically every time.
pub struct Xorshift128Plus {
    s0: u64,
    s1: u64,
}

impl Xorshift128Plus {
    #[must_use]
    pub fn new(s0: u64, s1: u64) -> Self {
        Self { s0, s1 }
    }

    #[inline]
    pub fn next(&mut self) -> u64 {
        let mut x = self.s0;
        let y = self.s1;
        self.s0 = y;
        x ^= x << 23;
        self.s1 = x ^ y ^ (x >> 17) ^ (y >> 26);
        self.s1.wrapping_add(y)
    }
}

#[inline]
fn mirror(i: isize, size: usize) -> usize {
    let size = size as isize;
    let mut i = i;
    if i < 0 {
        i = -i - 1;
    }
    if i >= size {
        i = 2 * size - 1 - i;
    }
    i as usize
}

/// Uniform [0, 1) noise filtered with a 4-neighbor Laplacian, giving
/// zero-mean high-frequency grain in roughly [-3.6, 3.6].
fn random_image(rng: &mut Xorshift128Plus, xsize: usize, ysize: usize) -> ImageF {
    let mut uniform = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let row = uniform.row_mut(y);
        let mut x = 0;
        while x < xsize {
            let bits = rng.next();
            for half in 0..2 {
                if x >= xsize {
                    break;
                }
                let word = (bits >> (32 * half)) as u32;
                // 1.0 with 23 random mantissa bits is in [1, 2).
                let rand12 = f32::from_bits((word >> 9) | 0x3f80_0000);
                row[x] = rand12 - 1.0;
                x += 1;
            }
        }
    }
    let mut out = ImageF::new(xsize, ysize);
    for y in 0..ysize {
        let dst = out.row_mut(y);
        for x in 0..xsize {
            let c = uniform.row(y)[x];
            let n = uniform.row(mirror(y as isize - 1, ysize))[x];
            let s = uniform.row(mirror(y as isize + 1, ysize))[x];
            let w = uniform.row(y)[mirror(x as isize - 1, xsize)];
            let e = uniform.row(y)[mirror(x as isize + 1, xsize)];
            dst[x] = 4.0 * c - n - s - w - e;
        }
    }
    out
}

/// Rational polynomial approximation of the strength curve near the fitted
/// gamma; max error below 1e-6 over the valid intensity range.
const POLY_P: [f32; 4] = [
    2.833_417_7e-5,
    -4.038_399_8e-3,
    1.365_728_0e-1,
    1.076_504_2,
];
const POLY_Q: [f32; 3] = [7.692_140_8e-1, 5.268_621_0e-1, -8.705_369_1e-2];

/// Strength evaluator chosen once per image, never branching per pixel.
enum StrengthEval {
    /// alpha == 0: constant strength independent of intensity.
    Linear { beta: f32 },
    /// Rational polynomial; cheaper than `powf`.
    Poly { alpha: f32, beta: f32 },
    /// Exact fallback when the polynomial is out of its accurate range.
    Pow { alpha: f32, gamma: f32, beta: f32 },
}

impl StrengthEval {
    #[inline]
    fn eval(&self, x: f32) -> f32 {
        match *self {
            StrengthEval::Linear { beta } => beta,
            StrengthEval::Poly { alpha, beta } => {
                let p = ((POLY_P[0] * x + POLY_P[1]) * x + POLY_P[2]) * x + POLY_P[3];
                let q = (POLY_Q[2] * x + POLY_Q[1]) * x + POLY_Q[0];
                alpha * (p / q) + beta
            }
            StrengthEval::Pow { alpha, gamma, beta } => alpha * x.powf(gamma) + beta,
        }
    }
}

#[inline]
fn noise_strength(eval: &StrengthEval, x: f32) -> f32 {
    eval.eval(x).clamp(0.0, 1.0)
}

/// Largest deviation of an approximate evaluator from the exact power curve
/// at uniformly spaced intensities.
fn max_abs_error(params: &NoiseParams, approx: &StrengthEval) -> f32 {
    let exact = StrengthEval::Pow {
        alpha: params.alpha,
        gamma: params.gamma,
        beta: params.beta,
    };
    let x0 = -XYB_RANGE[1] + XYB_CENTER[1];
    let x1 = XYB_RANGE[1] + XYB_CENTER[1];
    let mut max_err = 0.0f32;
    let mut x = x0;
    while x < x1 {
        let err = (noise_strength(&exact, x) - noise_strength(approx, x)).abs();
        max_err = max_err.max(err);
        x += 0.1;
    }
    max_err
}

fn select_eval(params: &NoiseParams) -> StrengthEval {
    if params.alpha == 0.0 {
        return StrengthEval::Linear { beta: params.beta };
    }
    let poly = StrengthEval::Poly {
        alpha: params.alpha,
        beta: params.beta,
    };
    if max_abs_error(params, &poly) < 1e-3 {
        poly
    } else {
        StrengthEval::Pow {
            alpha: params.alpha,
            gamma: params.gamma,
            beta: params.beta,
        }
    }
}

const RG_CORR: f32 = 0.9;
const RGN_CORR: f32 = 0.1;
const NOISE_NORM: f32 = 0.22;

/// Synthesizes grain into a centered opsin image.
pub fn add_noise(params: &NoiseParams, opsin: &mut Image3F) {
    if params.is_zero() {
        return;
    }
    let eval = select_eval(params);
    let (xsize, ysize) = (opsin.xsize(), opsin.ysize());
    let mut rng = Xorshift128Plus::new(65537, 123_456_789);
    let rnd_red = random_image(&mut rng, xsize, ysize);
    let rnd_green = random_image(&mut rng, xsize, ysize);
    let rnd_corr = random_image(&mut rng, xsize, ysize);

    for y in 0..ysize {
        for ix in 0..xsize {
            let vx = opsin.plane_row(0, y)[ix];
            let vy = opsin.plane_row(1, y)[ix];
            let in_g = 0.5 * (vy - vx);
            let in_r = 0.5 * (vy + vx);
            let clamped_g = in_g.clamp(-XYB_RANGE[1], XYB_RANGE[1]);
            let clamped_r = in_r.clamp(-XYB_RANGE[1], XYB_RANGE[1]);
            let strength_g = noise_strength(&eval, clamped_g + XYB_CENTER[1]);
            let strength_r = noise_strength(&eval, clamped_r + XYB_CENTER[1]);

            let rnd_r = rnd_red.row(y)[ix] * NOISE_NORM;
            let rnd_g = rnd_green.row(y)[ix] * NOISE_NORM;
            let rnd_c = rnd_corr.row(y)[ix] * NOISE_NORM;
            let red_noise = RGN_CORR * rnd_r * strength_r + RG_CORR * rnd_c * strength_r;
            let green_noise = RGN_CORR * rnd_g * strength_g + RG_CORR * rnd_c * strength_g;

            let px = opsin.plane_row_mut(0, y);
            px[ix] = (px[ix] + red_noise - green_noise).clamp(-XYB_RANGE[0], XYB_RANGE[0]);
            let py = opsin.plane_row_mut(1, y);
            py[ix] = (py[ix] + red_noise + green_noise).clamp(-XYB_RANGE[1], XYB_RANGE[1]);
            let pb = opsin.plane_row_mut(2, y);
            pb[ix] = (pb[ix] + 0.9375 * (red_noise + green_noise))
                .clamp(-XYB_RANGE[2], XYB_RANGE[2]);
        }
    }
}

// ============================================================================
// Estimation
// ============================================================================

const SAD_BINS: usize = 256;

struct SadHistogram {
    bins: [u32; SAD_BINS],
}

impl SadHistogram {
    fn new() -> Self {
        Self { bins: [0; SAD_BINS] }
    }

    fn increment(&mut self, value: f32) {
        let idx = (value.max(0.0) as usize).min(SAD_BINS - 1);
        self.bins[idx] += 1;
    }

    fn mode(&self) -> usize {
        let mut best = 0;
        for (i, &count) in self.bins.iter().enumerate() {
            if count > self.bins[best] {
                best = i;
            }
        }
        best
    }
}

/// Mean of the smallest half of patch SADs against the center patch of one
/// block, on the (X + Y) / 2 channel mix.
fn sad_score(opsin: &Image3F, x0: usize, y0: usize, block_s: usize) -> f32 {
    const PATCH_X: usize = 3;
    const PATCH_Y: usize = 4;
    const OFFSET: usize = 2;
    let mut sads = Vec::with_capacity((block_s - PATCH_X) * (block_s - PATCH_Y));
    let mix = |x: usize, y: usize| {
        0.5 * (opsin.plane_row(1, y)[x] + opsin.plane_row(0, y)[x])
    };
    for y_bl in 0..block_s {
        if y_bl + PATCH_Y >= block_s {
            break;
        }
        for x_bl in 0..block_s {
            if x_bl + PATCH_X >= block_s {
                break;
            }
            let mut sad_sum = 0.0f32;
            for cy in 0..PATCH_Y {
                for cx in 0..PATCH_X {
                    let wnd = mix(x0 + x_bl + cx, y0 + y_bl + cy);
                    let center = mix(x0 + OFFSET + cx, y0 + OFFSET + cy);
                    sad_sum += (center - wnd).abs();
                }
            }
            sads.push(sad_sum);
        }
    }
    // Rank-order: the smallest half is robust against texture outliers.
    sads.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let samples = sads.len() / 2;
    sads[..samples].iter().sum::<f32>() / samples as f32
}

fn sad_scores(opsin: &Image3F, block_s: usize, histogram: &mut SadHistogram) -> Vec<f32> {
    let mut scores = Vec::new();
    let mut y = 0;
    while y + block_s <= opsin.ysize() {
        let mut x = 0;
        while x + block_s <= opsin.xsize() {
            let score = sad_score(opsin, x, y, block_s);
            histogram.increment(score * SAD_BINS as f32);
            scores.push(score);
            x += block_s;
        }
        y += block_s;
    }
    scores
}

/// One measurement: mean block intensity and mean Laplacian magnitude.
#[derive(Debug, Clone, Copy)]
pub struct NoiseLevel {
    pub intensity: f32,
    pub noise_level: f32,
}

const LAPL_FILTER: [[f32; 3]; 3] = [
    [-0.25, -1.0, -0.25],
    [-1.0, 5.0, -1.0],
    [-0.25, -1.0, -0.25],
];

fn noise_levels(
    opsin: &Image3F,
    scores: &[f32],
    threshold: f32,
    block_s: usize,
) -> Vec<NoiseLevel> {
    let mix = |x: usize, y: usize| {
        0.5 * (opsin.plane_row(1, y)[x] + opsin.plane_row(0, y)[x])
    };
    let mut levels = Vec::new();
    let mut patch_index = 0;
    let mut y0 = 0;
    while y0 + block_s <= opsin.ysize() {
        let mut x0 = 0;
        while x0 + block_s <= opsin.xsize() {
            if scores[patch_index] <= threshold {
                let mut mean_int = 0.0f32;
                for y in 0..block_s {
                    for x in 0..block_s {
                        mean_int += mix(x0 + x, y0 + y);
                    }
                }
                mean_int /= (block_s * block_s) as f32;

                let mut level = 0.0f32;
                for y in 0..block_s {
                    for x in 0..block_s {
                        let mut filtered = 0.0f32;
                        for fy in -1i32..=1 {
                            // Mirror within the block at its borders.
                            let sy = if (y as i32 + fy) >= 0 && (y as i32 + fy) < block_s as i32 {
                                (y as i32 + fy) as usize
                            } else {
                                (y as i32 - fy) as usize
                            };
                            for fx in -1i32..=1 {
                                let sx =
                                    if (x as i32 + fx) >= 0 && (x as i32 + fx) < block_s as i32 {
                                        (x as i32 + fx) as usize
                                    } else {
                                        (x as i32 - fx) as usize
                                    };
                                filtered += mix(x0 + sx, y0 + sy)
                                    * LAPL_FILTER[(fy + 1) as usize][(fx + 1) as usize];
                            }
                        }
                        level += filtered.abs();
                    }
                }
                level /= (block_s * block_s) as f32;
                levels.push(NoiseLevel { intensity: mean_int, noise_level: level });
            }
            patch_index += 1;
            x0 += block_s;
        }
        y0 += block_s;
    }
    levels
}

/// Anchors the fit at the intensity extremes so the curve extrapolates sanely.
fn add_points_for_extrapolation(levels: &mut Vec<NoiseLevel>) {
    let mut nl_min = NoiseLevel { intensity: 0.0, noise_level: 2.0 };
    let mut nl_max = NoiseLevel { intensity: 0.0, noise_level: -2.0 };
    for nl in levels.iter() {
        if nl.noise_level < nl_min.noise_level {
            nl_min = *nl;
        }
        if nl.noise_level > nl_max.noise_level {
            nl_max = *nl;
        }
    }
    nl_max.intensity = -0.5;
    nl_min.intensity = 0.5;
    levels.push(nl_min);
    levels.push(nl_max);
}

/// Regularized squared-residual loss of the strength curve over measured
/// (intensity, noise) pairs, with its analytic gradient.
struct LossFunction {
    levels: Vec<NoiseLevel>,
}

impl LossFunction {
    fn compute(&self, w: &[f64; 3], df: &mut [f64; 3]) -> f64 {
        const EPSILON: f64 = 1e-2;
        const REGUL: f64 = 0.000_05;
        let mut loss = 0.0;
        df.fill(0.0);
        for nl in &self.levels {
            let x = f64::from(nl.intensity) + f64::from(XYB_CENTER[1]);
            if x <= EPSILON {
                continue;
            }
            let powx = x.powf(w[1]);
            let residual = f64::from(nl.noise_level) - (w[0] * powx + w[2]);
            df[0] += -2.0 * (1.0 - REGUL) * residual * powx + REGUL * w[1];
            df[1] += -2.0 * (1.0 - REGUL) * residual * w[0] * powx * x.ln() + REGUL * w[0];
            df[2] += -2.0 * (1.0 - REGUL) * residual;
            loss += (1.0 - REGUL) * residual * residual + REGUL * w[0] * w[1];
        }
        loss
    }
}

#[inline]
fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Møller's scaled conjugate gradient over the 3-parameter curve.
fn optimize_with_scg(
    loss: &LossFunction,
    mut w: [f64; 3],
    precision: f64,
    max_iter: usize,
) -> [f64; 3] {
    const SIGMA0: f64 = 1e-4;
    let n = 3usize;
    let mut grad = [0.0; 3];
    let mut f = loss.compute(&w, &mut grad);
    let mut r = [-grad[0], -grad[1], -grad[2]];
    let mut p = r;
    let mut lambda = 1e-6f64;
    let mut lambda_bar = 0.0f64;
    let mut success = true;
    let mut delta_base = 0.0f64;

    for k in 1..=max_iter {
        let p_norm2 = dot(&p, &p);
        if dot(&r, &r).sqrt() < precision || p_norm2 == 0.0 {
            break;
        }
        if success {
            let sigma = SIGMA0 / p_norm2.sqrt();
            let w_probe = [w[0] + sigma * p[0], w[1] + sigma * p[1], w[2] + sigma * p[2]];
            let mut grad_probe = [0.0; 3];
            loss.compute(&w_probe, &mut grad_probe);
            delta_base = (dot(&grad_probe, &p) - dot(&grad, &p)) / sigma;
        }
        let mut delta = delta_base + (lambda - lambda_bar) * p_norm2;
        if delta <= 0.0 {
            lambda_bar = 2.0 * (lambda - delta / p_norm2);
            delta = -delta + lambda * p_norm2;
            lambda = lambda_bar;
        }
        let mu = dot(&p, &r);
        let alpha = mu / delta;
        let w_new = [w[0] + alpha * p[0], w[1] + alpha * p[1], w[2] + alpha * p[2]];
        let mut grad_new = [0.0; 3];
        let f_new = loss.compute(&w_new, &mut grad_new);
        let comparison = 2.0 * delta * (f - f_new) / (mu * mu);
        if comparison >= 0.0 {
            w = w_new;
            f = f_new;
            grad = grad_new;
            let r_new = [-grad[0], -grad[1], -grad[2]];
            lambda_bar = 0.0;
            success = true;
            if k % n == 0 {
                p = r_new;
            } else {
                let beta = (dot(&r_new, &r_new) - dot(&r_new, &r)) / mu;
                p = [
                    r_new[0] + beta * p[0],
                    r_new[1] + beta * p[1],
                    r_new[2] + beta * p[2],
                ];
            }
            r = r_new;
            if comparison >= 0.75 {
                lambda *= 0.25;
            }
        } else {
            lambda_bar = lambda;
            success = false;
        }
        if comparison < 0.25 {
            lambda += delta * (1.0 - comparison) / p_norm2;
        }
        if lambda > 1e20 {
            break;
        }
    }
    w
}

/// Fits the noise strength curve from the flat regions of a centered opsin
/// image. Leaves all parameters zero when the image is too textured for the
/// flat-region model.
pub fn get_noise_parameter(opsin: &Image3F, quality_coef: f32) -> NoiseParams {
    let block_s = 8;
    let mut histogram = SadHistogram::new();
    let scores = sad_scores(opsin, block_s, &mut histogram);
    if scores.is_empty() {
        return NoiseParams::default();
    }
    let threshold = histogram.mode() as f32 / SAD_BINS as f32;
    // A high mode means a strong global pattern that would fool the model.
    if threshold > 0.15 || threshold <= 0.0 {
        return NoiseParams::default();
    }
    let mut levels = noise_levels(opsin, &scores, threshold, block_s);
    add_points_for_extrapolation(&mut levels);
    let loss = LossFunction { levels };
    let fitted = optimize_with_scg(&loss, [-0.05, 2.6, 0.025], 1e-8, 1000);
    NoiseParams {
        alpha: fitted[0] as f32 * quality_coef,
        gamma: fitted[1] as f32,
        beta: fitted[2] as f32 * quality_coef,
    }
}

// ============================================================================
// Serialization
// ============================================================================

const NOISE_PRECISION: f32 = 1000.0;

fn encode_float_param(value: f32, writer: &mut BitWriter) {
    writer.write(1, u32::from(value >= 0.0));
    let quantized = ((value.abs() * NOISE_PRECISION + 0.5) as u32).min(0xffff);
    writer.write(16, quantized);
}

fn decode_float_param(reader: &mut BitReader<'_>) -> Result<f32> {
    let sign = if reader.read(1)? == 1 { 1.0 } else { -1.0 };
    let quantized = reader.read(16)?;
    Ok(sign * quantized as f32 / NOISE_PRECISION)
}

/// Writes the "have noise" gate and, if set, the three quantized parameters.
pub fn encode_noise(params: &NoiseParams, writer: &mut BitWriter) {
    let have_noise = !params.is_zero();
    writer.write(1, u32::from(have_noise));
    if have_noise {
        encode_float_param(params.alpha, writer);
        encode_float_param(params.gamma, writer);
        encode_float_param(params.beta, writer);
    }
    writer.zero_pad_to_byte();
}

/// Reads what `encode_noise` wrote and realigns to a byte boundary.
pub fn decode_noise(reader: &mut BitReader<'_>) -> Result<NoiseParams> {
    let mut params = NoiseParams::default();
    if reader.read(1)? == 1 {
        params.alpha = decode_float_param(reader)?;
        params.gamma = decode_float_param(reader)?;
        params.beta = decode_float_param(reader)?;
    }
    reader.jump_to_byte_boundary()?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opsin::{center_opsin_values, opsin_dynamics_image};
    use crate::image::Image3B;

    #[test]
    fn test_xorshift_is_deterministic() {
        let mut a = Xorshift128Plus::new(65537, 123_456_789);
        let mut b = Xorshift128Plus::new(65537, 123_456_789);
        for _ in 0..100 {
            assert_eq!(a.next(), b.next());
        }
        let mut c = Xorshift128Plus::new(1, 2);
        assert_ne!(a.next(), c.next());
    }

    #[test]
    fn test_random_image_zero_mean_highpass() {
        let mut rng = Xorshift128Plus::new(65537, 123_456_789);
        let img = random_image(&mut rng, 64, 64);
        let mut sum = 0.0f64;
        let mut max_abs = 0.0f32;
        for y in 0..64 {
            for &v in img.row(y) {
                sum += f64::from(v);
                max_abs = max_abs.max(v.abs());
            }
        }
        let mean = sum / (64.0 * 64.0);
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!(max_abs < 4.01, "range {}", max_abs);
        assert!(max_abs > 1.0, "grain should have real amplitude");
    }

    #[test]
    fn test_noise_param_serialization_roundtrip() {
        let params = NoiseParams { alpha: -0.031, gamma: 2.502, beta: 0.018 };
        let mut w = BitWriter::new();
        encode_noise(&params, &mut w);
        let bytes = w.into_bytes();
        let back = decode_noise(&mut BitReader::new(&bytes)).unwrap();
        assert!((back.alpha - params.alpha).abs() < 1.0 / NOISE_PRECISION);
        assert!((back.gamma - params.gamma).abs() < 1.0 / NOISE_PRECISION);
        assert!((back.beta - params.beta).abs() < 1.0 / NOISE_PRECISION);
    }

    #[test]
    fn test_zero_noise_is_one_padded_byte() {
        let mut w = BitWriter::new();
        encode_noise(&NoiseParams::default(), &mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 1);
        let back = decode_noise(&mut BitReader::new(&bytes)).unwrap();
        assert!(back.is_zero());
    }

    #[test]
    fn test_flat_image_disables_noise() {
        let mut srgb = Image3B::new(64, 64);
        for c in 0..3 {
            srgb.plane_mut(c).fill(128);
        }
        let mut opsin = opsin_dynamics_image(&srgb);
        center_opsin_values(&mut opsin);
        let params = get_noise_parameter(&opsin, 1.0);
        assert!(params.is_zero(), "flat image must not get noise params");
    }

    #[test]
    fn test_noisy_image_gets_nonzero_fit() {
        let mut srgb = Image3B::new(128, 128);
        let mut rng = Xorshift128Plus::new(7, 11);
        for c in 0..3 {
            for y in 0..128 {
                for x in 0..128 {
                    let base = 100 + (rng.next() % 7) as u8;
                    srgb.plane_mut(c).set(x, y, base);
                }
            }
        }
        let mut opsin = opsin_dynamics_image(&srgb);
        center_opsin_values(&mut opsin);
        let params = get_noise_parameter(&opsin, 1.0);
        assert!(!params.is_zero(), "noisy image should produce a model");
    }

    #[test]
    fn test_add_noise_changes_local_variance() {
        let mut opsin = Image3F::new(64, 64);
        // Mid-gray centered opsin: zero everywhere.
        let before = opsin.clone();
        let params = NoiseParams { alpha: 0.0, gamma: 0.0, beta: 0.3 };
        add_noise(&params, &mut opsin);
        let mut changed = 0;
        for y in 0..64 {
            for x in 0..64 {
                if (opsin.plane_row(1, y)[x] - before.plane_row(1, y)[x]).abs() > 1e-4 {
                    changed += 1;
                }
            }
        }
        assert!(changed > 64 * 64 / 2, "only {} pixels changed", changed);
        // Output must stay within the coded gamut.
        for c in 0..3 {
            for y in 0..64 {
                for &v in opsin.plane_row(c, y) {
                    assert!(v.abs() <= XYB_RANGE[c] + 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_scg_fits_synthetic_curve() {
        // Data generated from a known curve; the fit must recover it.
        let truth = [-0.04f64, 2.4, 0.02];
        let mut levels = Vec::new();
        for i in 0..40 {
            let intensity = -0.4 + 0.02 * i as f64;
            let x = intensity + f64::from(XYB_CENTER[1]);
            let level = truth[0] * x.powf(truth[1]) + truth[2];
            levels.push(NoiseLevel {
                intensity: intensity as f32,
                noise_level: level as f32,
            });
        }
        let loss = LossFunction { levels };
        let fitted = optimize_with_scg(&loss, [-0.05, 2.6, 0.025], 1e-10, 1000);
        let mut df = [0.0; 3];
        let residual = loss.compute(&fitted, &mut df);
        assert!(residual < 1e-3, "fit residual {}", residual);
    }
}
