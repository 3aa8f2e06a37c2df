//! Encoder pipeline and the rate-distortion control loop
//!
//! The control loop is the perceptual heart of the codec: quantize, decode
//! what the decoder would decode, measure the perceptual distance against
//! the original, and push the per-block quant field up where tiles are worse
//! than the target while relaxing tiles that are better than needed. Both
//! branches are required for stability.

use imgref::ImgRef;
use rgb::RGB8;
use tracing::debug;

use crate::adaptive_quant::{
    adaptive_quantization_map, adjust_quant_val, dist_to_peak_map, tile_dist_map,
};
use crate::bitstream::{BitWriter, PaddedBytes};
use crate::butteraugli::ButteraugliComparator;
use crate::coeffs::{compute_coefficients, recon_opsin_image, QuantizedCoeffs};
use crate::consts::{BLOCK_DIM, MAX_IMAGE_DIM, NUM_AC_CONTEXTS};
use crate::ctan::{find_best_y_to_b_correlation, find_best_y_to_x_correlation, ColorTransform};
use crate::dct::transposed_scaled_dct;
use crate::entropy::{
    compute_coeff_order, encode_coeff_orders, encode_image, natural_coeff_orders,
    tokenize_coefficients, write_token_section, AC_ALPHABET,
};
use crate::epf::do_denoise;
use crate::error::{Error, Result};
use crate::gaborish::gaborish_inverse;
use crate::header::{
    Header, BITSTREAM_DEFAULT, FLAG_ALPHA, FLAG_DENOISE, FLAG_DITHER, FLAG_GABORISH,
    FLAG_SMOOTH_DC_PRED,
};
use crate::image::{
    align_image, image3_from_interleaved, scale_image, Image3B, Image3F, Image3S, ImageF, ImageU,
    Rect,
};
use crate::noise::{encode_noise, get_noise_parameter, NoiseParams};
use crate::opsin::{center_opsin_values, centered_opsin_to_srgb, opsin_dynamics_image};
use crate::quantizer::Quantizer;
use crate::types::{CompressParams, Override, QuantTemplate};

/// Distances below this use the HQ template and search.
const MAX_BUTTERAUGLI_FOR_HQ: f32 = 2.0;
/// Dither the output above this distance; at very high quality dithering
/// shows as checkerboarding.
const MIN_BUTTERAUGLI_FOR_DITHER: f32 = 1.0;

// At low distances the original noise survives quantization, so synthesis
// would double it; ramp modeling in above this distance.
const NOISE_RAMP_UP_DISTANCE_MIN: f32 = 1.4;
const NOISE_RAMP_UP_DISTANCE_RANGE: f32 = 0.6;
const NOISE_LEVEL_AT_START_OF_RAMP_UP: f32 = 0.25;

/// PIK encoder with builder-style configuration.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    params: CompressParams,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target perceptual distance; smaller is higher quality.
    #[must_use]
    pub fn distance(mut self, butteraugli_distance: f32) -> Self {
        self.params.butteraugli_distance = butteraugli_distance;
        self
    }

    /// Target compressed size in bytes.
    #[must_use]
    pub fn target_size(mut self, bytes: usize) -> Self {
        self.params.target_size = bytes;
        self
    }

    /// Target bits per pixel.
    #[must_use]
    pub fn target_bitrate(mut self, bits_per_pixel: f32) -> Self {
        self.params.target_bitrate = bits_per_pixel;
        self
    }

    /// Use the fast scale search when a size target is set.
    #[must_use]
    pub fn target_size_search_fast_mode(mut self, fast: bool) -> Self {
        self.params.target_size_search_fast_mode = fast;
        self
    }

    /// Skip the ctan search and the perceptual control loop.
    #[must_use]
    pub fn fast_mode(mut self, fast: bool) -> Self {
        self.params.fast_mode = fast;
        self
    }

    /// Raise iteration caps and use the slower search constants.
    #[must_use]
    pub fn really_slow_mode(mut self, slow: bool) -> Self {
        self.params.really_slow_mode = slow;
        self
    }

    /// Iteration budget of the control loop.
    #[must_use]
    pub fn max_butteraugli_iters(mut self, iters: usize) -> Self {
        self.params.max_butteraugli_iters = iters;
        self
    }

    /// Asymmetry parameter forwarded to the comparator.
    #[must_use]
    pub fn hf_asymmetry(mut self, hf_asymmetry: f32) -> Self {
        self.params.hf_asymmetry = hf_asymmetry;
        self
    }

    /// Force the decoder-side denoise filter on or off.
    #[must_use]
    pub fn denoise(mut self, denoise: Override) -> Self {
        self.params.denoise = denoise;
        self
    }

    /// Force noise modeling on or off.
    #[must_use]
    pub fn noise(mut self, apply_noise: Override) -> Self {
        self.params.apply_noise = apply_noise;
        self
    }

    /// Bypass the control loop with a single scalar quant.
    #[must_use]
    pub fn uniform_quant(mut self, quant: f32) -> Self {
        self.params.uniform_quant = quant;
        self
    }

    /// Replace the whole parameter set.
    #[must_use]
    pub fn params(mut self, params: CompressParams) -> Self {
        self.params = params;
        self
    }

    /// Encodes interleaved 8-bit RGB.
    pub fn encode_rgb(&self, pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        validate_dimensions(width, height)?;
        let expected = width * height * 3;
        if pixels.len() != expected {
            return Err(Error::InvalidPixelData { expected, actual: pixels.len() });
        }
        let srgb = image3_from_interleaved(pixels, width, height, 3 * width);
        pixels_to_pik(&self.params, &srgb, None)
    }

    /// Encodes interleaved 8-bit RGBA; alpha is carried losslessly.
    pub fn encode_rgba(&self, pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        validate_dimensions(width, height)?;
        let expected = width * height * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidPixelData { expected, actual: pixels.len() });
        }
        let mut srgb = Image3B::new(width, height);
        let mut alpha = ImageU::new(width, height);
        for y in 0..height {
            let src = &pixels[y * width * 4..(y + 1) * width * 4];
            for x in 0..width {
                for c in 0..3 {
                    srgb.plane_mut(c).set(x, y, src[4 * x + c]);
                }
                alpha.set(x, y, u16::from(src[4 * x + 3]));
            }
        }
        pixels_to_pik(&self.params, &srgb, Some(&alpha))
    }

    /// Encodes an `imgref` RGB view.
    pub fn encode_img(&self, img: ImgRef<'_, RGB8>) -> Result<Vec<u8>> {
        validate_dimensions(img.width(), img.height())?;
        let mut srgb = Image3B::new(img.width(), img.height());
        for (y, row) in img.rows().enumerate() {
            for (x, px) in row.iter().enumerate() {
                srgb.plane_mut(0).set(x, y, px.r);
                srgb.plane_mut(1).set(x, y, px.g);
                srgb.plane_mut(2).set(x, y, px.b);
            }
        }
        pixels_to_pik(&self.params, &srgb, None)
    }
}

fn validate_dimensions(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height, reason: "empty image" });
    }
    if width > MAX_IMAGE_DIM || height > MAX_IMAGE_DIM {
        return Err(Error::InvalidDimensions {
            width,
            height,
            reason: "dimension above format limit",
        });
    }
    Ok(())
}

/// Compresses an sRGB image (plus optional alpha) into a fresh bitstream.
pub fn pixels_to_pik(
    params: &CompressParams,
    srgb: &Image3B,
    alpha: Option<&ImageU>,
) -> Result<Vec<u8>> {
    validate_dimensions(srgb.xsize(), srgb.ysize())?;
    if params.use_brunsli_v2 {
        return Err(Error::Unsupported("brunsli bitstream"));
    }
    let opsin_orig = opsin_dynamics_image(srgb);

    let mut header = Header {
        bitstream: BITSTREAM_DEFAULT,
        xsize: srgb.xsize() as u32,
        ysize: srgb.ysize() as u32,
        ..Header::default()
    };
    if alpha.is_some() {
        header.flags |= FLAG_ALPHA;
    }
    if params.denoise == Override::On {
        header.flags |= FLAG_DENOISE;
    }
    if params.butteraugli_distance < MAX_BUTTERAUGLI_FOR_HQ {
        header.quant_template = QuantTemplate::Hq;
    } else {
        header.quant_template = QuantTemplate::Default;
        header.flags |= FLAG_SMOOTH_DC_PRED;
        header.flags |= FLAG_GABORISH;
    }
    if params.butteraugli_distance > MIN_BUTTERAUGLI_FOR_DITHER {
        header.flags |= FLAG_DITHER;
    }

    let mut compressed = PaddedBytes::new();
    compressed.extend_from_slice(&header.store());
    if let Some(alpha) = alpha {
        crate::alpha::alpha_to_pik(alpha, 8, &mut compressed)?;
    }

    let mut opsin_params = params.clone();
    let target_size = params.target_size_for(srgb.xsize(), srgb.ysize());
    if params.target_size > 0 || params.target_bitrate > 0.0 {
        opsin_params.target_size = if compressed.len() < target_size {
            target_size - compressed.len()
        } else {
            1
        };
    }
    opsin_to_pik(&opsin_params, &header, &opsin_orig, &mut compressed)?;
    Ok(compressed.into_vec())
}

/// Runs the opsin-domain pipeline and appends the coded payload.
fn opsin_to_pik(
    params: &CompressParams,
    header: &Header,
    opsin_orig: &Image3F,
    compressed: &mut PaddedBytes,
) -> Result<()> {
    let xsize = opsin_orig.xsize();
    let ysize = opsin_orig.ysize();
    let block_xsize = xsize.div_ceil(BLOCK_DIM);
    let block_ysize = ysize.div_ceil(BLOCK_DIM);

    let mut opsin = align_image(opsin_orig, BLOCK_DIM);
    center_opsin_values(&mut opsin);

    let mut noise_params = NoiseParams::default();
    let enable_noise = params
        .apply_noise
        .resolve(params.butteraugli_distance > NOISE_RAMP_UP_DISTANCE_MIN);
    if enable_noise {
        let rampup = (params.butteraugli_distance - NOISE_RAMP_UP_DISTANCE_MIN)
            / NOISE_RAMP_UP_DISTANCE_RANGE;
        let quality_coef = if rampup < 1.0 {
            NOISE_LEVEL_AT_START_OF_RAMP_UP
                + (1.0 - NOISE_LEVEL_AT_START_OF_RAMP_UP) * rampup.max(0.0)
        } else {
            1.0
        };
        noise_params = get_noise_parameter(&opsin, quality_coef);
    }

    if header.has(FLAG_GABORISH) {
        gaborish_inverse(&mut opsin);
    }

    let mut ctan = ColorTransform::new(xsize, ysize);
    if !params.fast_mode
        && (params.butteraugli_distance >= 0.0
            || params.target_bitrate > 0.0
            || params.target_size > 0)
    {
        let dct = transposed_scaled_dct(&opsin);
        find_best_y_to_b_correlation(&dct, &mut ctan.ytob_map, &mut ctan.ytob_dc);
        find_best_y_to_x_correlation(&dct, &mut ctan.ytox_map, &mut ctan.ytox_dc);
    }

    let mut quantizer = Quantizer::new(header.quant_template, block_xsize, block_ysize);
    quantizer.set_quant(1.0);

    if params.fast_mode {
        let target = params.butteraugli_distance;
        let target_dc = target.min(target.powf(0.698_222_388_257_853_88));
        let quant_dc = 0.57 / target_dc;
        let quant_ac = 1.857_049_450_827_386_5 / target;
        let qf = adaptive_quantization_map(opsin_orig.plane(1), BLOCK_DIM);
        quantizer.set_quant_field(quant_dc, &scale_image(quant_ac, &qf));
    } else if params.target_size > 0 || params.target_bitrate > 0.0 {
        let target_size = params.target_size_for(xsize, ysize);
        if params.target_size_search_fast_mode {
            find_best_quantization(opsin_orig, &opsin, params, header, 1.0, &ctan, &mut quantizer);
            scale_to_target_size(&opsin, &noise_params, target_size, &ctan, &mut quantizer);
        } else {
            compress_to_target_size(
                opsin_orig,
                &opsin,
                params,
                &noise_params,
                header,
                target_size,
                &ctan,
                &mut quantizer,
            );
        }
    } else if params.uniform_quant > 0.0 {
        quantizer.set_quant(params.uniform_quant);
    } else {
        if params.butteraugli_distance < 0.0 {
            return Err(Error::EncodingFailed {
                stage: "quant search",
                reason: "negative butteraugli target".to_string(),
            });
        }
        if params.butteraugli_distance <= NOISE_RAMP_UP_DISTANCE_MIN {
            find_best_quantization_hq(
                opsin_orig,
                &opsin,
                params,
                header,
                params.butteraugli_distance,
                &ctan,
                &mut quantizer,
            );
        } else {
            find_best_quantization(
                opsin_orig,
                &opsin,
                params,
                header,
                params.butteraugli_distance,
                &ctan,
                &mut quantizer,
            );
        }
    }

    let qcoeffs = compute_coefficients(&opsin, &quantizer, &ctan);
    let payload = encode_to_bitstream(&qcoeffs, &quantizer, &noise_params, &ctan, params.fast_mode);
    compressed.extend_from_slice(&payload);
    Ok(())
}

/// Serializes everything after the header and alpha: noise, ctan, quantizer,
/// DC residuals, scan orders, AC tokens.
pub fn encode_to_bitstream(
    qcoeffs: &QuantizedCoeffs,
    quantizer: &Quantizer,
    noise_params: &NoiseParams,
    ctan: &ColorTransform,
    fast_mode: bool,
) -> Vec<u8> {
    let mut writer = BitWriter::new();
    encode_noise(noise_params, &mut writer);
    ctan.encode(&mut writer);
    quantizer.encode(&mut writer);
    writer.zero_pad_to_byte();

    let (bx, by) = (qcoeffs.dc.xsize(), qcoeffs.dc.ysize());
    let rect = Rect::new(0, 0, bx, by);
    let mut residuals = Image3S::new(bx, by);
    crate::dc_predictor::shrink_dc(&rect, &qcoeffs.dc, &mut residuals);
    encode_image(&residuals, fast_mode, &mut writer);

    let mut orders = natural_coeff_orders();
    compute_coeff_order(&qcoeffs.ac, &qcoeffs.block_ctx, &mut orders);
    encode_coeff_orders(&orders, &mut writer);

    let tokens =
        tokenize_coefficients(&orders, quantizer.raw_quant_field(), &qcoeffs.ac, &qcoeffs.block_ctx);
    write_token_section(&mut writer, &tokens, NUM_AC_CONTEXTS, AC_ALPHABET, fast_mode);
    writer.into_bytes()
}

/// One decode-and-compare step shared by both search loops.
fn evaluate_candidate(
    comparator: &mut ButteraugliComparator,
    opsin_arg: &Image3F,
    header: &Header,
    quantizer: &Quantizer,
    ctan: &ColorTransform,
) {
    let qcoeffs = compute_coefficients(opsin_arg, quantizer, ctan);
    let mut recon = recon_opsin_image(header, &qcoeffs, quantizer, ctan);
    if header.has(FLAG_DENOISE) {
        do_denoise(quantizer, &mut recon);
    }
    let mut srgb = Image3B::new(recon.xsize(), recon.ysize());
    centered_opsin_to_srgb(&recon, header.has(FLAG_DITHER), &mut srgb);
    comparator.compare(&srgb);
}

const MARGINS: [usize; 7] = [0, 0, 1, 2, 1, 0, 0];
const POW: [f64; 7] = [
    0.999_050_059_311_229_37,
    1.002_777_828_823_716_6,
    0.742_862_977_936_915_47,
    0.851_721_989_194_969_55,
    0.0,
    0.0,
    0.0,
];

/// Standard control loop: iterate quantize/decode/compare, nudging the field
/// toward uniform per-tile distance at the target.
pub fn find_best_quantization(
    opsin_orig: &Image3F,
    opsin_arg: &Image3F,
    params: &CompressParams,
    header: &Header,
    butteraugli_target: f32,
    ctan: &ColorTransform,
    quantizer: &mut Quantizer,
) {
    let mut comparator = ButteraugliComparator::new(opsin_orig, params.hf_asymmetry);
    let butteraugli_target_dc =
        butteraugli_target.min(butteraugli_target.powf(0.745_002_522_204_226_69));
    let initial_quant_dc = 0.938_312_608_586_605_03 / butteraugli_target_dc;
    let quant_ac = 1.176_060_090_135_594 / butteraugli_target;
    let mut quant_field = scale_image(
        quant_ac,
        &adaptive_quantization_map(opsin_orig.plane(1), BLOCK_DIM),
    );
    let mut best_quant_field = quant_field.clone();
    let mut best_butteraugli = 1000.0f32;
    let mut tile_distmap: Option<ImageF> = None;

    for i in 0..params.max_butteraugli_iters {
        if quantizer.set_quant_field(initial_quant_dc, &quant_field) {
            evaluate_candidate(&mut comparator, opsin_arg, header, quantizer, ctan);
            let mut best_quant_updated = false;
            if comparator.distance() <= best_butteraugli {
                best_quant_field = quant_field.clone();
                // Clamping prevents over-shrinking beyond the target.
                best_butteraugli = comparator.distance().max(butteraugli_target);
                best_quant_updated = true;
            }
            tile_distmap = Some(tile_dist_map(
                comparator.distmap(),
                BLOCK_DIM,
                MARGINS[i.min(MARGINS.len() - 1)],
            ));
            debug!(
                iter = i,
                distance = comparator.distance(),
                improved = best_quant_updated,
                dc_quant = initial_quant_dc,
                "butteraugli iteration"
            );
        }
        let Some(ref distmap) = tile_distmap else { continue };
        let cur_pow = POW[i.min(POW.len() - 1)];
        if cur_pow == 0.0 {
            for y in 0..quant_field.ysize() {
                for x in 0..quant_field.xsize() {
                    let diff = distmap.get(x, y) / butteraugli_target;
                    if diff >= 1.0 {
                        let q = quant_field.get(x, y);
                        quant_field.set(x, y, q * diff);
                    }
                }
            }
        } else {
            for y in 0..quant_field.ysize() {
                for x in 0..quant_field.xsize() {
                    let diff = distmap.get(x, y) / butteraugli_target;
                    let q = quant_field.get(x, y);
                    if diff < 1.0 {
                        quant_field.set(x, y, q * (f64::from(diff).powf(cur_pow)) as f32);
                    } else {
                        quant_field.set(x, y, q * diff);
                    }
                }
            }
        }
    }
    quantizer.set_quant_field(initial_quant_dc, &best_quant_field);
}

/// High-quality search: widens a peak-distance neighborhood and makes
/// Newton steps on individual field entries, escalating search radius, DC
/// quant, and the field ceiling when progress stalls.
#[allow(clippy::too_many_arguments)]
pub fn find_best_quantization_hq(
    opsin_orig: &Image3F,
    opsin_arg: &Image3F,
    params: &CompressParams,
    header: &Header,
    butteraugli_target: f32,
    ctan: &ColorTransform,
    quantizer: &mut Quantizer,
) {
    let slow = params.really_slow_mode;
    let mut comparator = ButteraugliComparator::new(opsin_orig, params.hf_asymmetry);
    let mut quant_field = scale_image(
        if slow { 1.2 } else { 1.5 },
        &adaptive_quantization_map(opsin_orig.plane(1), BLOCK_DIM),
    );
    let mut best_quant_field = quant_field.clone();
    let mut best_butteraugli = 1000.0f32;
    let mut tile_distmap: Option<ImageF> = None;
    const MAX_OUTER_ITERS: usize = 2;
    const ADJ_SPEED: [f32; MAX_OUTER_ITERS] = [0.1, 0.04];
    let mut outer_iter = 0usize;
    let mut butteraugli_iter = 0usize;
    let mut search_radius = 0usize;
    let mut quant_ceil = 5.0f32;
    let mut quant_dc = if slow { 1.2f32 } else { 1.6f32 };
    let mut num_stalling_iters = 0usize;
    let max_iters = if slow {
        params.max_butteraugli_iters_really_slow_mode
    } else {
        params.max_butteraugli_iters
    };

    loop {
        let (_, qmax) = crate::image::image_min_max(&quant_field);
        if quantizer.set_quant_field(quant_dc, &quant_field) {
            evaluate_candidate(&mut comparator, opsin_arg, header, quantizer, ctan);
            butteraugli_iter += 1;
            let mut best_quant_updated = false;
            if comparator.distance() <= best_butteraugli {
                best_quant_field = quant_field.clone();
                best_butteraugli = comparator.distance().max(butteraugli_target);
                best_quant_updated = true;
                num_stalling_iters = 0;
            } else if outer_iter == 0 {
                num_stalling_iters += 1;
            }
            tile_distmap = Some(tile_dist_map(comparator.distmap(), BLOCK_DIM, 0));
            debug!(
                iter = butteraugli_iter,
                distance = comparator.distance(),
                improved = best_quant_updated,
                search_radius,
                quant_dc,
                quant_ceil,
                "HQ butteraugli iteration"
            );
            if butteraugli_iter >= max_iters {
                break;
            }
        }
        let mut changed = false;
        if let Some(ref distmap) = tile_distmap {
            while !changed && comparator.distance() > butteraugli_target {
                for radius in 0..=search_radius {
                    if changed {
                        break;
                    }
                    let dist_to_peak =
                        dist_to_peak_map(distmap, butteraugli_target, radius, 0.0);
                    for y in 0..quant_field.ysize() {
                        for x in 0..quant_field.xsize() {
                            let peak_dist = dist_to_peak.get(x, y);
                            if peak_dist >= 0.0 {
                                let speed = if slow { ADJ_SPEED[outer_iter] } else { 0.2 };
                                let factor = speed * distmap.get(x, y);
                                let mut q = quant_field.get(x, y);
                                if adjust_quant_val(&mut q, peak_dist, factor, quant_ceil) {
                                    quant_field.set(x, y, q);
                                    changed = true;
                                }
                            }
                        }
                    }
                }
                if !changed || num_stalling_iters >= (if slow { 3 } else { 1 }) {
                    // Extend the search before giving up on this round.
                    if search_radius < 4
                        && (qmax < 0.99 * quant_ceil
                            || quant_ceil >= 3.0 + search_radius as f32)
                    {
                        search_radius += 1;
                        continue;
                    }
                    if quant_dc < 0.4 * quant_ceil - 0.8 {
                        quant_dc += 0.2;
                        changed = true;
                        continue;
                    }
                    if quant_ceil < 8.0 {
                        quant_ceil += 0.5;
                        continue;
                    }
                    break;
                }
            }
        }
        if !changed {
            outer_iter += 1;
            if !slow || outer_iter == MAX_OUTER_ITERS {
                break;
            }
            const QUANT_SCALE: f32 = 0.75;
            for y in 0..quant_field.ysize() {
                for v in quant_field.row_mut(y) {
                    *v *= QUANT_SCALE;
                }
            }
            num_stalling_iters = 0;
        }
    }
    quantizer.set_quant_field(quant_dc, &best_quant_field);
}

/// Applies a scalar on the AC field (and a damped one on DC).
fn scale_quantization_map(
    quant_dc: f32,
    quant_ac: &ImageF,
    scale: f32,
    quantizer: &mut Quantizer,
) -> bool {
    let scale_dc = 0.8 * scale + 0.2;
    let changed = quantizer.set_quant_field(scale_dc * quant_dc, &scale_image(scale, quant_ac));
    debug!(scale, changed, "scaling quantization map");
    changed
}

/// Fast target-size mode: binary search a scalar on an already-tuned field.
fn scale_to_target_size(
    opsin: &Image3F,
    noise_params: &NoiseParams,
    target_size: usize,
    ctan: &ColorTransform,
    quantizer: &mut Quantizer,
) {
    let (quant_dc, quant_ac) = quantizer.get_quant_field();
    let encoded_size = |quantizer: &Quantizer| -> usize {
        let qcoeffs = compute_coefficients(opsin, quantizer, ctan);
        encode_to_bitstream(&qcoeffs, quantizer, noise_params, ctan, false).len()
    };

    let mut scale_bad = 1.0f32;
    let mut scale_good = 1.0f32;
    let mut found_candidate = false;
    for _ in 0..10 {
        scale_quantization_map(quant_dc, &quant_ac, scale_good, quantizer);
        if encoded_size(quantizer) <= target_size {
            found_candidate = true;
            break;
        }
        scale_bad = scale_good;
        scale_good *= 0.5;
    }
    if !found_candidate {
        // The budget is unreachable; leave the most aggressive attempt.
        return;
    }
    if scale_good == 1.0 {
        // Quality already at the distance-1.0 field; no reason to go finer.
        return;
    }
    for _ in 0..16 {
        let scale = 0.5 * (scale_bad + scale_good);
        if !scale_quantization_map(quant_dc, &quant_ac, scale, quantizer) {
            break;
        }
        if encoded_size(quantizer) <= target_size {
            scale_good = scale;
        } else {
            scale_bad = scale;
        }
    }
    scale_quantization_map(quant_dc, &quant_ac, scale_good, quantizer);
}

/// Slow target-size mode: bisect the butteraugli target itself.
#[allow(clippy::too_many_arguments)]
fn compress_to_target_size(
    opsin_orig: &Image3F,
    opsin: &Image3F,
    params: &CompressParams,
    noise_params: &NoiseParams,
    header: &Header,
    target_size: usize,
    ctan: &ColorTransform,
    quantizer: &mut Quantizer,
) {
    const INTERVAL_LEN_THRESH: f32 = 0.05;
    let mut best: Option<(f32, ImageF)> = None;
    let mut dist_bad = -1.0f32;
    let mut dist_good = -1.0f32;
    loop {
        let mut dist = 1.0f32;
        if dist_good >= 0.0 && dist_bad >= 0.0 {
            if dist_good - dist_bad < INTERVAL_LEN_THRESH {
                break;
            }
            dist = 0.5 * (dist_good + dist_bad);
        } else if dist_good >= 0.0 {
            dist = dist_good * 0.8;
            if dist < 0.3 {
                break;
            }
        } else if dist_bad >= 0.0 {
            dist = dist_bad * 1.25;
            if dist > 32.0 {
                break;
            }
        }
        find_best_quantization(opsin_orig, opsin, params, header, dist, ctan, quantizer);
        let qcoeffs = compute_coefficients(opsin, quantizer, ctan);
        let size = encode_to_bitstream(&qcoeffs, quantizer, noise_params, ctan, false).len();
        debug!(dist, size, target_size, "target-size probe");
        if size <= target_size {
            dist_good = dist;
            let (dc, ac) = quantizer.get_quant_field();
            best = Some((dc, ac));
        } else {
            dist_bad = dist;
        }
    }
    if let Some((dc, ac)) = best {
        quantizer.set_quant_field(dc, &ac);
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
                    img.plane_mut(c).set(x, y, ((x * 220) / xsize + 10) as u8);
                }
            }
        }
        img
    }

    #[test]
    fn test_empty_image_is_invalid_input() {
        let err = Encoder::new().encode_rgb(&[], 0, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let err = Encoder::new().encode_rgb(&[0u8; 10], 4, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidPixelData { .. }));
    }

    #[test]
    fn test_brunsli_pathway_unsupported() {
        let mut params = CompressParams::default();
        params.use_brunsli_v2 = true;
        let img = gradient_srgb(16, 16);
        let err = pixels_to_pik(&params, &img, None).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_fast_mode_produces_bitstream() {
        let img = gradient_srgb(32, 24);
        let bytes = Encoder::new()
            .distance(1.5)
            .fast_mode(true)
            .encode_rgb(&crate::image::interleaved_from_image3(&img), 32, 24)
            .unwrap();
        assert!(bytes.len() > crate::header::MAX_COMPRESSED_HEADER_SIZE);
    }

    #[test]
    fn test_uniform_quant_bypasses_search() {
        let img = gradient_srgb(16, 16);
        let mut params = CompressParams::default();
        params.uniform_quant = 2.0;
        let bytes = pixels_to_pik(&params, &img, None).unwrap();
        assert!(!bytes.is_empty());
    }
}
