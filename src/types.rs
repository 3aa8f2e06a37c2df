//! Core configuration types for zenpik

/// Tri-state override for decoder-side filters.
///
/// `Default` defers to the quality-dependent decision made by the encoder;
/// `On`/`Off` force the feature regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Override {
    #[default]
    Default,
    On,
    Off,
}

impl Override {
    /// Resolve the override against the encoder's default decision.
    #[inline]
    #[must_use]
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Override::Default => default,
            Override::On => true,
            Override::Off => false,
        }
    }
}

/// Selects the dequantization matrix set and quality-dependent flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantTemplate {
    /// Tables tuned for mid/low quality; pairs with smooth DC prediction
    /// and the Gaborish transform.
    #[default]
    Default,
    /// Finer tables for near-lossless targets.
    Hq,
}

impl QuantTemplate {
    #[inline]
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            QuantTemplate::Default => 0,
            QuantTemplate::Hq => 1,
        }
    }

    #[must_use]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QuantTemplate::Default),
            1 => Some(QuantTemplate::Hq),
            _ => None,
        }
    }
}

/// Encoder configuration.
///
/// Exactly one rate target is honored: `uniform_quant` if positive, else
/// `target_size`/`target_bitrate` if positive, else `butteraugli_distance`.
#[derive(Debug, Clone)]
pub struct CompressParams {
    /// Target perceptual distance (smaller is better quality).
    pub butteraugli_distance: f32,
    /// Target compressed size in bytes (0 = unused).
    pub target_size: usize,
    /// Target bits per pixel (0 = unused).
    pub target_bitrate: f32,
    /// Use the fast scale-search strategy for target-size mode.
    pub target_size_search_fast_mode: bool,
    /// Skip the ctan search and the perceptual control loop.
    pub fast_mode: bool,
    /// Raise iteration caps and use the slower update constants.
    pub really_slow_mode: bool,
    /// Iteration budget for the standard control loop.
    pub max_butteraugli_iters: usize,
    /// Iteration budget when `really_slow_mode` is set.
    pub max_butteraugli_iters_really_slow_mode: usize,
    /// Asymmetry parameter forwarded to the perceptual comparator.
    pub hf_asymmetry: f32,
    /// Encoder-side denoise decision.
    pub denoise: Override,
    /// Noise modeling decision (default ramps in above distance 1.4).
    pub apply_noise: Override,
    /// If positive, bypass the control loop with a single scalar quant.
    pub uniform_quant: f32,
    /// Dispatch to the JPEG-recompression path (not available here).
    pub use_brunsli_v2: bool,
}

impl Default for CompressParams {
    fn default() -> Self {
        Self {
            butteraugli_distance: 1.0,
            target_size: 0,
            target_bitrate: 0.0,
            target_size_search_fast_mode: false,
            fast_mode: false,
            really_slow_mode: false,
            max_butteraugli_iters: 7,
            max_butteraugli_iters_really_slow_mode: 20,
            hf_asymmetry: 1.0,
            denoise: Override::Default,
            apply_noise: Override::Default,
            uniform_quant: 0.0,
            use_brunsli_v2: false,
        }
    }
}

impl CompressParams {
    /// Resolved byte budget for the given image size, or 0 when unconstrained.
    #[must_use]
    pub fn target_size_for(&self, xsize: usize, ysize: usize) -> usize {
        if self.target_size > 0 {
            return self.target_size;
        }
        if self.target_bitrate > 0.0 {
            return (0.5 + f64::from(self.target_bitrate) * (xsize * ysize) as f64 / 8.0) as usize;
        }
        0
    }
}

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecompressParams {
    /// Refuse images with more pixels than this.
    pub max_num_pixels: u64,
    /// Decoder-side denoise override.
    pub denoise: Override,
    /// Fail if trailing bytes remain after the coefficient stream.
    pub check_decompressed_size: bool,
}

impl Default for DecompressParams {
    fn default() -> Self {
        Self {
            max_num_pixels: 1 << 30,
            denoise: Override::Default,
            check_decompressed_size: false,
        }
    }
}
