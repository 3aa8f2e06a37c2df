//! # zenpik - Perceptually-Tuned Lossy Image Codec
//!
//! zenpik compresses sRGB images at and below visually-lossless quality. The
//! encoder takes pixels into an opsin color-opponent space, transforms 8x8
//! blocks, removes cross-channel correlation, and then closes a
//! rate-distortion loop: it repeatedly quantizes, reconstructs what the
//! decoder would produce, measures a butteraugli-style perceptual distance
//! against the original, and adjusts a per-block quantization field until
//! the target distance (or byte budget) is met.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zenpik::{Encoder, Decoder};
//!
//! let compressed = Encoder::new()
//!     .distance(1.0)
//!     .encode_rgb(&pixels, width, height)?;
//!
//! let image = Decoder::new().decode(&compressed)?;
//! ```
//!
//! ## Quality targets
//!
//! - `distance(d)`: target perceptual distance; 1.0 is visually lossless for
//!   most content, larger is smaller files
//! - `target_size(bytes)` / `target_bitrate(bpp)`: search the distance that
//!   fits a byte budget
//! - `fast_mode(true)`: skip the perceptual search for quick encodes

// Containers and bit-level plumbing
mod bitstream;
mod consts;
mod error;
mod image;
mod types;

// Signal path
mod adaptive_quant;
mod ctan;
mod dct;
mod gaborish;
mod opsin;
mod quantizer;

// Entropy coding
mod ans;
mod dc_predictor;
mod entropy;

// Perceptual model and auxiliary models
mod butteraugli;
mod epf;
mod noise;

// Pipeline
mod alpha;
mod coeffs;
mod decode;
mod encode;
mod header;

// Public API
pub use decode::{DecodedImage, Decoder};
pub use encode::Encoder;
pub use error::{Error, Result};
pub use types::{CompressParams, DecompressParams, Override, QuantTemplate};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_surface_roundtrip() {
        let width = 24;
        let height = 16;
        let mut pixels = vec![0u8; width * height * 3];
        for (i, p) in pixels.iter_mut().enumerate() {
            *p = ((i * 11) % 200) as u8;
        }
        let compressed = Encoder::new()
            .distance(2.0)
            .fast_mode(true)
            .encode_rgb(&pixels, width, height)
            .expect("encode");
        let decoded = Decoder::new().decode(&compressed).expect("decode");
        assert_eq!(decoded.width, width);
        assert_eq!(decoded.height, height);
        assert_eq!(decoded.pixels.len(), width * height * 3);
        assert!(decoded.alpha.is_none());
    }
}
