//! Fixed bitstream header

use crate::consts::MAX_IMAGE_DIM;
use crate::error::{Error, Result};
use crate::types::QuantTemplate;

/// Default transform-coded bitstream.
pub const BITSTREAM_DEFAULT: u8 = 0;
/// JPEG-recompression bitstream (recognized, not supported here).
pub const BITSTREAM_BRUNSLI: u8 = 1;

/// The image carries an alpha payload.
pub const FLAG_ALPHA: u32 = 1;
/// Run the edge-preserving denoise filter after reconstruction.
pub const FLAG_DENOISE: u32 = 2;
/// Dither the float-to-byte conversion.
pub const FLAG_DITHER: u32 = 4;
/// Reconstruct DC as a bilinear surface between block centers.
pub const FLAG_SMOOTH_DC_PRED: u32 = 8;
/// The opsin image was sharpened before coding; smooth after decoding.
pub const FLAG_GABORISH: u32 = 16;

const ALL_FLAGS: u32 =
    FLAG_ALPHA | FLAG_DENOISE | FLAG_DITHER | FLAG_SMOOTH_DC_PRED | FLAG_GABORISH;

/// Upper bound on the stored header size in bytes.
pub const MAX_COMPRESSED_HEADER_SIZE: usize = 14;

/// Fixed header at the front of every compressed image.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub bitstream: u8,
    pub xsize: u32,
    pub ysize: u32,
    pub quant_template: QuantTemplate,
    pub flags: u32,
}

impl Header {
    #[inline]
    #[must_use]
    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Serializes the header; all multi-byte fields little-endian.
    #[must_use]
    pub fn store(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_COMPRESSED_HEADER_SIZE);
        out.push(self.bitstream);
        out.extend_from_slice(&self.xsize.to_le_bytes());
        out.extend_from_slice(&self.ysize.to_le_bytes());
        out.push(self.quant_template.to_u8());
        out.extend_from_slice(&self.flags.to_le_bytes());
        debug_assert!(out.len() <= MAX_COMPRESSED_HEADER_SIZE);
        out
    }

    /// Parses a header, returning it and the bytes consumed.
    pub fn load(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < MAX_COMPRESSED_HEADER_SIZE {
            return Err(Error::MalformedBitstream { reason: "truncated header" });
        }
        let bitstream = bytes[0];
        if bitstream != BITSTREAM_DEFAULT && bitstream != BITSTREAM_BRUNSLI {
            return Err(Error::MalformedBitstream { reason: "unrecognized bitstream tag" });
        }
        let xsize = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
        let ysize = u32::from_le_bytes(bytes[5..9].try_into().unwrap());
        if xsize as usize > MAX_IMAGE_DIM || ysize as usize > MAX_IMAGE_DIM {
            return Err(Error::InvalidDimensions {
                width: xsize as usize,
                height: ysize as usize,
                reason: "dimension above format limit",
            });
        }
        let quant_template = QuantTemplate::from_u8(bytes[9])
            .ok_or(Error::MalformedBitstream { reason: "unknown quant template" })?;
        let flags = u32::from_le_bytes(bytes[10..14].try_into().unwrap());
        if flags & !ALL_FLAGS != 0 {
            return Err(Error::MalformedBitstream { reason: "unknown header flag" });
        }
        Ok((
            Self { bitstream, xsize, ysize, quant_template, flags },
            MAX_COMPRESSED_HEADER_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            bitstream: BITSTREAM_DEFAULT,
            xsize: 1920,
            ysize: 1080,
            quant_template: QuantTemplate::Hq,
            flags: FLAG_ALPHA | FLAG_DITHER,
        };
        let bytes = header.store();
        let (back, used) = Header::load(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back.xsize, 1920);
        assert_eq!(back.ysize, 1080);
        assert_eq!(back.quant_template, QuantTemplate::Hq);
        assert!(back.has(FLAG_ALPHA));
        assert!(back.has(FLAG_DITHER));
        assert!(!back.has(FLAG_DENOISE));
    }

    #[test]
    fn test_bad_tag_rejected() {
        let mut bytes = Header::default().store();
        bytes[0] = 9;
        assert!(Header::load(&bytes).is_err());
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let header = Header {
            xsize: 1 << 25,
            ysize: 16,
            ..Header::default()
        };
        let bytes = header.store();
        assert!(Header::load(&bytes).is_err());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = Header::default().store();
        assert!(Header::load(&bytes[..7]).is_err());
    }
}
