//! Alpha plane coding
//!
//! Alpha rides in its own byte-aligned section between the header and the
//! opsin payload: predicted with the luminance DC predictor and entropy
//! coded with the shared token machinery. Only 8-bit alpha is supported.

use crate::bitstream::{BitReader, BitWriter, PaddedBytes};
use crate::dc_predictor::{expand_y, shrink_y};
use crate::entropy::{
    nbits_and_bits, value_from_bits, write_token_section, Token, TokenReader, DC_ALPHABET,
};
use crate::error::{Error, Result};
use crate::image::{ImageS, ImageU, Rect};

/// Encodes an alpha plane and appends the section to `compressed`.
pub fn alpha_to_pik(alpha: &ImageU, bit_depth: u8, compressed: &mut PaddedBytes) -> Result<()> {
    if bit_depth != 8 {
        return Err(Error::Unsupported("alpha bit depth other than 8"));
    }
    let (xsize, ysize) = (alpha.xsize(), alpha.ysize());
    let mut plane = ImageS::new(xsize, ysize);
    for y in 0..ysize {
        let src = alpha.row(y);
        let dst = plane.row_mut(y);
        for x in 0..xsize {
            debug_assert!(src[x] <= 0xff);
            dst[x] = src[x] as i16;
        }
    }
    let rect = Rect::new(0, 0, xsize, ysize);
    let mut residuals = ImageS::new(xsize, ysize);
    shrink_y(&rect, &plane, &mut residuals);

    let mut tokens = Vec::with_capacity(xsize * ysize);
    for y in 0..ysize {
        for &v in residuals.row(y) {
            let (nbits, bits) = nbits_and_bits(i32::from(v));
            tokens.push(Token::new(0, nbits, nbits, bits));
        }
    }
    let mut writer = BitWriter::new();
    writer.write(8, u32::from(bit_depth));
    writer.zero_pad_to_byte();
    write_token_section(&mut writer, &tokens, 1, DC_ALPHABET, false);
    let section = writer.into_bytes();
    compressed.extend_from_slice(&(section.len() as u32).to_le_bytes());
    compressed.extend_from_slice(&section);
    Ok(())
}

/// Decodes an alpha section; returns the plane, its bit depth, and the bytes
/// consumed.
pub fn pik_to_alpha(
    bytes: &[u8],
    xsize: usize,
    ysize: usize,
) -> Result<(ImageU, u8, usize)> {
    if bytes.len() < 4 {
        return Err(Error::MalformedBitstream { reason: "truncated alpha section" });
    }
    let section_len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
    if bytes.len() < 4 + section_len {
        return Err(Error::MalformedBitstream { reason: "truncated alpha section" });
    }
    let mut reader = BitReader::new(&bytes[4..4 + section_len]);
    let bit_depth = reader.read(8)? as u8;
    if bit_depth != 8 {
        return Err(Error::Unsupported("alpha bit depth other than 8"));
    }
    reader.jump_to_byte_boundary()?;

    let mut tr = TokenReader::new(&mut reader, 1, DC_ALPHABET)?;
    let mut residuals = ImageS::new(xsize, ysize);
    for y in 0..ysize {
        for x in 0..xsize {
            let nbits = tr.read_symbol(0)?;
            if nbits as usize >= DC_ALPHABET {
                return Err(Error::MalformedBitstream { reason: "alpha residual class" });
            }
            let bits = tr.read_bits(nbits)?;
            residuals.row_mut(y)[x] = value_from_bits(nbits, bits) as i16;
        }
    }
    tr.finish()?;

    let rect = Rect::new(0, 0, xsize, ysize);
    let mut expanded = ImageS::new(xsize, ysize);
    expand_y(&rect, &residuals, &mut expanded);
    let mut alpha = ImageU::new(xsize, ysize);
    for y in 0..ysize {
        let src = expanded.row(y);
        let dst = alpha.row_mut(y);
        for x in 0..xsize {
            if !(0..=0xff).contains(&src[x]) {
                return Err(Error::MalformedBitstream { reason: "alpha value out of range" });
            }
            dst[x] = src[x] as u16;
        }
    }
    Ok((alpha, bit_depth, 4 + section_len))
}
