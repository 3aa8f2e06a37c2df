//! Decoder pipeline
//!
//! Strict inverse of the encoder's bitstream assembly: header, alpha, noise
//! parameters, color transform, quantizer, DC residuals, scan orders, AC
//! tokens; then reconstruction, optional denoise, noise synthesis, and the
//! centered-opsin-to-sRGB conversion.

use imgref::{ImgVec, Img};
use rgb::RGB8;

use crate::alpha::pik_to_alpha;
use crate::bitstream::BitReader;
use crate::coeffs::{recon_opsin_image, QuantizedCoeffs};
use crate::consts::{BLOCK_DIM, BLOCK_SIZE, NUM_AC_CONTEXTS};
use crate::ctan::ColorTransform;
use crate::dc_predictor::expand_dc;
use crate::entropy::{
    compute_block_context, decode_ac, decode_coeff_orders, decode_image, natural_coeff_orders,
    TokenReader, AC_ALPHABET,
};
use crate::epf::do_denoise;
use crate::error::{Error, Result};
use crate::header::{Header, BITSTREAM_BRUNSLI, FLAG_ALPHA, FLAG_DENOISE, FLAG_DITHER};
use crate::image::{interleaved_from_image3, Image3B, Image3I, ImageS, Rect};
use crate::noise::{add_noise, decode_noise, NoiseParams};
use crate::opsin::centered_opsin_to_srgb;
use crate::quantizer::Quantizer;
use crate::types::DecompressParams;

/// A decoded image: interleaved sRGB bytes plus optional 8-bit alpha.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    /// `3 * width * height` interleaved RGB bytes.
    pub pixels: Vec<u8>,
    /// `width * height` alpha bytes when the stream carried alpha.
    pub alpha: Option<Vec<u8>>,
}

impl DecodedImage {
    /// Converts into an `imgref` buffer, dropping alpha.
    #[must_use]
    pub fn into_img(self) -> ImgVec<RGB8> {
        let pixels: Vec<RGB8> = self
            .pixels
            .chunks_exact(3)
            .map(|c| RGB8::new(c[0], c[1], c[2]))
            .collect();
        Img::new(pixels, self.width, self.height)
    }
}

/// PIK decoder with builder-style configuration.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    params: DecompressParams,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse images with more pixels than this.
    #[must_use]
    pub fn max_num_pixels(mut self, max: u64) -> Self {
        self.params.max_num_pixels = max;
        self
    }

    /// Force the denoise filter on or off regardless of the header.
    #[must_use]
    pub fn denoise(mut self, denoise: crate::types::Override) -> Self {
        self.params.denoise = denoise;
        self
    }

    /// Fail when trailing bytes remain after the coefficient stream.
    #[must_use]
    pub fn check_decompressed_size(mut self, check: bool) -> Self {
        self.params.check_decompressed_size = check;
        self
    }

    /// Decodes a compressed image.
    pub fn decode(&self, compressed: &[u8]) -> Result<DecodedImage> {
        pik_to_pixels(&self.params, compressed)
    }
}

/// Everything between the alpha section and the end of the payload.
struct DecodedSections {
    ctan: ColorTransform,
    noise_params: NoiseParams,
    quantizer: Quantizer,
    qcoeffs: QuantizedCoeffs,
    bytes_read: usize,
}

fn decode_from_bitstream(bytes: &[u8], header: &Header) -> Result<DecodedSections> {
    let xsize = header.xsize as usize;
    let ysize = header.ysize as usize;
    let block_xsize = xsize.div_ceil(BLOCK_DIM);
    let block_ysize = ysize.div_ceil(BLOCK_DIM);

    let mut reader = BitReader::new(bytes);
    let noise_params = decode_noise(&mut reader)?;
    let ctan = ColorTransform::decode(&mut reader, xsize, ysize)?;
    let mut quantizer =
        Quantizer::decode(&mut reader, header.quant_template, block_xsize, block_ysize)?;
    reader.jump_to_byte_boundary()?;

    let mut qcoeffs = QuantizedCoeffs::new(block_xsize, block_ysize);
    decode_image(&mut reader, &mut qcoeffs.dc)?;
    let rect = Rect::new(0, 0, block_xsize, block_ysize);
    let mut tmp_y = ImageS::new(block_xsize, block_ysize);
    let mut tmp_xz_residuals = ImageS::new(2 * block_xsize, block_ysize);
    let mut tmp_xz_expanded = ImageS::new(2 * block_xsize, block_ysize);
    expand_dc(
        &rect,
        &mut qcoeffs.dc,
        &mut tmp_y,
        &mut tmp_xz_residuals,
        &mut tmp_xz_expanded,
    );
    qcoeffs.block_ctx = compute_block_context(&qcoeffs.dc);

    let mut orders = natural_coeff_orders();
    decode_coeff_orders(&mut reader, &mut orders)?;

    let mut num_nzeros = Image3I::new(block_xsize, block_ysize);
    let mut tr = TokenReader::new(&mut reader, NUM_AC_CONTEXTS, AC_ALPHABET)?;
    decode_ac(
        &qcoeffs.block_ctx,
        &orders,
        &mut tr,
        &mut qcoeffs.ac,
        quantizer.raw_quant_field_mut(),
        &mut num_nzeros,
    )?;
    tr.finish()?;

    // The AC image carries the DC values in its slot 0 for reconstruction.
    for c in 0..3 {
        for y in 0..block_ysize {
            for x in 0..block_xsize {
                let dc = qcoeffs.dc.plane_row(c, y)[x];
                qcoeffs.ac.plane_row_mut(c, y)[x * BLOCK_SIZE] = dc;
            }
        }
    }

    let bytes_read = reader.bytes_consumed();
    Ok(DecodedSections { ctan, noise_params, quantizer, qcoeffs, bytes_read })
}

/// Decodes a full compressed image to sRGB (and alpha, when present).
pub fn pik_to_pixels(params: &DecompressParams, compressed: &[u8]) -> Result<DecodedImage> {
    if compressed.is_empty() {
        return Err(Error::MalformedBitstream { reason: "empty input" });
    }
    let (header, mut pos) = Header::load(compressed)?;
    if header.bitstream == BITSTREAM_BRUNSLI {
        return Err(Error::Unsupported("brunsli bitstream"));
    }
    let xsize = header.xsize as usize;
    let ysize = header.ysize as usize;
    if xsize == 0 || ysize == 0 {
        return Err(Error::InvalidDimensions {
            width: xsize,
            height: ysize,
            reason: "empty image",
        });
    }
    let num_pixels = header.xsize as u64 * header.ysize as u64;
    if num_pixels > params.max_num_pixels {
        return Err(Error::ImageTooLarge {
            num_pixels,
            max_num_pixels: params.max_num_pixels,
        });
    }

    let mut alpha_bytes: Option<Vec<u8>> = None;
    if header.has(FLAG_ALPHA) {
        let (alpha, _depth, read) = pik_to_alpha(&compressed[pos..], xsize, ysize)?;
        pos += read;
        let mut bytes = Vec::with_capacity(xsize * ysize);
        for y in 0..ysize {
            bytes.extend(alpha.row(y).iter().map(|&v| v as u8));
        }
        alpha_bytes = Some(bytes);
    }

    let sections = decode_from_bitstream(&compressed[pos..], &header)?;
    pos += sections.bytes_read;

    let mut opsin = recon_opsin_image(
        &header,
        &sections.qcoeffs,
        &sections.quantizer,
        &sections.ctan,
    );
    let enable_denoise = params.denoise.resolve(header.has(FLAG_DENOISE));
    if enable_denoise {
        do_denoise(&sections.quantizer, &mut opsin);
    }
    add_noise(&sections.noise_params, &mut opsin);

    let mut srgb = Image3B::new(opsin.xsize(), opsin.ysize());
    centered_opsin_to_srgb(&opsin, header.has(FLAG_DITHER), &mut srgb);
    srgb.shrink_to(xsize, ysize);

    if params.check_decompressed_size && pos != compressed.len() {
        return Err(Error::MalformedBitstream { reason: "trailing bytes after payload" });
    }

    Ok(DecodedImage {
        width: xsize,
        height: ysize,
        pixels: interleaved_from_image3(&srgb),
        alpha: alpha_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            Decoder::new().decode(&[]),
            Err(Error::MalformedBitstream { .. })
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(Decoder::new().decode(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_brunsli_tag_unsupported() {
        let header = Header {
            bitstream: BITSTREAM_BRUNSLI,
            xsize: 8,
            ysize: 8,
            ..Header::default()
        };
        let bytes = header.store();
        assert!(matches!(
            Decoder::new().decode(&bytes),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_pixel_limit_enforced() {
        let header = Header {
            xsize: 1000,
            ysize: 1000,
            ..Header::default()
        };
        let bytes = header.store();
        let err = Decoder::new().max_num_pixels(10_000).decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { .. }));
    }

    #[test]
    fn test_zero_size_rejected() {
        let header = Header {
            xsize: 0,
            ysize: 64,
            ..Header::default()
        };
        let bytes = header.store();
        assert!(matches!(
            Decoder::new().decode(&bytes),
            Err(Error::InvalidDimensions { .. })
        ));
    }
}
