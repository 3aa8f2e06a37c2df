//! Token stream construction and the AC/DC entropy codec
//!
//! Quantized data is flattened into `(context, symbol, nbits, bits)` tokens:
//! symbols go through clustered ANS histograms, raw bits are appended
//! verbatim. Coefficients are visited in per-context scan orders transmitted
//! as Lehmer codes. The per-block quant index rides in the same stream as a
//! residual against its left/top neighbor, so `decode_ac` restores the AC
//! coefficients, the quant field, and the per-block nonzero counts exactly.

use crate::ans::{
    cluster_histograms, read_context_map, read_histogram, write_context_map, write_histogram,
    AnsDecoder, AnsDecodingData, AnsEncoder, AnsEncodingData, Histogram,
};
use crate::bitstream::{BitReader, BitWriter};
use crate::consts::{
    AC_DENSITY_CONTEXTS, BLOCK_SIZE, INDEX_LUT, NATURAL_COEFF_ORDER, NONZERO_CONTEXTS,
    NUM_AC_CONTEXTS, ORDER_CONTEXTS, QUANT_FIELD_CONTEXTS, SYMBOL_LUT,
};
use crate::error::{Error, Result};
use crate::image::{Image3B, Image3I, Image3S, ImageI};

/// Alphabet of the DC residual sections (magnitude classes 0..=16).
pub const DC_ALPHABET: usize = 17;
/// Alphabet of the AC section (rank-coded run/magnitude bytes).
pub const AC_ALPHABET: usize = 256;

/// One entropy-coded event: `symbol` is ANS-coded under `context`, then
/// `nbits` raw bits of `bits` follow verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub context: u32,
    pub symbol: u8,
    pub nbits: u8,
    pub bits: u16,
}

impl Token {
    #[inline]
    #[must_use]
    pub fn new(context: u32, symbol: u8, nbits: u8, bits: u16) -> Self {
        Self { context, symbol, nbits, bits }
    }
}

/// Magnitude class and offset bits of a signed value (JPEG convention).
#[inline]
#[must_use]
pub fn nbits_and_bits(v: i32) -> (u8, u16) {
    debug_assert!(v.unsigned_abs() < (1 << 16));
    if v == 0 {
        return (0, 0);
    }
    let n = 32 - v.unsigned_abs().leading_zeros();
    let bits = if v < 0 { v + (1 << n) - 1 } else { v };
    (n as u8, bits as u16)
}

/// Inverse of `nbits_and_bits`.
#[inline]
#[must_use]
pub fn value_from_bits(nbits: u8, bits: u16) -> i32 {
    if nbits == 0 {
        return 0;
    }
    let bits = i32::from(bits);
    if bits < (1 << (nbits - 1)) {
        bits - (1 << nbits) + 1
    } else {
        bits
    }
}

// ============================================================================
// Token sections
// ============================================================================

/// Writes a complete token section: histograms (clustered or one per
/// context), the ANS symbol stream, then the raw bits, byte-aligned.
pub fn write_token_section(
    writer: &mut BitWriter,
    tokens: &[Token],
    num_contexts: usize,
    alphabet_size: usize,
    fast: bool,
) {
    let mut histograms = vec![Histogram::new(alphabet_size); num_contexts];
    for t in tokens {
        histograms[t.context as usize].add(t.symbol);
    }

    let (enc_datas, context_map): (Vec<AnsEncodingData>, Option<Vec<u8>>) = if fast {
        writer.write(1, 1);
        let datas: Vec<_> = histograms.iter().map(AnsEncodingData::new).collect();
        for d in &datas {
            write_histogram(writer, &d.freqs);
        }
        (datas, None)
    } else {
        writer.write(1, 0);
        let (clusters, map) = cluster_histograms(&histograms);
        write_context_map(writer, &map, clusters.len());
        let datas: Vec<_> = clusters.iter().map(AnsEncodingData::new).collect();
        for d in &datas {
            write_histogram(writer, &d.freqs);
        }
        (datas, Some(map))
    };
    writer.zero_pad_to_byte();

    let mut enc = AnsEncoder::new();
    for t in tokens.iter().rev() {
        let idx = context_map
            .as_ref()
            .map_or(t.context as usize, |m| m[t.context as usize] as usize);
        enc.put(&enc_datas[idx], t.symbol);
    }
    let ans_bytes = enc.finish();
    writer.write(32, ans_bytes.len() as u32);
    writer.append_bytes(&ans_bytes);

    for t in tokens {
        writer.write(u32::from(t.nbits), u32::from(t.bits));
    }
    writer.zero_pad_to_byte();
}

/// Streaming reader over a token section; the consumer drives symbol and
/// raw-bit reads in the same order the encoder emitted them.
pub struct TokenReader<'r, 'a> {
    datas: Vec<AnsDecodingData>,
    context_map: Option<Vec<u8>>,
    decoder: AnsDecoder<'a>,
    reader: &'r mut BitReader<'a>,
}

impl<'r, 'a> TokenReader<'r, 'a> {
    pub fn new(
        reader: &'r mut BitReader<'a>,
        num_contexts: usize,
        alphabet_size: usize,
    ) -> Result<Self> {
        let fast = reader.read(1)? == 1;
        let (datas, context_map) = if fast {
            let mut datas = Vec::with_capacity(num_contexts);
            for _ in 0..num_contexts {
                datas.push(AnsDecodingData::new(read_histogram(reader, alphabet_size)?)?);
            }
            (datas, None)
        } else {
            let (map, num_clusters) = read_context_map(reader, num_contexts)?;
            let mut datas = Vec::with_capacity(num_clusters);
            for _ in 0..num_clusters {
                datas.push(AnsDecodingData::new(read_histogram(reader, alphabet_size)?)?);
            }
            (datas, Some(map))
        };
        reader.jump_to_byte_boundary()?;
        let ans_len = reader.read(32)? as usize;
        let ans_bytes = reader.take_bytes(ans_len)?;
        let decoder = AnsDecoder::new(ans_bytes)?;
        Ok(Self { datas, context_map, decoder, reader })
    }

    pub fn read_symbol(&mut self, context: u32) -> Result<u8> {
        let idx = self
            .context_map
            .as_ref()
            .map_or(context as usize, |m| m[context as usize] as usize);
        self.decoder.get(&self.datas[idx])
    }

    pub fn read_bits(&mut self, nbits: u8) -> Result<u16> {
        Ok(self.reader.read(u32::from(nbits))? as u16)
    }

    /// Closes the section and realigns the underlying reader.
    pub fn finish(self) -> Result<()> {
        if !self.decoder.is_finished() {
            return Err(Error::MalformedBitstream { reason: "ANS stream not fully consumed" });
        }
        self.reader.jump_to_byte_boundary()
    }
}

// ============================================================================
// DC residual images
// ============================================================================

/// Encodes the three planes of a residual image (context = plane).
pub fn encode_image(img: &Image3S, fast: bool, writer: &mut BitWriter) {
    let mut tokens = Vec::with_capacity(3 * img.xsize() * img.ysize());
    for c in 0..3 {
        for y in 0..img.ysize() {
            for &v in img.plane_row(c, y) {
                let (nbits, bits) = nbits_and_bits(i32::from(v));
                tokens.push(Token::new(c as u32, nbits, nbits, bits));
            }
        }
    }
    write_token_section(writer, &tokens, 3, DC_ALPHABET, fast);
}

/// Decodes an image written by `encode_image` into `img` (pre-sized).
pub fn decode_image(reader: &mut BitReader<'_>, img: &mut Image3S) -> Result<()> {
    let mut tr = TokenReader::new(reader, 3, DC_ALPHABET)?;
    for c in 0..3 {
        for y in 0..img.ysize() {
            for x in 0..img.xsize() {
                let nbits = tr.read_symbol(c as u32)?;
                if nbits as usize >= DC_ALPHABET {
                    return Err(Error::MalformedBitstream { reason: "DC magnitude class too large" });
                }
                let bits = tr.read_bits(nbits)?;
                img.plane_row_mut(c, y)[x] = value_from_bits(nbits, bits) as i16;
            }
        }
    }
    tr.finish()
}

// ============================================================================
// Block context
// ============================================================================

/// Neighbor-gradient threshold separating flat from structured blocks,
/// in raw DC units.
const BLOCK_CTX_THRESHOLD: i32 = 8;

/// Derives the per-block coding context from the quantized DC image. Both
/// sides compute this on identical integer data, after DC decoding and
/// before AC decoding. Flat blocks use their channel as context; blocks
/// with strong directional structure share contexts 3..5.
#[must_use]
pub fn compute_block_context(dc: &Image3S) -> Image3B {
    let (bx, by) = (dc.xsize(), dc.ysize());
    let mut ctx = Image3B::new(bx, by);
    for c in 0..3 {
        for y in 0..by {
            for x in 0..bx {
                let center = i32::from(dc.plane_row(c, y)[x]);
                let w = if x > 0 { i32::from(dc.plane_row(c, y)[x - 1]) } else { center };
                let e = if x + 1 < bx { i32::from(dc.plane_row(c, y)[x + 1]) } else { center };
                let n = if y > 0 { i32::from(dc.plane_row(c, y - 1)[x]) } else { center };
                let s = if y + 1 < by { i32::from(dc.plane_row(c, y + 1)[x]) } else { center };
                let gh = (w - center).abs() + (e - center).abs();
                let gv = (n - center).abs() + (s - center).abs();
                let result = if gh > 4 * gv && gh > BLOCK_CTX_THRESHOLD {
                    3
                } else if gv > 4 * gh && gv > BLOCK_CTX_THRESHOLD {
                    4
                } else if gh + gv > 2 * BLOCK_CTX_THRESHOLD {
                    5
                } else {
                    c as u8
                };
                ctx.plane_row_mut(c, y)[x] = result;
            }
        }
    }
    ctx
}

// ============================================================================
// Coefficient scan orders
// ============================================================================

fn zigzag_rank() -> [usize; BLOCK_SIZE] {
    let mut rank = [0usize; BLOCK_SIZE];
    for (i, &pos) in NATURAL_COEFF_ORDER[..BLOCK_SIZE].iter().enumerate() {
        rank[pos] = i;
    }
    rank
}

/// Chooses a scan order per order context: positions sorted by decreasing
/// total coefficient magnitude, ties broken by the natural zig-zag.
pub fn compute_coeff_order(
    ac: &Image3S,
    block_ctx: &Image3B,
    orders: &mut [[usize; BLOCK_SIZE]; ORDER_CONTEXTS],
) {
    let block_xsize = ac.xsize() / BLOCK_SIZE;
    let mut totals = [[0u64; BLOCK_SIZE]; ORDER_CONTEXTS];
    for c in 0..3 {
        for y in 0..ac.ysize() {
            let row = ac.plane_row(c, y);
            let ctx_row = block_ctx.plane_row(c, y);
            for bx in 0..block_xsize {
                let octx = ctx_row[bx] as usize;
                let block = &row[bx * BLOCK_SIZE..(bx + 1) * BLOCK_SIZE];
                for (k, &v) in block.iter().enumerate().skip(1) {
                    totals[octx][k] += u64::from(v.unsigned_abs());
                }
            }
        }
    }
    let rank = zigzag_rank();
    for (octx, order) in orders.iter_mut().enumerate() {
        let mut positions: Vec<usize> = (1..BLOCK_SIZE).collect();
        positions.sort_by_key(|&pos| (std::cmp::Reverse(totals[octx][pos]), rank[pos]));
        order[0] = 0;
        order[1..].copy_from_slice(&positions);
    }
}

fn bits_for_count(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - ((n - 1) as u32).leading_zeros()
    }
}

/// Transmits the scan orders: one shortcut bit for the natural order, else
/// a fixed-width Lehmer code of the AC position permutation.
pub fn encode_coeff_orders(
    orders: &[[usize; BLOCK_SIZE]; ORDER_CONTEXTS],
    writer: &mut BitWriter,
) {
    for order in orders {
        if order[..BLOCK_SIZE] == NATURAL_COEFF_ORDER[..BLOCK_SIZE] {
            writer.write(1, 1);
            continue;
        }
        writer.write(1, 0);
        let mut remaining: Vec<usize> = (1..BLOCK_SIZE).collect();
        for &pos in &order[1..] {
            let idx = remaining.iter().position(|&p| p == pos).expect("valid permutation");
            writer.write(bits_for_count(remaining.len()), idx as u32);
            remaining.remove(idx);
        }
    }
    writer.zero_pad_to_byte();
}

/// Reads the scan orders written by `encode_coeff_orders`.
pub fn decode_coeff_orders(
    reader: &mut BitReader<'_>,
    orders: &mut [[usize; BLOCK_SIZE]; ORDER_CONTEXTS],
) -> Result<()> {
    for order in orders.iter_mut() {
        if reader.read(1)? == 1 {
            order.copy_from_slice(&NATURAL_COEFF_ORDER[..BLOCK_SIZE]);
            continue;
        }
        let mut remaining: Vec<usize> = (1..BLOCK_SIZE).collect();
        order[0] = 0;
        for slot in order[1..].iter_mut() {
            let idx = reader.read(bits_for_count(remaining.len()))? as usize;
            if idx >= remaining.len() {
                return Err(Error::MalformedBitstream { reason: "Lehmer digit out of range" });
            }
            *slot = remaining.remove(idx);
        }
    }
    reader.jump_to_byte_boundary()
}

// ============================================================================
// AC tokenization
// ============================================================================

#[inline]
fn quant_context(qpred: i32) -> u32 {
    ((qpred >> 2) as u32).min(QUANT_FIELD_CONTEXTS as u32 - 1)
}

#[inline]
fn nonzero_context(octx: usize, left: u32, above: u32) -> u32 {
    let pred = (left + above + 1) >> 1;
    (QUANT_FIELD_CONTEXTS + octx * NONZERO_CONTEXTS) as u32
        + pred.min(NONZERO_CONTEXTS as u32 - 1)
}

#[inline]
fn ac_context(octx: usize, nz_left: u32, pos: usize) -> u32 {
    debug_assert!(pos >= 1 && pos < BLOCK_SIZE);
    let density = nz_left.min(7) as usize * 15 + ((pos - 1) >> 2).min(14);
    debug_assert!(density < AC_DENSITY_CONTEXTS);
    (QUANT_FIELD_CONTEXTS + ORDER_CONTEXTS * NONZERO_CONTEXTS + octx * AC_DENSITY_CONTEXTS) as u32
        + density as u32
}

#[inline]
fn quant_prediction(quant_field: &ImageI, x: usize, y: usize) -> i32 {
    if x > 0 {
        quant_field.get(x - 1, y)
    } else if y > 0 {
        quant_field.get(x, y - 1)
    } else {
        64
    }
}

const ZRL: u8 = 0xf0;
const EOB: u8 = 0x00;

/// Flattens the quant field, per-block nonzero counts, and AC coefficients
/// of every block into the token stream. The DC slot (offset 0 mod 64) is
/// never touched here.
pub fn tokenize_coefficients(
    orders: &[[usize; BLOCK_SIZE]; ORDER_CONTEXTS],
    quant_field: &ImageI,
    ac: &Image3S,
    block_ctx: &Image3B,
) -> Vec<Token> {
    let (bx, by) = (quant_field.xsize(), quant_field.ysize());
    debug_assert_eq!(ac.xsize(), bx * BLOCK_SIZE);
    debug_assert_eq!(ac.ysize(), by);
    let mut tokens = Vec::new();
    for c in 0..3 {
        let mut above_nz = vec![0u32; bx];
        for y in 0..by {
            let mut left_nz = 0u32;
            for x in 0..bx {
                if c == 0 {
                    let qpred = quant_prediction(quant_field, x, y);
                    let (nbits, bits) = nbits_and_bits(quant_field.get(x, y) - qpred);
                    tokens.push(Token::new(quant_context(qpred), nbits, nbits, bits));
                }
                let octx = block_ctx.plane_row(c, y)[x] as usize;
                let order = &orders[octx];
                let block = &ac.plane_row(c, y)[x * BLOCK_SIZE..(x + 1) * BLOCK_SIZE];
                let nzeros = block[1..].iter().filter(|&&v| v != 0).count() as u32;
                tokens.push(Token::new(
                    nonzero_context(octx, left_nz, above_nz[x]),
                    nzeros as u8,
                    0,
                    0,
                ));
                left_nz = nzeros;
                above_nz[x] = nzeros;

                let mut pos = 1usize;
                let mut remaining = nzeros;
                while remaining > 0 {
                    let mut j = pos;
                    while block[order[j]] == 0 {
                        j += 1;
                    }
                    let mut run = j - pos;
                    while run >= 16 {
                        tokens.push(Token::new(
                            ac_context(octx, remaining, pos),
                            INDEX_LUT[ZRL as usize],
                            0,
                            0,
                        ));
                        pos += 16;
                        run -= 16;
                    }
                    let (nbits, bits) = nbits_and_bits(i32::from(block[order[j]]));
                    debug_assert!(nbits <= 15, "AC coefficient out of magnitude range");
                    let symbol = ((run as u8) << 4) | nbits;
                    tokens.push(Token::new(
                        ac_context(octx, remaining, pos),
                        INDEX_LUT[symbol as usize],
                        nbits,
                        bits,
                    ));
                    pos = j + 1;
                    remaining -= 1;
                }
                if pos < BLOCK_SIZE {
                    tokens.push(Token::new(
                        ac_context(octx, 0, pos),
                        INDEX_LUT[EOB as usize],
                        0,
                        0,
                    ));
                }
            }
        }
    }
    tokens
}

/// Decodes the AC token stream produced by `tokenize_coefficients`,
/// restoring `ac`, `quant_field`, and the per-block nonzero counts.
pub fn decode_ac(
    block_ctx: &Image3B,
    orders: &[[usize; BLOCK_SIZE]; ORDER_CONTEXTS],
    tr: &mut TokenReader<'_, '_>,
    ac: &mut Image3S,
    quant_field: &mut ImageI,
    num_nzeros: &mut Image3I,
) -> Result<()> {
    let (bx, by) = (quant_field.xsize(), quant_field.ysize());
    for c in 0..3 {
        let mut above_nz = vec![0u32; bx];
        for y in 0..by {
            let mut left_nz = 0u32;
            for x in 0..bx {
                if c == 0 {
                    let qpred = quant_prediction(quant_field, x, y);
                    let nbits = tr.read_symbol(quant_context(qpred))?;
                    if nbits > 15 {
                        return Err(Error::MalformedBitstream { reason: "bad quant residual class" });
                    }
                    let bits = tr.read_bits(nbits)?;
                    let raw = qpred + value_from_bits(nbits, bits);
                    if !(1..=0x7fff).contains(&raw) {
                        return Err(Error::MalformedBitstream { reason: "quant index out of range" });
                    }
                    quant_field.set(x, y, raw);
                }
                let octx = block_ctx.plane_row(c, y)[x] as usize;
                let order = &orders[octx];
                let nzeros =
                    u32::from(tr.read_symbol(nonzero_context(octx, left_nz, above_nz[x]))?);
                if nzeros as usize >= BLOCK_SIZE {
                    return Err(Error::MalformedBitstream { reason: "nonzero count too large" });
                }
                num_nzeros.plane_row_mut(c, y)[x] = nzeros as i32;
                left_nz = nzeros;
                above_nz[x] = nzeros;

                let block_start = x * BLOCK_SIZE;
                let mut pos = 1usize;
                let mut remaining = nzeros;
                while remaining > 0 {
                    if pos >= BLOCK_SIZE {
                        return Err(Error::MalformedBitstream { reason: "AC scan overrun" });
                    }
                    let rank = tr.read_symbol(ac_context(octx, remaining, pos))?;
                    let symbol = SYMBOL_LUT[rank as usize];
                    if symbol == EOB {
                        return Err(Error::MalformedBitstream { reason: "early end of block" });
                    }
                    if symbol == ZRL {
                        pos += 16;
                        continue;
                    }
                    let run = usize::from(symbol >> 4);
                    let nbits = symbol & 15;
                    pos += run;
                    if pos >= BLOCK_SIZE {
                        return Err(Error::MalformedBitstream { reason: "AC run overrun" });
                    }
                    let bits = tr.read_bits(nbits)?;
                    let value = value_from_bits(nbits, bits);
                    if value == 0 {
                        return Err(Error::MalformedBitstream { reason: "zero AC value" });
                    }
                    ac.plane_row_mut(c, y)[block_start + order[pos]] = value as i16;
                    pos += 1;
                    remaining -= 1;
                }
                if pos < BLOCK_SIZE {
                    let rank = tr.read_symbol(ac_context(octx, 0, pos))?;
                    if SYMBOL_LUT[rank as usize] != EOB {
                        return Err(Error::MalformedBitstream { reason: "missing end of block" });
                    }
                }
            }
        }
    }
    Ok(())
}

/// All six scan orders initialized to the natural zig-zag.
#[must_use]
pub fn natural_coeff_orders() -> [[usize; BLOCK_SIZE]; ORDER_CONTEXTS] {
    let mut orders = [[0usize; BLOCK_SIZE]; ORDER_CONTEXTS];
    for order in orders.iter_mut() {
        order.copy_from_slice(&NATURAL_COEFF_ORDER[..BLOCK_SIZE]);
    }
    orders
}
