//! Range ANS entropy coding with clustered histograms
//!
//! Symbols are coded with a byte-wise rANS (32-bit state, 12-bit frequency
//! precision). The encoder pushes symbols in reverse so the decoder can read
//! the stream forward. Per-context empirical histograms are clustered into a
//! bounded set before transmission; the context map says which cluster each
//! context uses.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// log2 of the frequency table size.
pub const ANS_LOG_TAB_SIZE: u32 = 12;
/// All normalized histograms sum to this.
pub const ANS_TAB_SIZE: u32 = 1 << ANS_LOG_TAB_SIZE;

const RANS_L: u32 = 1 << 23;

/// Upper bound on distinct histograms after clustering.
pub const MAX_CLUSTERS: usize = 64;

/// Cost in bits below which merging two histograms beats opening a cluster.
const CLUSTER_PENALTY_BITS: f64 = 1024.0;

/// Empirical symbol counts for one context.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub counts: Vec<u32>,
    pub total: u64,
}

impl Histogram {
    #[must_use]
    pub fn new(alphabet_size: usize) -> Self {
        Self {
            counts: vec![0; alphabet_size],
            total: 0,
        }
    }

    #[inline]
    pub fn add(&mut self, symbol: u8) {
        self.counts[symbol as usize] += 1;
        self.total += 1;
    }

    pub fn add_histogram(&mut self, other: &Histogram) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.total += other.total;
    }

    /// Shannon cost of coding the histogram's own symbols, in bits.
    #[must_use]
    pub fn entropy_bits(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let total = self.total as f64;
        let mut bits = 0.0;
        for &c in &self.counts {
            if c > 0 {
                bits += f64::from(c) * (total / f64::from(c)).log2();
            }
        }
        bits
    }
}

/// Normalized frequencies ready for ANS coding.
#[derive(Debug, Clone)]
pub struct AnsEncodingData {
    pub freqs: Vec<u32>,
    pub cum_freqs: Vec<u32>,
}

fn normalize_counts(counts: &[u32], total: u64) -> Vec<u32> {
    let n = counts.len();
    let mut freqs = vec![0u32; n];
    if total == 0 {
        // Unused context; give all mass to symbol 0.
        freqs[0] = ANS_TAB_SIZE;
        return freqs;
    }
    let mut sum = 0u32;
    for (f, &c) in freqs.iter_mut().zip(counts) {
        if c > 0 {
            *f = ((u64::from(ANS_TAB_SIZE) * u64::from(c) / total) as u32).max(1);
            sum += *f;
        }
    }
    // Fix the rounding drift on the most frequent symbols.
    while sum != ANS_TAB_SIZE {
        if sum > ANS_TAB_SIZE {
            let i = (0..n)
                .filter(|&i| freqs[i] > 1)
                .max_by_key(|&i| freqs[i])
                .expect("at least one reducible frequency");
            freqs[i] -= 1;
            sum -= 1;
        } else {
            let i = (0..n).max_by_key(|&i| freqs[i]).expect("nonempty alphabet");
            freqs[i] += 1;
            sum += 1;
        }
    }
    freqs
}

fn cumulative(freqs: &[u32]) -> Vec<u32> {
    let mut cum = vec![0u32; freqs.len() + 1];
    for (i, &f) in freqs.iter().enumerate() {
        cum[i + 1] = cum[i] + f;
    }
    cum
}

impl AnsEncodingData {
    #[must_use]
    pub fn new(histogram: &Histogram) -> Self {
        let freqs = normalize_counts(&histogram.counts, histogram.total);
        let cum_freqs = cumulative(&freqs);
        Self { freqs, cum_freqs }
    }
}

/// Decoder-side tables: normalized frequencies plus a slot-to-symbol map.
#[derive(Debug, Clone)]
pub struct AnsDecodingData {
    pub freqs: Vec<u32>,
    pub cum_freqs: Vec<u32>,
    slot_to_symbol: Vec<u8>,
}

impl AnsDecodingData {
    pub fn new(freqs: Vec<u32>) -> Result<Self> {
        let sum: u64 = freqs.iter().map(|&f| u64::from(f)).sum();
        if sum != u64::from(ANS_TAB_SIZE) {
            return Err(Error::MalformedBitstream { reason: "histogram does not sum to table size" });
        }
        let cum_freqs = cumulative(&freqs);
        let mut slot_to_symbol = vec![0u8; ANS_TAB_SIZE as usize];
        for (sym, window) in cum_freqs.windows(2).enumerate() {
            for slot in window[0]..window[1] {
                slot_to_symbol[slot as usize] = sym as u8;
            }
        }
        Ok(Self { freqs, cum_freqs, slot_to_symbol })
    }
}

/// rANS encoder; symbols must be pushed in reverse stream order.
#[derive(Debug)]
pub struct AnsEncoder {
    state: u32,
    reversed: Vec<u8>,
}

impl Default for AnsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RANS_L,
            reversed: Vec::new(),
        }
    }

    pub fn put(&mut self, data: &AnsEncodingData, symbol: u8) {
        let freq = data.freqs[symbol as usize];
        debug_assert!(freq > 0, "symbol {} has zero frequency", symbol);
        let start = data.cum_freqs[symbol as usize];
        let x_max = ((RANS_L >> ANS_LOG_TAB_SIZE) << 8) * freq;
        while self.state >= x_max {
            self.reversed.push((self.state & 0xff) as u8);
            self.state >>= 8;
        }
        self.state = ((self.state / freq) << ANS_LOG_TAB_SIZE) + (self.state % freq) + start;
    }

    /// Closes the stream; the returned bytes are read forward by the decoder.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.reversed.push((self.state >> 24) as u8);
        self.reversed.push((self.state >> 16) as u8);
        self.reversed.push((self.state >> 8) as u8);
        self.reversed.push(self.state as u8);
        self.reversed.reverse();
        self.reversed
    }
}

/// rANS decoder over a byte slice.
#[derive(Debug)]
pub struct AnsDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    state: u32,
}

impl<'a> AnsDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::MalformedBitstream { reason: "ANS stream too short" });
        }
        let state = u32::from(bytes[0])
            | u32::from(bytes[1]) << 8
            | u32::from(bytes[2]) << 16
            | u32::from(bytes[3]) << 24;
        Ok(Self { bytes, pos: 4, state })
    }

    pub fn get(&mut self, data: &AnsDecodingData) -> Result<u8> {
        let slot = self.state & (ANS_TAB_SIZE - 1);
        let symbol = data.slot_to_symbol[slot as usize];
        let freq = data.freqs[symbol as usize];
        let start = data.cum_freqs[symbol as usize];
        self.state = freq * (self.state >> ANS_LOG_TAB_SIZE) + slot - start;
        while self.state < RANS_L {
            if self.pos >= self.bytes.len() {
                return Err(Error::MalformedBitstream { reason: "ANS stream exhausted" });
            }
            self.state = (self.state << 8) | u32::from(self.bytes[self.pos]);
            self.pos += 1;
        }
        Ok(symbol)
    }

    /// True when every byte has been consumed and the state has returned to
    /// its initial value.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pos == self.bytes.len() && self.state == RANS_L
    }
}

/// Clusters per-context histograms into at most `MAX_CLUSTERS` groups.
///
/// Greedy: each histogram joins the cluster whose entropy it inflates the
/// least, unless opening a new cluster is cheaper and the budget allows it.
/// Returns the clustered histograms and the context map.
pub fn cluster_histograms(histograms: &[Histogram]) -> (Vec<Histogram>, Vec<u8>) {
    let mut clusters: Vec<Histogram> = Vec::new();
    let mut context_map = vec![0u8; histograms.len()];
    for (ctx, h) in histograms.iter().enumerate() {
        if h.total == 0 {
            continue;
        }
        let own = h.entropy_bits();
        let mut best: Option<(usize, f64)> = None;
        for (i, c) in clusters.iter().enumerate() {
            let mut merged = c.clone();
            merged.add_histogram(h);
            let delta = merged.entropy_bits() - c.entropy_bits() - own;
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((i, delta));
            }
        }
        match best {
            Some((i, delta)) if delta < CLUSTER_PENALTY_BITS || clusters.len() >= MAX_CLUSTERS => {
                clusters[i].add_histogram(h);
                context_map[ctx] = i as u8;
            }
            _ => {
                clusters.push(h.clone());
                context_map[ctx] = (clusters.len() - 1) as u8;
            }
        }
    }
    if clusters.is_empty() {
        clusters.push(Histogram::new(histograms[0].counts.len()));
    }
    (clusters, context_map)
}

/// Writes a normalized histogram. Degenerate single-symbol histograms get a
/// one-bit shortcut.
pub fn write_histogram(writer: &mut BitWriter, freqs: &[u32]) {
    if let Some(sym) = freqs.iter().position(|&f| f == ANS_TAB_SIZE) {
        writer.write(1, 1);
        writer.write(8, sym as u32);
        return;
    }
    writer.write(1, 0);
    let max_symbol = freqs.iter().rposition(|&f| f > 0).unwrap_or(0);
    writer.write(8, max_symbol as u32);
    for &f in &freqs[..=max_symbol] {
        if f == 0 {
            writer.write(1, 0);
        } else {
            writer.write(1, 1);
            writer.write(12, f - 1);
        }
    }
}

/// Reads a histogram written by `write_histogram`.
pub fn read_histogram(reader: &mut BitReader<'_>, alphabet_size: usize) -> Result<Vec<u32>> {
    let mut freqs = vec![0u32; alphabet_size];
    if reader.read(1)? == 1 {
        let sym = reader.read(8)? as usize;
        if sym >= alphabet_size {
            return Err(Error::MalformedBitstream { reason: "histogram symbol out of range" });
        }
        freqs[sym] = ANS_TAB_SIZE;
        return Ok(freqs);
    }
    let max_symbol = reader.read(8)? as usize;
    if max_symbol >= alphabet_size {
        return Err(Error::MalformedBitstream { reason: "histogram symbol out of range" });
    }
    for f in freqs.iter_mut().take(max_symbol + 1) {
        if reader.read(1)? == 1 {
            *f = reader.read(12)? + 1;
        }
    }
    Ok(freqs)
}

/// Writes the context map as (value, run) byte pairs.
pub fn write_context_map(writer: &mut BitWriter, context_map: &[u8], num_clusters: usize) {
    writer.write(8, num_clusters as u32);
    let mut i = 0;
    while i < context_map.len() {
        let value = context_map[i];
        let mut run = 1usize;
        while i + run < context_map.len() && context_map[i + run] == value && run < 256 {
            run += 1;
        }
        writer.write(8, u32::from(value));
        writer.write(8, (run - 1) as u32);
        i += run;
    }
}

/// Reads a context map of `num_contexts` entries; returns (map, clusters).
pub fn read_context_map(reader: &mut BitReader<'_>, num_contexts: usize) -> Result<(Vec<u8>, usize)> {
    let num_clusters = reader.read(8)? as usize;
    if num_clusters == 0 || num_clusters > MAX_CLUSTERS {
        return Err(Error::MalformedBitstream { reason: "bad cluster count" });
    }
    let mut map = Vec::with_capacity(num_contexts);
    while map.len() < num_contexts {
        let value = reader.read(8)? as u8;
        let run = reader.read(8)? as usize + 1;
        if value as usize >= num_clusters || map.len() + run > num_contexts {
            return Err(Error::MalformedBitstream { reason: "bad context map run" });
        }
        map.extend(std::iter::repeat(value).take(run));
    }
    Ok((map, num_clusters))
}
