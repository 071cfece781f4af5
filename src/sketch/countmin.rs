//! Count-Min sketch over canonical k-mers.
//!
//! H independent tables of width W; `add` saturating-increments one cell
//! per table, `count` returns the minimum across tables. False positives
//! can inflate counts but never deflate them, and the sketch is
//! append-only within its lifetime. A presence-only variant packs one bit
//! per cell and answers `contains` when every probed bit is set.
//!
//! Probe positions come from two independent 64-bit hashes combined as
//! `h1 + i*h2` for table i, over a width rounded to a prime.

use anyhow::{anyhow, Result};

use crate::core::kmer::hash_pair;

/// Cell layout of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchKind {
    /// Saturating u16 counters.
    Counter,
    /// One bit per cell; `count` reports 0 or 1.
    Presence,
}

impl SketchKind {
    pub(crate) fn code(self) -> u8 {
        match self {
            SketchKind::Counter => 0,
            SketchKind::Presence => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(SketchKind::Counter),
            1 => Ok(SketchKind::Presence),
            other => Err(anyhow!("unknown sketch kind code {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Cells {
    Counts(Vec<u16>),
    Bits(Vec<u64>),
}

/// Count-Min / presence sketch over canonical k-mers of a fixed size.
#[derive(Debug, Clone)]
pub struct KmerSketch {
    pub(crate) k: usize,
    pub(crate) kind: SketchKind,
    pub(crate) num_tables: usize,
    pub(crate) width: u64,
    pub(crate) ceiling: u32,
    pub(crate) cells: Cells,
    /// Total add operations, for the fill-ratio FPR estimate.
    pub(crate) items_added: u64,
}

/// Round up to a prime by trial division. Widths are modest (< 2^40), so
/// the scan terminates quickly.
pub(crate) fn next_prime(mut n: u64) -> u64 {
    if n < 3 {
        return 3;
    }
    if n % 2 == 0 {
        n += 1;
    }
    loop {
        if is_prime(n) {
            return n;
        }
        n += 2;
    }
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3u64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

impl KmerSketch {
    /// Counting sketch targeting `mem_bytes` total, split across
    /// `num_tables` tables. Width is the prime nearest the per-table
    /// byte share divided by the 2-byte cell size.
    pub fn counter(k: usize, mem_bytes: usize, num_tables: usize, ceiling: u32) -> Result<Self> {
        Self::validate_params(k, num_tables)?;
        let width = next_prime((mem_bytes as u64 / num_tables as u64 / 2).max(3));
        let cells = Cells::Counts(vec![0u16; (width * num_tables as u64) as usize]);
        Ok(Self {
            k,
            kind: SketchKind::Counter,
            num_tables,
            width,
            ceiling: ceiling.min(u16::MAX as u32),
            cells,
            items_added: 0,
        })
    }

    /// Presence-only sketch targeting `mem_bytes` total (8 cells per byte).
    pub fn presence(k: usize, mem_bytes: usize, num_tables: usize) -> Result<Self> {
        Self::validate_params(k, num_tables)?;
        let width = next_prime((mem_bytes as u64 * 8 / num_tables as u64).max(3));
        let words_per_table = width.div_ceil(64);
        let cells = Cells::Bits(vec![0u64; (words_per_table * num_tables as u64) as usize]);
        Ok(Self {
            k,
            kind: SketchKind::Presence,
            num_tables,
            width,
            ceiling: 1,
            cells,
            items_added: 0,
        })
    }

    fn validate_params(k: usize, num_tables: usize) -> Result<()> {
        if k == 0 || k > 255 {
            return Err(anyhow!("k-mer size {k} out of range (1..=255)"));
        }
        if num_tables == 0 || num_tables > 255 {
            return Err(anyhow!("table count {num_tables} out of range (1..=255)"));
        }
        Ok(())
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn kind(&self) -> SketchKind {
        self.kind
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn count_ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn items_added(&self) -> u64 {
        self.items_added
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, table: usize) -> u64 {
        h1.wrapping_add(h2.wrapping_mul(table as u64)) % self.width
    }

    /// Insert one occurrence of a canonical k-mer. Returns the new
    /// min-count estimate (saturated at the ceiling).
    pub fn add(&mut self, kmer: &[u8]) -> u16 {
        debug_assert_eq!(kmer.len(), self.k, "k-mer length does not match sketch K");
        let (h1, h2) = hash_pair(kmer);
        self.items_added += 1;
        let ceiling = self.ceiling as u16;
        match &mut self.cells {
            Cells::Counts(counts) => {
                let mut min_after = u16::MAX;
                for t in 0..self.num_tables {
                    let idx = (t as u64 * self.width
                        + h1.wrapping_add(h2.wrapping_mul(t as u64)) % self.width)
                        as usize;
                    if counts[idx] < ceiling {
                        counts[idx] += 1;
                    }
                    min_after = min_after.min(counts[idx]);
                }
                min_after
            }
            Cells::Bits(words) => {
                let words_per_table = self.width.div_ceil(64);
                for t in 0..self.num_tables {
                    let pos = h1.wrapping_add(h2.wrapping_mul(t as u64)) % self.width;
                    let idx = (t as u64 * words_per_table + pos / 64) as usize;
                    words[idx] |= 1u64 << (pos % 64);
                }
                1
            }
        }
    }

    /// Min-count estimate for a canonical k-mer.
    pub fn count(&self, kmer: &[u8]) -> u16 {
        debug_assert_eq!(kmer.len(), self.k, "k-mer length does not match sketch K");
        let (h1, h2) = hash_pair(kmer);
        match &self.cells {
            Cells::Counts(counts) => {
                let mut min_count = u16::MAX;
                for t in 0..self.num_tables {
                    let idx = (t as u64 * self.width + self.probe(h1, h2, t)) as usize;
                    min_count = min_count.min(counts[idx]);
                }
                min_count
            }
            Cells::Bits(words) => {
                let words_per_table = self.width.div_ceil(64);
                for t in 0..self.num_tables {
                    let pos = self.probe(h1, h2, t);
                    let idx = (t as u64 * words_per_table + pos / 64) as usize;
                    if words[idx] & (1u64 << (pos % 64)) == 0 {
                        return 0;
                    }
                }
                1
            }
        }
    }

    pub fn contains(&self, kmer: &[u8]) -> bool {
        self.count(kmer) > 0
    }

    /// Occupied-cell fraction per table.
    fn fill_ratios(&self) -> Vec<f64> {
        let mut fills = Vec::with_capacity(self.num_tables);
        match &self.cells {
            Cells::Counts(counts) => {
                for t in 0..self.num_tables {
                    let start = (t as u64 * self.width) as usize;
                    let end = start + self.width as usize;
                    let occupied = counts[start..end].iter().filter(|&&c| c > 0).count();
                    fills.push(occupied as f64 / self.width as f64);
                }
            }
            Cells::Bits(words) => {
                let words_per_table = self.width.div_ceil(64) as usize;
                for t in 0..self.num_tables {
                    let start = t * words_per_table;
                    let occupied: u32 = words[start..start + words_per_table]
                        .iter()
                        .map(|w| w.count_ones())
                        .sum();
                    fills.push(occupied as f64 / self.width as f64);
                }
            }
        }
        fills
    }

    /// Estimated false-positive rate from the observed fill ratios: the
    /// more pessimistic of the product across tables and the worst
    /// table raised to the table count.
    pub fn estimated_fpr(&self) -> f64 {
        let fills = self.fill_ratios();
        if fills.is_empty() {
            return 0.0;
        }
        let product: f64 = fills.iter().product();
        let max_fill = fills.iter().cloned().fold(0.0f64, f64::max);
        product.max(max_fill.powi(self.num_tables as i32))
    }

    /// Total memory held by the cell arrays, in bytes.
    pub fn memory_bytes(&self) -> usize {
        match &self.cells {
            Cells::Counts(counts) => counts.len() * 2,
            Cells::Bits(words) => words.len() * 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kmer::canonical;

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(10), 11);
        assert_eq!(next_prime(11), 11);
        assert_eq!(next_prime(1), 3);
    }

    #[test]
    fn test_add_and_count() {
        let mut sketch = KmerSketch::counter(5, 1 << 16, 4, 255).unwrap();
        let kmer = canonical(b"ACGTA");
        assert_eq!(sketch.count(&kmer), 0);
        for expected in 1..=5u16 {
            assert_eq!(sketch.add(&kmer), expected);
        }
        assert_eq!(sketch.count(&kmer), 5);
    }

    #[test]
    fn test_count_saturates_at_ceiling() {
        let mut sketch = KmerSketch::counter(5, 1 << 12, 2, 3).unwrap();
        let kmer = canonical(b"ACGTA");
        for _ in 0..10 {
            sketch.add(&kmer);
        }
        assert_eq!(sketch.count(&kmer), 3);
    }

    #[test]
    fn test_presence_contains() {
        let mut sketch = KmerSketch::presence(5, 1 << 12, 3).unwrap();
        let present = canonical(b"ACGTA");
        let absent = canonical(b"TTTTG");
        sketch.add(&present);
        assert!(sketch.contains(&present));
        assert!(!sketch.contains(&absent));
        assert_eq!(sketch.count(&present), 1);
    }

    #[test]
    fn test_counts_never_deflate() {
        let mut sketch = KmerSketch::counter(5, 1 << 14, 3, 255).unwrap();
        let a = canonical(b"ACGTA");
        let b = canonical(b"GGGTC");
        for _ in 0..4 {
            sketch.add(&a);
        }
        let before = sketch.count(&a);
        sketch.add(&b);
        assert!(sketch.count(&a) >= before);
    }

    fn dna_from_index(mut i: u64, len: usize) -> Vec<u8> {
        let bases = [b'A', b'C', b'G', b'T'];
        (0..len)
            .map(|_| {
                let b = bases[(i % 4) as usize];
                i /= 4;
                b
            })
            .collect()
    }

    #[test]
    fn test_fpr_grows_with_load() {
        let mut sketch = KmerSketch::counter(6, 1 << 10, 2, 255).unwrap();
        assert_eq!(sketch.estimated_fpr(), 0.0);
        for i in 0..200u64 {
            sketch.add(&canonical(&dna_from_index(i, 6)));
        }
        let fpr = sketch.estimated_fpr();
        assert!(fpr > 0.0);
        assert!(fpr <= 1.0);
    }
}
