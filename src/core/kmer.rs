//! Canonical k-mer operations: reverse complement, canonicalization,
//! positioned extraction, and the deterministic hash family used by sketches.
//!
//! K-mers are handled as uppercase ASCII bytes. The canonical form of a
//! k-mer is the lexicographic minimum of the k-mer and its reverse
//! complement, so `canonical(k) == canonical(revcomp(k))` always holds.

use anyhow::{anyhow, Result};

/// Complement a single DNA base. Anything outside ACGT maps to N.
#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' => b'A',
        _ => b'N',
    }
}

/// Reverse complement of a DNA sequence.
pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// True if every base is unambiguous ACGT (either case).
#[inline]
pub fn is_unambiguous(seq: &[u8]) -> bool {
    !seq.is_empty()
        && seq
            .iter()
            .all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't'))
}

/// Canonical form: lexicographic min of the uppercased k-mer and its
/// reverse complement.
pub fn canonical(kmer: &[u8]) -> Vec<u8> {
    let upper: Vec<u8> = kmer.iter().map(|b| b.to_ascii_uppercase()).collect();
    let rc = revcomp(&upper);
    if upper <= rc {
        upper
    } else {
        rc
    }
}

/// Canonical form for string input.
pub fn canonical_str(kmer: &str) -> String {
    String::from_utf8(canonical(kmer.as_bytes())).expect("canonical preserves ASCII")
}

/// Extract every k-length window of `seq` together with its offset,
/// in canonical form. Windows containing a non-ACGT base are skipped, so a
/// read with an `N` effectively splits at that position. Reads shorter
/// than k yield nothing.
pub fn positioned_kmers(seq: &[u8], k: usize) -> Vec<(usize, Vec<u8>)> {
    if k == 0 || seq.len() < k {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(seq.len() - k + 1);
    for i in 0..=seq.len() - k {
        let window = &seq[i..i + k];
        if is_unambiguous(window) {
            out.push((i, canonical(window)));
        }
    }
    out
}

/// Canonical k-mers without positions, for bulk counting.
pub fn kmers_of(seq: &[u8], k: usize) -> Vec<Vec<u8>> {
    positioned_kmers(seq, k).into_iter().map(|(_, km)| km).collect()
}

/// K-mer sizes above this cannot be 2-bit packed into a u64.
pub const MAX_PACKED_K: usize = 31;

/// 2-bit encode an unambiguous k-mer (k <= 31) into a u64.
/// A=0, C=1, G=2, T=3.
pub fn pack_kmer(kmer: &[u8]) -> Result<u64> {
    if kmer.len() > MAX_PACKED_K {
        return Err(anyhow!(
            "k-mer size {} exceeds packable maximum {}",
            kmer.len(),
            MAX_PACKED_K
        ));
    }
    let mut packed: u64 = 0;
    for &b in kmer {
        let code = match b {
            b'A' | b'a' => 0u64,
            b'C' | b'c' => 1,
            b'G' | b'g' => 2,
            b'T' | b't' => 3,
            _ => return Err(anyhow!("cannot pack ambiguous base {:?}", b as char)),
        };
        packed = (packed << 2) | code;
    }
    Ok(packed)
}

/// Finalizing mixer from splitmix64. Full-avalanche over 64 bits, stable
/// across runs and platforms, which keeps serialized sketches portable.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Deterministic 64-bit hash of a k-mer under a seed. K-mers that fit the
/// 2-bit packing hash through the packed value; longer seeds fold bytes in.
pub fn hash_kmer(kmer: &[u8], seed: u64) -> u64 {
    if kmer.len() <= MAX_PACKED_K {
        if let Ok(packed) = pack_kmer(kmer) {
            return mix64(packed ^ mix64(seed));
        }
    }
    let mut h = mix64(seed ^ kmer.len() as u64);
    for chunk in kmer.chunks(8) {
        let mut word = 0u64;
        for &b in chunk {
            word = (word << 8) | b as u64;
        }
        h = mix64(h ^ word);
    }
    h
}

/// The two independent hashes the sketch derives its H probe positions from.
pub fn hash_pair(kmer: &[u8]) -> (u64, u64) {
    (hash_kmer(kmer, 0x5851f42d4c957f2d), hash_kmer(kmer, 0x14057b7ef767814f))
}

/// Low-complexity test: homopolymers, dinucleotide repeats, and k-mers
/// dominated (>80%) by a single base. Used for the Homopolymer call filter.
pub fn is_low_complexity(kmer: &[u8]) -> bool {
    if kmer.is_empty() {
        return true;
    }
    let upper: Vec<u8> = kmer.iter().map(|b| b.to_ascii_uppercase()).collect();

    if upper.iter().all(|&b| b == upper[0]) {
        return true;
    }

    if upper.len() >= 4 && upper.iter().enumerate().all(|(i, &b)| b == upper[i % 2]) {
        return true;
    }

    let mut counts = [0u32; 4];
    for &b in &upper {
        match b {
            b'A' => counts[0] += 1,
            b'C' => counts[1] += 1,
            b'G' => counts[2] += 1,
            b'T' => counts[3] += 1,
            _ => {}
        }
    }
    let max_count = *counts.iter().max().expect("four base counts");
    max_count * 100 > upper.len() as u32 * 80
}

/// Length of the longest homopolymer run overlapping `pos` in `seq`.
pub fn homopolymer_run_at(seq: &[u8], pos: usize) -> usize {
    if pos >= seq.len() {
        return 0;
    }
    let base = seq[pos].to_ascii_uppercase();
    let mut start = pos;
    while start > 0 && seq[start - 1].to_ascii_uppercase() == base {
        start -= 1;
    }
    let mut end = pos;
    while end + 1 < seq.len() && seq[end + 1].to_ascii_uppercase() == base {
        end += 1;
    }
    end - start + 1
}
