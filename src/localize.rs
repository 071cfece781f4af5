//! Contig localization: anchor a contig to the reference via seed k-mers
//! and extract the implicated reference windows.
//!
//! Seeds are sampled from the contig at a fixed spacing and looked up in
//! a precomputed canonical seed index over the reference. Hits on the
//! same sequence are clustered with a positional band; each cluster
//! yields one padded reference window. A contig with no clusters is a
//! no-reference-match condition and produces no variant.

use ahash::AHashMap;
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembly::Contig;
use crate::core::kmer::canonical;

/// Localization parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizeParams {
    /// Seed k-mer size; may differ from the pipeline K.
    pub seed_size: usize,
    /// Distance between sampled seed offsets in the contig.
    pub seed_spacing: usize,
    /// Maximum positional spread a hit cluster may cover.
    pub maxdiff: usize,
    /// Reference padding added on both sides of the clustered span.
    pub pad: usize,
}

impl Default for LocalizeParams {
    fn default() -> Self {
        Self {
            seed_size: 31,
            seed_spacing: 10,
            maxdiff: 1000,
            pad: 100,
        }
    }
}

/// A reference slice implicated by a contig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceWindow {
    pub seqid: String,
    /// 0-based half-open interval on the reference sequence.
    pub start: usize,
    pub end: usize,
    pub sequence: String,
}

impl ReferenceWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Precomputed canonical seed index over the reference genome:
/// seed k-mer -> (sequence, position) hit list.
pub struct ReferenceIndex {
    seed_size: usize,
    sequences: Vec<(String, String)>,
    index: AHashMap<Vec<u8>, Vec<(u32, u32)>>,
}

impl ReferenceIndex {
    pub fn build(sequences: Vec<(String, String)>, seed_size: usize) -> Result<Self> {
        if seed_size == 0 {
            return Err(anyhow!("seed size must be positive"));
        }
        // Index each sequence independently, then merge
        let partial: Vec<AHashMap<Vec<u8>, Vec<(u32, u32)>>> = sequences
            .par_iter()
            .enumerate()
            .map(|(seq_idx, (_, sequence))| {
                let mut index: AHashMap<Vec<u8>, Vec<(u32, u32)>> = AHashMap::new();
                let bytes = sequence.as_bytes();
                if bytes.len() < seed_size {
                    return index;
                }
                for pos in 0..=bytes.len() - seed_size {
                    let window = &bytes[pos..pos + seed_size];
                    if !window
                        .iter()
                        .all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T'))
                    {
                        continue;
                    }
                    index
                        .entry(canonical(window))
                        .or_default()
                        .push((seq_idx as u32, pos as u32));
                }
                index
            })
            .collect();

        let mut index: AHashMap<Vec<u8>, Vec<(u32, u32)>> = AHashMap::new();
        for per_seq in partial {
            for (seed, mut hits) in per_seq {
                index.entry(seed).or_default().append(&mut hits);
            }
        }
        Ok(Self {
            seed_size,
            sequences,
            index,
        })
    }

    pub fn seed_size(&self) -> usize {
        self.seed_size
    }

    pub fn sequences(&self) -> &[(String, String)] {
        &self.sequences
    }

    pub fn seqid(&self, idx: u32) -> &str {
        &self.sequences[idx as usize].0
    }

    fn hits(&self, seed: &[u8]) -> &[(u32, u32)] {
        self.index
            .get(seed)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Sample seed offsets across the contig: every `spacing` bases plus the
/// final full window.
fn seed_offsets(contig_len: usize, seed_size: usize, spacing: usize) -> Vec<usize> {
    if contig_len < seed_size {
        return Vec::new();
    }
    let last = contig_len - seed_size;
    let mut offsets: Vec<usize> = (0..=last).step_by(spacing.max(1)).collect();
    if *offsets.last().expect("at least offset 0") != last {
        offsets.push(last);
    }
    offsets
}

/// Localize a contig. Returns zero windows when no seed clusters form.
pub fn localize(
    contig: &Contig,
    index: &ReferenceIndex,
    params: &LocalizeParams,
) -> Result<Vec<ReferenceWindow>> {
    if params.seed_size != index.seed_size() {
        return Err(anyhow!(
            "seed size {} does not match reference index seed size {}",
            params.seed_size,
            index.seed_size()
        ));
    }

    let bytes = contig.sequence.as_bytes();
    let mut hits_by_seq: AHashMap<u32, Vec<u32>> = AHashMap::new();
    for offset in seed_offsets(bytes.len(), params.seed_size, params.seed_spacing) {
        let window = &bytes[offset..offset + params.seed_size];
        if !window
            .iter()
            .all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T'))
        {
            continue;
        }
        for &(seq_idx, pos) in index.hits(&canonical(window)) {
            hits_by_seq.entry(seq_idx).or_default().push(pos);
        }
    }

    if hits_by_seq.is_empty() {
        debug!(contig = contig.id, "no reference seed matches");
        return Ok(Vec::new());
    }

    let mut windows = Vec::new();
    for (seq_idx, mut positions) in hits_by_seq {
        positions.sort_unstable();
        positions.dedup();

        // Band clustering: split where consecutive hits drift apart
        let mut cluster_start = 0usize;
        for i in 1..=positions.len() {
            let split = i == positions.len()
                || (positions[i] - positions[cluster_start]) as usize > params.maxdiff;
            if !split {
                continue;
            }
            let min_pos = positions[cluster_start] as usize;
            let max_pos = positions[i - 1] as usize;
            cluster_start = i;

            let (_, ref_seq) = &index.sequences()[seq_idx as usize];
            let start = min_pos.saturating_sub(params.pad);
            let end = (max_pos + contig.len() + params.pad).min(ref_seq.len());
            if start >= end {
                continue;
            }
            windows.push(ReferenceWindow {
                seqid: index.seqid(seq_idx).to_string(),
                start,
                end,
                sequence: ref_seq[start..end].to_string(),
            });
        }
    }

    windows.sort_by(|a, b| a.seqid.cmp(&b.seqid).then(a.start.cmp(&b.start)));
    Ok(windows)
}
