//! Banded affine-gap alignment of a contig against a reference window:
//! global in the contig, local in the reference.

use anyhow::{anyhow, Result};
use bio::alignment::pairwise::banded;
use bio::alignment::{Alignment, AlignmentOperation};
use serde::{Deserialize, Serialize};

/// Scoring and banding parameters for the contig/window alignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    /// Gap penalties, expressed as negative scores.
    pub gap_open: i32,
    pub gap_extend: i32,
    /// Seed k-mer size for the alignment band.
    pub band_kmer: usize,
    /// Band window width around the seed diagonal.
    pub band_width: usize,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            match_score: 1,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
            band_kmer: 10,
            band_width: 50,
        }
    }
}

/// Outcome of aligning one contig against one reference window.
#[derive(Debug, Clone)]
pub struct ContigAlignment {
    pub score: i32,
    /// Window-local offset where the aligned region begins.
    pub ystart: usize,
    pub operations: Vec<AlignmentOperation>,
    pub cigar: String,
}

/// Align `contig` (query, global) against `window` (reference, local).
pub fn align_contig(
    contig: &str,
    window: &str,
    params: &AlignmentParams,
) -> Result<ContigAlignment> {
    if contig.is_empty() || window.is_empty() {
        return Err(anyhow!("cannot align empty sequences"));
    }
    if params.gap_open >= 0 || params.gap_extend > 0 {
        return Err(anyhow!(
            "gap penalties must be negative (open={}, extend={})",
            params.gap_open,
            params.gap_extend
        ));
    }

    let match_score = params.match_score;
    let mismatch_score = params.mismatch_score;
    let score = |a: u8, b: u8| {
        if a == b {
            match_score
        } else {
            mismatch_score
        }
    };
    let mut aligner = banded::Aligner::new(
        params.gap_open,
        params.gap_extend,
        score,
        params.band_kmer,
        params.band_width,
    );
    let alignment: Alignment = aligner.semiglobal(contig.as_bytes(), window.as_bytes());
    let cigar = alignment.cigar(false);

    Ok(ContigAlignment {
        score: alignment.score,
        ystart: alignment.ystart,
        operations: alignment.operations,
        cigar,
    })
}
