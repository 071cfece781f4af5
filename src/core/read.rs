//! Augmented reads: sequencing reads annotated with the positions and
//! abundances of their novel k-mers.
//!
//! The novelty filter emits these, the refinement filter prunes them, and
//! the partitioner groups them. Annotations are kept in offset order; the
//! abundance vector always lists the case sample first, controls after.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::core::kmer::{canonical, canonical_str};

/// One annotated k-mer occurrence within a read. `abundances[0]` is the
/// case count, the remainder are the control counts in sample order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmerAnnotation {
    pub offset: usize,
    pub kmer: String,
    pub abundances: Vec<u16>,
}

impl KmerAnnotation {
    pub fn new(offset: usize, kmer: impl Into<String>, abundances: Vec<u16>) -> Self {
        Self {
            offset,
            kmer: kmer.into(),
            abundances,
        }
    }

    pub fn case_abundance(&self) -> u16 {
        self.abundances.first().copied().unwrap_or(0)
    }

    pub fn control_abundances(&self) -> &[u16] {
        if self.abundances.is_empty() {
            &[]
        } else {
            &self.abundances[1..]
        }
    }
}

/// A sequencing read augmented with novel k-mer annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentedRead {
    pub id: String,
    pub sequence: String,
    /// FASTQ quality string; absent for FASTA input.
    pub quals: Option<String>,
    /// Mate sequences carried through the augmented format.
    pub mate_seqs: Vec<String>,
    /// Novel k-mer occurrences, ordered by offset.
    pub annotations: Vec<KmerAnnotation>,
}

impl AugmentedRead {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
            quals: None,
            mate_seqs: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_quals(mut self, quals: impl Into<String>) -> Self {
        self.quals = Some(quals.into());
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
    }

    /// Distinct canonical novel k-mers annotated on this read.
    pub fn novel_kmer_set(&self) -> AHashSet<Vec<u8>> {
        self.annotations
            .iter()
            .map(|a| canonical(a.kmer.as_bytes()))
            .collect()
    }

    /// Strand-invariant sequence identity used for partition dedup: the
    /// canonical form of the full read sequence.
    pub fn canonical_identity(&self) -> String {
        canonical_str(&self.sequence)
    }

    /// Keep only annotations satisfying `keep`, preserving offset order.
    pub fn retain_annotations<F>(&mut self, keep: F)
    where
        F: FnMut(&KmerAnnotation) -> bool,
    {
        self.annotations.retain(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_with_annotations() -> AugmentedRead {
        let mut read = AugmentedRead::new("read1", "ACGTACGTACGT").with_quals("IIIIIIIIIIII");
        read.annotations.push(KmerAnnotation::new(0, "ACGTA", vec![9, 0, 1]));
        read.annotations.push(KmerAnnotation::new(3, "TACGT", vec![8, 1, 0]));
        read
    }

    #[test]
    fn test_abundance_split() {
        let read = read_with_annotations();
        assert_eq!(read.annotations[0].case_abundance(), 9);
        assert_eq!(read.annotations[0].control_abundances(), &[0, 1]);
    }

    #[test]
    fn test_novel_kmer_set_is_canonical() {
        let read = read_with_annotations();
        let set = read.novel_kmer_set();
        // ACGTA and TACGT are each other's reverse complements
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_canonical_identity_matches_revcomp() {
        let fwd = AugmentedRead::new("a", "ACGTTGCA");
        let rev = AugmentedRead::new("b", "TGCAACGT");
        assert_eq!(fwd.canonical_identity(), rev.canonical_identity());
    }

    #[test]
    fn test_retain_annotations() {
        let mut read = read_with_annotations();
        read.retain_annotations(|a| a.offset == 0);
        assert_eq!(read.annotations.len(), 1);
        assert_eq!(read.annotations[0].offset, 0);
    }
}
