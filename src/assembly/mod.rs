//! Per-partition local assembly.
//!
//! Two assembler implementations sit behind one narrow trait so the
//! pipeline can fall back transparently: a de Bruijn graph assembler as
//! the primary path and a greedy overlap extender for partitions the
//! graph cannot resolve.

pub mod debruijn;
pub mod greedy;

use ahash::AHashSet;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::kmer::canonical;
use crate::core::read::AugmentedRead;

pub use debruijn::DeBruijnAssembler;
pub use greedy::GreedyAssembler;

/// An assembled contig with its supporting evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
    pub id: usize,
    pub sequence: String,
    /// Ids of the reads that contributed to this contig.
    pub support: Vec<String>,
    /// Novel k-mer occurrences projected onto contig coordinates:
    /// (offset, canonical k-mer).
    pub novel_kmers: Vec<(usize, String)>,
}

impl Contig {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Distinct canonical novel k-mers on this contig.
    pub fn novel_kmer_set(&self) -> AHashSet<Vec<u8>> {
        self.novel_kmers
            .iter()
            .map(|(_, km)| km.as_bytes().to_vec())
            .collect()
    }
}

/// Local assembler over a partition's reads.
pub trait Assembler {
    fn name(&self) -> &'static str;
    fn assemble(&self, reads: &[AugmentedRead]) -> Result<Vec<Contig>>;
}

/// Which assembler produced a partition's contigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyPath {
    Primary,
    Fallback,
    Failed,
}

/// Run the primary assembler and fall back transparently when it errors
/// or returns no contigs.
pub fn assemble_with_fallback(
    primary: &dyn Assembler,
    fallback: &dyn Assembler,
    reads: &[AugmentedRead],
) -> (Vec<Contig>, AssemblyPath) {
    match primary.assemble(reads) {
        Ok(contigs) if !contigs.is_empty() => return (contigs, AssemblyPath::Primary),
        Ok(_) => {
            debug!(
                assembler = primary.name(),
                "primary assembler produced no contigs, invoking fallback"
            );
        }
        Err(err) => {
            warn!(
                assembler = primary.name(),
                "primary assembler failed ({err:#}), invoking fallback"
            );
        }
    }
    match fallback.assemble(reads) {
        Ok(contigs) if !contigs.is_empty() => (contigs, AssemblyPath::Fallback),
        Ok(_) => (Vec::new(), AssemblyPath::Failed),
        Err(err) => {
            warn!(assembler = fallback.name(), "fallback assembler failed: {err:#}");
            (Vec::new(), AssemblyPath::Failed)
        }
    }
}

/// Project the partition's novel k-mers onto contig coordinates by
/// scanning every k-length contig window for canonical membership.
pub fn project_novel_kmers(
    sequence: &str,
    partition_kmers: &AHashSet<Vec<u8>>,
    k: usize,
) -> Vec<(usize, String)> {
    let bytes = sequence.as_bytes();
    if bytes.len() < k {
        return Vec::new();
    }
    let mut projected = Vec::new();
    for offset in 0..=bytes.len() - k {
        let window = canonical(&bytes[offset..offset + k]);
        if partition_kmers.contains(&window) {
            projected.push((
                offset,
                String::from_utf8(window).expect("canonical preserves ASCII"),
            ));
        }
    }
    projected
}

/// Union of novel k-mers across a partition's reads.
pub fn partition_novel_kmers(reads: &[AugmentedRead]) -> AHashSet<Vec<u8>> {
    let mut kmers = AHashSet::new();
    for read in reads {
        kmers.extend(read.novel_kmer_set());
    }
    kmers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::read::KmerAnnotation;

    struct FixedAssembler(Vec<Contig>);
    struct FailingAssembler;

    impl Assembler for FixedAssembler {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn assemble(&self, _reads: &[AugmentedRead]) -> Result<Vec<Contig>> {
            Ok(self.0.clone())
        }
    }

    impl Assembler for FailingAssembler {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn assemble(&self, _reads: &[AugmentedRead]) -> Result<Vec<Contig>> {
            anyhow::bail!("injected failure")
        }
    }

    fn contig(seq: &str) -> Contig {
        Contig {
            id: 0,
            sequence: seq.to_string(),
            support: vec!["r1".into()],
            novel_kmers: Vec::new(),
        }
    }

    #[test]
    fn test_primary_wins_when_it_produces() {
        let (contigs, path) = assemble_with_fallback(
            &FixedAssembler(vec![contig("ACGTACGT")]),
            &FixedAssembler(vec![contig("TTTT")]),
            &[],
        );
        assert_eq!(path, AssemblyPath::Primary);
        assert_eq!(contigs[0].sequence, "ACGTACGT");
    }

    #[test]
    fn test_fallback_on_error() {
        let (contigs, path) = assemble_with_fallback(
            &FailingAssembler,
            &FixedAssembler(vec![contig("TTTTACGT")]),
            &[],
        );
        assert_eq!(path, AssemblyPath::Fallback);
        assert_eq!(contigs[0].sequence, "TTTTACGT");
    }

    #[test]
    fn test_fallback_on_empty() {
        let (_, path) = assemble_with_fallback(
            &FixedAssembler(Vec::new()),
            &FixedAssembler(vec![contig("TTTTACGT")]),
            &[],
        );
        assert_eq!(path, AssemblyPath::Fallback);
    }

    #[test]
    fn test_both_empty_marks_failed() {
        let (contigs, path) =
            assemble_with_fallback(&FixedAssembler(Vec::new()), &FailingAssembler, &[]);
        assert!(contigs.is_empty());
        assert_eq!(path, AssemblyPath::Failed);
    }

    #[test]
    fn test_project_novel_kmers() {
        let mut read = AugmentedRead::new("r1", "ACGTACGTAC");
        read.annotations
            .push(KmerAnnotation::new(2, "GTACG", vec![9, 0]));
        let kmers = partition_novel_kmers(&[read]);
        let projected = project_novel_kmers("TTACGTACGTACTT", &kmers, 5);
        // GTACG (canonical CGTAC) occurs wherever the window matches
        assert!(!projected.is_empty());
        for (_, km) in &projected {
            assert_eq!(km, "CGTAC");
        }
    }
}
