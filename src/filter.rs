//! Annotation refinement: second-pass validation of novel k-mers.
//!
//! The novelty stage works against heavily loaded sketches whose counts
//! are inflated by collisions. This stage recounts the surviving k-mers
//! against a fresh sketch built over the much smaller novel-read corpus,
//! masks k-mers that hit the reference genome, and optionally screens a
//! contamination sketch. Reads whose annotations fully drain are dropped.
//!
//! The recount sketch is fixed at construction from the original corpus,
//! so re-applying the refinery to its own output changes nothing.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::kmer::{canonical, kmers_of};
use crate::core::read::AugmentedRead;
use crate::sketch::KmerSketch;

/// Counters reported after a refinement pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefineReport {
    pub reads_in: u64,
    pub reads_out: u64,
    pub kmers_in: u64,
    pub kmers_masked_reference: u64,
    pub kmers_below_case_min: u64,
    pub kmers_contaminated: u64,
}

/// Second-pass annotation refinery. The reference and contamination
/// sketches are presence-oriented: any hit masks the k-mer.
pub struct Refinery<'a> {
    reference: Option<&'a KmerSketch>,
    contamination: Option<&'a KmerSketch>,
    case_min: u16,
    k: usize,
    /// Counts over the original novel-read corpus, built once.
    recount: KmerSketch,
}

impl<'a> Refinery<'a> {
    /// Build a refinery over the novel-read corpus. The corpus is small
    /// enough after the novelty stage that collisions in the recount
    /// sketch are rare, making these counts exact enough to drop
    /// false-positive novelty.
    pub fn new(
        k: usize,
        reference: Option<&'a KmerSketch>,
        contamination: Option<&'a KmerSketch>,
        case_min: u16,
        recount_mem_bytes: usize,
        corpus: &[AugmentedRead],
    ) -> Result<Self> {
        for (name, sketch) in [("reference", reference), ("contamination", contamination)] {
            if let Some(s) = sketch {
                if s.k() != k {
                    return Err(anyhow!(
                        "{name} sketch K={} does not match pipeline K={k}",
                        s.k()
                    ));
                }
            }
        }
        let mut recount = KmerSketch::counter(k, recount_mem_bytes, 4, u16::MAX as u32)?;
        for read in corpus {
            for kmer in kmers_of(read.sequence.as_bytes(), k) {
                recount.add(&kmer);
            }
        }
        Ok(Self {
            reference,
            contamination,
            case_min,
            k,
            recount,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Re-validate every annotation; drop drained reads. Order is
    /// preserved, and because the recount sketch never changes, the
    /// operation is idempotent for identical sketches.
    pub fn refine(&self, reads: Vec<AugmentedRead>) -> Result<(Vec<AugmentedRead>, RefineReport)> {
        let mut report = RefineReport {
            reads_in: reads.len() as u64,
            ..Default::default()
        };

        let mut survivors = Vec::with_capacity(reads.len());
        for mut read in reads {
            report.kmers_in += read.annotations.len() as u64;
            let mut masked = 0u64;
            let mut low = 0u64;
            let mut contaminated = 0u64;
            read.annotations.retain(|ann| {
                let km = canonical(ann.kmer.as_bytes());
                if self.reference.map(|s| s.contains(&km)).unwrap_or(false) {
                    masked += 1;
                    return false;
                }
                if self.recount.count(&km) < self.case_min {
                    low += 1;
                    return false;
                }
                if self.contamination.map(|s| s.contains(&km)).unwrap_or(false) {
                    contaminated += 1;
                    return false;
                }
                true
            });
            report.kmers_masked_reference += masked;
            report.kmers_below_case_min += low;
            report.kmers_contaminated += contaminated;
            if read.has_annotations() {
                report.reads_out += 1;
                survivors.push(read);
            }
        }

        info!(
            reads_in = report.reads_in,
            reads_out = report.reads_out,
            masked = report.kmers_masked_reference,
            "refinement pass complete"
        );
        Ok((survivors, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::read::KmerAnnotation;

    const K: usize = 5;

    fn annotated(id: &str, seq: &str, kmers: &[(usize, &str)]) -> AugmentedRead {
        let mut read = AugmentedRead::new(id, seq);
        for (offset, km) in kmers {
            read.annotations
                .push(KmerAnnotation::new(*offset, km.to_string(), vec![9, 0]));
        }
        read
    }

    fn presence_of(seqs: &[&str]) -> KmerSketch {
        let mut sketch = KmerSketch::presence(K, 1 << 12, 3).unwrap();
        for seq in seqs {
            for km in kmers_of(seq.as_bytes(), K) {
                sketch.add(&km);
            }
        }
        sketch
    }

    #[test]
    fn test_reference_hit_masks_kmer() {
        let reference = presence_of(&["GGACG"]);
        let reads = vec![annotated(
            "r1",
            "GGACGTATTC",
            &[(0, "GGACG"), (2, "ACGTA")],
        )];
        let refinery =
            Refinery::new(K, Some(&reference), None, 1, 1 << 14, &reads).unwrap();
        let (out, report) = refinery.refine(reads).unwrap();
        assert_eq!(report.kmers_masked_reference, 1);
        assert_eq!(out[0].annotations.len(), 1);
        assert_eq!(out[0].annotations[0].kmer, "ACGTA");
    }

    #[test]
    fn test_recount_drops_singleton_kmers() {
        // Three copies of one sequence, one of another: with case_min=2 the
        // singleton's annotations drain and the read is dropped
        let reads = vec![
            annotated("a", "GGACGTATTC", &[(0, "GGACG")]),
            annotated("b", "GGACGTATTC", &[(0, "GGACG")]),
            annotated("c", "TTACCAGGCA", &[(1, "TACCA")]),
        ];
        let refinery = Refinery::new(K, None, None, 2, 1 << 14, &reads).unwrap();
        let (out, report) = refinery.refine(reads).unwrap();
        assert_eq!(report.reads_out, 2);
        assert_eq!(report.kmers_below_case_min, 1);
        assert!(out.iter().all(|r| r.id != "c"));
    }

    #[test]
    fn test_contamination_masks() {
        let contamination = presence_of(&["TACCA"]);
        let reads = vec![annotated("c", "TTACCAGGCA", &[(1, "TACCA")])];
        let refinery =
            Refinery::new(K, None, Some(&contamination), 1, 1 << 14, &reads).unwrap();
        let (out, report) = refinery.refine(reads).unwrap();
        assert_eq!(report.kmers_contaminated, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_idempotent_with_identical_sketches() {
        let reference = presence_of(&["GGACG"]);
        let reads = vec![
            annotated("a", "GGACGTATTC", &[(0, "GGACG"), (2, "ACGTA")]),
            annotated("b", "ACGTATTCAA", &[(0, "ACGTA")]),
        ];
        let refinery =
            Refinery::new(K, Some(&reference), None, 1, 1 << 14, &reads).unwrap();
        let (once, _) = refinery.refine(reads).unwrap();
        let (twice, _) = refinery.refine(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_idempotent_when_dropped_read_shared_kmers() {
        // Read b's only annotation (GGGCT) is reference-masked, so b is
        // dropped on the first pass. Both reads contain ACGTC, and
        // case_min=2 is met only by counting b's copy. The recount is
        // pinned to the original corpus, so a's annotation must survive
        // a second pass over the shrunken read set too.
        let reference = presence_of(&["GGGCT"]);
        let reads = vec![
            annotated("a", "TTGCACGTCAA", &[(4, "ACGTC")]),
            annotated("b", "GGGCTACGTCA", &[(0, "GGGCT")]),
        ];
        let refinery =
            Refinery::new(K, Some(&reference), None, 2, 1 << 14, &reads).unwrap();

        let (once, report) = refinery.refine(reads).unwrap();
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].id, "a");
        assert_eq!(report.kmers_masked_reference, 1);
        assert_eq!(report.kmers_below_case_min, 0);

        let (twice, _) = refinery.refine(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_k_mismatch_fatal() {
        let reference = KmerSketch::presence(7, 1 << 10, 2).unwrap();
        assert!(Refinery::new(K, Some(&reference), None, 1, 1 << 14, &[]).is_err());
    }
}
