//! Trio genotype-likelihood scoring of variant calls.
//!
//! Each sample's coverage model gives the expected k-mer abundance per
//! genotype copy number; the observed statistic is the mean abundance of
//! the variant-window k-mers (alt support) and of the reference-window
//! k-mers absent from the variant window (ref support). The de novo score
//! is the log-likelihood gap between "proband het, parents hom-ref" and
//! the best transmitting configuration.

use ahash::AHashSet;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::core::variant::{CallFilter, VariantCall};
use crate::sketch::{CoverageModel, KmerSketch};

/// Parent genotype copy-number pairs that could transmit the allele.
const TRANSMITTING: &[(u8, u8)] = &[
    (1, 0),
    (0, 1),
    (1, 1),
    (2, 0),
    (0, 2),
    (2, 1),
    (1, 2),
    (2, 2),
];

/// Likelihood-stage thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LikelihoodParams {
    /// Mean control alt abundance above this earns `ControlAbundance`.
    pub max_control_alt: f64,
    /// Proband alt abundance below this fraction of the haploid mean
    /// earns `AbundMismatch`.
    pub min_alt_fraction: f64,
}

impl Default for LikelihoodParams {
    fn default() -> Self {
        Self {
            max_control_alt: 1.0,
            min_alt_fraction: 0.25,
        }
    }
}

/// One sample's sketch and fitted coverage model.
pub struct SampleEvidence<'a> {
    pub name: String,
    pub sketch: &'a KmerSketch,
    pub model: CoverageModel,
}

/// Scores calls for a proband and its two parents.
pub struct TrioScorer<'a> {
    proband: SampleEvidence<'a>,
    parents: [SampleEvidence<'a>; 2],
    params: LikelihoodParams,
}

impl<'a> TrioScorer<'a> {
    pub fn new(
        proband: SampleEvidence<'a>,
        parents: [SampleEvidence<'a>; 2],
        params: LikelihoodParams,
    ) -> Result<Self> {
        let k = proband.sketch.k();
        for parent in &parents {
            if parent.sketch.k() != k {
                return Err(anyhow!(
                    "parent sketch K={} does not match proband K={k}",
                    parent.sketch.k()
                ));
            }
        }
        Ok(Self {
            proband,
            parents,
            params,
        })
    }

    fn mean_abundance(sketch: &KmerSketch, kmers: &[&str]) -> f64 {
        if kmers.is_empty() {
            return 0.0;
        }
        let total: f64 = kmers
            .iter()
            .map(|km| sketch.count(km.as_bytes()) as f64)
            .sum();
        total / kmers.len() as f64
    }

    /// Score one call in place: sets `likelihood` and applies the
    /// likelihood-derived filter labels.
    pub fn score(&self, call: &mut VariantCall) {
        let vw: Vec<&str> = call
            .variant_window_kmers
            .iter()
            .map(|s| s.as_str())
            .collect();
        if vw.is_empty() {
            call.add_filter(CallFilter::AbundMismatch);
            return;
        }
        let vw_set: AHashSet<&str> = vw.iter().copied().collect();
        let rw_only: Vec<&str> = call
            .reference_window_kmers
            .iter()
            .map(|s| s.as_str())
            .filter(|km| !vw_set.contains(km))
            .collect();

        let proband_alt = Self::mean_abundance(self.proband.sketch, &vw);
        let proband_ref = Self::mean_abundance(self.proband.sketch, &rw_only);
        let parent_alt: Vec<f64> = self
            .parents
            .iter()
            .map(|p| Self::mean_abundance(p.sketch, &vw))
            .collect();

        // De novo: proband carries one copy, both parents carry none.
        // Ref support enters on the proband side, where a het also keeps
        // one reference copy.
        let denovo = self.proband.model.genotype_log_density(proband_alt, 1)
            + self.proband.model.genotype_log_density(proband_ref, 1)
            + self.parents[0].model.genotype_log_density(parent_alt[0], 0)
            + self.parents[1].model.genotype_log_density(parent_alt[1], 0);

        // Best transmitting configuration: proband het with at least one
        // parent carrying the allele
        let inherited = TRANSMITTING
            .iter()
            .map(|&(g0, g1)| {
                self.proband.model.genotype_log_density(proband_alt, 1)
                    + self.proband.model.genotype_log_density(proband_ref, 1)
                    + self.parents[0].model.genotype_log_density(parent_alt[0], g0)
                    + self.parents[1].model.genotype_log_density(parent_alt[1], g1)
            })
            .fold(f64::NEG_INFINITY, f64::max);

        let score = denovo - inherited;
        call.likelihood = Some(score);

        if score < 0.0 {
            call.add_filter(CallFilter::LikelihoodFail);
        }
        if parent_alt
            .iter()
            .any(|&alt| alt > self.params.max_control_alt)
        {
            call.add_filter(CallFilter::ControlAbundance);
        }
        if proband_alt < self.params.min_alt_fraction * self.proband.model.mu {
            call.add_filter(CallFilter::AbundMismatch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kmer::{canonical, kmers_of};
    use crate::core::variant::VariantKind;

    const K: usize = 5;

    fn sketch_with_depth(seq: &str, depth: usize) -> KmerSketch {
        let mut sketch = KmerSketch::counter(K, 1 << 14, 3, 255).unwrap();
        for _ in 0..depth {
            for km in kmers_of(seq.as_bytes(), K) {
                sketch.add(&km);
            }
        }
        sketch
    }

    fn model() -> CoverageModel {
        CoverageModel { mu: 15.0, sigma: 3.0 }
    }

    fn call_with_windows(alt_seq: &str, ref_seq: &str) -> VariantCall {
        let mut call = VariantCall::new("chr1", 50, "A", "G", VariantKind::Snv);
        call.variant_window_kmers = kmers_of(alt_seq.as_bytes(), K)
            .into_iter()
            .map(|km| String::from_utf8(km).unwrap())
            .collect();
        call.reference_window_kmers = kmers_of(ref_seq.as_bytes(), K)
            .into_iter()
            .map(|km| String::from_utf8(canonical(&km)).unwrap())
            .collect();
        call
    }

    #[test]
    fn test_denovo_call_scores_positive() {
        let alt = "GGACGTATTC";
        let reference = "GGACGAATTC";
        // Proband carries the alt at het depth; parents never saw it
        let proband = sketch_with_depth(alt, 15);
        let father = sketch_with_depth(reference, 30);
        let mother = sketch_with_depth(reference, 30);

        let scorer = TrioScorer::new(
            SampleEvidence { name: "proband".into(), sketch: &proband, model: model() },
            [
                SampleEvidence { name: "father".into(), sketch: &father, model: model() },
                SampleEvidence { name: "mother".into(), sketch: &mother, model: model() },
            ],
            LikelihoodParams::default(),
        )
        .unwrap();

        let mut call = call_with_windows(alt, reference);
        scorer.score(&mut call);
        let score = call.likelihood.unwrap();
        assert!(score > 0.0, "expected positive de novo score, got {score}");
        assert!(!call.filters.contains(&CallFilter::LikelihoodFail));
    }

    #[test]
    fn test_inherited_variant_fails_likelihood() {
        let alt = "GGACGTATTC";
        let reference = "GGACGAATTC";
        // Father also carries the alt at het depth
        let proband = sketch_with_depth(alt, 15);
        let father = sketch_with_depth(alt, 15);
        let mother = sketch_with_depth(reference, 30);

        let scorer = TrioScorer::new(
            SampleEvidence { name: "proband".into(), sketch: &proband, model: model() },
            [
                SampleEvidence { name: "father".into(), sketch: &father, model: model() },
                SampleEvidence { name: "mother".into(), sketch: &mother, model: model() },
            ],
            LikelihoodParams::default(),
        )
        .unwrap();

        let mut call = call_with_windows(alt, reference);
        scorer.score(&mut call);
        assert!(call.likelihood.unwrap() < 0.0);
        assert!(call.filters.contains(&CallFilter::LikelihoodFail));
        assert!(call.filters.contains(&CallFilter::ControlAbundance));
    }

    #[test]
    fn test_low_proband_abundance_is_mismatch() {
        let alt = "GGACGTATTC";
        let reference = "GGACGAATTC";
        // Alt support far below the het expectation of ~15
        let proband = sketch_with_depth(alt, 2);
        let father = sketch_with_depth(reference, 30);
        let mother = sketch_with_depth(reference, 30);

        let scorer = TrioScorer::new(
            SampleEvidence { name: "proband".into(), sketch: &proband, model: model() },
            [
                SampleEvidence { name: "father".into(), sketch: &father, model: model() },
                SampleEvidence { name: "mother".into(), sketch: &mother, model: model() },
            ],
            LikelihoodParams::default(),
        )
        .unwrap();

        let mut call = call_with_windows(alt, reference);
        scorer.score(&mut call);
        assert!(call.filters.contains(&CallFilter::AbundMismatch));
    }

    #[test]
    fn test_empty_vw_marks_mismatch() {
        let proband = sketch_with_depth("GGACGTATTC", 10);
        let scorer = TrioScorer::new(
            SampleEvidence { name: "proband".into(), sketch: &proband, model: model() },
            [
                SampleEvidence { name: "father".into(), sketch: &proband, model: model() },
                SampleEvidence { name: "mother".into(), sketch: &proband, model: model() },
            ],
            LikelihoodParams::default(),
        )
        .unwrap();
        let mut call = VariantCall::new("chr1", 5, "A", "G", VariantKind::Snv);
        scorer.score(&mut call);
        assert!(call.likelihood.is_none());
        assert!(call.filters.contains(&CallFilter::AbundMismatch));
    }

    #[test]
    fn test_k_mismatch_fatal() {
        let proband = sketch_with_depth("GGACGTATTC", 10);
        let other = KmerSketch::counter(7, 1 << 10, 2, 255).unwrap();
        let result = TrioScorer::new(
            SampleEvidence { name: "proband".into(), sketch: &proband, model: model() },
            [
                SampleEvidence { name: "father".into(), sketch: &other, model: model() },
                SampleEvidence { name: "mother".into(), sketch: &proband, model: model() },
            ],
            LikelihoodParams::default(),
        );
        assert!(result.is_err());
    }
}
