//! Variant records emitted by the calling stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a called variant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKind {
    Snv,
    Insertion,
    Deletion,
    /// Complex call produced by merging adjacent events.
    Mnv,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VariantKind::Snv => "SNV",
            VariantKind::Insertion => "INSERTION",
            VariantKind::Deletion => "DELETION",
            VariantKind::Mnv => "MNV",
        };
        write!(f, "{label}")
    }
}

/// FILTER vocabulary for emitted calls. `Pass` is implied by an empty
/// filter set; the remaining labels match the VCF FILTER column strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallFilter {
    LikelihoodFail,
    ControlAbundance,
    AbundMismatch,
    NoReferenceMatch,
    PartitionTooSmall,
    Homopolymer,
    ContigEndTooClose,
}

impl fmt::Display for CallFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CallFilter::LikelihoodFail => "LikelihoodFail",
            CallFilter::ControlAbundance => "ControlAbundance",
            CallFilter::AbundMismatch => "AbundMismatch",
            CallFilter::NoReferenceMatch => "NoReferenceMatch",
            CallFilter::PartitionTooSmall => "PartitionTooSmall",
            CallFilter::Homopolymer => "Homopolymer",
            CallFilter::ContigEndTooClose => "ContigEndTooClose",
        };
        write!(f, "{label}")
    }
}

/// A called variant with its supporting evidence.
///
/// `pos` is a 0-based reference coordinate; the VCF writer converts to
/// 1-based on output. `ref_allele`/`alt_allele` follow VCF anchoring
/// conventions for indels (anchor base included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantCall {
    pub seqid: String,
    pub pos: usize,
    pub ref_allele: String,
    pub alt_allele: String,
    pub kind: VariantKind,
    /// Novel k-mers of the contig that span the variant allele.
    pub supporting_kmers: Vec<String>,
    /// K-length windows of the reference covering the locus.
    pub reference_window_kmers: Vec<String>,
    /// K-length windows of the contig covering the locus.
    pub variant_window_kmers: Vec<String>,
    /// Contig slice spanning the variant, for the ALTWINDOW INFO field.
    pub alt_window: String,
    /// Reference slice spanning the variant, for the REFRWINDOW INFO field.
    pub ref_window: String,
    /// De novo log-likelihood score; None until the likelihood stage runs.
    pub likelihood: Option<f64>,
    pub filters: Vec<CallFilter>,
    /// Alignment score of the contig/window alignment that produced this
    /// call, used to pick a winner among duplicates.
    pub alignment_score: i32,
}

impl VariantCall {
    pub fn new(
        seqid: impl Into<String>,
        pos: usize,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
        kind: VariantKind,
    ) -> Self {
        Self {
            seqid: seqid.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
            kind,
            supporting_kmers: Vec::new(),
            reference_window_kmers: Vec::new(),
            variant_window_kmers: Vec::new(),
            alt_window: String::new(),
            ref_window: String::new(),
            likelihood: None,
            filters: Vec::new(),
            alignment_score: 0,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn add_filter(&mut self, filter: CallFilter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    /// Identity used to merge duplicate calls across contigs.
    pub fn allele_key(&self) -> (String, usize, String, String) {
        (
            self.seqid.clone(),
            self.pos,
            self.ref_allele.clone(),
            self.alt_allele.clone(),
        )
    }

    /// Sort key for deterministic VCF output.
    pub fn sort_key(&self) -> (String, usize) {
        (self.seqid.clone(), self.pos)
    }

    /// FILTER column string: `PASS` or semicolon-joined labels.
    pub fn filter_field(&self) -> String {
        if self.filters.is_empty() {
            "PASS".to_string()
        } else {
            self.filters
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(";")
        }
    }
}
