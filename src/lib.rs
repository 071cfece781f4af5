//! # DenovoForge - Reference-Free De Novo Variant Discovery
//!
//! A k-mer novelty pipeline for identifying de novo germline variants in a
//! proband given sequencing reads from the proband and one or more control
//! samples (typically parents). Instead of aligning reads to a reference and
//! comparing calls across samples, the pipeline isolates reads whose k-mers
//! are abundant in the proband but absent from every control, clusters those
//! reads into per-variant partitions, assembles each partition locally, and
//! only then aligns the resulting contig to the reference to emit a variant
//! call with a trio genotype-likelihood score.

pub mod assembly;
pub mod call;
pub mod core;
pub mod count;
pub mod filter;
pub mod io;
pub mod likelihood;
pub mod localize;
pub mod novel;
pub mod partition;
pub mod pipeline;
pub mod sketch;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::core::kmer::{canonical, revcomp};
pub use crate::core::read::{AugmentedRead, KmerAnnotation};
pub use crate::core::variant::{CallFilter, VariantCall, VariantKind};
pub use crate::pipeline::DenovoPipeline;
pub use crate::sketch::KmerSketch;
pub use crate::utils::configuration::PipelineConfiguration;

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
