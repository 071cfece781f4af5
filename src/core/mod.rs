//! Core data structures for the variant discovery pipeline
//!
//! K-mer handling, augmented reads, and variant records shared by all
//! pipeline stages.

pub mod kmer;
pub mod read;
pub mod variant;

pub use kmer::{canonical, positioned_kmers, revcomp};
pub use read::{AugmentedRead, KmerAnnotation};
pub use variant::{CallFilter, VariantCall, VariantKind};
