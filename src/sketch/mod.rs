//! Probabilistic k-mer abundance sketches
//!
//! Count-Min style counters and presence-only variants over canonical
//! k-mers, with bounded false-positive rate, binary serialization, and the
//! abundance histogram used by the likelihood model.

pub mod countmin;
pub mod histogram;
pub mod serialize;

pub use countmin::{KmerSketch, SketchKind};
pub use histogram::{AbundanceHistogram, CoverageModel};
