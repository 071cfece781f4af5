//! Stream I/O for the pipeline: plain FASTX input, the augmented FASTX
//! codec, partitioned streams, and VCF output.

pub mod augfastx;
pub mod fastx;
pub mod vcf;

pub use augfastx::{read_augmented, write_augmented, AugmentedReader, AugmentedWriter};
pub use fastx::{open_fastx, SeqRecord};
pub use vcf::VcfWriter;
