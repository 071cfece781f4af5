//! Shared synthetic-data helpers for the integration suites.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const READ_LEN: usize = 100;
pub const READ_STRIDE: usize = 7;

/// Deterministic random DNA sequence.
pub fn random_reference(seed: u64, len: usize) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let bases = ['A', 'C', 'G', 'T'];
    (0..len).map(|_| bases[rng.gen_range(0..4)]).collect()
}

/// A planted ground-truth variant, positions on the reference.
#[derive(Debug, Clone)]
pub enum PlantedVariant {
    Snv { pos: usize, alt: char },
    /// Insert `seq` between `pos` and `pos + 1`.
    Insertion { pos: usize, seq: String },
    /// Delete `len` bases starting at `pos`.
    Deletion { pos: usize, len: usize },
}

/// Apply variants to a reference, producing the alternate haplotype.
/// Variants must be sorted by position and non-overlapping.
pub fn apply_variants(reference: &str, variants: &[PlantedVariant]) -> String {
    let mut haplotype = reference.to_string();
    for variant in variants.iter().rev() {
        match variant {
            PlantedVariant::Snv { pos, alt } => {
                haplotype.replace_range(*pos..pos + 1, &alt.to_string());
            }
            PlantedVariant::Insertion { pos, seq } => {
                haplotype.insert_str(pos + 1, seq);
            }
            PlantedVariant::Deletion { pos, len } => {
                haplotype.replace_range(*pos..pos + len, "");
            }
        }
    }
    haplotype
}

/// Error-free reads tiling a haplotype at a fixed stride.
pub fn tile_reads(haplotype: &str, offset: usize) -> Vec<String> {
    let mut reads = Vec::new();
    let mut start = offset;
    while start + READ_LEN <= haplotype.len() {
        reads.push(haplotype[start..start + READ_LEN].to_string());
        start += READ_STRIDE;
    }
    reads
}

pub fn write_fastq(dir: &Path, name: &str, read_groups: &[&[String]]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).expect("create FASTQ fixture");
    let mut idx = 0;
    for group in read_groups {
        for read in group.iter() {
            writeln!(file, "@read{idx}").unwrap();
            writeln!(file, "{read}").unwrap();
            writeln!(file, "+").unwrap();
            writeln!(file, "{}", "I".repeat(read.len())).unwrap();
            idx += 1;
        }
    }
    path
}

pub fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).expect("create FASTA fixture");
    for (id, seq) in records {
        writeln!(file, ">{id}").unwrap();
        writeln!(file, "{seq}").unwrap();
    }
    path
}
