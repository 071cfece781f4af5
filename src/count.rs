//! Sample counting: populate one sketch per sample from a sequence stream.
//!
//! Decomposes each read into canonical k-mers (windows containing `N` are
//! skipped), inserts them into the sample's sketch, and reports reads
//! processed, k-mers stored, and the estimated false-positive rate. Reads
//! are not deduplicated. Cascaded counting restricts insertions to k-mers
//! already present in a base sample's sketch, which keeps downstream
//! control sketches small.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::kmer::{hash_kmer, kmers_of};
use crate::io::fastx::{open_fastx, SeqRecord};
use crate::sketch::{AbundanceHistogram, KmerSketch};

/// Sampling seed for the abundance histogram; one k-mer in
/// `HISTOGRAM_SAMPLE_RATE` contributes to the distribution estimate.
const HISTOGRAM_SAMPLE_SEED: u64 = 0x9d39247e33776d41;
const HISTOGRAM_SAMPLE_RATE: u64 = 64;

/// Outcome of counting one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountReport {
    pub reads_processed: u64,
    pub kmers_stored: u64,
    pub kmers_skipped_cascade: u64,
    pub malformed_records: u64,
    pub estimated_fpr: f64,
}

/// Populate `sketch` from a stream of sequence records.
///
/// When `cascade` is given, only k-mers present in the cascade sketch are
/// inserted; the cascade sketch must share the pipeline K. Malformed
/// records are skipped and counted, and counting aborts once more than
/// `max_malformed` have been seen.
pub fn count_stream<I>(
    sketch: &mut KmerSketch,
    records: I,
    cascade: Option<&KmerSketch>,
    max_malformed: u64,
) -> Result<CountReport>
where
    I: IntoIterator<Item = Result<SeqRecord>>,
{
    if let Some(base) = cascade {
        if base.k() != sketch.k() {
            return Err(anyhow!(
                "cascade sketch K={} does not match sample sketch K={}",
                base.k(),
                sketch.k()
            ));
        }
    }

    let k = sketch.k();
    let mut report = CountReport {
        reads_processed: 0,
        kmers_stored: 0,
        kmers_skipped_cascade: 0,
        malformed_records: 0,
        estimated_fpr: 0.0,
    };

    for record in records {
        let record = match record {
            Ok(r) => r,
            Err(err) => {
                report.malformed_records += 1;
                warn!("skipping malformed input record: {err:#}");
                if report.malformed_records > max_malformed {
                    return Err(anyhow!(
                        "aborting: {} malformed records exceeds threshold {}",
                        report.malformed_records,
                        max_malformed
                    ));
                }
                continue;
            }
        };
        report.reads_processed += 1;
        for kmer in kmers_of(record.seq.as_bytes(), k) {
            if let Some(base) = cascade {
                if !base.contains(&kmer) {
                    report.kmers_skipped_cascade += 1;
                    continue;
                }
            }
            sketch.add(&kmer);
            report.kmers_stored += 1;
        }
    }

    report.estimated_fpr = sketch.estimated_fpr();
    debug!(
        reads = report.reads_processed,
        kmers = report.kmers_stored,
        fpr = report.estimated_fpr,
        "sample counted"
    );
    Ok(report)
}

/// Count a FASTA/FASTQ file into `sketch`.
pub fn count_file<P: AsRef<Path>>(
    sketch: &mut KmerSketch,
    path: P,
    cascade: Option<&KmerSketch>,
    max_malformed: u64,
) -> Result<CountReport> {
    let path = path.as_ref();
    info!("counting k-mers from {}", path.display());
    let records = open_fastx(path)?;
    count_stream(sketch, records, cascade, max_malformed)
}

/// Estimate the sample's abundance histogram by re-streaming its reads
/// against the filled sketch. A deterministic 1-in-N k-mer subsample keeps
/// the distinct-k-mer set small while leaving the distribution shape
/// intact.
pub fn sample_histogram<I>(sketch: &KmerSketch, records: I) -> Result<AbundanceHistogram>
where
    I: IntoIterator<Item = Result<SeqRecord>>,
{
    let k = sketch.k();
    let mut seen = ahash::AHashSet::new();
    let mut histogram = AbundanceHistogram::new();
    for record in records {
        let Ok(record) = record else { continue };
        for kmer in kmers_of(record.seq.as_bytes(), k) {
            let h = hash_kmer(&kmer, HISTOGRAM_SAMPLE_SEED);
            if h % HISTOGRAM_SAMPLE_RATE != 0 {
                continue;
            }
            if seen.insert(h) {
                histogram.record(sketch.count(&kmer));
            }
        }
    }
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kmer::canonical;

    fn records(seqs: &[&str]) -> Vec<Result<SeqRecord>> {
        seqs.iter()
            .enumerate()
            .map(|(i, s)| {
                Ok(SeqRecord {
                    id: format!("r{i}"),
                    seq: s.to_string(),
                    qual: None,
                })
            })
            .collect()
    }

    #[test]
    fn test_count_stream_populates_sketch() {
        let mut sketch = KmerSketch::counter(5, 1 << 14, 3, 255).unwrap();
        let report =
            count_stream(&mut sketch, records(&["ACGTACGTA", "ACGTACGTA"]), None, 10).unwrap();
        assert_eq!(report.reads_processed, 2);
        assert_eq!(report.kmers_stored, 10);
        // ACGTA occurs at offsets 0 and 4, and TACGT canonicalizes to it too
        assert_eq!(sketch.count(&canonical(b"ACGTA")), 6);
    }

    #[test]
    fn test_cascade_restricts_insertions() {
        let mut base = KmerSketch::counter(5, 1 << 14, 3, 255).unwrap();
        count_stream(&mut base, records(&["ACGTACGTA"]), None, 10).unwrap();

        let mut downstream = KmerSketch::counter(5, 1 << 12, 3, 255).unwrap();
        let report = count_stream(
            &mut downstream,
            records(&["ACGTACGTA", "TTTTTTTTT"]),
            Some(&base),
            10,
        )
        .unwrap();
        assert!(report.kmers_skipped_cascade > 0);
        assert_eq!(downstream.count(&canonical(b"TTTTT")), 0);
        assert!(downstream.count(&canonical(b"ACGTA")) > 0);
    }

    #[test]
    fn test_cascade_k_mismatch_is_fatal() {
        let base = KmerSketch::counter(7, 1 << 12, 3, 255).unwrap();
        let mut sketch = KmerSketch::counter(5, 1 << 12, 3, 255).unwrap();
        let result = count_stream(&mut sketch, records(&["ACGTACGTA"]), Some(&base), 10);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_threshold_aborts() {
        let mut sketch = KmerSketch::counter(5, 1 << 12, 3, 255).unwrap();
        let stream: Vec<Result<SeqRecord>> = vec![
            Err(anyhow!("bad record")),
            Err(anyhow!("bad record")),
        ];
        assert!(count_stream(&mut sketch, stream, None, 1).is_err());
    }

    #[test]
    fn test_ambiguous_windows_skipped() {
        let mut sketch = KmerSketch::counter(5, 1 << 12, 3, 255).unwrap();
        let report = count_stream(&mut sketch, records(&["ACGTNACGTA"]), None, 10).unwrap();
        // Every window except the 5-base suffix covers the N
        assert_eq!(report.kmers_stored, 1);
    }
}
