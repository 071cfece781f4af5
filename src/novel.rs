//! The novelty filter: the core case/control streaming stage.
//!
//! Scans the proband read stream against one case sketch and one or more
//! control sketches and emits only reads carrying k-mers that are abundant
//! in the case (`count >= case_min`) and effectively absent from every
//! control (`count <= ctrl_max`, inclusive). Output preserves input order
//! and never modifies read sequences; each qualifying k-mer occurrence is
//! annotated separately with its offset and per-sample abundances.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::kmer::positioned_kmers;
use crate::core::read::{AugmentedRead, KmerAnnotation};
use crate::io::fastx::SeqRecord;
use crate::sketch::KmerSketch;

/// Thresholds for the novelty predicate. Both bounds are inclusive;
/// `case_min = 0` admits every k-mer and a saturated `ctrl_max` disables
/// the control test. `abund_screen`, when set, drops any read containing
/// a k-mer whose case abundance falls below the screen, before the
/// novelty test runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelParams {
    pub case_min: u16,
    pub ctrl_max: u16,
    pub abund_screen: Option<u16>,
}

impl Default for NovelParams {
    fn default() -> Self {
        Self {
            case_min: 5,
            ctrl_max: 1,
            abund_screen: None,
        }
    }
}

/// Counters reported after a novelty pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NovelReport {
    pub reads_in: u64,
    pub reads_out: u64,
    pub reads_screened: u64,
    pub kmers_annotated: u64,
}

/// The streaming case/control filter. Sketches are read-only and shared.
pub struct NovelFilter {
    case: Arc<KmerSketch>,
    controls: Vec<Arc<KmerSketch>>,
    params: NovelParams,
    k: usize,
}

impl NovelFilter {
    pub fn new(
        case: Arc<KmerSketch>,
        controls: Vec<Arc<KmerSketch>>,
        params: NovelParams,
    ) -> Result<Self> {
        if controls.is_empty() {
            return Err(anyhow!("novelty filter requires at least one control sketch"));
        }
        let k = case.k();
        for ctrl in &controls {
            if ctrl.k() != k {
                return Err(anyhow!(
                    "control sketch K={} does not match case sketch K={}",
                    ctrl.k(),
                    k
                ));
            }
        }
        Ok(Self {
            case,
            controls,
            params,
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Apply the novelty predicate to one read. Returns the annotated
    /// read when any k-mer qualifies, `None` otherwise. Reads containing
    /// only ambiguous bases yield no k-mers and are dropped silently.
    pub fn annotate(&self, record: &SeqRecord) -> Option<AugmentedRead> {
        let kmers = positioned_kmers(record.seq.as_bytes(), self.k);
        if kmers.is_empty() {
            return None;
        }

        let case_counts: Vec<u16> = kmers.iter().map(|(_, km)| self.case.count(km)).collect();

        if let Some(screen) = self.params.abund_screen {
            if case_counts.iter().any(|&c| c < screen) {
                return None;
            }
        }

        let mut annotations = Vec::new();
        for ((offset, kmer), &case_count) in kmers.iter().zip(&case_counts) {
            if case_count < self.params.case_min {
                continue;
            }
            let mut abundances = Vec::with_capacity(1 + self.controls.len());
            abundances.push(case_count);
            let mut novel = true;
            for ctrl in &self.controls {
                let ctrl_count = ctrl.count(kmer);
                if ctrl_count > self.params.ctrl_max {
                    novel = false;
                    break;
                }
                abundances.push(ctrl_count);
            }
            if !novel {
                continue;
            }
            annotations.push(KmerAnnotation::new(
                *offset,
                String::from_utf8_lossy(kmer).into_owned(),
                abundances,
            ));
        }

        if annotations.is_empty() {
            return None;
        }

        let mut read = AugmentedRead::new(record.id.clone(), record.seq.clone());
        read.quals = record.qual.clone();
        read.annotations = annotations;
        Some(read)
    }

    /// Run the filter over a stream, in order, collecting survivors.
    /// Malformed input records are skipped and counted against
    /// `max_malformed`.
    pub fn filter_stream<I>(
        &self,
        records: I,
        max_malformed: u64,
    ) -> Result<(Vec<AugmentedRead>, NovelReport)>
    where
        I: IntoIterator<Item = Result<SeqRecord>>,
    {
        let mut report = NovelReport::default();
        let mut survivors = Vec::new();
        let mut malformed = 0u64;

        for record in records {
            let record = match record {
                Ok(r) => r,
                Err(err) => {
                    malformed += 1;
                    debug!("skipping malformed proband record: {err:#}");
                    if malformed > max_malformed {
                        return Err(anyhow!(
                            "aborting: {malformed} malformed records exceeds threshold {max_malformed}"
                        ));
                    }
                    continue;
                }
            };
            report.reads_in += 1;

            if let Some(screen) = self.params.abund_screen {
                // Track screen drops separately from plain non-novel reads
                let kmers = positioned_kmers(record.seq.as_bytes(), self.k);
                if !kmers.is_empty() && kmers.iter().any(|(_, km)| self.case.count(km) < screen) {
                    report.reads_screened += 1;
                    continue;
                }
            }

            if let Some(read) = self.annotate(&record) {
                report.kmers_annotated += read.annotations.len() as u64;
                report.reads_out += 1;
                survivors.push(read);
            }
        }

        info!(
            reads_in = report.reads_in,
            reads_out = report.reads_out,
            screened = report.reads_screened,
            "novelty filter pass complete"
        );
        Ok((survivors, report))
    }
}
