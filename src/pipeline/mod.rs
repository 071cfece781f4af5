//! End-to-end pipeline orchestration.
//!
//! Wires the stages together: count case and control samples into
//! sketches, stream the proband through the novelty filter, refine the
//! annotations, partition, then run the per-partition
//! assemble→localize→call→likelihood block on a fixed worker pool over a
//! bounded queue. A single collector drains the result channel; workers
//! check a shared cancellation flag between partitions and in-flight
//! work is allowed to complete.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::assembly::{
    assemble_with_fallback, AssemblyPath, Contig, DeBruijnAssembler, GreedyAssembler,
};
use crate::call::{call_contig, merge_partition_calls};
use crate::core::variant::VariantCall;
use crate::count::{count_file, sample_histogram, CountReport};
use crate::filter::Refinery;
use crate::io::augfastx::AugmentedWriter;
use crate::io::fastx::{open_fastx, read_reference};
use crate::io::vcf::VcfWriter;
use crate::likelihood::{SampleEvidence, TrioScorer};
use crate::localize::{localize, ReferenceIndex};
use crate::novel::NovelFilter;
use crate::partition::{partition_reads, Partition};
use crate::sketch::{CoverageModel, KmerSketch};
use crate::utils::configuration::PipelineConfiguration;
use crate::utils::summary::{PartitionLossReason, RunSummary};

/// Input files for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub proband: PathBuf,
    /// Control samples; the trio likelihood model engages when there are
    /// exactly two.
    pub controls: Vec<PathBuf>,
    pub reference: PathBuf,
    pub contamination: Option<PathBuf>,
    pub output_vcf: Option<PathBuf>,
    /// Optional partitioned augmented FASTX dump.
    pub partition_output: Option<PathBuf>,
}

/// The assembled pipeline.
pub struct DenovoPipeline {
    config: PipelineConfiguration,
}

impl DenovoPipeline {
    pub fn new(config: PipelineConfiguration) -> Result<Self> {
        crate::utils::logging::init_logging();
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfiguration {
        &self.config
    }

    /// Count the case sample into a fresh sketch.
    pub fn build_case_sketch(&self, path: &Path) -> Result<(KmerSketch, CountReport)> {
        let cfg = &self.config.sketch;
        let mut sketch = KmerSketch::counter(
            self.config.general.k,
            cfg.case_mem_bytes,
            cfg.num_tables,
            cfg.count_ceiling,
        )?;
        let report = count_file(
            &mut sketch,
            path,
            None,
            self.config.general.max_malformed_records,
        )?;
        Ok((sketch, report))
    }

    /// Count a control sample with cascaded sizing against the case.
    pub fn build_control_sketch(
        &self,
        path: &Path,
        case: &KmerSketch,
    ) -> Result<(KmerSketch, CountReport)> {
        let cfg = &self.config.sketch;
        let mut sketch = KmerSketch::counter(
            self.config.general.k,
            self.config.control_mem_bytes(),
            cfg.num_tables,
            cfg.count_ceiling,
        )?;
        let report = count_file(
            &mut sketch,
            path,
            Some(case),
            self.config.general.max_malformed_records,
        )?;
        Ok((sketch, report))
    }

    /// Presence sketch over a FASTA/FASTQ file (reference, contamination).
    pub fn build_presence_sketch(&self, path: &Path) -> Result<KmerSketch> {
        let mut sketch = KmerSketch::presence(
            self.config.general.k,
            self.config.sketch.case_mem_bytes / 4,
            self.config.sketch.num_tables,
        )?;
        count_file(
            &mut sketch,
            path,
            None,
            self.config.general.max_malformed_records,
        )?;
        Ok(sketch)
    }

    fn check_fpr(&self, report: &CountReport, sample: &str, summary: &mut RunSummary) {
        if report.estimated_fpr > self.config.sketch.max_fpr {
            summary.low_confidence = true;
            summary.record_warning(format!(
                "sketch FPR {:.4} for {sample} exceeds ceiling {:.4}; output is low-confidence",
                report.estimated_fpr, self.config.sketch.max_fpr
            ));
        }
    }

    /// Fit a coverage model for one sample by re-streaming its reads
    /// against the filled sketch.
    fn fit_model(&self, path: &Path, sketch: &KmerSketch) -> Result<Option<CoverageModel>> {
        let histogram = sample_histogram(sketch, open_fastx(path)?)?;
        Ok(histogram.coverage_model())
    }

    /// Run the per-partition calling block on a worker pool and collect
    /// scored calls.
    pub fn call_partitions(
        &self,
        partitions: &[Partition],
        index: &ReferenceIndex,
        scorer: Option<&TrioScorer<'_>>,
        summary: &Mutex<RunSummary>,
    ) -> Result<Vec<VariantCall>> {
        if partitions.is_empty() {
            return Ok(Vec::new());
        }
        let k = self.config.general.k;
        let asm = &self.config.assembly;
        let primary = DeBruijnAssembler::new(k, asm.min_edge_coverage, asm.min_contig_len)?;
        let fallback = GreedyAssembler::new(k, asm.min_overlap, asm.min_contig_len)?;

        let threads = self.config.worker_threads().min(partitions.len()).max(1);
        let capacity = self.config.performance.channel_capacity.max(1);
        let cancel = AtomicBool::new(false);
        let (task_tx, task_rx) = bounded::<&Partition>(capacity);
        let (result_tx, result_rx) = bounded::<Vec<VariantCall>>(capacity);

        let calls = std::thread::scope(|scope| {
            for _ in 0..threads {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = &cancel;
                let primary = &primary;
                let fallback = &fallback;
                scope.spawn(move || {
                    while let Ok(partition) = task_rx.recv() {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let calls = self.process_partition(
                            partition, primary, fallback, index, scorer, summary,
                        );
                        if result_tx.send(calls).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            let cancel = &cancel;
            let feeder = scope.spawn(move || {
                for partition in partitions {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    if task_tx.send(partition).is_err() {
                        break;
                    }
                }
                drop(task_tx);
            });

            let mut all_calls = Vec::new();
            for batch in result_rx {
                all_calls.extend(batch);
            }
            let _ = feeder.join();
            all_calls
        });

        summary.lock().partitions_processed += partitions.len() as u64;
        Ok(calls)
    }

    /// Assemble one partition, localize and call its contigs, and score
    /// the surviving calls. Loss reasons are recorded in the summary.
    fn process_partition(
        &self,
        partition: &Partition,
        primary: &DeBruijnAssembler,
        fallback: &GreedyAssembler,
        index: &ReferenceIndex,
        scorer: Option<&TrioScorer<'_>>,
        summary: &Mutex<RunSummary>,
    ) -> Vec<VariantCall> {
        let (contigs, path) = assemble_with_fallback(primary, fallback, &partition.reads);
        if path == AssemblyPath::Failed {
            summary.lock().record_lost_partition(
                partition.label.as_str(),
                PartitionLossReason::AssemblyFail,
                None,
            );
            return Vec::new();
        }

        let mut calls = Vec::new();
        let mut localized_any = false;
        let mut first_contig: Option<&Contig> = None;
        for contig in &contigs {
            first_contig.get_or_insert(contig);
            let windows = match localize(contig, index, &self.config.localize) {
                Ok(w) => w,
                Err(err) => {
                    warn!(partition = %partition.label, "localization failed: {err:#}");
                    continue;
                }
            };
            if windows.is_empty() {
                continue;
            }
            localized_any = true;
            match call_contig(contig, &windows, &self.config.alignment, &self.config.call) {
                Ok(contig_calls) => calls.extend(contig_calls),
                Err(err) => {
                    summary.lock().record_lost_partition(
                        partition.label.as_str(),
                        PartitionLossReason::AlignmentFail,
                        Some(contig.sequence.clone()),
                    );
                    warn!(partition = %partition.label, "alignment failed: {err:#}");
                    return Vec::new();
                }
            }
        }

        if !localized_any {
            summary.lock().record_lost_partition(
                partition.label.as_str(),
                PartitionLossReason::NoReferenceMatch,
                first_contig.map(|c| c.sequence.clone()),
            );
            return Vec::new();
        }

        let mut merged = merge_partition_calls(calls);
        if let Some(scorer) = scorer {
            for call in &mut merged {
                scorer.score(call);
            }
        }
        merged
    }

    /// Full run: sketches → novelty → refinement → partitioning →
    /// calling → VCF.
    pub fn run(&self, inputs: &PipelineInputs) -> Result<(Vec<VariantCall>, RunSummary)> {
        let mut summary = RunSummary::start();
        let k = self.config.general.k;
        let max_malformed = self.config.general.max_malformed_records;

        info!(k, "building case sketch from {}", inputs.proband.display());
        let (case_sketch, case_report) = self.build_case_sketch(&inputs.proband)?;
        self.check_fpr(&case_report, "proband", &mut summary);
        summary.count_reports.push(case_report);

        let mut control_sketches = Vec::with_capacity(inputs.controls.len());
        for control in &inputs.controls {
            info!("building control sketch from {}", control.display());
            let (sketch, report) = self.build_control_sketch(control, &case_sketch)?;
            self.check_fpr(&report, &control.display().to_string(), &mut summary);
            summary.count_reports.push(report);
            control_sketches.push(sketch);
        }

        info!("building reference sketch and seed index");
        let reference_sketch = self.build_presence_sketch(&inputs.reference)?;
        let reference_seqs = read_reference(&inputs.reference)?;
        let index = ReferenceIndex::build(reference_seqs, self.config.localize.seed_size)?;
        let contamination_sketch = inputs
            .contamination
            .as_deref()
            .map(|p| self.build_presence_sketch(p))
            .transpose()?;

        // Novelty filter over the proband stream
        let case_sketch = Arc::new(case_sketch);
        let control_sketches: Vec<Arc<KmerSketch>> =
            control_sketches.into_iter().map(Arc::new).collect();
        let novel_filter = NovelFilter::new(
            case_sketch.clone(),
            control_sketches.clone(),
            self.config.novel,
        )?;
        let (novel_reads, novel_report) =
            novel_filter.filter_stream(open_fastx(&inputs.proband)?, max_malformed)?;
        summary.novel_report = Some(novel_report);

        // Refinement; the recount sketch is pinned to the novel corpus
        let refinery = Refinery::new(
            k,
            Some(&reference_sketch),
            contamination_sketch.as_ref(),
            self.config.novel.case_min,
            self.config.sketch.recount_mem_bytes,
            &novel_reads,
        )?;
        let (refined, refine_report) = refinery.refine(novel_reads)?;
        summary.refine_report = Some(refine_report);

        // Partitioning
        let (partitions, partition_report) = partition_reads(refined, &self.config.partition)?;
        for _ in 0..partition_report.partitions_too_small {
            summary.record_lost_partition("-", PartitionLossReason::PartitionTooSmall, None);
        }
        summary.partition_report = Some(partition_report);

        if let Some(path) = &inputs.partition_output {
            write_partitions(path, &partitions)
                .with_context(|| format!("failed to write partitions to {}", path.display()))?;
        }

        // Trio likelihood models, when the sample layout allows it
        let models = if inputs.controls.len() == 2 {
            let proband_model = self.fit_model(&inputs.proband, case_sketch.as_ref())?;
            let father_model = self.fit_model(&inputs.controls[0], control_sketches[0].as_ref())?;
            let mother_model = self.fit_model(&inputs.controls[1], control_sketches[1].as_ref())?;
            match (proband_model, father_model, mother_model) {
                (Some(p), Some(f), Some(m)) => Some((p, f, m)),
                _ => {
                    summary.record_warning(
                        "could not fit coverage models; likelihood scoring skipped".to_string(),
                    );
                    None
                }
            }
        } else {
            summary.record_warning(format!(
                "{} control samples present; trio likelihood scoring requires 2",
                inputs.controls.len()
            ));
            None
        };
        let scorer = match &models {
            Some((p, f, m)) => Some(TrioScorer::new(
                SampleEvidence {
                    name: "proband".to_string(),
                    sketch: case_sketch.as_ref(),
                    model: *p,
                },
                [
                    SampleEvidence {
                        name: "control_1".to_string(),
                        sketch: control_sketches[0].as_ref(),
                        model: *f,
                    },
                    SampleEvidence {
                        name: "control_2".to_string(),
                        sketch: control_sketches[1].as_ref(),
                        model: *m,
                    },
                ],
                self.config.likelihood,
            )?),
            None => None,
        };

        // Per-partition calling block
        let summary_mutex = Mutex::new(summary);
        let mut calls =
            self.call_partitions(&partitions, &index, scorer.as_ref(), &summary_mutex)?;
        let mut summary = summary_mutex.into_inner();

        if self.config.general.sort_output {
            calls.sort_by_key(|c| c.sort_key());
        }
        summary.calls_emitted = calls.len() as u64;
        summary.calls_pass = calls.iter().filter(|c| c.is_pass()).count() as u64;

        if let Some(path) = &inputs.output_vcf {
            let mut writer = VcfWriter::create(path)?;
            writer.write_header(inputs.reference.to_str())?;
            writer.write_calls(&calls, false)?;
            writer.flush()?;
        }

        summary.finish();
        summary.log_overview();
        Ok((calls, summary))
    }
}

/// Write partitions as `#part=`-labeled augmented FASTX, gzip-aware.
fn write_partitions(path: &Path, partitions: &[Partition]) -> Result<()> {
    let file = File::create(path)?;
    let gz = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let sink: Box<dyn std::io::Write> = if gz {
        Box::new(GzEncoder::new(file, Compression::default()))
    } else {
        Box::new(BufWriter::new(file))
    };
    let mut writer = AugmentedWriter::new(sink);
    for partition in partitions {
        writer.start_partition(&partition.label)?;
        for read in &partition.reads {
            writer.write_record(read)?;
        }
    }
    writer.flush()
}
