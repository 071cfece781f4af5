//! Pipeline configuration: per-stage sections with presets, file and
//! environment loading, and validation.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::call::{AlignmentParams, CallParams};
use crate::likelihood::LikelihoodParams;
use crate::localize::LocalizeParams;
use crate::novel::NovelParams;
use crate::partition::PartitionParams;

/// General run settings shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Pipeline k-mer size; fixed for the whole run.
    pub k: usize,
    /// Abort once this many malformed input records have been skipped.
    pub max_malformed_records: u64,
    /// Sort VCF output by (seqid, pos).
    pub sort_output: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            k: 31,
            max_malformed_records: 1000,
            sort_output: true,
        }
    }
}

/// Sketch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Byte budget for the case sample's counting sketch.
    pub case_mem_bytes: usize,
    /// Fraction of the case budget used per control sketch under
    /// cascaded sizing.
    pub control_mem_fraction: f64,
    /// Hash table count per sketch.
    pub num_tables: usize,
    /// Saturation ceiling for counting sketches.
    pub count_ceiling: u32,
    /// Warn and mark the run low-confidence above this estimated FPR.
    pub max_fpr: f64,
    /// Byte budget for the refinement recount sketch.
    pub recount_mem_bytes: usize,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            case_mem_bytes: 1 << 30,
            control_mem_fraction: 0.25,
            num_tables: 4,
            count_ceiling: u16::MAX as u32,
            max_fpr: 0.05,
            recount_mem_bytes: 1 << 26,
        }
    }
}

/// Assembly stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Minimum edge coverage in the de Bruijn graph.
    pub min_edge_coverage: u32,
    /// Overlap floor for the greedy fallback.
    pub min_overlap: usize,
    /// Contigs shorter than this are discarded.
    pub min_contig_len: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            min_edge_coverage: 2,
            min_overlap: 31,
            min_contig_len: 62,
        }
    }
}

/// Worker pool and channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads for the per-partition calling block; 0 means one
    /// per available core.
    pub worker_threads: usize,
    /// Bounded channel capacity between the partition feeder and the
    /// workers.
    pub channel_capacity: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            channel_capacity: 64,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfiguration {
    pub general: GeneralConfig,
    pub sketch: SketchConfig,
    pub novel: NovelParams,
    pub partition: PartitionParams,
    pub assembly: AssemblyConfig,
    pub localize: LocalizeParams,
    pub alignment: AlignmentParams,
    pub call: CallParams,
    pub likelihood: LikelihoodParams,
    pub performance: PerformanceConfig,
}

impl PipelineConfiguration {
    /// Load from a TOML/JSON/YAML file plus `DENOVO_` environment
    /// overrides (e.g. `DENOVO_GENERAL__K=25`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("DENOVO").separator("__"))
            .build()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        let configuration: Self = config
            .try_deserialize()
            .context("configuration file did not match the expected schema")?;
        configuration.validate()?;
        info!("loaded configuration from {}", path.display());
        Ok(configuration)
    }

    /// Defaults adjusted for small test datasets.
    pub fn small_dataset() -> Self {
        let mut config = Self::default();
        config.general.k = 25;
        config.sketch.case_mem_bytes = 1 << 24;
        config.sketch.recount_mem_bytes = 1 << 20;
        config.assembly.min_edge_coverage = 1;
        config.assembly.min_overlap = 25;
        config.assembly.min_contig_len = 50;
        config.sync_k();
        config
    }

    /// Propagate the pipeline K into the stage sections that carry it.
    pub fn sync_k(&mut self) {
        self.call.k = self.general.k;
        if self.localize.seed_size > self.general.k {
            self.localize.seed_size = self.general.k;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let k = self.general.k;
        if k == 0 || k > 255 {
            return Err(anyhow!("k-mer size {k} out of range (1..=255)"));
        }
        if self.call.k != k {
            return Err(anyhow!(
                "call stage K={} disagrees with pipeline K={k}; call sync_k() after edits",
                self.call.k
            ));
        }
        if self.localize.seed_size == 0 || self.localize.seed_size > k {
            return Err(anyhow!(
                "localize seed size {} must be in 1..={k}",
                self.localize.seed_size
            ));
        }
        if !(0.0..=1.0).contains(&self.sketch.control_mem_fraction)
            || self.sketch.control_mem_fraction == 0.0
        {
            return Err(anyhow!(
                "control memory fraction {} must be in (0, 1]",
                self.sketch.control_mem_fraction
            ));
        }
        if self.sketch.num_tables == 0 {
            return Err(anyhow!("sketch table count must be positive"));
        }
        if self.assembly.min_contig_len < k {
            return Err(anyhow!(
                "minimum contig length {} is shorter than K={k}",
                self.assembly.min_contig_len
            ));
        }
        Ok(())
    }

    /// Effective worker thread count.
    pub fn worker_threads(&self) -> usize {
        if self.performance.worker_threads > 0 {
            self.performance.worker_threads
        } else {
            num_cpus::get()
        }
    }

    /// Per-control sketch byte budget under cascaded sizing.
    pub fn control_mem_bytes(&self) -> usize {
        ((self.sketch.case_mem_bytes as f64) * self.sketch.control_mem_fraction).max(1024.0)
            as usize
    }
}
