//! Run summary: every non-fatal condition the pipeline recovers from
//! accumulates here, so no partition is ever dropped silently.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::count::CountReport;
use crate::filter::RefineReport;
use crate::novel::NovelReport;
use crate::partition::PartitionReport;

/// Why a partition produced no variant calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionLossReason {
    AssemblyFail,
    NoReferenceMatch,
    AlignmentFail,
    PartitionTooSmall,
}

impl PartitionLossReason {
    pub fn code(&self) -> &'static str {
        match self {
            PartitionLossReason::AssemblyFail => "AssemblyFail",
            PartitionLossReason::NoReferenceMatch => "NoReferenceMatch",
            PartitionLossReason::AlignmentFail => "AlignmentFail",
            PartitionLossReason::PartitionTooSmall => "PartitionTooSmall",
        }
    }
}

/// A partition that yielded no calls, with its reason code and the
/// contig sequence when one existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LostPartition {
    pub label: String,
    pub reason: PartitionLossReason,
    pub contig: Option<String>,
}

/// Aggregated accounting for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,

    pub count_reports: Vec<CountReport>,
    pub novel_report: Option<NovelReport>,
    pub refine_report: Option<RefineReport>,
    pub partition_report: Option<PartitionReport>,

    pub partitions_processed: u64,
    pub calls_emitted: u64,
    pub calls_pass: u64,
    pub lost_partitions: Vec<LostPartition>,

    /// Set when any sketch exceeded the configured FPR ceiling; output
    /// should be treated as low-confidence.
    pub low_confidence: bool,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            started_at: Some(chrono::Utc::now()),
            ..Default::default()
        }
    }

    pub fn record_lost_partition(
        &mut self,
        label: impl Into<String>,
        reason: PartitionLossReason,
        contig: Option<String>,
    ) {
        let label = label.into();
        warn!(partition = %label, reason = reason.code(), "partition produced no calls");
        self.lost_partitions.push(LostPartition {
            label,
            reason,
            contig,
        });
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now());
    }

    pub fn lost_count(&self, reason: PartitionLossReason) -> usize {
        self.lost_partitions
            .iter()
            .filter(|l| l.reason == reason)
            .count()
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Log the headline numbers at the end of a run.
    pub fn log_overview(&self) {
        info!(
            partitions = self.partitions_processed,
            calls = self.calls_emitted,
            pass = self.calls_pass,
            lost = self.lost_partitions.len(),
            low_confidence = self.low_confidence,
            "pipeline run complete"
        );
    }
}
