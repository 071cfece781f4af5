//! Read partitioning: group reads connected through shared novel k-mers.
//!
//! Builds an inverted index `k-mer -> read ids` and merges reads with a
//! union-find instead of materializing the quadratic edge set. Components
//! are deduplicated by canonical read sequence and emitted in descending
//! size order with deterministic labels.

use ahash::AHashMap;
use anyhow::Result;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::read::AugmentedRead;

/// Partitioning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionParams {
    /// Minimum number of distinct shared novel k-mers required to connect
    /// a pair of reads. 1 connects on any shared k-mer; higher values
    /// prune weak edges in repeat-linked partitions.
    pub min_shared_kmers: usize,
    /// Partitions with fewer reads than this are dropped and reported.
    pub min_reads: usize,
    /// Partitions larger than this are split with a warning.
    pub max_reads: Option<usize>,
    /// Drop members whose canonical sequence duplicates another member.
    pub dedup: bool,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            min_shared_kmers: 1,
            min_reads: 2,
            max_reads: None,
            dedup: true,
        }
    }
}

/// A labeled connected component of the shared-k-mer graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub label: String,
    pub reads: Vec<AugmentedRead>,
}

impl Partition {
    /// Distinct novel k-mers across all members.
    pub fn novel_kmer_count(&self) -> usize {
        let mut kmers = ahash::AHashSet::new();
        for read in &self.reads {
            kmers.extend(read.novel_kmer_set());
        }
        kmers.len()
    }
}

/// Counters reported after partitioning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionReport {
    pub reads_in: u64,
    pub reads_grouped: u64,
    pub reads_deduplicated: u64,
    pub partitions_emitted: u64,
    pub partitions_too_small: u64,
    pub partitions_split: u64,
}

/// Group reads into partitions. Output is deterministic for identical
/// input and parameters: descending size, ties broken by the
/// lexicographically smallest member read id, labels numbered from 1.
pub fn partition_reads(
    reads: Vec<AugmentedRead>,
    params: &PartitionParams,
) -> Result<(Vec<Partition>, PartitionReport)> {
    let mut report = PartitionReport {
        reads_in: reads.len() as u64,
        ..Default::default()
    };
    if reads.is_empty() {
        return Ok((Vec::new(), report));
    }

    // Inverted index over canonical novel k-mers
    let mut index: AHashMap<Vec<u8>, Vec<u32>> = AHashMap::new();
    for (idx, read) in reads.iter().enumerate() {
        for kmer in read.novel_kmer_set() {
            index.entry(kmer).or_default().push(idx as u32);
        }
    }

    let mut dsu: UnionFind<u32> = UnionFind::new(reads.len());
    if params.min_shared_kmers <= 1 {
        for ids in index.values() {
            for pair in ids.windows(2) {
                dsu.union(pair[0], pair[1]);
            }
        }
    } else {
        // Count distinct shared k-mers per read pair, then keep edges
        // meeting the support threshold
        let mut pair_support: AHashMap<(u32, u32), usize> = AHashMap::new();
        for ids in index.values() {
            for (i, &a) in ids.iter().enumerate() {
                for &b in &ids[i + 1..] {
                    let key = if a < b { (a, b) } else { (b, a) };
                    *pair_support.entry(key).or_insert(0) += 1;
                }
            }
        }
        for ((a, b), support) in pair_support {
            if support >= params.min_shared_kmers {
                dsu.union(a, b);
            }
        }
    }

    // Collect components in input order so member order is stable
    let mut components: AHashMap<u32, Vec<u32>> = AHashMap::new();
    for idx in 0..reads.len() as u32 {
        components.entry(dsu.find(idx)).or_default().push(idx);
    }

    let mut reads: Vec<Option<AugmentedRead>> = reads.into_iter().map(Some).collect();
    let mut groups: Vec<Vec<AugmentedRead>> = Vec::with_capacity(components.len());
    for (_, member_ids) in components {
        let mut members: Vec<AugmentedRead> = member_ids
            .iter()
            .map(|&i| reads[i as usize].take().expect("each read joins one component"))
            .collect();
        if params.dedup {
            let mut seen = ahash::AHashSet::new();
            let before = members.len();
            members.retain(|r| seen.insert(r.canonical_identity()));
            report.reads_deduplicated += (before - members.len()) as u64;
        }
        groups.push(members);
    }

    // Deterministic ordering: size descending, then smallest read id
    groups.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| min_id(a).cmp(min_id(b)))
    });

    let mut partitions = Vec::new();
    for group in groups {
        if group.len() < params.min_reads {
            report.partitions_too_small += 1;
            continue;
        }
        match params.max_reads {
            Some(cap) if group.len() > cap => {
                warn!(
                    size = group.len(),
                    cap, "splitting oversized partition"
                );
                report.partitions_split += 1;
                for chunk in group.chunks(cap) {
                    partitions.push(chunk.to_vec());
                }
            }
            _ => partitions.push(group),
        }
    }

    let labeled: Vec<Partition> = partitions
        .into_iter()
        .enumerate()
        .map(|(i, reads)| {
            report.partitions_emitted += 1;
            report.reads_grouped += reads.len() as u64;
            Partition {
                label: (i + 1).to_string(),
                reads,
            }
        })
        .collect();

    info!(
        partitions = report.partitions_emitted,
        reads = report.reads_grouped,
        too_small = report.partitions_too_small,
        "partitioning complete"
    );
    Ok((labeled, report))
}

fn min_id(reads: &[AugmentedRead]) -> &str {
    reads
        .iter()
        .map(|r| r.id.as_str())
        .min()
        .unwrap_or_default()
}
