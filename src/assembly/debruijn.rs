//! De Bruijn graph assembler: the primary per-partition path.
//!
//! Reads are strand-oriented against the partition's accumulated k-mer
//! set, decomposed into (k-1)-mer nodes joined by k-mer edges, and
//! contigs are extracted by walking maximal unbranched paths. Partitions
//! are small, so the graph stays in plain hash maps.

use ahash::{AHashMap, AHashSet};
use anyhow::{anyhow, Result};

use crate::core::kmer::revcomp;
use crate::core::read::AugmentedRead;

use super::{partition_novel_kmers, project_novel_kmers, Assembler, Contig};

#[derive(Debug, Clone)]
pub struct DeBruijnAssembler {
    k: usize,
    /// Edges seen fewer times than this are treated as sequencing error.
    min_edge_coverage: u32,
    min_contig_len: usize,
}

#[derive(Debug, Default)]
struct Node {
    successors: AHashMap<String, u32>,
    in_degree: u32,
    out_degree: u32,
}

impl DeBruijnAssembler {
    pub fn new(k: usize, min_edge_coverage: u32, min_contig_len: usize) -> Result<Self> {
        if k < 4 {
            return Err(anyhow!("de Bruijn assembly requires k >= 4, got {k}"));
        }
        Ok(Self {
            k,
            min_edge_coverage,
            min_contig_len,
        })
    }

    /// Orient each read to the strand sharing more k-mers with the reads
    /// already placed. The first read fixes the frame; single-pass in
    /// input order keeps the result deterministic.
    fn orient_reads(&self, reads: &[AugmentedRead]) -> Vec<(String, String)> {
        let k = self.k;
        let mut placed_kmers: AHashSet<Vec<u8>> = AHashSet::new();
        let mut oriented = Vec::with_capacity(reads.len());

        for read in reads {
            let fwd = read.sequence.as_bytes().to_vec();
            let rev = revcomp(&fwd);
            let orientation = if placed_kmers.is_empty() {
                fwd
            } else {
                let fwd_hits = count_shared(&fwd, k, &placed_kmers);
                let rev_hits = count_shared(&rev, k, &placed_kmers);
                if rev_hits > fwd_hits {
                    rev
                } else {
                    fwd
                }
            };
            for i in 0..orientation.len().saturating_sub(k - 1) {
                placed_kmers.insert(orientation[i..i + k].to_vec());
            }
            oriented.push((
                read.id.clone(),
                String::from_utf8(orientation).expect("DNA is ASCII"),
            ));
        }
        oriented
    }

    fn build_graph(&self, oriented: &[(String, String)]) -> AHashMap<String, Node> {
        let k = self.k;
        let mut edge_counts: AHashMap<(String, String), u32> = AHashMap::new();
        for (_, seq) in oriented {
            let bytes = seq.as_bytes();
            if bytes.len() < k {
                continue;
            }
            for i in 0..=bytes.len() - k {
                let kmer = &bytes[i..i + k];
                if !kmer.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T')) {
                    continue;
                }
                let from = String::from_utf8_lossy(&kmer[..k - 1]).into_owned();
                let to = String::from_utf8_lossy(&kmer[1..]).into_owned();
                *edge_counts.entry((from, to)).or_insert(0) += 1;
            }
        }

        let mut nodes: AHashMap<String, Node> = AHashMap::new();
        for ((from, to), count) in edge_counts {
            if count < self.min_edge_coverage {
                continue;
            }
            nodes
                .entry(from.clone())
                .or_default()
                .successors
                .insert(to.clone(), count);
            nodes.entry(from).or_default().out_degree += 1;
            nodes.entry(to).or_default().in_degree += 1;
        }
        nodes
    }

    /// Walk maximal unbranched paths. Path starts are nodes that are not
    /// the interior of a linear chain; starts are visited in sorted order
    /// so output is deterministic.
    fn extract_paths(&self, nodes: &AHashMap<String, Node>) -> Vec<String> {
        let mut starts: Vec<&String> = nodes
            .keys()
            .filter(|key| {
                let node = &nodes[*key];
                node.out_degree > 0 && (node.in_degree != 1 || node.out_degree > 1)
            })
            .collect();
        starts.sort();

        let mut visited_edges: AHashSet<(String, String)> = AHashSet::new();
        let mut contigs = Vec::new();

        for start in starts {
            let node = &nodes[start];
            let mut successors: Vec<&String> = node.successors.keys().collect();
            successors.sort();
            for succ in successors {
                if visited_edges.contains(&(start.clone(), succ.clone())) {
                    continue;
                }
                let mut sequence = start.clone();
                let mut current = succ.clone();
                visited_edges.insert((start.clone(), current.clone()));
                loop {
                    sequence.push(current.as_bytes()[current.len() - 1] as char);
                    let Some(node) = nodes.get(&current) else { break };
                    if node.out_degree != 1 || node.in_degree > 1 {
                        break;
                    }
                    let next = node
                        .successors
                        .keys()
                        .next()
                        .expect("out_degree 1 node has a successor")
                        .clone();
                    if visited_edges.contains(&(current.clone(), next.clone())) {
                        break;
                    }
                    visited_edges.insert((current.clone(), next.clone()));
                    current = next;
                }
                contigs.push(sequence);
            }
        }
        contigs
    }

    fn support_for(
        &self,
        sequence: &str,
        oriented: &[(String, String)],
    ) -> Vec<String> {
        let k = self.k;
        let contig_kmers: AHashSet<&[u8]> = {
            let bytes = sequence.as_bytes();
            (0..bytes.len().saturating_sub(k - 1))
                .map(|i| &bytes[i..i + k])
                .collect()
        };
        let mut support = Vec::new();
        for (id, seq) in oriented {
            let bytes = seq.as_bytes();
            let shares = (0..bytes.len().saturating_sub(k - 1))
                .any(|i| contig_kmers.contains(&bytes[i..i + k]));
            if shares {
                support.push(id.clone());
            }
        }
        support
    }
}

fn count_shared(seq: &[u8], k: usize, kmers: &AHashSet<Vec<u8>>) -> usize {
    if seq.len() < k {
        return 0;
    }
    (0..=seq.len() - k)
        .filter(|&i| kmers.contains(&seq[i..i + k]))
        .count()
}

impl Assembler for DeBruijnAssembler {
    fn name(&self) -> &'static str {
        "debruijn"
    }

    fn assemble(&self, reads: &[AugmentedRead]) -> Result<Vec<Contig>> {
        if reads.is_empty() {
            return Ok(Vec::new());
        }
        let oriented = self.orient_reads(reads);
        let nodes = self.build_graph(&oriented);
        let novel = partition_novel_kmers(reads);

        let mut contigs = Vec::new();
        for sequence in self.extract_paths(&nodes) {
            if sequence.len() < self.min_contig_len {
                continue;
            }
            let support = self.support_for(&sequence, &oriented);
            let novel_kmers = project_novel_kmers(&sequence, &novel, self.k);
            contigs.push(Contig {
                id: contigs.len(),
                sequence,
                support,
                novel_kmers,
            });
        }
        // Longest contig first; ties resolve by sequence for stability
        contigs.sort_by(|a, b| {
            b.len()
                .cmp(&a.len())
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        for (i, contig) in contigs.iter_mut().enumerate() {
            contig.id = i;
        }
        Ok(contigs)
    }
}
