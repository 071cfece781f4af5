//! Greedy overlap-extension assembler: the fallback path.
//!
//! Seeds a contig with the read carrying the most novel k-mers, then
//! repeatedly extends either end with the read providing the largest
//! exact overlap, trying both strands of every candidate. Remaining reads
//! seed further contigs within the same partition.

use anyhow::{anyhow, Result};

use crate::core::kmer::revcomp;
use crate::core::read::AugmentedRead;

use super::{partition_novel_kmers, project_novel_kmers, Assembler, Contig};

#[derive(Debug, Clone)]
pub struct GreedyAssembler {
    k: usize,
    /// Overlap floor; the effective requirement is `max(K, min_overlap)`.
    min_overlap: usize,
    min_contig_len: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    sequence: String,
    novel_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Right,
    Left,
    Contained,
}

#[derive(Debug, Clone)]
struct Extension {
    overlap: usize,
    novel_count: usize,
    candidate_idx: usize,
    reverse: bool,
    side: Side,
}

impl Extension {
    /// Larger overlap wins; ties by novel k-mer count, then input rank,
    /// then forward strand, then right-end extension.
    fn beats(&self, other: &Extension) -> bool {
        (
            self.overlap,
            self.novel_count,
            std::cmp::Reverse(self.candidate_idx),
            !self.reverse,
            self.side == Side::Right || self.side == Side::Contained,
        ) > (
            other.overlap,
            other.novel_count,
            std::cmp::Reverse(other.candidate_idx),
            !other.reverse,
            other.side == Side::Right || other.side == Side::Contained,
        )
    }
}

impl GreedyAssembler {
    pub fn new(k: usize, min_overlap: usize, min_contig_len: usize) -> Result<Self> {
        if k == 0 {
            return Err(anyhow!("greedy assembly requires k > 0"));
        }
        Ok(Self {
            k,
            min_overlap,
            min_contig_len,
        })
    }

    fn required_overlap(&self) -> usize {
        self.k.max(self.min_overlap)
    }

    /// Largest exact suffix/prefix overlap of `left` against `right`,
    /// at least `req` bases, shorter than both sequences.
    fn best_overlap(left: &str, right: &str, req: usize) -> Option<usize> {
        let max = left.len().min(right.len()).saturating_sub(1);
        (req..=max)
            .rev()
            .find(|&o| left.as_bytes()[left.len() - o..] == right.as_bytes()[..o])
    }

    fn find_extension(&self, contig: &str, candidates: &[Option<Candidate>]) -> Option<Extension> {
        let req = self.required_overlap();
        let mut best: Option<Extension> = None;
        for (idx, slot) in candidates.iter().enumerate() {
            let Some(candidate) = slot else { continue };
            for reverse in [false, true] {
                let seq = if reverse {
                    String::from_utf8(revcomp(candidate.sequence.as_bytes()))
                        .expect("DNA is ASCII")
                } else {
                    candidate.sequence.clone()
                };

                let extension = if contig.contains(&seq) {
                    Some(Extension {
                        overlap: seq.len(),
                        novel_count: candidate.novel_count,
                        candidate_idx: idx,
                        reverse,
                        side: Side::Contained,
                    })
                } else if let Some(overlap) = Self::best_overlap(contig, &seq, req) {
                    Some(Extension {
                        overlap,
                        novel_count: candidate.novel_count,
                        candidate_idx: idx,
                        reverse,
                        side: Side::Right,
                    })
                } else {
                    Self::best_overlap(&seq, contig, req).map(|overlap| Extension {
                        overlap,
                        novel_count: candidate.novel_count,
                        candidate_idx: idx,
                        reverse,
                        side: Side::Left,
                    })
                };

                if let Some(ext) = extension {
                    if best.as_ref().map(|b| ext.beats(b)).unwrap_or(true) {
                        best = Some(ext);
                    }
                }
            }
        }
        best
    }

    fn apply_extension(
        contig: &mut String,
        ext: &Extension,
        candidates: &mut [Option<Candidate>],
    ) -> String {
        let candidate = candidates[ext.candidate_idx]
            .take()
            .expect("extension points at a live candidate");
        let seq = if ext.reverse {
            String::from_utf8(revcomp(candidate.sequence.as_bytes())).expect("DNA is ASCII")
        } else {
            candidate.sequence.clone()
        };
        match ext.side {
            Side::Contained => {}
            Side::Right => contig.push_str(&seq[ext.overlap..]),
            Side::Left => {
                let mut extended = seq[..seq.len() - ext.overlap].to_string();
                extended.push_str(contig);
                *contig = extended;
            }
        }
        candidate.id
    }
}

impl Assembler for GreedyAssembler {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn assemble(&self, reads: &[AugmentedRead]) -> Result<Vec<Contig>> {
        if reads.is_empty() {
            return Ok(Vec::new());
        }
        let novel = partition_novel_kmers(reads);

        // Seed order: most novel k-mers first, ties by read id
        let mut order: Vec<usize> = (0..reads.len()).collect();
        let novel_counts: Vec<usize> = reads
            .iter()
            .map(|r| r.novel_kmer_set().len())
            .collect();
        order.sort_by(|&a, &b| {
            novel_counts[b]
                .cmp(&novel_counts[a])
                .then_with(|| reads[a].id.cmp(&reads[b].id))
        });

        let mut candidates: Vec<Option<Candidate>> = order
            .iter()
            .map(|&i| {
                Some(Candidate {
                    id: reads[i].id.clone(),
                    sequence: reads[i].sequence.clone(),
                    novel_count: novel_counts[i],
                })
            })
            .collect();

        let mut contigs = Vec::new();
        loop {
            let Some(seed_idx) = candidates.iter().position(|c| c.is_some()) else {
                break;
            };
            let seed = candidates[seed_idx].take().expect("position points at Some");
            let mut contig = seed.sequence.clone();
            let mut support = vec![seed.id.clone()];

            while let Some(ext) = self.find_extension(&contig, &candidates) {
                support.push(Self::apply_extension(&mut contig, &ext, &mut candidates));
            }

            if contig.len() >= self.min_contig_len {
                let novel_kmers = project_novel_kmers(&contig, &novel, self.k);
                contigs.push(Contig {
                    id: contigs.len(),
                    sequence: contig,
                    support,
                    novel_kmers,
                });
            }
        }
        Ok(contigs)
    }
}
