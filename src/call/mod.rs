//! Variant calling: align each contig to its reference windows and
//! interpret the alignment into variant records.
//!
//! Mismatch runs become SNVs, insertion runs become anchored insertions,
//! deletion runs anchored deletions. Adjacent events within the merge
//! window collapse into one complex call. Indels are reported at the
//! leftmost position of their equivalence class.

pub mod align;

use ahash::AHashSet;
use anyhow::Result;
use bio::alignment::AlignmentOperation;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembly::Contig;
use crate::core::kmer::{canonical, homopolymer_run_at};
use crate::core::variant::{CallFilter, VariantCall, VariantKind};
use crate::localize::ReferenceWindow;

pub use align::{align_contig, AlignmentParams, ContigAlignment};

/// Calling parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CallParams {
    /// Pipeline K, used for the RW/VW k-mer windows.
    pub k: usize,
    /// Adjacent events within this many reference bases merge into one
    /// complex call.
    pub merge_window: usize,
    /// SNVs closer than this to either contig end are filtered.
    pub terminal_snv_dist: usize,
    pub allow_terminal_snv: bool,
    /// Indels inside a homopolymer run at least this long are filtered.
    pub homopolymer_min_run: usize,
    /// Reference padding width; SNVs inside it are not reported.
    pub ref_pad: usize,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            k: 31,
            merge_window: 10,
            terminal_snv_dist: 12,
            allow_terminal_snv: false,
            homopolymer_min_run: 5,
            ref_pad: 100,
        }
    }
}

/// One alignment event in window-local coordinates, before anchoring.
#[derive(Debug, Clone)]
struct RawEvent {
    /// Window-local reference offset where the event begins.
    ref_pos: usize,
    /// Contig offset where the event begins.
    contig_pos: usize,
    ref_seq: String,
    alt_seq: String,
    kind: VariantKind,
}

impl RawEvent {
    fn ref_end(&self) -> usize {
        self.ref_pos + self.ref_seq.len()
    }

    fn contig_end(&self) -> usize {
        self.contig_pos + self.alt_seq.len()
    }
}

/// Extract raw events from an alignment walk.
fn collect_events(
    contig: &str,
    window: &str,
    aln: &ContigAlignment,
    novel_kmers: &[(usize, String)],
    k: usize,
) -> Vec<RawEvent> {
    let cbytes = contig.as_bytes();
    let wbytes = window.as_bytes();
    let contig_len = cbytes.len();
    let mut events = Vec::new();
    let mut x = 0usize;
    let mut y = aln.ystart;

    let ops = &aln.operations;
    let mut i = 0;
    while i < ops.len() {
        let op = ops[i];
        // Length of the homogeneous run starting here
        let mut run = 1;
        while i + run < ops.len() && ops[i + run] == op {
            run += 1;
        }
        match op {
            AlignmentOperation::Match => {
                x += run;
                y += run;
            }
            AlignmentOperation::Subst => {
                for j in 0..run {
                    events.push(RawEvent {
                        ref_pos: y + j,
                        contig_pos: x + j,
                        ref_seq: (wbytes[y + j] as char).to_string(),
                        alt_seq: (cbytes[x + j] as char).to_string(),
                        kind: VariantKind::Snv,
                    });
                }
                x += run;
                y += run;
            }
            AlignmentOperation::Ins => {
                let inserted = String::from_utf8_lossy(&cbytes[x..x + run]).into_owned();
                let terminal = x == 0 || x + run == contig_len;
                let supported = !terminal
                    || novel_kmers
                        .iter()
                        .any(|(o, _)| *o < x + run && o + k > x);
                if supported {
                    events.push(RawEvent {
                        ref_pos: y,
                        contig_pos: x,
                        ref_seq: String::new(),
                        alt_seq: inserted,
                        kind: VariantKind::Insertion,
                    });
                }
                x += run;
            }
            AlignmentOperation::Del => {
                events.push(RawEvent {
                    ref_pos: y,
                    contig_pos: x,
                    ref_seq: String::from_utf8_lossy(&wbytes[y..y + run]).into_owned(),
                    alt_seq: String::new(),
                    kind: VariantKind::Deletion,
                });
                y += run;
            }
            AlignmentOperation::Xclip(n) => x += n,
            AlignmentOperation::Yclip(n) => y += n,
        }
        i += run.max(1);
    }
    events
}

/// Shift an indel to the leftmost position of its equivalence class.
fn left_align(event: &mut RawEvent, window: &[u8]) {
    match event.kind {
        VariantKind::Insertion => {
            let mut seq: Vec<u8> = event.alt_seq.bytes().collect();
            while event.ref_pos > 0
                && event.contig_pos > 0
                && window[event.ref_pos - 1] == *seq.last().expect("insertion is non-empty")
            {
                seq.rotate_right(1);
                seq[0] = window[event.ref_pos - 1];
                event.ref_pos -= 1;
                event.contig_pos -= 1;
            }
            event.alt_seq = String::from_utf8(seq).expect("DNA is ASCII");
        }
        VariantKind::Deletion => {
            let len = event.ref_seq.len();
            while event.ref_pos > 0
                && window[event.ref_pos - 1] == window[event.ref_pos + len - 1]
            {
                event.ref_pos -= 1;
            }
            event.ref_seq =
                String::from_utf8_lossy(&window[event.ref_pos..event.ref_pos + len]).into_owned();
        }
        _ => {}
    }
}

/// Merge events whose reference spans lie within `merge_window` of one
/// another into complex calls.
fn merge_adjacent(events: Vec<RawEvent>, contig: &str, window: &str, merge_window: usize) -> Vec<RawEvent> {
    if events.len() < 2 {
        return events;
    }
    let mut sorted = events;
    sorted.sort_by_key(|e| (e.ref_pos, e.contig_pos));

    let mut merged: Vec<Vec<RawEvent>> = vec![vec![sorted[0].clone()]];
    for event in sorted.into_iter().skip(1) {
        let group = merged.last_mut().expect("group list starts non-empty");
        let last = group.last().expect("group is non-empty");
        if event.ref_pos.saturating_sub(last.ref_end()) <= merge_window {
            group.push(event);
        } else {
            merged.push(vec![event]);
        }
    }

    merged
        .into_iter()
        .map(|group| {
            if group.len() == 1 {
                return group.into_iter().next().expect("single-event group");
            }
            let first = group.first().expect("group is non-empty").clone();
            let last = group.last().expect("group is non-empty").clone();
            RawEvent {
                ref_pos: first.ref_pos,
                contig_pos: first.contig_pos,
                ref_seq: window[first.ref_pos..last.ref_end()].to_string(),
                alt_seq: contig[first.contig_pos..last.contig_end()].to_string(),
                kind: VariantKind::Mnv,
            }
        })
        .collect()
}

/// Canonical K-length windows of `seq` overlapping `[locus, locus+len)`.
fn spanning_kmers(seq: &[u8], locus: usize, span: usize, k: usize) -> Vec<String> {
    if seq.len() < k {
        return Vec::new();
    }
    let first = locus.saturating_sub(k - 1);
    let last = (locus + span.max(1) - 1).min(seq.len() - k);
    let mut kmers = Vec::new();
    let mut seen = AHashSet::new();
    for offset in first..=last {
        let km = canonical(&seq[offset..offset + k]);
        if seen.insert(km.clone()) {
            kmers.push(String::from_utf8(km).expect("canonical preserves ASCII"));
        }
    }
    kmers
}

fn finalize_call(
    event: RawEvent,
    contig: &Contig,
    window: &ReferenceWindow,
    params: &CallParams,
    score: i32,
) -> Option<VariantCall> {
    let wbytes = window.sequence.as_bytes();
    let window_len = wbytes.len();

    // SNVs inside the reference padding are never reported
    if event.kind == VariantKind::Snv
        && (event.ref_pos < params.ref_pad || event.ref_pos + params.ref_pad >= window_len)
    {
        return None;
    }

    // VCF anchoring: indels carry the preceding reference base
    let (pos_local, ref_allele, alt_allele) = match event.kind {
        VariantKind::Snv | VariantKind::Mnv => {
            (event.ref_pos, event.ref_seq.clone(), event.alt_seq.clone())
        }
        VariantKind::Insertion => {
            if event.ref_pos == 0 {
                let anchor = wbytes[0] as char;
                (0, anchor.to_string(), format!("{}{anchor}", event.alt_seq))
            } else {
                let anchor = wbytes[event.ref_pos - 1] as char;
                (
                    event.ref_pos - 1,
                    anchor.to_string(),
                    format!("{anchor}{}", event.alt_seq),
                )
            }
        }
        VariantKind::Deletion => {
            if event.ref_pos == 0 {
                let anchor = wbytes[event.ref_end()] as char;
                (0, format!("{}{anchor}", event.ref_seq), anchor.to_string())
            } else {
                let anchor = wbytes[event.ref_pos - 1] as char;
                (
                    event.ref_pos - 1,
                    format!("{anchor}{}", event.ref_seq),
                    anchor.to_string(),
                )
            }
        }
    };

    if ref_allele.is_empty() || alt_allele.is_empty() {
        return None;
    }

    let mut call = VariantCall::new(
        window.seqid.clone(),
        window.start + pos_local,
        ref_allele,
        alt_allele,
        event.kind,
    );
    call.alignment_score = score;

    if event.kind == VariantKind::Snv && !params.allow_terminal_snv {
        let near_start = event.contig_pos < params.terminal_snv_dist;
        let near_end = event.contig_pos + params.terminal_snv_dist >= contig.len();
        if near_start || near_end {
            call.add_filter(CallFilter::ContigEndTooClose);
        }
    }

    if matches!(event.kind, VariantKind::Insertion | VariantKind::Deletion)
        && homopolymer_run_at(wbytes, pos_local) >= params.homopolymer_min_run
    {
        call.add_filter(CallFilter::Homopolymer);
    }

    // Evidence windows: K-length substrings covering the locus on both
    // sides, plus the novel k-mers that land inside the variant window
    let k = params.k;
    call.reference_window_kmers =
        spanning_kmers(wbytes, pos_local, call.ref_allele.len(), k);
    call.variant_window_kmers = spanning_kmers(
        contig.sequence.as_bytes(),
        event.contig_pos,
        call.alt_allele.len(),
        k,
    );
    let novel: AHashSet<&str> = contig
        .novel_kmers
        .iter()
        .map(|(_, km)| km.as_str())
        .collect();
    call.supporting_kmers = call
        .variant_window_kmers
        .iter()
        .filter(|km| novel.contains(km.as_str()))
        .cloned()
        .collect();

    let ctx = k;
    let w_lo = pos_local.saturating_sub(ctx);
    let w_hi = (pos_local + call.ref_allele.len() + ctx).min(window_len);
    call.ref_window = window.sequence[w_lo..w_hi].to_string();
    let c_lo = event.contig_pos.saturating_sub(ctx);
    let c_hi = (event.contig_pos + call.alt_allele.len() + ctx).min(contig.len());
    call.alt_window = contig.sequence[c_lo..c_hi].to_string();

    Some(call)
}

/// Call variants from one contig against its candidate windows: the best
/// scoring alignment wins, and its events become calls.
pub fn call_contig(
    contig: &Contig,
    windows: &[ReferenceWindow],
    aln_params: &AlignmentParams,
    call_params: &CallParams,
) -> Result<Vec<VariantCall>> {
    let mut best: Option<(ContigAlignment, &ReferenceWindow)> = None;
    for window in windows {
        let aln = align_contig(&contig.sequence, &window.sequence, aln_params)?;
        if best.as_ref().map(|(b, _)| aln.score > b.score).unwrap_or(true) {
            best = Some((aln, window));
        }
    }
    let Some((aln, window)) = best else {
        return Ok(Vec::new());
    };
    debug!(
        contig = contig.id,
        score = aln.score,
        cigar = %aln.cigar,
        "selected best alignment"
    );

    let mut events = collect_events(
        &contig.sequence,
        &window.sequence,
        &aln,
        &contig.novel_kmers,
        call_params.k,
    );
    let wbytes = window.sequence.as_bytes();
    for event in &mut events {
        left_align(event, wbytes);
    }
    let events = merge_adjacent(
        events,
        &contig.sequence,
        &window.sequence,
        call_params.merge_window,
    );

    Ok(events
        .into_iter()
        .filter_map(|e| finalize_call(e, contig, window, call_params, aln.score))
        .collect())
}

/// Merge duplicate calls across a partition's contigs on
/// `(seqid, pos, ref, alt)`, keeping the best alignment score.
pub fn merge_partition_calls(calls: Vec<VariantCall>) -> Vec<VariantCall> {
    let mut merged: Vec<VariantCall> = Vec::new();
    for call in calls {
        if let Some(existing) = merged.iter_mut().find(|c| c.allele_key() == call.allele_key()) {
            if call.alignment_score > existing.alignment_score {
                *existing = call;
            }
        } else {
            merged.push(call);
        }
    }
    merged.sort_by_key(|c| c.sort_key());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: usize = 11;

    /// 120 bp reference with no repeated 11-mers.
    fn reference() -> String {
        let mut seq = String::from(
            "ACGTTGCATCAGTTCCAGACGGATTACAGGCTTAACTGATGCCAAGTCTCGGAAGTACCTGTTCAATGGCAGATTACCGGTTCCGGAATCAAGGTCATGCAACCTTGATTCGGTACACGT",
        );
        seq.truncate(120);
        seq
    }

    fn window_for(seq: &str) -> ReferenceWindow {
        ReferenceWindow {
            seqid: "chr1".to_string(),
            start: 0,
            end: seq.len(),
            sequence: seq.to_string(),
        }
    }

    fn contig_of(seq: &str) -> Contig {
        let novel_kmers: Vec<(usize, String)> = if seq.len() >= K {
            (0..=seq.len() - K)
                .map(|o| {
                    (
                        o,
                        String::from_utf8(canonical(&seq.as_bytes()[o..o + K])).unwrap(),
                    )
                })
                .collect()
        } else {
            Vec::new()
        };
        Contig {
            id: 0,
            sequence: seq.to_string(),
            support: vec!["r1".to_string()],
            novel_kmers,
        }
    }

    fn call_params() -> CallParams {
        CallParams {
            k: K,
            merge_window: 10,
            terminal_snv_dist: 5,
            allow_terminal_snv: false,
            homopolymer_min_run: 5,
            ref_pad: 0,
        }
    }

    #[test]
    fn test_snv_called_at_reference_coordinate() {
        let reference = reference();
        // Contig copies reference[30..90] with an SNV at reference pos 60
        let mut contig_seq: Vec<u8> = reference.as_bytes()[30..90].to_vec();
        let original = contig_seq[30];
        contig_seq[30] = if original == b'G' { b'T' } else { b'G' };
        let contig = contig_of(std::str::from_utf8(&contig_seq).unwrap());
        let window = window_for(&reference);

        let calls = call_contig(
            &contig,
            &[window],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.kind, VariantKind::Snv);
        assert_eq!(call.pos, 60);
        assert_eq!(call.ref_allele, (original as char).to_string());
        // Property: the reference slice at pos matches ref_allele
        assert_eq!(&reference[call.pos..call.pos + 1], call.ref_allele);
        assert!(call.is_pass());
        assert!(!call.supporting_kmers.is_empty());
    }

    #[test]
    fn test_insertion_called_with_anchor() {
        let reference = reference();
        let mut contig_seq = reference[30..90].to_string();
        contig_seq.insert_str(30, "TGCTA");
        let contig = contig_of(&contig_seq);
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.kind, VariantKind::Insertion);
        assert_eq!(call.alt_allele.len(), call.ref_allele.len() + 5);
        assert!(call.alt_allele.starts_with(&call.ref_allele));
        // Anchor base matches the reference at the reported position
        assert_eq!(
            &reference[call.pos..call.pos + 1],
            &call.ref_allele[..1]
        );
    }

    #[test]
    fn test_deletion_called_with_anchor() {
        let reference = reference();
        let mut contig_seq = reference[30..95].to_string();
        contig_seq.replace_range(30..37, "");
        let contig = contig_of(&contig_seq);
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.kind, VariantKind::Deletion);
        assert_eq!(call.ref_allele.len(), call.alt_allele.len() + 7);
        // Property: reference slice equals the full deleted allele
        assert_eq!(
            &reference[call.pos..call.pos + call.ref_allele.len()],
            call.ref_allele
        );
    }

    #[test]
    fn test_terminal_snv_filtered() {
        let reference = reference();
        let mut contig_seq: Vec<u8> = reference.as_bytes()[30..90].to_vec();
        // SNV two bases from the contig start
        let original = contig_seq[2];
        contig_seq[2] = if original == b'G' { b'T' } else { b'G' };
        let contig = contig_of(std::str::from_utf8(&contig_seq).unwrap());
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].filters.contains(&CallFilter::ContigEndTooClose));
    }

    #[test]
    fn test_terminal_snv_allowed_when_configured() {
        let reference = reference();
        let mut contig_seq: Vec<u8> = reference.as_bytes()[30..90].to_vec();
        let original = contig_seq[2];
        contig_seq[2] = if original == b'G' { b'T' } else { b'G' };
        let contig = contig_of(std::str::from_utf8(&contig_seq).unwrap());
        let mut params = call_params();
        params.allow_terminal_snv = true;
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &params,
        )
        .unwrap();
        assert!(calls[0].is_pass());
    }

    #[test]
    fn test_adjacent_events_merge_into_complex_call() {
        let reference = reference();
        let mut contig_seq: Vec<u8> = reference.as_bytes()[30..90].to_vec();
        // Two SNVs three bases apart
        for &i in &[30usize, 33] {
            contig_seq[i] = match contig_seq[i] {
                b'A' => b'C',
                b'C' => b'A',
                b'G' => b'T',
                _ => b'G',
            };
        }
        let contig = contig_of(std::str::from_utf8(&contig_seq).unwrap());
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.kind, VariantKind::Mnv);
        assert_eq!(call.ref_allele.len(), 4);
        assert_eq!(
            &reference[call.pos..call.pos + call.ref_allele.len()],
            call.ref_allele
        );
    }

    #[test]
    fn test_deletion_left_aligned_in_repeat() {
        // Reference with a CAG repeat; deleting one unit is ambiguous and
        // must report the leftmost placement
        let reference =
            "ACGTTGCATCAGTTCCAGACGGATTACAGGCAGCAGCAGCAGCTTAACTGATGCCAAGTCTCGGAAGTACCTGTTCAATG";
        // Repeat block CAGCAGCAGCAG starts at 29 ("GGCAGCAG...")
        let mut contig_seq = reference[10..70].to_string();
        // Delete one CAG unit from inside the repeat (local 21..24)
        contig_seq.replace_range(21..24, "");
        let contig = contig_of(&contig_seq);
        let calls = call_contig(
            &contig,
            &[window_for(reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.kind, VariantKind::Deletion);
        // Any placement of a 3 bp deletion in the repeat is equivalent;
        // the call must use the leftmost one
        let earliest_equivalent = 28;
        assert_eq!(call.pos, earliest_equivalent);
        assert_eq!(
            &reference[call.pos..call.pos + call.ref_allele.len()],
            call.ref_allele
        );
    }

    #[test]
    fn test_supporting_kmers_subset_of_vw() {
        let reference = reference();
        let mut contig_seq: Vec<u8> = reference.as_bytes()[30..90].to_vec();
        contig_seq[30] = if contig_seq[30] == b'G' { b'T' } else { b'G' };
        let contig = contig_of(std::str::from_utf8(&contig_seq).unwrap());
        let calls = call_contig(
            &contig,
            &[window_for(&reference)],
            &AlignmentParams::default(),
            &call_params(),
        )
        .unwrap();
        let call = &calls[0];
        let vw: AHashSet<&String> = call.variant_window_kmers.iter().collect();
        let novel: AHashSet<String> = contig
            .novel_kmers
            .iter()
            .map(|(_, km)| km.clone())
            .collect();
        for km in &call.supporting_kmers {
            assert!(vw.contains(km));
            assert!(novel.contains(km));
        }
    }

    #[test]
    fn test_merge_partition_calls_keeps_best_score() {
        let mut a = VariantCall::new("chr1", 10, "A", "G", VariantKind::Snv);
        a.alignment_score = 40;
        let mut b = VariantCall::new("chr1", 10, "A", "G", VariantKind::Snv);
        b.alignment_score = 55;
        let mut c = VariantCall::new("chr1", 20, "T", "C", VariantKind::Snv);
        c.alignment_score = 10;
        let merged = merge_partition_calls(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].alignment_score, 55);
    }
}
