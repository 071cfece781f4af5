//! End-to-end pipeline scenarios on synthetic trios.

mod common;

use common::*;

use denovo_forge::core::variant::VariantKind;
use denovo_forge::pipeline::{DenovoPipeline, PipelineInputs};
use denovo_forge::utils::configuration::PipelineConfiguration;

const REF_LEN: usize = 2000;

fn pipeline() -> DenovoPipeline {
    DenovoPipeline::new(PipelineConfiguration::small_dataset()).unwrap()
}

struct TrioFixture {
    _dir: tempfile::TempDir,
    inputs: PipelineInputs,
}

/// Build a trio where the proband carries `variants` on one haplotype
/// and both parents are homozygous reference.
fn trio_with_variants(seed: u64, variants: &[PlantedVariant]) -> TrioFixture {
    let dir = tempfile::tempdir().unwrap();
    let reference = random_reference(seed, REF_LEN);
    let alt_haplotype = apply_variants(&reference, variants);

    let ref_reads_a = tile_reads(&reference, 0);
    let ref_reads_b = tile_reads(&reference, 3);
    let alt_reads = tile_reads(&alt_haplotype, 0);

    let proband = write_fastq(dir.path(), "proband.fastq", &[&ref_reads_a, &alt_reads]);
    let father = write_fastq(dir.path(), "father.fastq", &[&ref_reads_a, &ref_reads_b]);
    let mother = write_fastq(dir.path(), "mother.fastq", &[&ref_reads_a, &ref_reads_b]);
    let reference_path = write_fasta(dir.path(), "ref.fa", &[("chr1", &reference)]);
    let vcf = dir.path().join("calls.vcf");

    TrioFixture {
        inputs: PipelineInputs {
            proband,
            controls: vec![father, mother],
            reference: reference_path,
            contamination: None,
            output_vcf: Some(vcf),
            partition_output: None,
        },
        _dir: dir,
    }
}

#[test]
fn test_trio_with_proband_only_snvs() {
    let variants = vec![
        PlantedVariant::Snv { pos: 400, alt: 'X' },
        PlantedVariant::Snv { pos: 1000, alt: 'X' },
        PlantedVariant::Snv { pos: 1600, alt: 'X' },
    ];
    // Resolve the placeholder alt into a base that differs from the reference
    let reference = random_reference(11, REF_LEN);
    let variants: Vec<PlantedVariant> = variants
        .into_iter()
        .map(|v| match v {
            PlantedVariant::Snv { pos, .. } => {
                let refr = reference.as_bytes()[pos] as char;
                let alt = if refr == 'A' { 'G' } else { 'A' };
                PlantedVariant::Snv { pos, alt }
            }
            other => other,
        })
        .collect();

    let fixture = trio_with_variants(11, &variants);
    let (calls, summary) = pipeline().run(&fixture.inputs).unwrap();

    let report = summary.partition_report.as_ref().unwrap();
    assert_eq!(
        report.partitions_emitted, 3,
        "one partition per planted variant: {report:?}"
    );

    for variant in &variants {
        let PlantedVariant::Snv { pos, alt } = variant else {
            unreachable!()
        };
        let found = calls.iter().find(|c| c.pos == *pos).unwrap_or_else(|| {
            panic!("no call at planted position {pos}; calls: {calls:?}")
        });
        assert_eq!(found.kind, VariantKind::Snv);
        assert_eq!(found.ref_allele, &reference[*pos..pos + 1]);
        assert_eq!(found.alt_allele, alt.to_string());
        assert!(
            found.likelihood.unwrap() > 0.0,
            "de novo score should be positive: {found:?}"
        );
        assert!(found.is_pass(), "expected PASS call: {found:?}");
        assert!(!found.supporting_kmers.is_empty());
    }

    // Calls are sorted by position
    let positions: Vec<usize> = calls.iter().map(|c| c.pos).collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[test]
fn test_no_proband_unique_variants_yields_empty_vcf() {
    let fixture = trio_with_variants(23, &[]);
    let (calls, summary) = pipeline().run(&fixture.inputs).unwrap();

    assert!(calls.is_empty());
    let novel = summary.novel_report.as_ref().unwrap();
    assert_eq!(novel.reads_out, 0, "novelty stage should emit nothing");

    // VCF exists and contains only header lines
    let vcf_text =
        std::fs::read_to_string(fixture.inputs.output_vcf.as_ref().unwrap()).unwrap();
    assert!(vcf_text.contains("##fileformat=VCFv4.2"));
    assert!(vcf_text.lines().all(|l| l.starts_with('#')));
}

#[test]
fn test_variant_shared_with_parent_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let reference = random_reference(37, REF_LEN);
    let alt = if reference.as_bytes()[900] == b'C' { 'T' } else { 'C' };
    let variants = vec![PlantedVariant::Snv { pos: 900, alt }];
    let haplotype = apply_variants(&reference, &variants);

    let ref_reads = tile_reads(&reference, 0);
    let alt_reads = tile_reads(&haplotype, 0);

    // Father carries the same variant: nothing is proband-unique
    let proband = write_fastq(dir.path(), "proband.fastq", &[&ref_reads, &alt_reads]);
    let father = write_fastq(dir.path(), "father.fastq", &[&ref_reads, &alt_reads]);
    let mother = write_fastq(dir.path(), "mother.fastq", &[&ref_reads, &ref_reads]);
    let reference_path = write_fasta(dir.path(), "ref.fa", &[("chr1", &reference)]);

    let inputs = PipelineInputs {
        proband,
        controls: vec![father, mother],
        reference: reference_path,
        contamination: None,
        output_vcf: None,
        partition_output: None,
    };
    let (calls, summary) = pipeline().run(&inputs).unwrap();

    assert!(
        calls.iter().all(|c| c.pos != 900),
        "shared variant must not be called: {calls:?}"
    );
    let novel = summary.novel_report.as_ref().unwrap();
    assert_eq!(novel.reads_out, 0);
}

#[test]
fn test_partitioned_output_written() {
    let reference = random_reference(53, REF_LEN);
    let alt = if reference.as_bytes()[700] == b'G' { 'A' } else { 'G' };
    let variants = vec![PlantedVariant::Snv { pos: 700, alt }];
    let mut fixture = trio_with_variants(53, &variants);
    let part_path = fixture
        .inputs
        .proband
        .parent()
        .unwrap()
        .join("partitions.augfastq");
    fixture.inputs.partition_output = Some(part_path.clone());

    pipeline().run(&fixture.inputs).unwrap();

    let text = std::fs::read_to_string(&part_path).unwrap();
    assert!(text.contains("#part=1"));
    assert!(text.contains("@read"));
}
