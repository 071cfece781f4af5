//! VCF 4.2 output for variant calls.
//!
//! INFO fields: `RW`/`VW` (number of reference/variant window k-mers
//! spanning the locus), `ALTWINDOW`/`REFRWINDOW` (the window sequences),
//! `LIKESCORE` (de novo log-likelihood score), `CALLCLASS` (variant kind).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::variant::VariantCall;

const FILTER_DESCRIPTIONS: &[(&str, &str)] = &[
    ("LikelihoodFail", "De novo likelihood score is negative"),
    ("ControlAbundance", "Variant k-mers abundant in a control sample"),
    ("AbundMismatch", "Proband abundance inconsistent with a heterozygous variant"),
    ("NoReferenceMatch", "Contig could not be localized to the reference"),
    ("PartitionTooSmall", "Supporting partition below the minimum read count"),
    ("Homopolymer", "Variant lies in low-complexity sequence"),
    ("ContigEndTooClose", "SNV within the terminal distance of a contig end"),
];

/// Streaming VCF writer.
pub struct VcfWriter<W: Write> {
    output: W,
    header_written: bool,
}

impl VcfWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create VCF file: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> VcfWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            header_written: false,
        }
    }

    pub fn write_header(&mut self, reference: Option<&str>) -> Result<()> {
        writeln!(self.output, "##fileformat=VCFv4.2")?;
        writeln!(
            self.output,
            "##source=denovo-forge {}",
            env!("CARGO_PKG_VERSION")
        )?;
        if let Some(reference) = reference {
            writeln!(self.output, "##reference={reference}")?;
        }
        writeln!(
            self.output,
            "##INFO=<ID=RW,Number=1,Type=Integer,Description=\"Reference window k-mers spanning the variant locus\">"
        )?;
        writeln!(
            self.output,
            "##INFO=<ID=VW,Number=1,Type=Integer,Description=\"Variant window k-mers spanning the variant locus\">"
        )?;
        writeln!(
            self.output,
            "##INFO=<ID=ALTWINDOW,Number=1,Type=String,Description=\"Contig sequence spanning the variant\">"
        )?;
        writeln!(
            self.output,
            "##INFO=<ID=REFRWINDOW,Number=1,Type=String,Description=\"Reference sequence spanning the variant\">"
        )?;
        writeln!(
            self.output,
            "##INFO=<ID=LIKESCORE,Number=1,Type=Float,Description=\"De novo log-likelihood score\">"
        )?;
        writeln!(
            self.output,
            "##INFO=<ID=CALLCLASS,Number=1,Type=String,Description=\"Variant classification\">"
        )?;
        for (id, desc) in FILTER_DESCRIPTIONS {
            writeln!(
                self.output,
                "##FILTER=<ID={id},Description=\"{desc}\">"
            )?;
        }
        writeln!(self.output, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_call(&mut self, call: &VariantCall) -> Result<()> {
        if !self.header_written {
            self.write_header(None)?;
        }
        let mut info = vec![
            format!("RW={}", call.reference_window_kmers.len()),
            format!("VW={}", call.variant_window_kmers.len()),
        ];
        if !call.alt_window.is_empty() {
            info.push(format!("ALTWINDOW={}", call.alt_window));
        }
        if !call.ref_window.is_empty() {
            info.push(format!("REFRWINDOW={}", call.ref_window));
        }
        if let Some(score) = call.likelihood {
            info.push(format!("LIKESCORE={score:.4}"));
        }
        info.push(format!("CALLCLASS={}", call.kind));

        writeln!(
            self.output,
            "{}\t{}\t.\t{}\t{}\t.\t{}\t{}",
            call.seqid,
            call.pos + 1,
            call.ref_allele,
            call.alt_allele,
            call.filter_field(),
            info.join(";")
        )?;
        Ok(())
    }

    /// Write a batch, optionally sorted by `(seqid, pos)`.
    pub fn write_calls(&mut self, calls: &[VariantCall], sort: bool) -> Result<()> {
        if sort {
            let mut sorted: Vec<&VariantCall> = calls.iter().collect();
            sorted.sort_by_key(|c| c.sort_key());
            for call in sorted {
                self.write_call(call)?;
            }
        } else {
            for call in calls {
                self.write_call(call)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }
}
