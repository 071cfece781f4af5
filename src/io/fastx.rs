//! Plain FASTA/FASTQ input with automatic format and gzip detection.
//!
//! The counting and novelty stages consume these records; everything
//! downstream speaks the augmented format instead.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;

/// A sequencing record as read from FASTA or FASTQ input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub id: String,
    pub seq: String,
    pub qual: Option<String>,
}

/// File format detected from the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastxFormat {
    Fasta,
    Fastq,
}

fn detect_format(path: &Path) -> Result<(FastxFormat, bool)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("unreadable file name: {}", path.display()))?
        .to_ascii_lowercase();
    let gzipped = name.ends_with(".gz");
    let stem = name.trim_end_matches(".gz");
    if stem.ends_with(".fq") || stem.ends_with(".fastq") {
        Ok((FastxFormat::Fastq, gzipped))
    } else if stem.ends_with(".fa") || stem.ends_with(".fasta") || stem.ends_with(".fna") {
        Ok((FastxFormat::Fasta, gzipped))
    } else {
        Err(anyhow!(
            "cannot detect FASTA/FASTQ format from file name: {}",
            path.display()
        ))
    }
}

/// Open a possibly-gzipped file as a buffered reader.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open input file: {}", path.display()))?;
    let gz = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let reader: Box<dyn Read + Send> = if gz {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Open a FASTA/FASTQ file (gzip-aware) as a stream of records. Records
/// that fail to parse surface as `Err` items so the caller can apply its
/// malformed-record policy.
pub fn open_fastx<P: AsRef<Path>>(
    path: P,
) -> Result<Box<dyn Iterator<Item = Result<SeqRecord>> + Send>> {
    let path = path.as_ref();
    let (format, _) = detect_format(path)?;
    let reader = open_text(path)?;
    match format {
        FastxFormat::Fastq => {
            let records = fastq::Reader::from_bufread(reader).records().map(|r| {
                let rec = r.context("malformed FASTQ record")?;
                Ok(SeqRecord {
                    id: rec.id().to_string(),
                    seq: String::from_utf8_lossy(rec.seq()).to_ascii_uppercase(),
                    qual: Some(String::from_utf8_lossy(rec.qual()).into_owned()),
                })
            });
            Ok(Box::new(records))
        }
        FastxFormat::Fasta => {
            let records = fasta::Reader::from_bufread(reader).records().map(|r| {
                let rec = r.context("malformed FASTA record")?;
                Ok(SeqRecord {
                    id: rec.id().to_string(),
                    seq: String::from_utf8_lossy(rec.seq()).to_ascii_uppercase(),
                    qual: None,
                })
            });
            Ok(Box::new(records))
        }
    }
}

/// Read an entire reference FASTA into (seqid, sequence) pairs.
pub fn read_reference<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>> {
    let path = path.as_ref();
    let reader = open_text(path)?;
    let mut sequences = Vec::new();
    for record in fasta::Reader::from_bufread(reader).records() {
        let rec = record
            .with_context(|| format!("malformed reference record in {}", path.display()))?;
        sequences.push((
            rec.id().to_string(),
            String::from_utf8_lossy(rec.seq()).to_ascii_uppercase(),
        ));
    }
    if sequences.is_empty() {
        return Err(anyhow!("reference {} contains no sequences", path.display()));
    }
    Ok(sequences)
}
