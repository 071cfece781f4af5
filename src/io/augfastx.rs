//! Augmented FASTX codec.
//!
//! A standard FASTQ/FASTA record followed by zero or more annotation
//! lines prefixed `# ` carrying `offset<TAB>kmer<TAB>case[,ctrl...]`, an
//! optional `#mateseq=` line per mate, and a terminating `#` on its own
//! line. Partitioned streams add a `#part=<label>` header before each
//! partition block.

use std::io::{BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};

use crate::core::read::{AugmentedRead, KmerAnnotation};

/// Streaming reader for augmented FASTX records.
pub struct AugmentedReader<R: BufRead> {
    input: R,
    /// Lookahead line pushed back by the record parser.
    pending: Option<String>,
    line_no: usize,
    /// Label from the most recently seen `#part=` header.
    current_partition: Option<String>,
}

impl<R: BufRead> AugmentedReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            pending: None,
            line_no: 0,
            current_partition: None,
        }
    }

    /// Partition label in effect for the record last returned.
    pub fn partition_label(&self) -> Option<&str> {
        self.current_partition.as_deref()
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        let n = self.input.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    fn push_back(&mut self, line: String) {
        self.pending = Some(line);
    }

    fn parse_annotation(&self, line: &str) -> Result<KmerAnnotation> {
        let body = line
            .strip_prefix("# ")
            .ok_or_else(|| anyhow!("line {}: malformed annotation line", self.line_no))?;
        let mut fields = body.split('\t');
        let offset: usize = fields
            .next()
            .ok_or_else(|| anyhow!("line {}: annotation missing offset", self.line_no))?
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad annotation offset", self.line_no))?;
        let kmer = fields
            .next()
            .ok_or_else(|| anyhow!("line {}: annotation missing k-mer", self.line_no))?
            .to_ascii_uppercase();
        let abund_field = fields
            .next()
            .ok_or_else(|| anyhow!("line {}: annotation missing abundances", self.line_no))?;
        let abundances = abund_field
            .split(',')
            .map(|a| {
                a.trim()
                    .parse::<u16>()
                    .with_context(|| format!("line {}: bad abundance value", self.line_no))
            })
            .collect::<Result<Vec<u16>>>()?;
        Ok(KmerAnnotation { offset, kmer, abundances })
    }

    fn read_record(&mut self) -> Result<Option<AugmentedRead>> {
        // Skip blanks and pick up partition headers
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => {
                    if let Some(label) = line.strip_prefix("#part=") {
                        self.current_partition = Some(label.trim().to_string());
                        continue;
                    }
                    break line;
                }
            }
        };

        let mut record = if let Some(id) = header.strip_prefix('@') {
            let seq = self
                .next_line()?
                .ok_or_else(|| anyhow!("line {}: truncated FASTQ record", self.line_no))?;
            let plus = self
                .next_line()?
                .ok_or_else(|| anyhow!("line {}: truncated FASTQ record", self.line_no))?;
            if !plus.starts_with('+') {
                bail!("line {}: expected '+' separator, found {plus:?}", self.line_no);
            }
            let qual = self
                .next_line()?
                .ok_or_else(|| anyhow!("line {}: truncated FASTQ record", self.line_no))?;
            AugmentedRead::new(id.to_string(), seq.to_ascii_uppercase()).with_quals(qual)
        } else if let Some(id) = header.strip_prefix('>') {
            let seq = self
                .next_line()?
                .ok_or_else(|| anyhow!("line {}: truncated FASTA record", self.line_no))?;
            AugmentedRead::new(id.to_string(), seq.to_ascii_uppercase())
        } else {
            bail!(
                "line {}: expected '@' or '>' record header, found {header:?}",
                self.line_no
            );
        };

        // Annotation block, terminated by a bare '#'
        loop {
            let Some(line) = self.next_line()? else {
                // Annotations are optional; EOF ends the record
                break;
            };
            if line == "#" {
                break;
            }
            if let Some(mate) = strip_prefix_ci(&line, "#mateseq=") {
                record.mate_seqs.push(mate.to_ascii_uppercase());
            } else if line.starts_with("# ") {
                record.annotations.push(self.parse_annotation(&line)?);
            } else {
                // Start of the next record
                self.push_back(line);
                break;
            }
        }

        Ok(Some(record))
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

impl<R: BufRead> Iterator for AugmentedReader<R> {
    type Item = Result<AugmentedRead>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Writer for augmented FASTX records.
pub struct AugmentedWriter<W: Write> {
    output: W,
}

impl<W: Write> AugmentedWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Emit a `#part=` header opening a partition block.
    pub fn start_partition(&mut self, label: &str) -> Result<()> {
        writeln!(self.output, "#part={label}")?;
        Ok(())
    }

    pub fn write_record(&mut self, read: &AugmentedRead) -> Result<()> {
        match &read.quals {
            Some(quals) => {
                writeln!(self.output, "@{}", read.id)?;
                writeln!(self.output, "{}", read.sequence)?;
                writeln!(self.output, "+")?;
                writeln!(self.output, "{quals}")?;
            }
            None => {
                writeln!(self.output, ">{}", read.id)?;
                writeln!(self.output, "{}", read.sequence)?;
            }
        }
        for ann in &read.annotations {
            let abunds = ann
                .abundances
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(self.output, "# {}\t{}\t{}", ann.offset, ann.kmer, abunds)?;
        }
        for mate in &read.mate_seqs {
            writeln!(self.output, "#mateseq={mate}")?;
        }
        writeln!(self.output, "#")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

/// Read every augmented record from a reader.
pub fn read_augmented<R: BufRead>(input: R) -> Result<Vec<AugmentedRead>> {
    AugmentedReader::new(input).collect()
}

/// Write a batch of augmented records to a writer.
pub fn write_augmented<W: Write>(output: W, reads: &[AugmentedRead]) -> Result<()> {
    let mut writer = AugmentedWriter::new(output);
    for read in reads {
        writer.write_record(read)?;
    }
    writer.flush()
}

/// Read a partitioned augmented stream into labeled groups, preserving
/// block order.
pub fn read_partitioned<R: BufRead>(input: R) -> Result<Vec<(String, Vec<AugmentedRead>)>> {
    let mut reader = AugmentedReader::new(input);
    let mut partitions: Vec<(String, Vec<AugmentedRead>)> = Vec::new();
    while let Some(record) = reader.next() {
        let record = record?;
        let label = reader
            .partition_label()
            .ok_or_else(|| anyhow!("record {:?} outside any #part= block", record.id))?
            .to_string();
        match partitions.last_mut() {
            Some((last, members)) if *last == label => members.push(record),
            _ => partitions.push((label, vec![record])),
        }
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_read() -> AugmentedRead {
        let mut read = AugmentedRead::new("read1", "ACGTACGTAC").with_quals("IIIIIIIIII");
        read.annotations.push(KmerAnnotation::new(2, "GTACG", vec![9, 0]));
        read.annotations.push(KmerAnnotation::new(4, "ACGTA", vec![8, 1]));
        read.mate_seqs.push("TTTTACGT".to_string());
        read
    }

    #[test]
    fn test_roundtrip() {
        let reads = vec![sample_read(), AugmentedRead::new("read2", "GGGGCCCC")];
        let mut buf = Vec::new();
        write_augmented(&mut buf, &reads).unwrap();
        let parsed = read_augmented(buf.as_slice()).unwrap();
        assert_eq!(parsed, reads);
    }

    #[test]
    fn test_annotation_line_format() {
        let mut buf = Vec::new();
        write_augmented(&mut buf, &[sample_read()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("# 2\tGTACG\t9,0"));
        assert!(text.contains("#mateseq=TTTTACGT"));
        assert!(text.trim_end().ends_with('#'));
    }

    #[test]
    fn test_record_without_annotations_has_sentinel_only() {
        let mut buf = Vec::new();
        write_augmented(&mut buf, &[AugmentedRead::new("r", "ACGT")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, ">r\nACGT\n#\n");
    }

    #[test]
    fn test_case_insensitive_parse() {
        let text = "@r1\nacgtacgt\n+\nIIIIIIII\n# 0\tacgta\t5,0\n#MATESEQ=ttga\n#\n";
        let parsed = read_augmented(text.as_bytes()).unwrap();
        assert_eq!(parsed[0].sequence, "ACGTACGT");
        assert_eq!(parsed[0].annotations[0].kmer, "ACGTA");
        assert_eq!(parsed[0].mate_seqs[0], "TTGA");
    }

    #[test]
    fn test_partitioned_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut writer = AugmentedWriter::new(&mut buf);
            writer.start_partition("1").unwrap();
            writer.write_record(&sample_read()).unwrap();
            writer.start_partition("2").unwrap();
            writer
                .write_record(&AugmentedRead::new("read9", "CCCCGGGG"))
                .unwrap();
            writer.flush().unwrap();
        }
        let partitions = read_partitioned(buf.as_slice()).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].0, "1");
        assert_eq!(partitions[0].1[0].id, "read1");
        assert_eq!(partitions[1].0, "2");
    }

    #[test]
    fn test_malformed_record_is_error() {
        let text = "@r1\nACGT\nIIII\n";
        assert!(read_augmented(text.as_bytes()).is_err());
    }
}
