//! Binary sketch file codec.
//!
//! Layout: magic `KVSK`, u8 version, u8 kind, u8 K, u8 H, u64 W (LE),
//! u32 count ceiling (LE), then the raw cells table by table,
//! little-endian. Serialize → load → serialize is byte-identical.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::countmin::{Cells, KmerSketch, SketchKind};

pub const SKETCH_MAGIC: &[u8; 4] = b"KVSK";
pub const SKETCH_VERSION: u8 = 1;

impl KmerSketch {
    /// Write the sketch to any writer in the binary format.
    pub fn serialize<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(SKETCH_MAGIC)?;
        writer.write_all(&[SKETCH_VERSION, self.kind.code(), self.k as u8, self.num_tables as u8])?;
        writer.write_all(&self.width.to_le_bytes())?;
        writer.write_all(&self.ceiling.to_le_bytes())?;
        match &self.cells {
            Cells::Counts(counts) => {
                for &c in counts {
                    writer.write_all(&c.to_le_bytes())?;
                }
            }
            Cells::Bits(words) => {
                for &w in words {
                    writer.write_all(&w.to_le_bytes())?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a sketch from a reader. Unreadable magic or an unsupported
    /// version is fatal.
    pub fn deserialize<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .context("sketch file truncated before magic")?;
        if &magic != SKETCH_MAGIC {
            bail!("bad sketch magic {:?}: not a sketch file", magic);
        }
        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let [version, kind_code, k, num_tables] = header;
        if version != SKETCH_VERSION {
            bail!("unsupported sketch version {version} (expected {SKETCH_VERSION})");
        }
        let kind = SketchKind::from_code(kind_code)?;
        if k == 0 || num_tables == 0 {
            bail!("corrupt sketch header: k={k} tables={num_tables}");
        }

        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf8)?;
        let width = u64::from_le_bytes(buf8);
        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let ceiling = u32::from_le_bytes(buf4);

        let cells = match kind {
            SketchKind::Counter => {
                let n = (width * num_tables as u64) as usize;
                let mut raw = vec![0u8; n * 2];
                reader
                    .read_exact(&mut raw)
                    .context("sketch file truncated in cell data")?;
                let counts = raw
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                Cells::Counts(counts)
            }
            SketchKind::Presence => {
                let words_per_table = width.div_ceil(64);
                let n = (words_per_table * num_tables as u64) as usize;
                let mut raw = vec![0u8; n * 8];
                reader
                    .read_exact(&mut raw)
                    .context("sketch file truncated in cell data")?;
                let words = raw
                    .chunks_exact(8)
                    .map(|c| {
                        let mut b = [0u8; 8];
                        b.copy_from_slice(c);
                        u64::from_le_bytes(b)
                    })
                    .collect();
                Cells::Bits(words)
            }
        };

        Ok(Self {
            k: k as usize,
            kind,
            num_tables: num_tables as usize,
            width,
            ceiling,
            cells,
            // Add statistics are not part of the on-disk format.
            items_added: 0,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create sketch file: {}", path.display()))?;
        self.serialize(BufWriter::new(file))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open sketch file: {}", path.display()))?;
        Self::deserialize(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kmer::canonical;

    #[test]
    fn test_roundtrip_byte_identical() {
        let mut sketch = KmerSketch::counter(5, 1 << 12, 3, 255).unwrap();
        for kmer in [b"ACGTA", b"GGGTC", b"TTACG"] {
            sketch.add(&canonical(kmer));
            sketch.add(&canonical(kmer));
        }

        let mut first = Vec::new();
        sketch.serialize(&mut first).unwrap();
        let restored = KmerSketch::deserialize(first.as_slice()).unwrap();
        let mut second = Vec::new();
        restored.serialize(&mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(restored.count(&canonical(b"ACGTA")), 2);
        assert_eq!(restored.k(), 5);
    }

    #[test]
    fn test_presence_roundtrip() {
        let mut sketch = KmerSketch::presence(7, 1 << 10, 2).unwrap();
        sketch.add(&canonical(b"ACGTACG"));
        let mut buf = Vec::new();
        sketch.serialize(&mut buf).unwrap();
        let restored = KmerSketch::deserialize(buf.as_slice()).unwrap();
        assert!(restored.contains(&canonical(b"ACGTACG")));
        assert!(!restored.contains(&canonical(b"TTTTTTT")));
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let buf = b"NOPE\x01\x00\x05\x03".to_vec();
        assert!(KmerSketch::deserialize(buf.as_slice()).is_err());
    }

    #[test]
    fn test_bad_version_is_fatal() {
        let mut sketch = KmerSketch::counter(5, 1 << 10, 2, 255).unwrap();
        sketch.add(&canonical(b"ACGTA"));
        let mut buf = Vec::new();
        sketch.serialize(&mut buf).unwrap();
        buf[4] = 99;
        assert!(KmerSketch::deserialize(buf.as_slice()).is_err());
    }
}
