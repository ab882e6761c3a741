//! Gzip-compressed per-bin files of coded variant records.
//!
//! Big-endian layout: sample name (`u16` byte length + UTF-8), chromosome id
//! (`u16`), bin start (`i32`), bin end (`i32`), then one `i32` per record and
//! a final [`SENTINEL`].

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::genomics::codec::{self, CodecError, CodedVariant, SENTINEL};

/// File extension of encoded discovery bins.
pub const BIN_FILE_EXTENSION: &str = "ing.gz";

/// Errors reading or writing encoded bin files.
#[derive(Debug, Error)]
pub enum BinFileError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Record failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Header is malformed.
    #[error("invalid bin header: {0}")]
    InvalidHeader(String),
    /// Stream ended before the terminating sentinel.
    #[error("record stream ended without sentinel after {0} records")]
    MissingSentinel(u64),
}

/// Header written at the start of every bin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinHeader {
    /// Sample the records belong to.
    pub sample: String,
    /// Numeric chromosome id.
    pub chrom: u16,
    /// Inclusive bin start.
    pub start: u32,
    /// Exclusive bin end.
    pub end: u32,
}

impl BinHeader {
    /// Canonical file name `<chrom>_<start>_<end>.ing.gz`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.{}",
            self.chrom, self.start, self.end, BIN_FILE_EXTENSION
        )
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<(), BinFileError> {
        let name = self.sample.as_bytes();
        let len = u16::try_from(name.len()).map_err(|_| {
            BinFileError::InvalidHeader(format!("sample name of {} bytes", name.len()))
        })?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(name)?;
        out.write_all(&self.chrom.to_be_bytes())?;
        out.write_all(&to_i32(self.start)?.to_be_bytes())?;
        out.write_all(&to_i32(self.end)?.to_be_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(input: &mut R) -> Result<Self, BinFileError> {
        let mut u16_buf = [0u8; 2];
        input.read_exact(&mut u16_buf)?;
        let mut name = vec![0u8; u16::from_be_bytes(u16_buf) as usize];
        input.read_exact(&mut name)?;
        let sample = String::from_utf8(name)
            .map_err(|_| BinFileError::InvalidHeader("sample name is not UTF-8".to_string()))?;
        input.read_exact(&mut u16_buf)?;
        let chrom = u16::from_be_bytes(u16_buf);
        let start = read_i32(input)?;
        let end = read_i32(input)?;
        if start < 0 || end <= start {
            return Err(BinFileError::InvalidHeader(format!(
                "bin bounds [{start}, {end})"
            )));
        }
        Ok(Self {
            sample,
            chrom,
            start: start as u32,
            end: end as u32,
        })
    }
}

fn to_i32(value: u32) -> Result<i32, BinFileError> {
    i32::try_from(value)
        .map_err(|_| BinFileError::InvalidHeader(format!("bound {value} exceeds i32")))
}

fn read_i32<R: Read>(input: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Writer for one bin's record stream.
#[derive(Debug)]
pub struct EncodedBinWriter<W: Write> {
    encoder: GzEncoder<W>,
    records: u64,
}

impl EncodedBinWriter<BufWriter<File>> {
    /// Create `path` and write `header`.
    pub fn create<P: AsRef<Path>>(path: P, header: &BinHeader) -> Result<Self, BinFileError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> EncodedBinWriter<W> {
    /// Start a bin stream on `inner`.
    pub fn new(inner: W, header: &BinHeader) -> Result<Self, BinFileError> {
        let mut encoder = GzEncoder::new(inner, Compression::default());
        header.write_to(&mut encoder)?;
        Ok(Self {
            encoder,
            records: 0,
        })
    }

    /// Append one coded record.
    pub fn write_record(&mut self, record: i32) -> Result<(), BinFileError> {
        debug_assert_ne!(record, SENTINEL);
        self.encoder.write_all(&record.to_be_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Write the sentinel, finish the gzip stream and hand back the inner writer.
    pub fn finish(mut self) -> Result<W, BinFileError> {
        self.encoder.write_all(&SENTINEL.to_be_bytes())?;
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        Ok(inner)
    }
}

/// Reader over one bin's record stream; iteration stops at the sentinel.
#[derive(Debug)]
pub struct EncodedBinReader<R: Read> {
    decoder: MultiGzDecoder<R>,
    header: BinHeader,
    records: u64,
    done: bool,
}

impl EncodedBinReader<BufReader<File>> {
    /// Open an encoded bin file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BinFileError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> EncodedBinReader<R> {
    /// Read the header from `inner`.
    pub fn new(inner: R) -> Result<Self, BinFileError> {
        let mut decoder = MultiGzDecoder::new(inner);
        let header = BinHeader::read_from(&mut decoder)?;
        Ok(Self {
            decoder,
            header,
            records: 0,
            done: false,
        })
    }

    /// Header of this bin.
    pub fn header(&self) -> &BinHeader {
        &self.header
    }

    fn next_record(&mut self) -> Result<Option<CodedVariant>, BinFileError> {
        let raw = match read_i32(&mut self.decoder) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(BinFileError::MissingSentinel(self.records));
            }
            Err(err) => return Err(err.into()),
        };
        if raw == SENTINEL {
            return Ok(None);
        }
        self.records += 1;
        Ok(Some(codec::decode(raw)?))
    }
}

impl<R: Read> Iterator for EncodedBinReader<R> {
    type Item = Result<CodedVariant, BinFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::AlleleClass;

    fn header() -> BinHeader {
        BinHeader {
            sample: "B73".to_string(),
            chrom: 10,
            start: 1_000_001,
            end: 2_000_001,
        }
    }

    #[test]
    fn stream_round_trips_through_gzip() {
        let mut writer = EncodedBinWriter::new(Vec::new(), &header()).unwrap();
        writer
            .write_record(codec::encode(5, AlleleClass::G, 0).unwrap())
            .unwrap();
        writer
            .write_record(codec::encode(9, AlleleClass::Deletion, 3).unwrap())
            .unwrap();
        assert_eq!(writer.records(), 2);
        let bytes = writer.finish().unwrap();

        let mut reader = EncodedBinReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.header(), &header());
        let records: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position(1_000_001), 1_000_010);
        assert_eq!(records[1].allele, AlleleClass::Deletion);
        assert!(reader.next().is_none());
    }

    #[test]
    fn truncated_stream_reports_missing_sentinel() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        header().write_to(&mut encoder).unwrap();
        encoder
            .write_all(&codec::encode(1, AlleleClass::A, 0).unwrap().to_be_bytes())
            .unwrap();
        let bytes = encoder.finish().unwrap();

        let results: Vec<_> = EncodedBinReader::new(bytes.as_slice()).unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(BinFileError::MissingSentinel(1))));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn file_name_follows_bin_bounds() {
        assert_eq!(header().file_name(), "10_1000001_2000001.ing.gz");
    }
}
