use std::io::{Read, Write};

use crate::error::{Result, SnapError};
use crate::field::FieldMask;
use crate::format::{FORMAT_VERSION, HEADER_SIZE, MAGIC};
use crate::word_io::WordIo;

/// One run of same-sized words inside the header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordRun {
    pub size: usize,
    pub count: usize,
}

impl WordRun {
    pub const fn new(size: usize, count: usize) -> Self {
        Self { size, count }
    }

    pub const fn byte_len(self) -> usize {
        self.size * self.count
    }
}

/// Ordered word layout of a fixed-size header record.
///
/// Drives [`WordIo`] across the record so that every member gets its own
/// byte-order fix. Changing the order is a format break and needs a new
/// [`FORMAT_VERSION`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderDescriptor {
    runs: &'static [WordRun],
}

/// Layout of the NBSNAP1 frame header.
const FRAME_RUNS: &[WordRun] = &[
    WordRun::new(1, 8), // magic
    WordRun::new(4, 1), // version
    WordRun::new(4, 1), // mask
    WordRun::new(8, 1), // nbody
    WordRun::new(8, 1), // time
    WordRun::new(8, 1), // body_len
    WordRun::new(8, 1), // checksum
    WordRun::new(1, 8), // reserved
];

impl HeaderDescriptor {
    /// Build a descriptor, checking it covers exactly `record_len` bytes.
    pub fn new(runs: &'static [WordRun], record_len: usize) -> Result<Self> {
        let total: usize = runs.iter().map(|r| r.byte_len()).sum();
        if total != record_len || runs.iter().any(|r| r.size == 0) {
            return Err(SnapError::Format(format!(
                "header descriptor covers {total} bytes but the record is {record_len}"
            )));
        }
        Ok(Self { runs })
    }

    /// Descriptor of the NBSNAP1 frame header.
    pub const fn frame() -> Self {
        Self { runs: FRAME_RUNS }
    }

    pub fn runs(&self) -> &[WordRun] {
        self.runs
    }

    pub fn byte_len(&self) -> usize {
        self.runs.iter().map(|r| r.byte_len()).sum()
    }

    /// Fill `record` from the stream, run by run.
    pub fn read<R: Read>(&self, io: &mut WordIo<R>, record: &mut [u8]) -> Result<()> {
        if self.read_or_eof(io, record)? {
            Ok(())
        } else {
            Err(SnapError::Truncated("stream ended before the header record".into()))
        }
    }

    /// Like [`read`](Self::read), but returns `Ok(false)` when the stream is
    /// already exhausted at the first byte of the record. Running out
    /// anywhere later is still a truncation.
    pub fn read_or_eof<R: Read>(&self, io: &mut WordIo<R>, record: &mut [u8]) -> Result<bool> {
        self.check_len(record)?;
        let mut cursor = 0;
        for (i, run) in self.runs.iter().enumerate() {
            let end = cursor + run.byte_len();
            if i == 0 {
                if io.try_read_words(&mut record[cursor..end], run.size)?.is_none() {
                    return Ok(false);
                }
            } else {
                io.read_words(&mut record[cursor..end], run.size)?;
            }
            cursor = end;
        }
        Ok(true)
    }

    /// Write `record` to the stream, run by run. `record` is unchanged on return.
    pub fn write<W: Write>(&self, io: &mut WordIo<W>, record: &mut [u8]) -> Result<()> {
        self.check_len(record)?;
        let mut cursor = 0;
        for run in self.runs {
            let end = cursor + run.byte_len();
            io.write_words(&mut record[cursor..end], run.size)?;
            cursor = end;
        }
        Ok(())
    }

    fn check_len(&self, record: &[u8]) -> Result<()> {
        if record.len() != self.byte_len() {
            return Err(SnapError::Format(format!(
                "header record is {} bytes, descriptor expects {}",
                record.len(),
                self.byte_len()
            )));
        }
        Ok(())
    }
}

/// Decoded NBSNAP1 frame header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub mask: FieldMask,
    pub nbody: u64,
    /// Meaningful only when `mask` has [`FieldMask::TIME`].
    pub time: f64,
    /// Bytes of per-field arrays following the header.
    pub body_len: u64,
    /// xxh3-64 of the on-disk body bytes.
    pub checksum: u64,
}

impl FrameHeader {
    /// Serialize to host-order bytes. Byte-order conversion is the
    /// descriptor's job.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.mask.bits().to_ne_bytes());
        buf[16..24].copy_from_slice(&self.nbody.to_ne_bytes());
        buf[24..32].copy_from_slice(&self.time.to_ne_bytes());
        buf[32..40].copy_from_slice(&self.body_len.to_ne_bytes());
        buf[40..48].copy_from_slice(&self.checksum.to_ne_bytes());
        // reserved[8] stays zero
        buf
    }

    /// Deserialize host-order bytes, checking magic and version.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &buf[0..8] != MAGIC {
            return Err(SnapError::Format("invalid NBSNAP magic bytes".into()));
        }
        let version = u32::from_ne_bytes(word(buf, 8));
        if version != FORMAT_VERSION {
            let hint = if version.swap_bytes() == FORMAT_VERSION {
                " (byte order looks reversed, try the other byte order)"
            } else {
                ""
            };
            return Err(SnapError::Format(format!(
                "unsupported NBSNAP version {version}{hint}"
            )));
        }
        Ok(Self {
            mask: FieldMask::from_bits_truncate(u32::from_ne_bytes(word(buf, 12))),
            nbody: u64::from_ne_bytes(word(buf, 16)),
            time: f64::from_ne_bytes(word(buf, 24)),
            body_len: u64::from_ne_bytes(word(buf, 32)),
            checksum: u64::from_ne_bytes(word(buf, 40)),
        })
    }

    /// Read and decode one header. `Ok(None)` when the stream ends cleanly
    /// before the first byte of the header.
    pub fn read_from<R: Read>(io: &mut WordIo<R>) -> Result<Option<Self>> {
        let mut record = [0u8; HEADER_SIZE];
        if !HeaderDescriptor::frame().read_or_eof(io, &mut record)? {
            return Ok(None);
        }
        Self::from_bytes(&record).map(Some)
    }

    pub fn write_to<W: Write>(&self, io: &mut WordIo<W>) -> Result<()> {
        let mut record = self.to_bytes();
        HeaderDescriptor::frame().write(io, &mut record)
    }
}

fn word<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> FrameHeader {
        FrameHeader {
            mask: FieldMask::from_bits(FieldMask::TIME | FieldMask::NOBJ | FieldMask::POS),
            nbody: 123_456,
            time: 2.75,
            body_len: 123_456 * 12,
            checksum: 0xDEAD_BEEF_0BAD_F00D,
        }
    }

    #[test]
    fn test_descriptor_covers_header() {
        assert_eq!(HeaderDescriptor::frame().byte_len(), HEADER_SIZE);
        assert!(HeaderDescriptor::new(FRAME_RUNS, HEADER_SIZE).is_ok());
        assert!(HeaderDescriptor::new(FRAME_RUNS, HEADER_SIZE + 4).is_err());
    }

    #[test]
    fn test_header_roundtrip_both_orders() {
        for swap in [false, true] {
            let header = sample();
            let mut io = WordIo::new(Vec::new(), swap);
            header.write_to(&mut io).unwrap();
            let bytes = io.into_inner();
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(&bytes[..8], MAGIC);

            let mut io = WordIo::new(Cursor::new(bytes), swap);
            let decoded = FrameHeader::read_from(&mut io).unwrap().unwrap();
            assert_eq!(decoded, header, "swap={swap}");
        }
    }

    #[test]
    fn test_foreign_header_is_byte_reversed_per_word() {
        let header = sample();
        let mut native = WordIo::new(Vec::new(), false);
        header.write_to(&mut native).unwrap();
        let mut foreign = WordIo::new(Vec::new(), true);
        header.write_to(&mut foreign).unwrap();
        let (native, foreign) = (native.into_inner(), foreign.into_inner());

        assert_eq!(native[..8], foreign[..8]);
        let mut nbody = [0u8; 8];
        nbody.copy_from_slice(&foreign[16..24]);
        nbody.reverse();
        assert_eq!(nbody, native[16..24]);
    }

    #[test]
    fn test_wrong_order_gets_hint() {
        let mut io = WordIo::new(Vec::new(), true);
        sample().write_to(&mut io).unwrap();
        let mut io = WordIo::new(Cursor::new(io.into_inner()), false);
        let err = FrameHeader::read_from(&mut io).unwrap_err();
        assert!(err.to_string().contains("byte order"), "got: {err}");
    }

    #[test]
    fn test_eof_at_boundary_vs_inside_header() {
        let mut io = WordIo::new(Cursor::new(Vec::new()), false);
        assert!(FrameHeader::read_from(&mut io).unwrap().is_none());

        let mut io = WordIo::new(Vec::new(), false);
        sample().write_to(&mut io).unwrap();
        let mut bytes = io.into_inner();
        bytes.truncate(HEADER_SIZE - 3);
        let mut io = WordIo::new(Cursor::new(bytes), false);
        assert!(matches!(FrameHeader::read_from(&mut io), Err(SnapError::Truncated(_))));
    }

    #[test]
    fn test_bad_magic() {
        let mut record = sample().to_bytes();
        record[0] = b'X';
        assert!(matches!(FrameHeader::from_bytes(&record), Err(SnapError::Format(_))));
    }
}
