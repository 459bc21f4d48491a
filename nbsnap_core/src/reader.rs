use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::OpenOptions;
use crate::error::{Result, SnapError};
use crate::field::{Field, FieldMask};
use crate::format::BODY_WORD_SIZE;
use crate::header::FrameHeader;
use crate::stream::{Probe, Tag, TagSource};
use crate::word_io::WordIo;

/// Byte length of the body a header with `mask` and `nbody` must carry, or
/// `None` when it does not fit in 64 bits.
pub(crate) fn expected_body_len(mask: FieldMask, nbody: u64) -> Option<u64> {
    mask.fields().try_fold(0u64, |acc, f| {
        nbody
            .checked_mul((f.width() * f.word_size()) as u64)
            .and_then(|len| acc.checked_add(len))
    })
}

/// Sequential reader for NBSNAP1 files.
///
/// # Frame sequence
/// 1. Read the 56-byte header through the header descriptor (magic and
///    version check, per-word byte-order fix).
/// 2. Read the body (`body_len` bytes) and, if asked, compare its xxh3-64
///    with the header checksum. The buffer grows with the bytes actually
///    delivered, so a header declaring more than the stream holds ends in
///    [`SnapError::Truncated`] rather than a huge allocation.
/// 3. Serve [`TagSource::read_real`] / [`TagSource::read_ints`] from the
///    buffered body, decoding each array through [`WordIo`].
///
/// The first header may be read ahead by [`TagSource::probe`]; it is kept and
/// replayed by the next [`TagSource::next_set`].
pub struct SnapFileReader<R> {
    io: Option<WordIo<R>>,
    verify: bool,
    pending: Option<FrameHeader>,
    current: Option<FrameHeader>,
    body: Vec<u8>,
    sets_read: u64,
}

impl SnapFileReader<BufReader<File>> {
    /// Open a snapshot file on disk.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(
            "opened snapshot {} (byte order {:?})",
            path.display(),
            options.byte_order
        );
        Ok(Self::new(BufReader::new(file), options))
    }
}

impl<R: Read> SnapFileReader<R> {
    pub fn new(inner: R, options: &OpenOptions) -> Self {
        Self {
            io: Some(WordIo::new(inner, options.byte_order.needs_swap())),
            verify: options.verify_checksum,
            pending: None,
            current: None,
            body: Vec::new(),
            sets_read: 0,
        }
    }

    /// Header of the set last returned by `next_set`.
    pub fn header(&self) -> Option<&FrameHeader> {
        self.current.as_ref()
    }

    pub fn sets_read(&self) -> u64 {
        self.sets_read
    }

    fn io(&mut self) -> Result<&mut WordIo<R>> {
        self.io
            .as_mut()
            .ok_or_else(|| SnapError::Format("snapshot stream already closed".into()))
    }

    fn current(&self) -> Result<&FrameHeader> {
        self.current
            .as_ref()
            .ok_or_else(|| SnapError::Format("no current snapshot set; call next_set first".into()))
    }

    /// Locate `field` in the buffered body: byte offset and length.
    fn locate(&self, field: Field, dst_len: usize) -> Result<(usize, usize)> {
        let header = self.current()?;
        if !header.mask.has_field(field) {
            return Err(SnapError::Format(format!("set has no {field} array")));
        }
        let nbody = header.nbody as usize;
        // Bounded by the validated body length.
        let expected = nbody * field.width();
        if dst_len != expected {
            return Err(SnapError::Format(format!(
                "{field} buffer holds {dst_len} values, set needs {expected}"
            )));
        }
        let offset: usize = header
            .mask
            .fields()
            .take_while(|f| *f != field)
            .map(|f| nbody * f.width() * f.word_size())
            .sum();
        Ok((offset, expected * field.word_size()))
    }

    fn decode(&self, field: Field, dst: &mut [u8]) -> Result<()> {
        let (offset, len) = self.locate(field, dst.len() / BODY_WORD_SIZE)?;
        let swap = self.io.as_ref().is_some_and(WordIo::swapping);
        let mut io = WordIo::new(&self.body[offset..offset + len], swap);
        io.read_words(dst, BODY_WORD_SIZE)?;
        Ok(())
    }
}

impl<R: Read> TagSource for SnapFileReader<R> {
    fn probe(&mut self) -> Result<Probe> {
        let header = match (self.pending, self.current) {
            (Some(h), _) | (None, Some(h)) => h,
            (None, None) => {
                let header = FrameHeader::read_from(self.io()?)?.ok_or_else(|| {
                    SnapError::Format("stream is empty, no snapshot set found".into())
                })?;
                self.pending = Some(header);
                header
            }
        };
        Ok(Probe {
            nbody: header.nbody as usize,
            time: header.mask.has(FieldMask::TIME).then_some(header.time),
        })
    }

    fn next_set(&mut self) -> Result<bool> {
        let header = match self.pending.take() {
            Some(h) => h,
            None => match FrameHeader::read_from(self.io()?)? {
                Some(h) => h,
                None => {
                    self.current = None;
                    return Ok(false);
                }
            },
        };

        let expected = expected_body_len(header.mask, header.nbody).ok_or_else(|| {
            SnapError::Format(format!(
                "set {}: {} particles with mask [{}] overflow the body size",
                self.sets_read, header.nbody, header.mask
            ))
        })?;
        if header.body_len != expected {
            return Err(SnapError::Format(format!(
                "set {} declares a {}-byte body but mask [{}] with {} particles needs {}",
                self.sets_read, header.body_len, header.mask, header.nbody, expected
            )));
        }
        usize::try_from(header.body_len)
            .map_err(|_| SnapError::Format(format!("body of {} bytes", header.body_len)))?;

        let mut body = std::mem::take(&mut self.body);
        body.clear();
        let got = self
            .io()?
            .get_mut()
            .by_ref()
            .take(header.body_len)
            .read_to_end(&mut body)
            .map_err(|e| SnapError::from_transfer(e, "reading snapshot body"))?;
        self.body = body;
        if (got as u64) < header.body_len {
            return Err(SnapError::Truncated(format!(
                "set {} body: {} of {} bytes present",
                self.sets_read, got, header.body_len
            )));
        }

        if self.verify {
            let actual = xxh3_64(&self.body);
            if actual != header.checksum {
                return Err(SnapError::Checksum {
                    expected: header.checksum,
                    actual,
                });
            }
        }

        debug!(
            "set {}: nbody={} mask=[{}] time={}",
            self.sets_read, header.nbody, header.mask, header.time
        );
        self.current = Some(header);
        self.sets_read += 1;
        Ok(true)
    }

    fn has_tag(&self, tag: Tag) -> bool {
        let Some(header) = &self.current else {
            return false;
        };
        match tag {
            Tag::Time => header.mask.has(FieldMask::TIME),
            Tag::Nobj => header.mask.has(FieldMask::NOBJ),
            Tag::Array(field) => header.mask.has_field(field),
        }
    }

    fn read_time(&mut self) -> Result<f64> {
        let header = self.current()?;
        if !header.mask.has(FieldMask::TIME) {
            return Err(SnapError::Format("set has no time tag".into()));
        }
        Ok(header.time)
    }

    fn read_nbody(&mut self) -> Result<usize> {
        let header = self.current()?;
        if !header.mask.has(FieldMask::NOBJ) {
            return Err(SnapError::Format("set has no particle count tag".into()));
        }
        usize::try_from(header.nbody)
            .map_err(|_| SnapError::Format(format!("{} particles", header.nbody)))
    }

    fn read_real(&mut self, field: Field, dst: &mut [f32]) -> Result<()> {
        self.decode(field, bytemuck::cast_slice_mut(dst))
    }

    fn read_ints(&mut self, field: Field, dst: &mut [i32]) -> Result<()> {
        self.decode(field, bytemuck::cast_slice_mut(dst))
    }

    fn close(&mut self) -> Result<()> {
        if self.io.take().is_some() {
            debug!("closed snapshot stream after {} sets", self.sets_read);
        }
        self.current = None;
        self.pending = None;
        self.body = Vec::new();
        Ok(())
    }
}
