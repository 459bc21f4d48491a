use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::CreateOptions;
use crate::error::{Result, SnapError};
use crate::field::Field;
use crate::format::BODY_WORD_SIZE;
use crate::header::FrameHeader;
use crate::reader::expected_body_len;
use crate::stream::{FrameRecord, TagSink};
use crate::word_io::WordIo;

/// Streaming writer for NBSNAP1 files.
///
/// # Set layout written
/// ```text
/// [HEADER: 56 bytes, per-word byte order from CreateOptions]
/// [pos] [vel] [mass] [pot] [acc] [aux] [keys] [rho] [phase]   ← present fields only
/// ```
/// The body is assembled in memory first so its checksum can go into the
/// header, then header and body are written back to back. Sets are appended;
/// there is no index, readers walk the file sequentially.
pub struct SnapFileWriter<W: Write> {
    io: Option<WordIo<W>>,
    body: Vec<u8>,
    sets_written: u64,
}

impl SnapFileWriter<BufWriter<File>> {
    /// Create a snapshot file at `path`, overwriting any existing file.
    pub fn create(path: impl AsRef<Path>, options: &CreateOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        info!(
            "creating snapshot {} (byte order {:?})",
            path.display(),
            options.byte_order
        );
        Ok(Self::new(BufWriter::new(file), options))
    }
}

impl<W: Write> SnapFileWriter<W> {
    pub fn new(inner: W, options: &CreateOptions) -> Self {
        Self {
            io: Some(WordIo::new(inner, options.byte_order.needs_swap())),
            body: Vec::new(),
            sets_written: 0,
        }
    }

    pub fn sets_written(&self) -> u64 {
        self.sets_written
    }

    /// Close and hand back the underlying writer, e.g. an in-memory buffer.
    pub fn into_inner(mut self) -> Result<W> {
        let mut io = self
            .io
            .take()
            .ok_or_else(|| SnapError::Format("snapshot writer already closed".into()))?;
        io.flush()?;
        Ok(io.into_inner())
    }

    fn encode_body(&mut self, set: &mut FrameRecord<'_>, swap: bool) -> Result<()> {
        let mut body = WordIo::new(std::mem::take(&mut self.body), swap);
        body.get_mut().clear();
        for field in Field::ALL {
            if field == Field::Key {
                if let Some(keys) = set.keys.as_mut() {
                    put_words(&mut body, keys, swap)?;
                }
            } else if let Some(values) = set.real_cow_mut(field) {
                put_words(&mut body, values, swap)?;
            }
        }
        self.body = body.into_inner();
        Ok(())
    }
}

/// Append one array to the body buffer. A foreign byte order needs the words
/// swapped in place, so a borrowed array is copied first.
fn put_words<T>(body: &mut WordIo<Vec<u8>>, values: &mut Cow<'_, [T]>, swap: bool) -> Result<()>
where
    T: bytemuck::Pod,
{
    if swap {
        body.write_words(bytemuck::cast_slice_mut(values.to_mut().as_mut_slice()), BODY_WORD_SIZE)?;
    } else {
        body.write_unswapped(bytemuck::cast_slice(&values[..]), BODY_WORD_SIZE)?;
    }
    Ok(())
}

impl<W: Write> TagSink for SnapFileWriter<W> {
    fn write_set(&mut self, set: &mut FrameRecord<'_>) -> Result<()> {
        let swap = self
            .io
            .as_ref()
            .ok_or_else(|| SnapError::Format("snapshot writer already closed".into()))?
            .swapping();

        for field in Field::ALL {
            let len = match field {
                Field::Key => set.keys.as_ref().map(|k| k.len()),
                _ => set.real(field).map(<[f32]>::len),
            };
            if let Some(len) = len {
                if len != set.nbody * field.width() {
                    return Err(SnapError::NbodyMismatch {
                        field: field.name(),
                        expected: set.nbody,
                        got: len / field.width(),
                    });
                }
            }
        }

        self.encode_body(set, swap)?;
        let mask = set.mask();
        debug_assert_eq!(
            Some(self.body.len() as u64),
            expected_body_len(mask, set.nbody as u64)
        );

        let header = FrameHeader {
            mask,
            nbody: set.nbody as u64,
            time: set.time.unwrap_or(0.0),
            body_len: self.body.len() as u64,
            checksum: xxh3_64(&self.body),
        };
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| SnapError::Format("snapshot writer already closed".into()))?;
        header.write_to(io)?;
        io.write_unswapped(&self.body, 1)?;

        debug!(
            "wrote set {}: nbody={} mask=[{}]",
            self.sets_written, set.nbody, mask
        );
        self.sets_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            io.flush()?;
            debug!("closed snapshot writer after {} sets", self.sets_written);
        }
        Ok(())
    }
}

impl<W: Write> Drop for SnapFileWriter<W> {
    fn drop(&mut self) {
        if let Some(io) = self.io.as_mut() {
            let _ = io.flush();
        }
    }
}
