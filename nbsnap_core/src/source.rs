use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info, warn};

use crate::cache::FieldCache;
use crate::com::{com_shift, ComReport};
use crate::config::OpenOptions;
use crate::error::{Result, SnapError, Status};
use crate::field::{Field, FieldMask, Kind};
use crate::reader::SnapFileReader;
use crate::select::SelectionTable;
use crate::stream::{FrameRecord, Tag, TagSource};

/// One snapshot held in typed buffers: time, particle count and the fields
/// that are valid for those particles.
///
/// A frame read from a set without a time tag reports `time() == 0` but
/// `has_time() == false`, and is written back without a time.
#[derive(Debug, Default)]
pub struct Frame {
    time: f64,
    has_time: bool,
    nbody: usize,
    cache: FieldCache,
}

impl Frame {
    pub fn new(nbody: usize, time: f64) -> Self {
        Self {
            time,
            has_time: true,
            nbody,
            cache: FieldCache::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// False when the time is the 0 substituted for a missing time tag.
    pub fn has_time(&self) -> bool {
        self.has_time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.has_time = true;
    }

    /// Forget the time: reads as 0 and is not written out.
    pub fn clear_time(&mut self) {
        self.time = 0.0;
        self.has_time = false;
    }

    pub fn nbody(&self) -> usize {
        self.nbody
    }

    /// Present fields plus `NOBJ`, and `TIME` when the frame has one.
    pub fn mask(&self) -> FieldMask {
        let mut mask = self.cache.mask();
        mask.set(FieldMask::TIME, self.has_time);
        mask.set(FieldMask::NOBJ, true);
        mask
    }

    pub fn has(&self, field: Field) -> bool {
        self.cache.is_present(field)
    }

    pub fn real(&self, field: Field) -> Option<&[f32]> {
        self.cache.real(field)
    }

    pub fn real_mut(&mut self, field: Field) -> Option<&mut [f32]> {
        self.cache.real_mut(field)
    }

    pub fn pos(&self) -> Option<&[f32]> {
        self.cache.real(Field::Pos)
    }

    pub fn vel(&self) -> Option<&[f32]> {
        self.cache.real(Field::Vel)
    }

    pub fn mass(&self) -> Option<&[f32]> {
        self.cache.real(Field::Mass)
    }

    pub fn keys(&self) -> Option<&[i32]> {
        self.cache.keys()
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut FieldCache {
        &mut self.cache
    }

    /// Copy `values` in as `field`. Length must be `nbody * width`.
    pub fn set_real(&mut self, field: Field, values: &[f32]) -> Result<()> {
        if field.kind() != Kind::Real {
            return Err(SnapError::Format(format!("{field} is not a real-valued field")));
        }
        self.check_len(field, values.len())?;
        self.cache.ensure(field, self.nbody)?;
        self.cache.real_slot_mut(field).copy_from_slice(values);
        self.cache.set_present(field, true);
        Ok(())
    }

    pub fn set_keys(&mut self, values: &[i32]) -> Result<()> {
        self.check_len(Field::Key, values.len())?;
        self.cache.ensure(Field::Key, self.nbody)?;
        self.cache.keys_slot_mut().copy_from_slice(values);
        self.cache.set_present(Field::Key, true);
        Ok(())
    }

    /// Mark `field` absent. Its allocation is kept for reuse.
    pub fn remove(&mut self, field: Field) {
        self.cache.set_present(field, false);
    }

    fn check_len(&self, field: Field, len: usize) -> Result<()> {
        if len != self.nbody * field.width() {
            return Err(SnapError::NbodyMismatch {
                field: field.name(),
                expected: self.nbody,
                got: len / field.width(),
            });
        }
        Ok(())
    }

    /// Recentre positions and velocities on the centre of mass. A phase-space
    /// array carried alongside is rewritten to match.
    pub fn move_to_com(&mut self) -> Result<ComReport> {
        let nbody = self.nbody;
        let (pos, vel, mass) = self.cache.motion_views_mut();
        let report = com_shift(pos, vel, mass, nbody)?;
        self.cache.sync_phase_space();
        Ok(report)
    }

    /// Bring PhaseSpace back in line after Pos/Vel were edited in place.
    pub fn sync_phase_space(&mut self) {
        self.cache.sync_phase_space();
    }

    /// Borrow every present field as a record ready for a [`TagSink`].
    ///
    /// [`TagSink`]: crate::stream::TagSink
    pub fn to_record(&self) -> FrameRecord<'_> {
        let mut record = FrameRecord {
            time: self.has_time.then_some(self.time),
            nbody: self.nbody,
            ..FrameRecord::default()
        };
        for field in self.cache.mask().fields() {
            match field.kind() {
                Kind::Real => record.real[field.index()] = self.real(field).map(Cow::Borrowed),
                Kind::Int => record.keys = self.keys().map(Cow::Borrowed),
            }
        }
        record
    }
}

/// Result of pulling one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    /// The set had no time tag; the frame time was set to 0.
    ReadyDefaultTime,
    /// The set had no particle count tag. Treat as end of stream.
    NoParticles,
    EndOfStream,
}

impl FrameStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, FrameStatus::Ready | FrameStatus::ReadyDefaultTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Open,
    FrameReady,
    Closed,
}

/// Pulls frames out of a [`TagSource`], narrowed to a particle selection.
///
/// Two caches are kept: the raw cache sized to each set's full particle
/// count, and the frame cache sized to the selection. Both only ever grow.
/// A stream-level failure (truncation, corruption, bad header) closes the
/// source; later calls report end of stream.
pub struct FrameSource<S: TagSource> {
    stream: S,
    state: SourceState,
    full_nbody: usize,
    initial_time: f64,
    raw: FieldCache,
    frame: Frame,
    max_nbody: usize,
    frames: u64,
}

impl FrameSource<SnapFileReader<BufReader<File>>> {
    /// Open a snapshot file and read its first header eagerly.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let reader = SnapFileReader::open(path, options)?;
        Self::from_stream(reader)
    }
}

impl<S: TagSource> FrameSource<S> {
    /// Validate `stream` and record the first set's particle count and time.
    pub fn from_stream(mut stream: S) -> Result<Self> {
        let probe = stream.probe()?;
        let initial_time = probe.time.unwrap_or_else(|| {
            warn!("first snapshot has no time, using 0");
            0.0
        });
        info!(
            "snapshot source ready: {} particles at t={}",
            probe.nbody, initial_time
        );
        Ok(Self {
            stream,
            state: SourceState::Open,
            full_nbody: probe.nbody,
            initial_time,
            raw: FieldCache::new(),
            frame: Frame::default(),
            max_nbody: 0,
            frames: 0,
        })
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Particle count of the first set.
    pub fn full_nbody(&self) -> usize {
        self.full_nbody
    }

    /// Time of the first set (0 when it had none).
    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    /// Largest particle count seen so far.
    pub fn max_nbody(&self) -> usize {
        self.max_nbody
    }

    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    /// Full-size buffers of the last set, before selection.
    pub fn raw(&self) -> &FieldCache {
        &self.raw
    }

    /// Pull the next frame, keeping the particles chosen by `selection`.
    /// `nsel` must equal the number of selected particles.
    pub fn next_frame(&mut self, selection: &SelectionTable, nsel: usize) -> Result<FrameStatus> {
        if self.state == SourceState::Closed {
            return Ok(FrameStatus::EndOfStream);
        }
        let result = match self.advance() {
            Ok(true) => self.load(Some((selection, nsel))),
            Ok(false) => Ok(FrameStatus::EndOfStream),
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    /// Pull the next frame with every particle, in file order.
    pub fn next_frame_all(&mut self) -> Result<FrameStatus> {
        if self.state == SourceState::Closed {
            return Ok(FrameStatus::EndOfStream);
        }
        let result = match self.advance() {
            Ok(true) => self.load(None),
            Ok(false) => Ok(FrameStatus::EndOfStream),
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    fn advance(&mut self) -> Result<bool> {
        let more = self.stream.next_set()?;
        if !more {
            debug!("end of snapshot stream after {} frames", self.frames);
        }
        Ok(more)
    }

    /// Stream-level failures leave the stream unusable: close it and hide
    /// whatever partial frame was decoded. Selection errors leave it open.
    fn settle(&mut self, result: Result<FrameStatus>) -> Result<FrameStatus> {
        if let Err(e) = &result {
            if matches!(
                e.status(),
                Status::FormatError | Status::Truncated | Status::Io
            ) {
                warn!("snapshot stream unusable, closing: {e}");
                self.frame.cache.reset_presence();
                let _ = self.close();
            }
        }
        result
    }

    /// Decode the current set into the caches. `None` keeps every particle.
    fn load(&mut self, selection: Option<(&SelectionTable, usize)>) -> Result<FrameStatus> {
        if !self.stream.has_tag(Tag::Nobj) {
            warn!("snapshot set {} has no particle data", self.frames);
            self.frame.cache.reset_presence();
            return Ok(FrameStatus::NoParticles);
        }
        let nbody = self.stream.read_nbody()?;
        let (time, defaulted) = if self.stream.has_tag(Tag::Time) {
            (self.stream.read_time()?, false)
        } else {
            warn!("snapshot set {} has no time, forcing t=0", self.frames);
            (0.0, true)
        };
        let nsel = match selection {
            Some((table, nsel)) => {
                table.validate(nbody, nsel)?;
                nsel
            }
            None => nbody,
        };

        self.raw.reset_presence();
        for field in Field::ALL {
            if !self.stream.has_tag(Tag::Array(field)) {
                continue;
            }
            if self.raw.ensure(field, nbody)? {
                debug!("raw {field} buffer grown to {nbody} particles");
            }
            match field.kind() {
                Kind::Real => self.stream.read_real(field, self.raw.real_slot_mut(field))?,
                Kind::Int => self.stream.read_ints(field, self.raw.keys_slot_mut())?,
            }
            self.raw.set_present(field, true);
        }
        self.split_phase_space(nbody)?;
        self.max_nbody = self.max_nbody.max(nbody);

        self.frame.cache.reset_presence();
        for field in self.raw.mask().fields() {
            self.frame.cache.ensure(field, nsel)?;
            match field.kind() {
                Kind::Real => {
                    let src = self.raw.real(field).unwrap_or_default();
                    let dst = self.frame.cache.real_slot_mut(field);
                    copy_selected(selection, src, field.width(), nbody, dst)?;
                }
                Kind::Int => {
                    let src = self.raw.keys().unwrap_or_default();
                    let dst = self.frame.cache.keys_slot_mut();
                    copy_selected(selection, src, field.width(), nbody, dst)?;
                }
            }
            self.frame.cache.set_present(field, true);
        }
        self.frame.time = time;
        self.frame.has_time = !defaulted;
        self.frame.nbody = nsel;
        self.state = SourceState::FrameReady;
        self.frames += 1;

        Ok(if defaulted {
            FrameStatus::ReadyDefaultTime
        } else {
            FrameStatus::Ready
        })
    }

    /// Fill missing positions/velocities from an interleaved phase-space array.
    fn split_phase_space(&mut self, nbody: usize) -> Result<()> {
        if !self.raw.is_present(Field::PhaseSpace) {
            return Ok(());
        }
        for (target, offset) in [(Field::Pos, 0), (Field::Vel, 3)] {
            if self.raw.is_present(target) {
                continue;
            }
            self.raw.ensure(target, nbody)?;
            self.raw.set_present(target, true);
            let (phase, out) = self.raw.real_pair_mut(Field::PhaseSpace, target);
            if let (Some(phase), Some(out)) = (phase, out) {
                for (src, dst) in phase.chunks_exact(6).zip(out.chunks_exact_mut(3)) {
                    dst.copy_from_slice(&src[offset..offset + 3]);
                }
            }
            debug!("derived {target} from phase space");
        }
        Ok(())
    }

    /// Release the stream. Idempotent; buffers stay readable until drop.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SourceState::Closed {
            return Ok(());
        }
        self.state = SourceState::Closed;
        info!("closing snapshot source after {} frames", self.frames);
        self.stream.close()
    }
}

/// Copy one field into the frame cache, through the selection when there is
/// one. Without a selection `dst` is exactly as long as `src`.
fn copy_selected<T: Copy>(
    selection: Option<(&SelectionTable, usize)>,
    src: &[T],
    width: usize,
    nbody: usize,
    dst: &mut [T],
) -> Result<()> {
    match selection {
        Some((table, _)) => table.scatter(src, width, nbody, dst).map(drop),
        None => {
            dst.copy_from_slice(src);
            Ok(())
        }
    }
}

impl<S: TagSource> Drop for FrameSource<S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreateOptions;
    use crate::stream::TagSink;
    use crate::writer::SnapFileWriter;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_source_is_send() {
        assert_send::<FrameSource<SnapFileReader<BufReader<File>>>>();
        assert_send::<Frame>();
    }

    #[test]
    fn test_frame_setters_check_length() {
        let mut frame = Frame::new(2, 1.0);
        assert!(frame.set_real(Field::Pos, &[0.0; 5]).is_err());
        assert!(frame.set_real(Field::Key, &[0.0; 2]).is_err());
        frame.set_real(Field::Pos, &[1.0; 6]).unwrap();
        frame.set_keys(&[3, 4]).unwrap();
        assert_eq!(
            frame.mask(),
            FieldMask::with_fields(&[Field::Pos, Field::Key])
                .with(FieldMask::TIME)
                .with(FieldMask::NOBJ)
        );

        frame.remove(Field::Pos);
        assert!(frame.pos().is_none());
        assert_eq!(frame.cache().watermark(Field::Pos), 6);
    }

    #[test]
    fn test_cleared_time_is_not_written() {
        let mut frame = Frame::new(1, 3.0);
        frame.set_real(Field::Mass, &[1.0]).unwrap();
        frame.clear_time();
        assert!(!frame.has_time());
        assert_eq!(frame.time(), 0.0);
        assert!(!frame.mask().has(FieldMask::TIME));
        assert_eq!(frame.to_record().time, None);

        frame.set_time(0.5);
        assert!(frame.has_time());
        assert_eq!(frame.to_record().time, Some(0.5));
    }

    #[test]
    fn test_move_to_com_resyncs_phase_space() {
        let mut frame = Frame::new(2, 0.0);
        frame.set_real(Field::Pos, &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0]).unwrap();
        frame.set_real(Field::Vel, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
        frame
            .set_real(Field::PhaseSpace, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap();
        frame.move_to_com().unwrap();
        assert_eq!(
            frame.real(Field::PhaseSpace),
            Some(&[-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0][..])
        );
    }

    #[test]
    fn test_to_record_borrows_present_fields() {
        let mut frame = Frame::new(1, 2.5);
        frame.set_real(Field::Mass, &[4.0]).unwrap();
        frame.set_keys(&[9]).unwrap();
        let record = frame.to_record();
        assert_eq!(record.time, Some(2.5));
        assert_eq!(record.real(Field::Mass), Some(&[4.0][..]));
        assert!(matches!(record.keys, Some(Cow::Borrowed(_))));
        assert!(record.real(Field::Pos).is_none());
    }

    #[test]
    fn test_in_memory_stream_with_selection() {
        let mut buf = Vec::new();
        {
            let mut writer = SnapFileWriter::new(&mut buf, &CreateOptions::default());
            let mut frame = Frame::new(4, 0.0);
            frame.set_real(Field::Mass, &[1.0, 2.0, 3.0, 4.0]).unwrap();
            writer.write_set(&mut frame.to_record()).unwrap();
            writer.close().unwrap();
        }

        let reader = SnapFileReader::new(&buf[..], &OpenOptions::default());
        let mut src = FrameSource::from_stream(reader).unwrap();
        assert_eq!(src.full_nbody(), 4);
        let sel = SelectionTable::new(vec![None, Some(1), None, Some(0)]);
        assert_eq!(src.next_frame(&sel, 2).unwrap(), FrameStatus::Ready);
        assert_eq!(src.state(), SourceState::FrameReady);
        assert_eq!(src.frame().mass(), Some(&[4.0, 2.0][..]));
        assert_eq!(src.raw().real(Field::Mass).map(<[f32]>::len), Some(4));
        assert_eq!(src.next_frame(&sel, 2).unwrap(), FrameStatus::EndOfStream);
    }
}
