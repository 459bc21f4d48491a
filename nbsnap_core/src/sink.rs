use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info, warn};

use crate::cache::interleave_phase_space;
use crate::com::{com_shift, ComReport};
use crate::config::CreateOptions;
use crate::error::{Result, SnapError};
use crate::field::{Field, Kind};
use crate::source::Frame;
use crate::stream::{FrameRecord, TagSink};
use crate::writer::SnapFileWriter;

/// Builds output frames field by field and commits them to a [`TagSink`].
///
/// Arrays are handed over as [`Cow`]: `Cow::Borrowed` aliases the caller's
/// buffer, which the borrow checker keeps alive until the frame is saved;
/// `Cow::Owned` (or the `*_copy` setters) gives the frame its own copy.
///
/// ```no_run
/// use std::borrow::Cow;
/// use nbsnap_core::{CreateOptions, Field, SnapshotOut};
///
/// let pos = vec![0.0f32; 30];
/// let mut out = SnapshotOut::create("run.nbs", &CreateOptions::default())?;
/// out.set_time(1.5);
/// out.set_real(Field::Pos, Cow::Borrowed(&pos[..]))?;
/// out.set_real_copy(Field::Mass, &[1.0; 10])?;
/// out.save()?;
/// out.close()?;
/// # Ok::<(), nbsnap_core::SnapError>(())
/// ```
pub struct SnapshotOut<'a, K: TagSink> {
    sink: K,
    record: FrameRecord<'a>,
    nbody: Option<usize>,
    saved: u64,
    closed: bool,
}

impl<'a> SnapshotOut<'a, SnapFileWriter<BufWriter<File>>> {
    /// Create (or truncate) a snapshot file.
    pub fn create(path: impl AsRef<Path>, options: &CreateOptions) -> Result<Self> {
        Ok(Self::from_sink(SnapFileWriter::create(path, options)?))
    }
}

impl<'a, K: TagSink> SnapshotOut<'a, K> {
    pub fn from_sink(sink: K) -> Self {
        Self {
            sink,
            record: FrameRecord::default(),
            nbody: None,
            saved: 0,
            closed: false,
        }
    }

    /// Particle count fixed by the first array of the pending frame.
    pub fn nbody(&self) -> Option<usize> {
        self.nbody
    }

    pub fn frames_saved(&self) -> u64 {
        self.saved
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn set_time(&mut self, time: f64) {
        self.record.time = Some(time);
    }

    pub fn set_real(&mut self, field: Field, values: Cow<'a, [f32]>) -> Result<()> {
        if field.kind() != Kind::Real {
            return Err(SnapError::Format(format!("{field} is not a real-valued field")));
        }
        self.claim(field, values.len())?;
        self.record.real[field.index()] = Some(values);
        Ok(())
    }

    pub fn set_real_copy(&mut self, field: Field, values: &[f32]) -> Result<()> {
        self.set_real(field, Cow::Owned(values.to_vec()))
    }

    pub fn set_keys(&mut self, keys: Cow<'a, [i32]>) -> Result<()> {
        self.claim(Field::Key, keys.len())?;
        self.record.keys = Some(keys);
        Ok(())
    }

    pub fn set_keys_copy(&mut self, keys: &[i32]) -> Result<()> {
        self.set_keys(Cow::Owned(keys.to_vec()))
    }

    /// Check an incoming array against the frame's particle count, fixing the
    /// count on the first one.
    fn claim(&mut self, field: Field, len: usize) -> Result<()> {
        let width = field.width();
        let n = len / width;
        match self.nbody {
            _ if len % width != 0 => Err(SnapError::NbodyMismatch {
                field: field.name(),
                expected: self.nbody.unwrap_or(n),
                got: n,
            }),
            Some(expected) if expected != n => Err(SnapError::NbodyMismatch {
                field: field.name(),
                expected,
                got: n,
            }),
            _ => {
                self.nbody = Some(n);
                Ok(())
            }
        }
    }

    /// Shift the pending positions and velocities to the centre-of-mass
    /// frame. Aliased arrays are copied first; the caller's buffers are not
    /// modified. A pending PhaseSpace array is rebuilt from the shifted
    /// positions and velocities.
    pub fn move_to_com(&mut self) -> Result<ComReport> {
        let count = self.nbody.unwrap_or(0);
        let [pos, vel, mass, .., phase] = &mut self.record.real;
        let report = com_shift(
            pos.as_mut().map(|p| p.to_mut().as_mut_slice()),
            vel.as_mut().map(|v| v.to_mut().as_mut_slice()),
            mass.as_deref(),
            count,
        )?;
        if let (Some(pos), Some(vel), Some(phase)) = (pos.as_deref(), vel.as_deref(), phase.as_mut()) {
            interleave_phase_space(phase.to_mut(), pos, vel);
        }
        Ok(report)
    }

    /// Commit the pending fields as one frame and start a fresh one.
    pub fn save(&mut self) -> Result<()> {
        if self.closed {
            return Err(SnapError::Format("snapshot output already closed".into()));
        }
        if self.record.is_empty() {
            return Err(SnapError::NothingToSave);
        }
        let mut record = std::mem::take(&mut self.record);
        record.nbody = self.nbody.take().unwrap_or(0);
        self.sink.write_set(&mut record)?;
        debug!("saved frame {} with {} particles", self.saved, record.nbody);
        self.saved += 1;
        Ok(())
    }

    /// Write a whole frame, bypassing the pending field set.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(SnapError::Format("snapshot output already closed".into()));
        }
        self.sink.write_set(&mut frame.to_record())?;
        self.saved += 1;
        Ok(())
    }

    /// Flush and release the sink. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.record.is_empty() {
            warn!("closing snapshot output with unsaved fields; they are dropped");
        }
        info!("snapshot output closed after {} frames", self.saved);
        self.sink.close()
    }
}

impl<K: TagSink> Drop for SnapshotOut<'_, K> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
