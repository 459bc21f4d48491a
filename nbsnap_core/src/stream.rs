use std::borrow::Cow;

use crate::error::Result;
use crate::field::{Field, FieldMask};

/// Tags a snapshot set can carry: the two frame-level scalars plus one array
/// per [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Time,
    Nobj,
    Array(Field),
}

/// What a source reports about its first set before any frame is pulled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub nbody: usize,
    /// `None` when the first set has no time tag.
    pub time: Option<f64>,
}

/// Read side of a tagged snapshot stream.
///
/// A stream is a sequence of sets. After [`next_set`](Self::next_set) returns
/// `true` the set's tags can be queried and read in any order until the next
/// call. Implementations:
/// - must report a short read as `SnapError::Truncated`;
/// - may assume callers size `dst` to `nbody * field.width()`.
pub trait TagSource {
    /// Validate the stream and describe its first set without consuming it.
    fn probe(&mut self) -> Result<Probe>;

    /// Advance to the next set. `Ok(false)` at a clean end of stream.
    fn next_set(&mut self) -> Result<bool>;

    fn has_tag(&self, tag: Tag) -> bool;

    fn read_time(&mut self) -> Result<f64>;

    fn read_nbody(&mut self) -> Result<usize>;

    fn read_real(&mut self, field: Field, dst: &mut [f32]) -> Result<()>;

    fn read_ints(&mut self, field: Field, dst: &mut [i32]) -> Result<()>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// One set ready to be written.
///
/// `Cow::Borrowed` arrays alias caller memory; `Cow::Owned` arrays were
/// copied in. A sink that must rewrite words in place (foreign byte order)
/// turns a borrowed array into an owned copy first.
#[derive(Debug, Default, Clone)]
pub struct FrameRecord<'a> {
    pub time: Option<f64>,
    pub nbody: usize,
    pub real: [Option<Cow<'a, [f32]>>; Field::ALL.len()],
    pub keys: Option<Cow<'a, [i32]>>,
}

impl<'a> FrameRecord<'a> {
    pub fn real(&self, field: Field) -> Option<&[f32]> {
        self.real[field.index()].as_deref()
    }

    pub fn real_cow_mut(&mut self, field: Field) -> Option<&mut Cow<'a, [f32]>> {
        self.real[field.index()].as_mut()
    }

    /// Mask of the tags this record will write.
    pub fn mask(&self) -> FieldMask {
        let mut mask = FieldMask::empty();
        mask.set(FieldMask::TIME, self.time.is_some());
        mask.set(FieldMask::NOBJ, true);
        for field in Field::ALL {
            let present = match field {
                Field::Key => self.keys.is_some(),
                _ => self.real[field.index()].is_some(),
            };
            mask.set_field(field, present);
        }
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.keys.is_none() && self.real.iter().all(Option::is_none)
    }
}

/// Write side of a tagged snapshot stream.
pub trait TagSink {
    /// Append one set.
    fn write_set(&mut self, set: &mut FrameRecord<'_>) -> Result<()>;

    /// Flush and release the underlying handle. Idempotent.
    fn close(&mut self) -> Result<()>;
}

impl<T: TagSink + ?Sized> TagSink for &mut T {
    fn write_set(&mut self, set: &mut FrameRecord<'_>) -> Result<()> {
        (**self).write_set(set)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
