use crate::error::Result;
use crate::field::FieldMask;
use crate::source::Frame;

/// A named transform applied to frames in turn.
///
/// Implementations must be `Send` so a pipeline can be moved onto a worker
/// thread.
pub trait Manipulator: Send {
    /// Short identifier, e.g. `"com_shift"`.
    fn name(&self) -> &str;

    /// One line for tool output.
    fn describe(&self) -> String;

    /// Fields the frame must carry for `manipulate` to do anything.
    fn need(&self) -> FieldMask;

    /// Fields `manipulate` writes.
    fn provide(&self) -> FieldMask {
        FieldMask::empty()
    }

    /// Transform `frame` in place. Returns `Ok(false)` when the frame was
    /// left alone (for instance a time gate that is not yet due).
    fn manipulate(&mut self, frame: &mut Frame) -> Result<bool>;
}

impl<M: Manipulator + ?Sized> Manipulator for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn need(&self) -> FieldMask {
        (**self).need()
    }

    fn provide(&self) -> FieldMask {
        (**self).provide()
    }

    fn manipulate(&mut self, frame: &mut Frame) -> Result<bool> {
        (**self).manipulate(frame)
    }
}
