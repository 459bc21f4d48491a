use log::debug;
use nbsnap_core::{FieldMask, Frame, Manipulator};

/// Runs the wrapped manipulator only every `step` in simulation time.
///
/// The first frame seen sets the due time to its own time, so it always
/// runs. Frames before the due time are passed through untouched; after each
/// run the due time advances by `step`. A `step` of zero runs every frame.
pub struct Periodic<M> {
    inner: M,
    step: f64,
    due: Option<f64>,
}

impl<M: Manipulator> Periodic<M> {
    pub fn new(inner: M, step: f64) -> Self {
        Self {
            inner,
            step: step.max(0.0),
            due: None,
        }
    }

    /// Next time at which the wrapped manipulator will run.
    pub fn next_due(&self) -> Option<f64> {
        self.due
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: Manipulator> Manipulator for Periodic<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn describe(&self) -> String {
        format!("{} (every {} time units)", self.inner.describe(), self.step)
    }

    fn need(&self) -> FieldMask {
        self.inner.need()
    }

    fn provide(&self) -> FieldMask {
        self.inner.provide()
    }

    fn manipulate(&mut self, frame: &mut Frame) -> nbsnap_core::Result<bool> {
        let due = *self.due.get_or_insert(frame.time());
        if frame.time() < due {
            debug!("{}: t={} before due time {due}, skipping", self.name(), frame.time());
            return Ok(false);
        }
        let ran = self.inner.manipulate(frame)?;
        self.due = Some(due + self.step);
        Ok(ran)
    }
}
