use nbsnap_core::{Field, FieldMask, Frame, Manipulator};

/// Add a constant offset to every position and velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Shift {
    pub deltar: [f32; 3],
    pub deltav: [f32; 3],
}

impl Shift {
    pub fn new(deltar: [f32; 3], deltav: [f32; 3]) -> Self {
        Self { deltar, deltav }
    }

    /// Offset the particles of `frame` in place. Absent fields are skipped.
    pub fn apply(&self, frame: &mut Frame) {
        if let Some(pos) = frame.real_mut(Field::Pos) {
            offset(pos, self.deltar);
        }
        if let Some(vel) = frame.real_mut(Field::Vel) {
            offset(vel, self.deltav);
        }
        frame.sync_phase_space();
    }
}

pub(crate) fn offset(xyz: &mut [f32], delta: [f32; 3]) {
    for p in xyz.chunks_exact_mut(3) {
        for (x, d) in p.iter_mut().zip(delta) {
            *x += d;
        }
    }
}

impl Manipulator for Shift {
    fn name(&self) -> &str {
        "shift"
    }

    fn describe(&self) -> String {
        format!("offset positions by {:?} and velocities by {:?}", self.deltar, self.deltav)
    }

    fn need(&self) -> FieldMask {
        FieldMask::empty()
    }

    fn provide(&self) -> FieldMask {
        FieldMask::with_fields(&[Field::Pos, Field::Vel])
    }

    fn manipulate(&mut self, frame: &mut Frame) -> nbsnap_core::Result<bool> {
        self.apply(frame);
        Ok(frame.has(Field::Pos) || frame.has(Field::Vel))
    }
}
