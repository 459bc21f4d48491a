use log::info;
use nbsnap_core::{Field, FieldMask, Frame, Manipulator};

/// Recentres every frame on its centre of mass.
///
/// Frames without masses are weighted uniformly. A frame whose total mass is
/// zero fails with `SnapError::Degenerate` and is left as it was.
#[derive(Debug, Default)]
pub struct ComShift {
    pub shifted: u64,
}

impl Manipulator for ComShift {
    fn name(&self) -> &str {
        "com_shift"
    }

    fn describe(&self) -> String {
        "move positions and velocities to the centre-of-mass frame".into()
    }

    /// Either positions or velocities are enough, which a mask cannot say.
    fn need(&self) -> FieldMask {
        FieldMask::empty()
    }

    fn provide(&self) -> FieldMask {
        FieldMask::with_fields(&[Field::Pos, Field::Vel])
    }

    fn manipulate(&mut self, frame: &mut Frame) -> nbsnap_core::Result<bool> {
        if !frame.has(Field::Pos) && !frame.has(Field::Vel) {
            return Ok(false);
        }
        let report = frame.move_to_com()?;
        info!(
            "t={}: removed centre of mass pos={:?} vel={:?}{}",
            frame.time(),
            report.pos,
            report.vel,
            if report.unit_mass { " (unit masses)" } else { "" }
        );
        self.shifted += 1;
        Ok(true)
    }
}
