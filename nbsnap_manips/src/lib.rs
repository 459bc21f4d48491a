mod com_shift;
mod periodic;
mod shift;
mod stack;

pub use com_shift::ComShift;
pub use periodic::Periodic;
pub use shift::Shift;
pub use stack::stack_frames;

use nbsnap_core::Manipulator;

/// Build a bundled manipulator from its name and numeric parameters.
///
/// - `com_shift` takes no parameters.
/// - `shift` takes up to six: `dx,dy,dz,dvx,dvy,dvz` (missing ones are 0).
///
/// Time gating is not a parameter; wrap the result in [`Periodic`].
pub fn manip_by_name(name: &str, params: &[f64]) -> anyhow::Result<Box<dyn Manipulator>> {
    match name {
        "com_shift" => {
            if !params.is_empty() {
                anyhow::bail!("com_shift takes no parameters, got {}", params.len());
            }
            Ok(Box::new(ComShift::default()))
        }
        "shift" => {
            if params.len() > 6 {
                anyhow::bail!("shift takes at most 6 parameters, got {}", params.len());
            }
            let mut p = [0.0f32; 6];
            for (dst, src) in p.iter_mut().zip(params) {
                *dst = *src as f32;
            }
            Ok(Box::new(Shift::new([p[0], p[1], p[2]], [p[3], p[4], p[5]])))
        }
        _ => anyhow::bail!("unknown manipulator {name:?}; bundled: com_shift, shift"),
    }
}
