use log::{info, warn};
use nbsnap_core::{Field, Frame, Kind, SnapError};

use crate::shift::offset;

/// Put two systems on top of each other.
///
/// The result holds the particles of `a` followed by those of `b`, with `b`'s
/// positions and velocities offset by `deltar`/`deltav`. Only fields present
/// in both frames survive. The time is taken from `a`, and stays absent when
/// `a` has none. With `zero_com` the combined system is moved to its
/// centre-of-mass frame.
pub fn stack_frames(
    a: &Frame,
    b: &Frame,
    deltar: [f32; 3],
    deltav: [f32; 3],
    zero_com: bool,
) -> nbsnap_core::Result<Frame> {
    let mut out = Frame::new(a.nbody() + b.nbody(), a.time());
    if !a.has_time() {
        out.clear_time();
    }
    let common = a.cache().mask().intersect(b.cache().mask());
    let dropped = a.cache().mask().bits() ^ b.cache().mask().bits();
    if dropped != 0 {
        warn!(
            "fields present in only one input are dropped: {}",
            nbsnap_core::FieldMask::from_bits(dropped)
        );
    }

    for field in common.fields() {
        match field.kind() {
            Kind::Real => {
                let (Some(ra), Some(rb)) = (a.real(field), b.real(field)) else {
                    continue;
                };
                let mut joined = Vec::with_capacity(ra.len() + rb.len());
                joined.extend_from_slice(ra);
                joined.extend_from_slice(rb);
                let tail = &mut joined[ra.len()..];
                match field {
                    Field::Pos => offset(tail, deltar),
                    Field::Vel => offset(tail, deltav),
                    Field::PhaseSpace => {
                        for p in tail.chunks_exact_mut(6) {
                            let (r, v) = p.split_at_mut(3);
                            offset(r, deltar);
                            offset(v, deltav);
                        }
                    }
                    _ => {}
                }
                out.set_real(field, &joined)?;
            }
            Kind::Int => {
                let (Some(ka), Some(kb)) = (a.keys(), b.keys()) else {
                    continue;
                };
                out.set_keys(&[ka, kb].concat())?;
            }
        }
    }

    info!(
        "stacked {} + {} particles, fields [{}]",
        a.nbody(),
        b.nbody(),
        common
    );

    if zero_com {
        match out.move_to_com() {
            Ok(_) => {}
            Err(SnapError::Degenerate(msg)) if !out.has(Field::Pos) && !out.has(Field::Vel) => {
                warn!("nothing to recentre: {msg}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
