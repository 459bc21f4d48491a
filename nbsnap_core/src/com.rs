use log::warn;

use crate::error::{Result, SnapError};

/// Outcome of a centre-of-mass shift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComReport {
    /// Mass-weighted mean position that was subtracted, if positions were given.
    pub pos: Option<[f64; 3]>,
    /// Mass-weighted mean velocity that was subtracted, if velocities were given.
    pub vel: Option<[f64; 3]>,
    pub total_weight: f64,
    /// No masses were available and every particle was weighted 1.
    pub unit_mass: bool,
}

/// Move `count` particles to their centre-of-mass frame.
///
/// Computes `Σ w_i x_i / Σ w_i` for positions and velocities independently
/// (accumulated in f64) and subtracts it in place. Without `mass` each
/// particle weighs 1 and the report says so.
///
/// Zero total weight (no particles, or all-zero masses) is an error; the
/// buffers are left untouched.
pub fn com_shift(
    pos: Option<&mut [f32]>,
    vel: Option<&mut [f32]>,
    mass: Option<&[f32]>,
    count: usize,
) -> Result<ComReport> {
    check_len("pos", pos.as_deref(), count, 3)?;
    check_len("vel", vel.as_deref(), count, 3)?;
    check_len("mass", mass, count, 1)?;

    let weight = |i: usize| mass.map_or(1.0, |m| f64::from(m[i]));
    let total_weight: f64 = (0..count).map(weight).sum();
    if total_weight == 0.0 {
        return Err(SnapError::Degenerate(format!(
            "total weight of {count} particles is zero, centre of mass undefined"
        )));
    }
    if mass.is_none() {
        warn!("no masses given, weighting each of {count} particles with 1");
    }

    let pos = pos.map(|p| shift(p, count, &weight, total_weight));
    let vel = vel.map(|v| shift(v, count, &weight, total_weight));

    Ok(ComReport {
        pos,
        vel,
        total_weight,
        unit_mass: mass.is_none(),
    })
}

fn check_len<T>(name: &'static str, values: Option<&[T]>, count: usize, width: usize) -> Result<()> {
    match values {
        Some(v) if v.len() < count * width => Err(SnapError::NbodyMismatch {
            field: name,
            expected: count,
            got: v.len() / width,
        }),
        _ => Ok(()),
    }
}

fn shift(xyz: &mut [f32], count: usize, weight: &impl Fn(usize) -> f64, total: f64) -> [f64; 3] {
    let mut sum = [0.0f64; 3];
    for (i, p) in xyz.chunks_exact(3).take(count).enumerate() {
        let w = weight(i);
        for k in 0..3 {
            sum[k] += w * f64::from(p[k]);
        }
    }
    let centre = sum.map(|s| s / total);
    for p in xyz.chunks_exact_mut(3).take(count) {
        for k in 0..3 {
            p[k] = (f64::from(p[k]) - centre[k]) as f32;
        }
    }
    centre
}
