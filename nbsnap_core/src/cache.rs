use crate::error::{Result, SnapError};
use crate::field::{Field, FieldMask, Kind};

/// One field's storage: the allocation (whose length is the watermark) and
/// the active prefix belonging to the current frame.
#[derive(Debug, Default)]
struct Slot<T> {
    data: Vec<T>,
    len: usize,
}

impl<T: Copy + Default> Slot<T> {
    /// Make room for `need` elements. Grows to exactly `need`, keeping the
    /// existing contents; never shrinks.
    fn ensure(&mut self, need: usize) -> bool {
        let grew = need > self.data.len();
        if grew {
            self.data.reserve_exact(need - self.data.len());
            self.data.resize(need, T::default());
        }
        self.len = need;
        grew
    }

    fn active(&self) -> &[T] {
        &self.data[..self.len]
    }

    fn active_mut(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    fn release(&mut self) {
        self.data = Vec::new();
        self.len = 0;
    }
}

/// Typed per-field buffers plus the mask saying which of them hold valid data.
///
/// Buffers are allocated on first use and grown exactly on demand. A frame
/// with fewer particles reuses the front of the existing allocation. Views
/// are only handed out for fields whose present flag is set, so a buffer left
/// over from an earlier frame is never exposed as current data.
#[derive(Debug, Default)]
pub struct FieldCache {
    real: [Slot<f32>; Field::ALL.len()],
    keys: Slot<i32>,
    mask: FieldMask,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size `field` for `nbody` particles. Returns true when the buffer had to
    /// grow (a reallocation).
    ///
    /// Does not mark the field present; callers do that once the data is
    /// actually written. A particle count whose element count does not fit in
    /// `usize` is a format error.
    pub fn ensure(&mut self, field: Field, nbody: usize) -> Result<bool> {
        let need = nbody.checked_mul(field.width()).ok_or_else(|| {
            SnapError::Format(format!("{nbody} particles overflow the {field} buffer size"))
        })?;
        Ok(match field.kind() {
            Kind::Real => self.real[field.index()].ensure(need),
            Kind::Int => self.keys.ensure(need),
        })
    }

    pub fn set_present(&mut self, field: Field, present: bool) {
        self.mask.set_field(field, present);
    }

    pub fn is_present(&self, field: Field) -> bool {
        self.mask.has_field(field)
    }

    /// Present flags of all fields (`TIME`/`NOBJ` are never set here).
    pub fn mask(&self) -> FieldMask {
        self.mask
    }

    /// Drop every present flag, keeping the allocations for reuse.
    pub fn reset_presence(&mut self) {
        self.mask = FieldMask::empty();
    }

    /// Allocation size of `field`, in elements.
    pub fn watermark(&self, field: Field) -> usize {
        match field.kind() {
            Kind::Real => self.real[field.index()].data.len(),
            Kind::Int => self.keys.data.len(),
        }
    }

    pub fn real(&self, field: Field) -> Option<&[f32]> {
        if field.kind() != Kind::Real || !self.is_present(field) {
            return None;
        }
        Some(self.real[field.index()].active())
    }

    pub fn real_mut(&mut self, field: Field) -> Option<&mut [f32]> {
        if field.kind() != Kind::Real || !self.is_present(field) {
            return None;
        }
        Some(self.real[field.index()].active_mut())
    }

    pub fn keys(&self) -> Option<&[i32]> {
        if !self.is_present(Field::Key) {
            return None;
        }
        Some(self.keys.active())
    }

    pub fn keys_mut(&mut self) -> Option<&mut [i32]> {
        if !self.is_present(Field::Key) {
            return None;
        }
        Some(self.keys.active_mut())
    }

    /// Mutable access to the sized buffer regardless of the present flag.
    /// Used while a frame is being filled.
    pub(crate) fn real_slot_mut(&mut self, field: Field) -> &mut [f32] {
        self.real[field.index()].active_mut()
    }

    pub(crate) fn keys_slot_mut(&mut self) -> &mut [i32] {
        self.keys.active_mut()
    }

    /// Mutable views of two distinct real fields at once. Each side is `None`
    /// unless that field is present; asking for the same field twice yields
    /// `(None, None)`.
    pub fn real_pair_mut(
        &mut self,
        a: Field,
        b: Field,
    ) -> (Option<&mut [f32]>, Option<&mut [f32]>) {
        if a == b {
            return (None, None);
        }
        let mask = self.mask;
        let (mut va, mut vb) = (None, None);
        for (field, slot) in Field::ALL.into_iter().zip(self.real.iter_mut()) {
            if field.kind() != Kind::Real || !mask.has_field(field) {
                continue;
            }
            if field == a {
                va = Some(slot.active_mut());
            } else if field == b {
                vb = Some(slot.active_mut());
            }
        }
        (va, vb)
    }

    /// Positions and velocities (mutable) together with masses (shared), for
    /// transforms that weight one by the other.
    pub fn motion_views_mut(
        &mut self,
    ) -> (Option<&mut [f32]>, Option<&mut [f32]>, Option<&[f32]>) {
        let mask = self.mask;
        let (mut pos, mut vel, mut mass) = (None, None, None);
        for (field, slot) in Field::ALL.into_iter().zip(self.real.iter_mut()) {
            if !mask.has_field(field) {
                continue;
            }
            match field {
                Field::Pos => pos = Some(slot.active_mut()),
                Field::Vel => vel = Some(slot.active_mut()),
                Field::Mass => mass = Some(&*slot.active_mut()),
                _ => {}
            }
        }
        (pos, vel, mass)
    }

    /// Rewrite the interleaved phase-space array from the current positions
    /// and velocities. Does nothing unless all three fields are present.
    pub fn sync_phase_space(&mut self) {
        let needed = FieldMask::with_fields(&[Field::Pos, Field::Vel, Field::PhaseSpace]);
        if !self.mask.contains(needed) {
            return;
        }
        let [pos, vel, .., phase] = &mut self.real;
        interleave_phase_space(phase.active_mut(), pos.active(), vel.active());
    }

    /// Release every buffer. The cache stays usable and reallocates lazily.
    pub fn clear(&mut self) {
        for slot in &mut self.real {
            slot.release();
        }
        self.keys.release();
        self.mask = FieldMask::empty();
    }
}

/// Pack `pos` and `vel` (3 components each) into `phase` (6 per particle).
pub(crate) fn interleave_phase_space(phase: &mut [f32], pos: &[f32], vel: &[f32]) {
    for ((dst, r), v) in phase
        .chunks_exact_mut(6)
        .zip(pos.chunks_exact(3))
        .zip(vel.chunks_exact(3))
    {
        dst[..3].copy_from_slice(r);
        dst[3..].copy_from_slice(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_allocation() {
        let cache = FieldCache::new();
        for f in Field::ALL {
            assert_eq!(cache.watermark(f), 0);
        }
        assert!(cache.real(Field::Pos).is_none());
    }

    #[test]
    fn test_growth_keeps_prefix() {
        let mut cache = FieldCache::new();
        assert!(cache.ensure(Field::Pos, 4).unwrap());
        cache.set_present(Field::Pos, true);
        for (i, v) in cache.real_mut(Field::Pos).unwrap().iter_mut().enumerate() {
            *v = i as f32;
        }

        assert!(cache.ensure(Field::Pos, 10).unwrap());
        assert_eq!(cache.watermark(Field::Pos), 30);
        let pos = cache.real(Field::Pos).unwrap();
        assert_eq!(pos.len(), 30);
        for (i, v) in pos[..12].iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
    }

    #[test]
    fn test_no_realloc_at_or_below_watermark() {
        let mut cache = FieldCache::new();
        cache.ensure(Field::Vel, 50).unwrap();
        cache.set_present(Field::Vel, true);
        let before = cache.real(Field::Vel).unwrap().as_ptr();

        for n in [50, 20, 0, 49] {
            assert!(!cache.ensure(Field::Vel, n).unwrap());
            assert_eq!(cache.watermark(Field::Vel), 150);
            let view = cache.real(Field::Vel).unwrap();
            assert_eq!(view.len(), n * 3);
            if n > 0 {
                assert_eq!(view.as_ptr(), before);
            }
        }
    }

    #[test]
    fn test_absent_field_has_no_view() {
        let mut cache = FieldCache::new();
        cache.ensure(Field::Mass, 8).unwrap();
        cache.set_present(Field::Mass, true);
        assert_eq!(cache.real(Field::Mass).map(<[f32]>::len), Some(8));

        cache.set_present(Field::Mass, false);
        assert!(cache.real(Field::Mass).is_none());
        assert_eq!(cache.watermark(Field::Mass), 8, "allocation is kept for reuse");
    }

    #[test]
    fn test_keys_are_integer() {
        let mut cache = FieldCache::new();
        cache.ensure(Field::Key, 3).unwrap();
        cache.set_present(Field::Key, true);
        cache.keys_mut().unwrap().copy_from_slice(&[7, 8, 9]);
        assert_eq!(cache.keys(), Some(&[7, 8, 9][..]));
        assert!(cache.real(Field::Key).is_none());
    }

    #[test]
    fn test_pair_views_are_disjoint() {
        let mut cache = FieldCache::new();
        for f in [Field::Pos, Field::Vel] {
            cache.ensure(f, 2).unwrap();
            cache.set_present(f, true);
        }
        let (vel, pos) = cache.real_pair_mut(Field::Vel, Field::Pos);
        vel.unwrap().fill(1.0);
        pos.unwrap().fill(2.0);
        assert!(cache.real(Field::Vel).unwrap().iter().all(|v| *v == 1.0));
        assert!(cache.real(Field::Pos).unwrap().iter().all(|v| *v == 2.0));

        let (pos, acc) = cache.real_pair_mut(Field::Pos, Field::Acceleration);
        assert!(pos.is_some());
        assert!(acc.is_none());

        let (a, b) = cache.real_pair_mut(Field::Pos, Field::Pos);
        assert!(a.is_none() && b.is_none());
    }

    #[test]
    fn test_ensure_rejects_overflowing_count() {
        let mut cache = FieldCache::new();
        let err = cache.ensure(Field::PhaseSpace, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, SnapError::Format(_)));
        assert_eq!(cache.watermark(Field::PhaseSpace), 0);
    }

    #[test]
    fn test_sync_phase_space() {
        let mut cache = FieldCache::new();
        for f in [Field::Pos, Field::Vel, Field::PhaseSpace] {
            cache.ensure(f, 2).unwrap();
            cache.set_present(f, true);
        }
        cache.real_mut(Field::Pos).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        cache.real_mut(Field::Vel).unwrap().fill(-1.0);
        cache.sync_phase_space();
        assert_eq!(
            cache.real(Field::PhaseSpace),
            Some(&[1.0, 2.0, 3.0, -1.0, -1.0, -1.0, 4.0, 5.0, 6.0, -1.0, -1.0, -1.0][..])
        );

        cache.set_present(Field::Vel, false);
        cache.real_mut(Field::Pos).unwrap().fill(0.0);
        cache.sync_phase_space();
        assert_eq!(cache.real(Field::PhaseSpace).unwrap()[0], 1.0, "needs both pos and vel");
    }

    #[test]
    fn test_clear_releases() {
        let mut cache = FieldCache::new();
        cache.ensure(Field::Density, 100).unwrap();
        cache.set_present(Field::Density, true);
        cache.clear();
        assert_eq!(cache.watermark(Field::Density), 0);
        assert!(cache.real(Field::Density).is_none());
    }
}
