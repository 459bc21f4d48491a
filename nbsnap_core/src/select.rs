use crate::error::{Result, SnapError};

/// Maps global particle indices onto a compact output range.
///
/// Entry `i` is the destination slot of particle `i`, or `None` when the
/// particle is excluded. The selected entries must be a bijection onto
/// `0..k`. Particles beyond the end of the table are excluded, so a table
/// built for an earlier, smaller frame keeps working on a grown one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionTable {
    slots: Vec<Option<usize>>,
}

impl SelectionTable {
    pub fn new(slots: Vec<Option<usize>>) -> Self {
        Self { slots }
    }

    /// Every particle of an `nbody` frame, identity order.
    pub fn all(nbody: usize) -> Self {
        Self {
            slots: (0..nbody).map(Some).collect(),
        }
    }

    /// Particles `first..=last` of an `nbody` frame, packed from slot 0.
    pub fn range(first: usize, last: usize, nbody: usize) -> Self {
        let slots = (0..nbody)
            .map(|i| (first..=last).contains(&i).then(|| i - first))
            .collect();
        Self { slots }
    }

    /// Select the given global indices, packed in ascending index order.
    /// Duplicates and out-of-range indices are rejected.
    pub fn from_indices(indices: &[usize], nbody: usize) -> Result<Self> {
        let mut slots = vec![None; nbody];
        for &i in indices {
            match slots.get_mut(i) {
                None => {
                    return Err(SnapError::InvalidSelection(format!(
                        "index {i} out of range for {nbody} particles"
                    )))
                }
                Some(Some(_)) => {
                    return Err(SnapError::InvalidSelection(format!("index {i} selected twice")))
                }
                Some(slot) => *slot = Some(0),
            }
        }
        let mut next = 0;
        for slot in slots.iter_mut().flatten() {
            *slot = next;
            next += 1;
        }
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Option<usize>] {
        &self.slots
    }

    /// Number of selected entries among the first `nbody` particles.
    pub fn selected(&self, nbody: usize) -> usize {
        self.window(nbody).iter().filter(|s| s.is_some()).count()
    }

    fn window(&self, nbody: usize) -> &[Option<usize>] {
        &self.slots[..self.slots.len().min(nbody)]
    }

    /// Check the table against an `nbody` frame and the caller's declared
    /// output count: exactly `declared` entries selected, each destination in
    /// range and used once.
    pub fn validate(&self, nbody: usize, declared: usize) -> Result<()> {
        let window = self.window(nbody);
        let found = window.iter().filter(|s| s.is_some()).count();
        if found != declared {
            return Err(SnapError::SelectionMismatch { declared, found });
        }
        let mut taken = vec![false; declared];
        for (src, dst) in window.iter().enumerate() {
            let Some(dst) = *dst else { continue };
            match taken.get_mut(dst) {
                None => {
                    return Err(SnapError::InvalidSelection(format!(
                        "particle {src} maps to slot {dst}, outside 0..{declared}"
                    )))
                }
                Some(true) => {
                    return Err(SnapError::InvalidSelection(format!(
                        "slot {dst} is the destination of more than one particle"
                    )))
                }
                Some(seen) => *seen = true,
            }
        }
        Ok(())
    }

    /// Copy the selected particles of `src` (`width` components each) into
    /// their destination slots in `dst`.
    ///
    /// `src` must hold at least `nbody * width` values and `dst` exactly
    /// `declared * width`. Sources are visited in ascending order. Returns the
    /// number of particles copied.
    pub fn apply<T: Copy>(
        &self,
        src: &[T],
        width: usize,
        nbody: usize,
        declared: usize,
        dst: &mut [T],
    ) -> Result<usize> {
        self.validate(nbody, declared)?;
        self.scatter(src, width, nbody, dst)
    }

    /// [`apply`](Self::apply) for a table that already passed
    /// [`validate`](Self::validate) for this `nbody`/`declared` pair.
    pub(crate) fn scatter<T: Copy>(
        &self,
        src: &[T],
        width: usize,
        nbody: usize,
        dst: &mut [T],
    ) -> Result<usize> {
        if src.len() < nbody * width {
            return Err(SnapError::InvalidSelection(format!(
                "source holds {} values, {nbody} particles x {width} needed",
                src.len()
            )));
        }
        let mut copied = 0;
        for (i, slot) in self.window(nbody).iter().enumerate() {
            let Some(d) = *slot else { continue };
            let to = dst.get_mut(d * width..(d + 1) * width).ok_or_else(|| {
                SnapError::InvalidSelection(format!("slot {d} outside destination buffer"))
            })?;
            to.copy_from_slice(&src[i * width..(i + 1) * width]);
            copied += 1;
        }
        Ok(copied)
    }
}
