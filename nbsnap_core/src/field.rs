use std::fmt;

/// Per-particle quantities a snapshot can carry.
///
/// Each variant has a fixed number of components per particle and a fixed
/// element type; there is no lookup by name at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Pos,
    Vel,
    Mass,
    Potential,
    Acceleration,
    Aux,
    Key,
    Density,
    /// Interleaved position and velocity, 6 components per particle.
    PhaseSpace,
}

/// Element type of a field's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `f32`
    Real,
    /// `i32`
    Int,
}

impl Field {
    /// Canonical on-disk order of the per-field arrays.
    pub const ALL: [Field; 9] = [
        Field::Pos,
        Field::Vel,
        Field::Mass,
        Field::Potential,
        Field::Acceleration,
        Field::Aux,
        Field::Key,
        Field::Density,
        Field::PhaseSpace,
    ];

    /// Components per particle.
    pub const fn width(self) -> usize {
        match self {
            Field::Pos | Field::Vel | Field::Acceleration => 3,
            Field::PhaseSpace => 6,
            Field::Mass | Field::Potential | Field::Aux | Field::Key | Field::Density => 1,
        }
    }

    pub const fn kind(self) -> Kind {
        match self {
            Field::Key => Kind::Int,
            _ => Kind::Real,
        }
    }

    /// Size in bytes of one component.
    pub const fn word_size(self) -> usize {
        4
    }

    pub const fn bit(self) -> u32 {
        match self {
            Field::Mass => FieldMask::MASS,
            Field::Pos => FieldMask::POS,
            Field::Vel => FieldMask::VEL,
            Field::PhaseSpace => FieldMask::PHASE_SPACE,
            Field::Potential => FieldMask::POTENTIAL,
            Field::Acceleration => FieldMask::ACCELERATION,
            Field::Key => FieldMask::KEY,
            Field::Density => FieldMask::DENSITY,
            Field::Aux => FieldMask::AUX,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::Pos => "pos",
            Field::Vel => "vel",
            Field::Mass => "mass",
            Field::Potential => "pot",
            Field::Acceleration => "acc",
            Field::Aux => "aux",
            Field::Key => "keys",
            Field::Density => "rho",
            Field::PhaseSpace => "phase",
        }
    }

    /// Dense index, used to address per-field tables.
    pub(crate) const fn index(self) -> usize {
        match self {
            Field::Pos => 0,
            Field::Vel => 1,
            Field::Mass => 2,
            Field::Potential => 3,
            Field::Acceleration => 4,
            Field::Aux => 5,
            Field::Key => 6,
            Field::Density => 7,
            Field::PhaseSpace => 8,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of valid-data flags for one frame.
///
/// `TIME` and `NOBJ` describe the frame itself; the remaining bits follow
/// [`Field::bit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FieldMask(u32);

impl FieldMask {
    pub const TIME: u32 = 1 << 0;
    pub const NOBJ: u32 = 1 << 1;
    pub const MASS: u32 = 1 << 2;
    pub const POS: u32 = 1 << 3;
    pub const VEL: u32 = 1 << 4;
    pub const PHASE_SPACE: u32 = 1 << 5;
    pub const POTENTIAL: u32 = 1 << 6;
    pub const ACCELERATION: u32 = 1 << 7;
    pub const KEY: u32 = 1 << 8;
    pub const DENSITY: u32 = 1 << 9;
    pub const AUX: u32 = 1 << 10;

    const KNOWN: u32 = (1 << 11) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Keep only the flags this version understands.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::KNOWN)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub const fn has_field(self, field: Field) -> bool {
        self.has(field.bit())
    }

    pub fn set(&mut self, bit: u32, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn set_field(&mut self, field: Field, on: bool) {
        self.set(field.bit(), on);
    }

    #[must_use]
    pub const fn with(self, bit: u32) -> Self {
        Self(self.0 | bit)
    }

    pub const fn intersect(self, other: FieldMask) -> FieldMask {
        FieldMask(self.0 & other.0)
    }

    pub const fn contains(self, other: FieldMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Fields whose bit is set, in canonical order.
    pub fn fields(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.has_field(*f))
    }

    pub fn with_fields(fields: &[Field]) -> Self {
        let mut mask = Self::empty();
        for f in fields {
            mask.set_field(*f, true);
        }
        mask
    }
}

impl fmt::Display for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = Vec::new();
        if self.has(Self::TIME) {
            names.push("time");
        }
        if self.has(Self::NOBJ) {
            names.push("nobj");
        }
        names.extend(self.fields().map(Field::name));
        if names.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_are_distinct() {
        let mut seen = FieldMask::TIME | FieldMask::NOBJ;
        for f in Field::ALL {
            assert_eq!(seen & f.bit(), 0, "{f} reuses a bit");
            seen |= f.bit();
        }
    }

    #[test]
    fn test_index_matches_canonical_order() {
        for (i, f) in Field::ALL.iter().enumerate() {
            assert_eq!(f.index(), i);
        }
    }

    #[test]
    fn test_mask_fields_and_display() {
        let mut mask = FieldMask::with_fields(&[Field::Vel, Field::Pos]);
        mask.set(FieldMask::TIME, true);
        assert_eq!(mask.fields().collect::<Vec<_>>(), vec![Field::Pos, Field::Vel]);
        assert_eq!(mask.to_string(), "time,pos,vel");
        mask.set_field(Field::Pos, false);
        assert!(!mask.has_field(Field::Pos));
        assert_eq!(FieldMask::empty().to_string(), "-");
    }

    #[test]
    fn test_truncate_drops_unknown_bits() {
        let mask = FieldMask::from_bits_truncate(0xFFFF_0000 | FieldMask::MASS);
        assert_eq!(mask.bits(), FieldMask::MASS);
    }
}
