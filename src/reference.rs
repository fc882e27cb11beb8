use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a BDD node. Negative values are complemented edges.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(&self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Return the internal representation of the reference.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    /// Non-negative encoding used as a hash input: `2*|i| + (i < 0)`.
    pub(crate) fn as_lit(self) -> u64 {
        ((self.0.unsigned_abs() as u64) << 1) + (self.0 < 0) as u64
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}
