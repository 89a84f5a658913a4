/// Index of an atom within its owning [`Molecule`](crate::Molecule).
///
/// Atom numbers are dense: removing an atom shifts every higher number
/// down by one, and the molecule rewrites all index-holding structures.
pub type AtomNumber = usize;

/// Index of a bond within its owning molecule's bond list.
pub type BondNumber = usize;

/// Declared bond type, as read from input or set by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BondKind {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
    Coordination,
    NotABond,
}

/// Directional (cis/trans) annotation on a single bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

/// An edge of the molecular graph.
///
/// Bonds are owned by the molecule's bond list; atoms reference them by
/// [`BondNumber`]. `aromatic` and `ring_bond_count` are computed
/// annotations, reset whenever connectivity changes; `kind` and
/// `direction` are declared state.
#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub a1: AtomNumber,
    pub a2: AtomNumber,
    pub kind: BondKind,
    /// Set by aromaticity derivation; cleared on structural change.
    pub aromatic: bool,
    pub direction: Direction,
    /// Number of SSSR rings this bond belongs to; `None` = not computed.
    pub ring_bond_count: Option<u32>,
}

impl Bond {
    pub fn new(a1: AtomNumber, a2: AtomNumber, kind: BondKind) -> Bond {
        assert!(a1 != a2, "bond endpoints must differ, got {a1} twice");
        Bond {
            a1,
            a2,
            kind,
            aromatic: false,
            direction: Direction::None,
            ring_bond_count: None,
        }
    }

    /// The endpoint that is not `atom`. Panics if `atom` is not an
    /// endpoint of this bond.
    pub fn other(&self, atom: AtomNumber) -> AtomNumber {
        if atom == self.a1 {
            self.a2
        } else if atom == self.a2 {
            self.a1
        } else {
            panic!("atom {atom} is not an endpoint of bond {}-{}", self.a1, self.a2)
        }
    }

    pub fn involves(&self, atom: AtomNumber) -> bool {
        self.a1 == atom || self.a2 == atom
    }

    pub fn joins(&self, a1: AtomNumber, a2: AtomNumber) -> bool {
        (self.a1 == a1 && self.a2 == a2) || (self.a1 == a2 && self.a2 == a1)
    }

    pub fn is_single(&self) -> bool {
        self.kind == BondKind::Single
    }

    pub fn is_directional(&self) -> bool {
        self.direction != Direction::None
    }

    /// Clears the computed annotations: aromaticity and ring membership.
    /// Called for every bond during the structural invalidation cascade.
    pub fn invalidate_computed(&mut self) {
        self.aromatic = false;
        self.ring_bond_count = None;
    }

    /// Rewrites endpoints after an atom removal: references above
    /// `removed` shift down by one. The caller guarantees neither
    /// endpoint equals `removed`.
    pub(crate) fn shift_down_above(&mut self, removed: AtomNumber) {
        debug_assert!(self.a1 != removed && self.a2 != removed);
        if self.a1 > removed {
            self.a1 -= 1;
        }
        if self.a2 > removed {
            self.a2 -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_endpoint() {
        let b = Bond::new(2, 7, BondKind::Double);
        assert_eq!(b.other(2), 7);
        assert_eq!(b.other(7), 2);
        assert!(b.joins(7, 2));
        assert!(!b.joins(2, 3));
    }

    #[test]
    #[should_panic]
    fn other_rejects_non_endpoint() {
        let b = Bond::new(0, 1, BondKind::Single);
        b.other(5);
    }

    #[test]
    #[should_panic]
    fn self_loop_rejected() {
        Bond::new(3, 3, BondKind::Single);
    }

    #[test]
    fn invalidation_clears_computed_state() {
        let mut b = Bond::new(0, 1, BondKind::Aromatic);
        b.aromatic = true;
        b.ring_bond_count = Some(1);
        b.invalidate_computed();
        assert!(!b.aromatic);
        assert_eq!(b.ring_bond_count, None);
        assert_eq!(b.kind, BondKind::Aromatic);
    }

    #[test]
    fn shift_down() {
        let mut b = Bond::new(3, 8, BondKind::Single);
        b.shift_down_above(5);
        assert_eq!((b.a1, b.a2), (3, 7));
    }
}
