use crate::bond::AtomNumber;

/// One of the four neighbour positions around a chiral centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChiralNeighbour {
    Atom(AtomNumber),
    ImplicitHydrogen,
    LonePair,
}

/// Tetrahedral chirality annotation for one atom.
///
/// The four slots are stored in a fixed cyclic order; that order is what
/// gives the annotation meaning, so every operation that renumbers,
/// substitutes or removes atoms must rewrite slots in place rather than
/// rebuild them. A centre whose arrangement can no longer be expressed
/// (a required explicit neighbour disappeared, or the centre gained a
/// fifth connection) is deleted by the owning molecule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChiralCentre {
    centre: AtomNumber,
    slots: [ChiralNeighbour; 4],
}

impl ChiralCentre {
    pub fn new(centre: AtomNumber, slots: [ChiralNeighbour; 4]) -> ChiralCentre {
        ChiralCentre { centre, slots }
    }

    pub fn centre(&self) -> AtomNumber {
        self.centre
    }

    pub fn slots(&self) -> &[ChiralNeighbour; 4] {
        &self.slots
    }

    /// True when `atom` is the centre or occupies a neighbour slot.
    pub fn involves(&self, atom: AtomNumber) -> bool {
        self.centre == atom || self.slots.contains(&ChiralNeighbour::Atom(atom))
    }

    pub fn implicit_hydrogen_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| **s == ChiralNeighbour::ImplicitHydrogen)
            .count()
    }

    pub fn lone_pair_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| **s == ChiralNeighbour::LonePair)
            .count()
    }

    /// Number of slots holding explicit atoms.
    pub fn explicit_neighbour_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, ChiralNeighbour::Atom(_)))
            .count()
    }

    /// The explicit atom neighbours in slot order.
    pub fn explicit_neighbours(&self) -> impl Iterator<Item = AtomNumber> + '_ {
        self.slots.iter().filter_map(|s| match s {
            ChiralNeighbour::Atom(a) => Some(*a),
            _ => None,
        })
    }

    /// Rewrites slot references from `from` to `to`, or the centre itself
    /// when `from` is the centre. Returns false if `from` does not appear.
    pub fn change_atom_number(&mut self, from: AtomNumber, to: AtomNumber) -> bool {
        if self.centre == from {
            self.centre = to;
            return true;
        }
        for slot in &mut self.slots {
            if *slot == ChiralNeighbour::Atom(from) {
                *slot = ChiralNeighbour::Atom(to);
                return true;
            }
        }
        false
    }

    /// Rewrites references after two atoms exchanged numbers.
    pub fn atom_numbers_swapped(&mut self, i1: AtomNumber, i2: AtomNumber) {
        let remap = |a: AtomNumber| {
            if a == i1 {
                i2
            } else if a == i2 {
                i1
            } else {
                a
            }
        };
        self.centre = remap(self.centre);
        for slot in &mut self.slots {
            if let ChiralNeighbour::Atom(a) = slot {
                *slot = ChiralNeighbour::Atom(remap(*a));
            }
        }
    }

    /// A previously implicit hydrogen became the explicit atom `a`.
    /// Returns false when no implicit-hydrogen slot was available.
    pub fn implicit_hydrogen_becomes_atom(&mut self, a: AtomNumber) -> bool {
        for slot in &mut self.slots {
            if *slot == ChiralNeighbour::ImplicitHydrogen {
                *slot = ChiralNeighbour::Atom(a);
                return true;
            }
        }
        false
    }

    /// A lone-pair slot is now occupied by the explicit atom `a`.
    pub fn lone_pair_becomes_atom(&mut self, a: AtomNumber) -> bool {
        for slot in &mut self.slots {
            if *slot == ChiralNeighbour::LonePair {
                *slot = ChiralNeighbour::Atom(a);
                return true;
            }
        }
        false
    }

    /// True when the centre or any slot references an atom number at or
    /// above `limit`. Used when the molecule is truncated.
    pub fn references_at_or_above(&self, limit: AtomNumber) -> bool {
        self.centre >= limit
            || self
                .explicit_neighbours()
                .any(|a| a >= limit)
    }

    /// Adjusts this centre for the removal of atom `removed`, which has
    /// not yet been renumbered away. Returns false when the centre can no
    /// longer be represented and must be dropped by the caller.
    ///
    /// A removed explicit hydrogen neighbour degrades to an implicit
    /// hydrogen slot; any other removed explicit neighbour invalidates
    /// the centre. Surviving references above `removed` shift down.
    pub fn adjust_for_removal(&mut self, removed: AtomNumber, was_hydrogen: bool) -> bool {
        if self.centre == removed {
            return false;
        }
        for slot in &mut self.slots {
            if *slot == ChiralNeighbour::Atom(removed) {
                if was_hydrogen {
                    *slot = ChiralNeighbour::ImplicitHydrogen;
                } else {
                    return false;
                }
            }
        }
        if self.centre > removed {
            self.centre -= 1;
        }
        for slot in &mut self.slots {
            if let ChiralNeighbour::Atom(a) = slot {
                if *a > removed {
                    *slot = ChiralNeighbour::Atom(*a - 1);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChiralNeighbour::{Atom, ImplicitHydrogen, LonePair};

    fn centre() -> ChiralCentre {
        ChiralCentre::new(2, [Atom(0), Atom(1), ImplicitHydrogen, Atom(5)])
    }

    #[test]
    fn involvement() {
        let c = centre();
        assert!(c.involves(2));
        assert!(c.involves(5));
        assert!(!c.involves(3));
        assert_eq!(c.implicit_hydrogen_count(), 1);
        assert_eq!(c.explicit_neighbour_count(), 3);
    }

    #[test]
    fn change_atom_number_rewrites_one_slot() {
        let mut c = centre();
        assert!(c.change_atom_number(5, 9));
        assert_eq!(c.slots()[3], Atom(9));
        assert!(!c.change_atom_number(5, 9));
    }

    #[test]
    fn change_centre_number() {
        let mut c = centre();
        assert!(c.change_atom_number(2, 7));
        assert_eq!(c.centre(), 7);
    }

    #[test]
    fn swap_rewrites_both_directions() {
        let mut c = centre();
        c.atom_numbers_swapped(0, 5);
        assert_eq!(c.slots()[0], Atom(5));
        assert_eq!(c.slots()[3], Atom(0));
    }

    #[test]
    fn implicit_hydrogen_fill() {
        let mut c = centre();
        assert!(c.implicit_hydrogen_becomes_atom(8));
        assert_eq!(c.implicit_hydrogen_count(), 0);
        assert!(!c.implicit_hydrogen_becomes_atom(9));
    }

    #[test]
    fn lone_pair_fill() {
        let mut c = ChiralCentre::new(0, [Atom(1), Atom(2), Atom(3), LonePair]);
        assert!(c.lone_pair_becomes_atom(4));
        assert_eq!(c.slots()[3], Atom(4));
    }

    #[test]
    fn removal_of_centre_invalidates() {
        let mut c = centre();
        assert!(!c.adjust_for_removal(2, false));
    }

    #[test]
    fn removal_of_explicit_neighbour_invalidates() {
        let mut c = centre();
        assert!(!c.adjust_for_removal(1, false));
    }

    #[test]
    fn removal_of_hydrogen_neighbour_degrades() {
        let mut c = ChiralCentre::new(2, [Atom(0), Atom(1), Atom(3), Atom(5)]);
        assert!(c.adjust_for_removal(3, true));
        assert_eq!(c.slots()[2], ImplicitHydrogen);
        // 5 shifted down past the removed slot 3.
        assert_eq!(c.slots()[3], Atom(4));
    }

    #[test]
    fn removal_shifts_higher_references() {
        let mut c = centre();
        assert!(c.adjust_for_removal(3, false));
        assert_eq!(c.centre(), 2);
        assert_eq!(c.slots()[3], Atom(4));
    }
}
