use tracing::{debug, error};

use crate::bond::{AtomNumber, Bond, BondKind, BondNumber, Direction};
use crate::molecule::Molecule;

use super::SmilesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingSlot {
    Unused,
    /// Closed under the no-reuse policy; never issued again this pass.
    Retired,
    Open {
        /// The atom that will eventually close this ring — the far end
        /// of the opening bond.
        closing_atom: AtomNumber,
        /// The atom at which the opening digit was written.
        opened_at: AtomNumber,
        bond: BondNumber,
    },
}

/// Allocator for ring-closure numbers, alive for one serialization pass.
///
/// The slot index is the closure label: slot 0 is reserved (label 0 is
/// never emitted), so a table for `nrings` rings has `nrings + 1` slots.
/// Openings claim the first unused slot by linear scan; closings locate
/// their slot by the two endpoint atoms and free or retire it depending
/// on the reuse policy. Asking to close a ring that is not open means
/// the traversal and the allocator disagree about the graph — a caller
/// bug, and fatal.
pub struct RingNumberManager<'a> {
    slots: Vec<RingSlot>,
    config: &'a SmilesConfig,
}

impl<'a> RingNumberManager<'a> {
    /// `nrings` bounds the number of simultaneously open rings.
    pub fn new(nrings: usize, config: &'a SmilesConfig) -> RingNumberManager<'a> {
        let mut slots = vec![RingSlot::Unused; nrings + 1];
        slots[0] = RingSlot::Retired;
        RingNumberManager { slots, config }
    }

    pub fn open_rings(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, RingSlot::Open { .. }))
            .count()
    }

    /// Records a ring opening at `opening_atom` across `bond` and
    /// appends the bare label to `out`. Openings carry no bond marker;
    /// the bond type is written by the matching closure.
    pub fn store_ring(
        &mut self,
        out: &mut String,
        m: &Molecule,
        bond: BondNumber,
        opening_atom: AtomNumber,
    ) {
        let closing_atom = m.bond(bond).other(opening_atom);
        let free = self
            .slots
            .iter()
            .position(|s| *s == RingSlot::Unused)
            .expect("ring number table exhausted");
        self.slots[free] = RingSlot::Open {
            closing_atom,
            opened_at: opening_atom,
            bond,
        };
        self.append_label(out, m, free, None, opening_atom);
    }

    /// Appends closure digits for every open ring ending at `atom`.
    ///
    /// `closures_found` lists the atoms at which those rings were
    /// opened. When `atom` is a chiral centre and more than one closure
    /// lands on it, the closures are emitted in exactly the order given
    /// — the caller has arranged them to match the printed neighbour
    /// order — otherwise slot-table order is used.
    pub fn append_ring_closures_for_atom(
        &mut self,
        out: &mut String,
        m: &Molecule,
        atom: AtomNumber,
        closures_found: &[AtomNumber],
        chiral: bool,
    ) -> usize {
        if chiral && closures_found.len() > 1 {
            for &from in closures_found {
                self.place_ring_closure(out, m, atom, from);
            }
            return closures_found.len();
        }

        let mut emitted = 0;
        for slot in 1..self.slots.len() {
            if let RingSlot::Open { closing_atom, .. } = self.slots[slot] {
                if closing_atom == atom {
                    self.process_ring(out, m, slot, atom);
                    emitted += 1;
                }
            }
        }
        emitted
    }

    /// Closes the specific ring opened at `from` and ending at `atom`.
    fn place_ring_closure(
        &mut self,
        out: &mut String,
        m: &Molecule,
        atom: AtomNumber,
        from: AtomNumber,
    ) {
        for slot in 1..self.slots.len() {
            if let RingSlot::Open {
                closing_atom,
                opened_at,
                ..
            } = self.slots[slot]
            {
                if closing_atom == atom && opened_at == from {
                    self.process_ring(out, m, slot, atom);
                    return;
                }
            }
        }
        error!(atom, from, "no open ring closure between atoms");
        self.debug_dump();
        panic!("ring closure requested with no matching open ring: atom {atom} from {from}");
    }

    fn process_ring(&mut self, out: &mut String, m: &Molecule, slot: usize, atom: AtomNumber) {
        let bond = match self.slots[slot] {
            RingSlot::Open { bond, .. } => bond,
            _ => unreachable!("process_ring on a slot that is not open"),
        };
        self.append_label(out, m, slot, Some(bond), atom);
        self.slots[slot] = if self.config.reuse_ring_closure_numbers {
            RingSlot::Unused
        } else {
            RingSlot::Retired
        };
    }

    /// Writes the (optional) bond marker and the numeric label. Labels
    /// below 10 are a single digit; larger ones are `%` followed by the
    /// two-digit decimal form.
    fn append_label(
        &self,
        out: &mut String,
        m: &Molecule,
        number: usize,
        bond: Option<BondNumber>,
        atom: AtomNumber,
    ) {
        if let Some(b) = bond {
            append_closure_bond_marker(out, m, m.bond(b), atom, self.config);
        }
        let label = number + self.config.ring_number_offset;
        debug_assert!(label <= 99, "ring closure label {label} out of range");
        if label < 10 {
            out.push((b'0' + label as u8) as char);
        } else {
            out.push('%');
            out.push((b'0' + (label / 10) as u8) as char);
            out.push((b'0' + (label % 10) as u8) as char);
        }
    }

    fn debug_dump(&self) {
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                RingSlot::Unused => debug!(slot = i, "unused"),
                RingSlot::Retired => debug!(slot = i, "retired"),
                RingSlot::Open {
                    closing_atom,
                    opened_at,
                    bond,
                } => debug!(slot = i, closing_atom, opened_at, bond, "open"),
            }
        }
    }
}

/// Marker preceding a closure digit. Plain single bonds get nothing;
/// directional single bonds are suppressed to plain unless both the
/// cis/trans switch and the ring-closure directionality switch are on.
fn append_closure_bond_marker(
    out: &mut String,
    m: &Molecule,
    bond: &Bond,
    atom: AtomNumber,
    config: &SmilesConfig,
) {
    match bond.kind {
        BondKind::Double => out.push('='),
        BondKind::Triple => out.push('#'),
        BondKind::Aromatic => {
            // Implied when both endpoints print lowercase.
            if !(endpoint_aromatic(m, bond.a1) && endpoint_aromatic(m, bond.a2)) {
                out.push(':');
            }
        }
        BondKind::NotABond => out.push('.'),
        BondKind::Single | BondKind::Coordination => {
            if bond.is_directional()
                && config.include_cis_trans
                && config.directional_ring_closures
            {
                out.push(direction_char(bond, atom));
            }
        }
    }
}

fn endpoint_aromatic(m: &Molecule, a: AtomNumber) -> bool {
    m.aromaticity.as_ref().is_some_and(|flags| flags[a])
}

/// Directional markers are stored relative to the bond's a1→a2 sense;
/// when written from the a2 end they flip.
pub(super) fn direction_char(bond: &Bond, from: AtomNumber) -> char {
    let up = match bond.direction {
        Direction::Up => from == bond.a1,
        Direction::Down => from != bond.a1,
        Direction::None => unreachable!("direction_char on a non-directional bond"),
    };
    if up {
        '/'
    } else {
        '\\'
    }
}
