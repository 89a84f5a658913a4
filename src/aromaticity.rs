//! Aromaticity flags.
//!
//! This crate does not run chemical aromaticity perception; the flags
//! are a structural derivation from declared bond kinds: a ring is
//! aromatic iff every bond in it is declared aromatic, an atom iff it
//! belongs to such a ring, a bond iff it lies in one. The flags live in
//! the molecule's caches and fall with ring info on any connectivity
//! change.

use crate::bond::BondNumber;
use crate::molecule::Molecule;

/// Fills the per-atom aromaticity cache and per-bond aromatic flags.
/// The caller has already ensured ring perception ran.
pub(crate) fn derive(m: &mut Molecule) {
    let mut atom_flags = vec![false; m.natoms()];
    let mut aromatic_bonds: Vec<BondNumber> = Vec::new();

    for ring in m.sssr.as_deref().expect("ring perception has run") {
        if !ring.is_aromatic {
            continue;
        }
        for &a in &ring.atoms {
            atom_flags[a] = true;
        }
        let len = ring.atoms.len();
        for i in 0..len {
            if let Some(b) = m.bond_between_atoms(ring.atoms[i], ring.atoms[(i + 1) % len]) {
                aromatic_bonds.push(b);
            }
        }
    }

    for b in aromatic_bonds {
        m.bonds[b].aromatic = true;
    }
    m.aromaticity = Some(atom_flags);
}
