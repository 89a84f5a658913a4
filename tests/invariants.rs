//! Cross-module invariants: bond symmetry, cache invalidation, parallel
//! array lengths, ring-closure labelling, and transformation semantics.

use std::collections::HashMap;

use molcrab::{
    BondKind, ChiralCentre, ChiralNeighbour, Element, ElementTransformation, Molecule,
    MoleculeError, RingNumberManager, SmilesConfig,
};

fn carbon_chain(n: usize) -> Molecule {
    let mut m = Molecule::new();
    for _ in 0..n {
        m.add_atom(Some(Element::C));
    }
    for i in 1..n {
        m.add_bond(i - 1, i, BondKind::Single).unwrap();
    }
    m
}

fn aromatic_ring(m: &mut Molecule, atoms: &[usize]) {
    for i in 0..atoms.len() {
        m.add_bond(atoms[i], atoms[(i + 1) % atoms.len()], BondKind::Aromatic)
            .unwrap();
    }
}

fn biphenyl() -> Molecule {
    let mut m = Molecule::new();
    for _ in 0..12 {
        m.add_atom(Some(Element::C));
    }
    aromatic_ring(&mut m, &[0, 1, 2, 3, 4, 5]);
    aromatic_ring(&mut m, &[6, 7, 8, 9, 10, 11]);
    m.add_bond(5, 6, BondKind::Single).unwrap();
    m
}

/// Scans serialized text for ring-closure labels, pairing each opening
/// occurrence with its closing occurrence. Returns `(label, open_pos,
/// close_pos)` triples in closing order. Bracket atoms are skipped so
/// isotope and H-count digits are not mistaken for labels.
fn closure_pairs(text: &str) -> Vec<(u32, usize, usize)> {
    let bytes = text.as_bytes();
    let mut open: HashMap<u32, usize> = HashMap::new();
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
            }
            b'%' => {
                let label = (bytes[i + 1] - b'0') as u32 * 10 + (bytes[i + 2] - b'0') as u32;
                match open.remove(&label) {
                    Some(start) => pairs.push((label, start, i)),
                    None => {
                        open.insert(label, i);
                    }
                }
                i += 2;
            }
            d if d.is_ascii_digit() => {
                let label = (d - b'0') as u32;
                match open.remove(&label) {
                    Some(start) => pairs.push((label, start, i)),
                    None => {
                        open.insert(label, i);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    assert!(open.is_empty(), "unclosed ring labels in '{text}'");
    pairs
}

#[test]
fn bond_symmetry_holds_through_mutations() {
    let mut m = carbon_chain(8);
    m.add_bond(7, 0, BondKind::Single).unwrap();
    assert!(m.validate().is_ok());

    m.remove_atom(3);
    assert!(m.validate().is_ok());

    m.swap_atoms(0, 5);
    assert!(m.validate().is_ok());

    m.remove_atoms(&[6, 1]).unwrap();
    assert!(m.validate().is_ok());

    m.resize(3);
    assert!(m.validate().is_ok());
}

#[test]
fn mutations_never_leave_stale_derived_data() {
    let mut m = carbon_chain(6);
    assert_eq!(m.nrings(), 0);
    assert_eq!(m.number_fragments(), 1);
    // Chain ends and middles are in different symmetry classes.
    assert_ne!(m.symmetry_class(0), m.symmetry_class(2));

    m.add_bond(5, 0, BondKind::Single).unwrap();
    assert_eq!(m.nrings(), 1, "ring count must reflect the new bond");
    assert!(m.is_ring_atom(0));
    // In the ring every atom is equivalent; stale chain classes would
    // still differ.
    assert_eq!(m.symmetry_class(0), m.symmetry_class(2));

    m.remove_bond_between_atoms(2, 3).unwrap();
    assert_eq!(m.nrings(), 0);
    assert!(!m.is_ring_atom(0));
    assert_eq!(m.number_fragments(), 1);
    assert_ne!(m.symmetry_class(2), m.symmetry_class(4));
}

#[test]
fn aromaticity_follows_connectivity_changes() {
    let mut m = Molecule::new();
    for _ in 0..6 {
        m.add_atom(Some(Element::C));
    }
    aromatic_ring(&mut m, &[0, 1, 2, 3, 4, 5]);
    assert!(m.is_aromatic(0));

    // Breaking the ring kills aromaticity everywhere.
    m.remove_bond_between_atoms(0, 1).unwrap();
    for a in 0..6 {
        assert!(!m.is_aromatic(a));
    }
}

#[test]
fn parallel_arrays_track_atom_count_everywhere() {
    let mut m = carbon_chain(4);
    m.set_charge(2, 0.5);
    m.set_atom_type(1, 7);
    assert!(m.validate().is_ok());

    m.add_atom(Some(Element::N));
    assert!(m.validate().is_ok());

    m.remove_atom(0);
    assert!(m.validate().is_ok());

    m.resize(2);
    assert!(m.validate().is_ok());

    let copy = m.clone();
    assert!(copy.validate().is_ok());

    let mut other = carbon_chain(2);
    other.copy_charges(&m).unwrap();
    assert!(other.validate().is_ok());
}

#[test]
fn biphenyl_ring_labels_round_trip_with_reuse() {
    let mut m = biphenyl();
    let text = m.smiles().to_string();
    let pairs = closure_pairs(&text);
    assert_eq!(pairs.len(), 2, "two rings expected in '{text}'");

    // Reuse enabled: both rings use label 1, and the second opens only
    // after the first has closed.
    let (l1, _o1, c1) = pairs[0];
    let (l2, o2, _c2) = pairs[1];
    assert_eq!(l1, 1);
    assert_eq!(l2, 1);
    assert!(c1 < o2, "label lifetimes overlap in '{text}'");
}

#[test]
fn biphenyl_ring_labels_distinct_without_reuse() {
    let mut m = biphenyl();
    let config = SmilesConfig {
        reuse_ring_closure_numbers: false,
        ..SmilesConfig::default()
    };
    let text = molcrab::write_smiles(&mut m, &config);
    let pairs = closure_pairs(&text);
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, 1);
    assert_eq!(pairs[1].0, 2);
}

#[test]
fn label_formatting_boundary() {
    // Ten disjoint bonded pairs give the manager real bonds to track.
    let mut m = Molecule::new();
    for _ in 0..10 {
        let a = m.add_atom(Some(Element::C));
        let b = m.add_atom(Some(Element::C));
        m.add_bond(a, b, BondKind::Single).unwrap();
    }
    let config = SmilesConfig::default();
    let mut rnm = RingNumberManager::new(10, &config);
    let mut out = String::new();
    for b in 0..9 {
        rnm.store_ring(&mut out, &m, b, 2 * b);
    }
    assert!(out.ends_with('9'), "label 9 must print bare: '{out}'");
    out.clear();
    rnm.store_ring(&mut out, &m, 9, 18);
    assert_eq!(out, "%10", "label 10 must use the percent form");
}

#[test]
fn substitution_of_bonded_atoms_rejected_without_mutation() {
    let mut m = carbon_chain(5);
    m.set_charge(1, -1.0);
    m.add_chiral_centre(ChiralCentre::new(
        2,
        [
            ChiralNeighbour::Atom(1),
            ChiralNeighbour::Atom(3),
            ChiralNeighbour::ImplicitHydrogen,
            ChiralNeighbour::LonePair,
        ],
    ))
    .unwrap();
    let snapshot = m.clone();

    assert_eq!(
        m.stereo_preserving_substitute(2, 3),
        Err(MoleculeError::AlreadyBonded { a1: 2, a2: 3 })
    );
    assert_eq!(m, snapshot, "failed substitution must not mutate");
}

#[test]
fn remove_atom_renumbering_matches_expected_chain() {
    // 0-1-2-3-4 minus atom 2: old 3 is new 2, old 4 is new 3.
    let mut m = carbon_chain(5);
    m.remove_atom(2);
    assert_eq!(m.natoms(), 4);
    assert!(m.are_bonded(0, 1));
    assert!(m.are_bonded(2, 3));
    assert!(!m.are_bonded(1, 2));
    assert_eq!(m.nbonds(), 2);
    assert_eq!(m.number_fragments(), 2);
}

#[test]
fn element_transformation_end_to_end() {
    let mut m = Molecule::new();
    m.add_atom(Some(Element::C));
    m.add_atom(Some(Element::C));
    m.add_atom(Some(Element::O));
    m.add_atom(Some(Element::N));

    let mut t = ElementTransformation::build("O=S").unwrap();
    assert_eq!(t.process(&mut m), 1);
    assert_eq!(m.element(2), Some(Element::S));
    assert_eq!(t.atoms_changed(), 1);
    assert_eq!(t.molecules_changed(), 1);

    assert_eq!(t.process(&mut m), 0);
    assert_eq!(t.molecules_changed(), 1);
    assert_eq!(t.molecules_processed(), 2);
}

#[test]
fn serialized_text_tracks_element_edits() {
    let mut m = carbon_chain(3);
    assert_eq!(m.smiles(), "CCC");
    let mut t = ElementTransformation::build("C=N").unwrap();
    t.process(&mut m);
    assert_eq!(m.smiles(), "NNN");
}
