//! Symmetry classes and canonical ranks.
//!
//! A Morgan-style refinement: atoms start from a hash of their intrinsic
//! invariants, then repeatedly rehash with their neighbours' ranks until
//! the partition stops splitting. The stable partition is the symmetry
//! classification; canonical ranks continue past it by artificially
//! distinguishing the lowest-numbered atom of the first tied class and
//! re-refining until the ranking is a permutation.

use std::hash::{Hash, Hasher};

use crate::bond::BondKind;
use crate::molecule::{Molecule, SymmetryInfo};

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

#[derive(Hash)]
struct AtomInvariant {
    atomic_num: u8,
    degree: u8,
    formal_charge: i8,
    isotope: u16,
    implicit_hydrogens: u8,
    singles: u8,
    doubles: u8,
    triples: u8,
    aromatics: u8,
    others: u8,
}

fn atom_invariant(m: &Molecule, a: usize, use_isotopes: bool) -> AtomInvariant {
    let atom = m.atom(a);
    let mut singles = 0u8;
    let mut doubles = 0u8;
    let mut triples = 0u8;
    let mut aromatics = 0u8;
    let mut others = 0u8;
    for &b in atom.bond_numbers() {
        match m.bond(b).kind {
            BondKind::Single => singles += 1,
            BondKind::Double => doubles += 1,
            BondKind::Triple => triples += 1,
            BondKind::Aromatic => aromatics += 1,
            BondKind::Coordination | BondKind::NotABond => others += 1,
        }
    }
    AtomInvariant {
        atomic_num: atom.element.map_or(0, |e| e.atomic_num()),
        degree: atom.ncon() as u8,
        formal_charge: atom.formal_charge,
        isotope: if use_isotopes { atom.isotope } else { 0 },
        implicit_hydrogens: if atom.implicit_h_known {
            atom.implicit_hydrogens
        } else {
            0
        },
        singles,
        doubles,
        triples,
        aromatics,
        others,
    }
}

fn hash_one<T: Hash>(value: &T) -> u64 {
    let mut h = Fnv1aHasher::new();
    value.hash(&mut h);
    h.finish()
}

/// Dense 0-based ranks; equal values share a rank.
fn ranks_from_values(values: &[u64]) -> Vec<usize> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| values[i]);
    let mut ranks = vec![0usize; n];
    for i in 1..n {
        ranks[order[i]] = if values[order[i]] == values[order[i - 1]] {
            ranks[order[i - 1]]
        } else {
            i
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn refine(m: &Molecule, ranks: &mut Vec<usize>) {
    let n = m.natoms();
    let mut prev_distinct = count_distinct(ranks);
    loop {
        let mut values = vec![0u64; n];
        for a in 0..n {
            let mut neighbour_ranks: Vec<usize> = m.neighbours(a).map(|nb| ranks[nb]).collect();
            neighbour_ranks.sort_unstable();
            let mut h = Fnv1aHasher::new();
            ranks[a].hash(&mut h);
            neighbour_ranks.hash(&mut h);
            values[a] = h.finish();
        }
        let new_ranks = ranks_from_values(&values);
        let distinct = count_distinct(&new_ranks);
        if distinct <= prev_distinct {
            return;
        }
        *ranks = new_ranks;
        prev_distinct = distinct;
    }
}

pub(crate) fn compute(m: &Molecule) -> SymmetryInfo {
    let n = m.natoms();
    let use_isotopes = m.config.isotopes_affect_canonical_rank;

    let values: Vec<u64> = (0..n)
        .map(|a| hash_one(&atom_invariant(m, a, use_isotopes)))
        .collect();
    let mut ranks = ranks_from_values(&values);
    refine(m, &mut ranks);

    let symmetry_class = ranks.clone();

    // Break ties one class at a time until every atom is distinct.
    let mut canonical = ranks;
    while count_distinct(&canonical) < n {
        let chosen = first_tied_atom(&canonical);
        let values: Vec<u64> = (0..n)
            .map(|a| {
                let distinguished = a == chosen;
                hash_one(&(canonical[a], distinguished))
            })
            .collect();
        canonical = ranks_from_values(&values);
        refine(m, &mut canonical);
    }

    SymmetryInfo {
        symmetry_class,
        canonical_rank: canonical,
    }
}

/// The lowest-numbered atom in the smallest-ranked class that still has
/// more than one member.
fn first_tied_atom(ranks: &[usize]) -> usize {
    let mut best: Option<(usize, usize)> = None;
    for (a, &r) in ranks.iter().enumerate() {
        let class_size = ranks.iter().filter(|&&x| x == r).count();
        if class_size < 2 {
            continue;
        }
        match best {
            Some((br, _)) if br <= r => {}
            _ => best = Some((r, a)),
        }
    }
    best.map(|(_, a)| a).expect("a tied class exists")
}
