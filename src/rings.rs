//! SSSR perception.
//!
//! Candidate rings are the shortest cycles through each bond; a greedy
//! pass over the candidates (smallest first) keeps those that are
//! linearly independent over GF(2) in edge space, until the cyclomatic
//! count is reached. Molecules here are small graphs, so the quadratic
//! candidate search is fine.

use std::collections::VecDeque;

use crate::bond::{AtomNumber, BondKind, BondNumber};
use crate::molecule::{Molecule, Ring};

/// Fills the molecule's ring caches: the SSSR ring set, per-atom ring
/// membership counts, per-bond ring counts and ring aromaticity flags.
pub(crate) fn perceive_sssr(m: &mut Molecule) {
    let expected = m.nrings();
    let rings = if expected == 0 {
        Vec::new()
    } else {
        find_rings(m, expected)
    };

    let mut membership = vec![0u32; m.natoms()];
    let mut bond_counts = vec![0u32; m.nbonds()];
    let mut out = Vec::with_capacity(rings.len());

    for ring in rings {
        for &a in &ring {
            membership[a] += 1;
        }
        let mut aromatic = true;
        for i in 0..ring.len() {
            let b = m
                .bond_between_atoms(ring[i], ring[(i + 1) % ring.len()])
                .expect("consecutive ring atoms are bonded");
            bond_counts[b] += 1;
            if m.bond(b).kind != BondKind::Aromatic {
                aromatic = false;
            }
        }
        out.push(Ring {
            atoms: ring,
            is_aromatic: aromatic,
        });
    }

    for (b, &count) in bond_counts.iter().enumerate() {
        m.bonds[b].ring_bond_count = Some(count);
    }
    m.ring_membership = Some(membership);
    m.sssr = Some(out);
}

fn find_rings(m: &Molecule, expected: usize) -> Vec<Vec<AtomNumber>> {
    let mut candidates: Vec<Vec<AtomNumber>> = (0..m.nbonds())
        .filter_map(|b| shortest_cycle_through(m, b))
        .map(|ring| normalize_ring(&ring))
        .collect();
    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    candidates.dedup();

    let num_edges = m.nbonds();
    let mut basis: Vec<Vec<u64>> = Vec::with_capacity(expected);
    let mut rings = Vec::with_capacity(expected);
    for ring in candidates {
        if rings.len() >= expected {
            break;
        }
        let bv = edge_bitvector(m, &ring, num_edges);
        if add_to_basis(&mut basis, bv) {
            rings.push(ring);
        }
    }
    rings
}

/// The smallest cycle containing bond `b`: a shortest path between its
/// endpoints that does not use `b` itself, closed by `b`.
fn shortest_cycle_through(m: &Molecule, b: BondNumber) -> Option<Vec<AtomNumber>> {
    let bond = m.bond(b);
    let (src, dst) = (bond.a1, bond.a2);
    let n = m.natoms();

    let mut pred: Vec<Option<AtomNumber>> = vec![None; n];
    let mut visited = vec![false; n];
    visited[src] = true;
    let mut queue = VecDeque::new();
    queue.push_back(src);

    'search: while let Some(current) = queue.pop_front() {
        for &nb in m.atom(current).bond_numbers() {
            if nb == b {
                continue;
            }
            let neighbour = m.bond(nb).other(current);
            if visited[neighbour] {
                continue;
            }
            visited[neighbour] = true;
            pred[neighbour] = Some(current);
            if neighbour == dst {
                break 'search;
            }
            queue.push_back(neighbour);
        }
    }

    if !visited[dst] {
        return None;
    }

    let mut path = vec![dst];
    let mut cur = dst;
    while let Some(p) = pred[cur] {
        path.push(p);
        cur = p;
    }
    path.reverse();
    // A two-atom "cycle" would need a parallel bond; not a ring.
    if path.len() < 3 {
        return None;
    }
    Some(path)
}

fn edge_bitvector(m: &Molecule, ring: &[AtomNumber], num_edges: usize) -> Vec<u64> {
    let mut bv = vec![0u64; num_edges.div_ceil(64)];
    let len = ring.len();
    for i in 0..len {
        if let Some(b) = m.bond_between_atoms(ring[i], ring[(i + 1) % len]) {
            bv[b / 64] |= 1u64 << (b % 64);
        }
    }
    bv
}

/// Gaussian elimination over GF(2). Returns false when `candidate` is in
/// the span of `basis`, otherwise adds the reduced vector and returns
/// true.
fn add_to_basis(basis: &mut Vec<Vec<u64>>, mut candidate: Vec<u64>) -> bool {
    for row in basis.iter() {
        if let Some(p) = leading_bit(row) {
            if candidate[p / 64] & (1u64 << (p % 64)) != 0 {
                for (c, r) in candidate.iter_mut().zip(row.iter()) {
                    *c ^= *r;
                }
            }
        }
    }
    if candidate.iter().all(|&w| w == 0) {
        return false;
    }
    basis.push(candidate);
    true
}

fn leading_bit(bv: &[u64]) -> Option<usize> {
    bv.iter()
        .enumerate()
        .find(|(_, &w)| w != 0)
        .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
}

/// Rotates the ring to start at its smallest atom number, walking in the
/// direction that puts the smaller of its two neighbours second. Gives
/// every cycle a single representative for deduplication.
fn normalize_ring(ring: &[AtomNumber]) -> Vec<AtomNumber> {
    let len = ring.len();
    let start = ring
        .iter()
        .enumerate()
        .min_by_key(|&(_, a)| a)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut out: Vec<AtomNumber> = (0..len).map(|i| ring[(start + i) % len]).collect();
    if len > 2 && out[1] > out[len - 1] {
        out[1..].reverse();
    }
    out
}
