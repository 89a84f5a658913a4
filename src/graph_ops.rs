use std::collections::VecDeque;

use petgraph::unionfind::UnionFind;

use crate::molecule::{FragmentInfo, Molecule};

/// Assigns every atom a connected-component (fragment) id. Ids are dense
/// and numbered in order of first appearance by atom number, so fragment
/// 0 always contains atom 0.
pub(crate) fn assign_fragments(m: &Molecule) -> FragmentInfo {
    let n = m.natoms();
    let mut uf = UnionFind::<usize>::new(n);
    for bond in m.bonds() {
        uf.union(bond.a1, bond.a2);
    }

    let mut root_id: Vec<usize> = vec![usize::MAX; n];
    let mut membership = vec![0usize; n];
    let mut count = 0;
    for a in 0..n {
        let root = uf.find(a);
        if root_id[root] == usize::MAX {
            root_id[root] = count;
            count += 1;
        }
        membership[a] = root_id[root];
    }

    FragmentInfo { membership, count }
}

/// All-pairs shortest path lengths in bonds, by BFS from every atom.
/// `u32::MAX` marks atom pairs in different fragments.
pub(crate) fn distance_matrix(m: &Molecule) -> Vec<Vec<u32>> {
    let n = m.natoms();
    let mut dist = vec![vec![u32::MAX; n]; n];
    for start in 0..n {
        let row = &mut dist[start];
        row[start] = 0;
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            let d = row[current];
            for neighbour in m.neighbours(current) {
                if row[neighbour] == u32::MAX {
                    row[neighbour] = d + 1;
                    queue.push_back(neighbour);
                }
            }
        }
    }
    dist
}
