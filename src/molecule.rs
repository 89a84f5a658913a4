use std::fmt;

use tracing::{debug, warn};

use crate::atom::Atom;
use crate::bond::{AtomNumber, Bond, BondKind, BondNumber, Direction};
use crate::chirality::ChiralCentre;
use crate::element::Element;
use crate::records::DataRecord;

/// Per-molecule policy. Replaces the file-scope switches of older
/// implementations so molecules with different policies can coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MolConfig {
    /// When set, adding a bond between two already-bonded atoms panics
    /// (after a debug dump) instead of returning an error.
    pub duplicate_bond_fatal: bool,
    /// Whether isotopic labels participate in symmetry/canonical ranking.
    pub isotopes_affect_canonical_rank: bool,
}

impl Default for MolConfig {
    fn default() -> Self {
        MolConfig {
            duplicate_bond_fatal: false,
            isotopes_affect_canonical_rank: true,
        }
    }
}

/// How much cached state a mutation invalidates.
///
/// Every mutator funnels through [`Molecule::invalidate`] with one of
/// these scopes; no mutator hand-rolls its own partial cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    /// Connectivity changed: atoms or bonds added, removed or rewired.
    Structural,
    /// A single atom's intrinsic property changed (element, charge).
    AtomProperty,
    /// Only an isotope changed.
    Isotope,
}

/// Recoverable errors. The structure is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoleculeError {
    AlreadyBonded { a1: AtomNumber, a2: AtomNumber },
    NotBonded { a1: AtomNumber, a2: AtomNumber },
    InvalidAtomNumber { atom: AtomNumber, natoms: usize },
    AtomCountMismatch { expected: usize, got: usize },
}

impl fmt::Display for MoleculeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBonded { a1, a2 } => {
                write!(f, "atoms {a1} and {a2} are already bonded")
            }
            Self::NotBonded { a1, a2 } => write!(f, "atoms {a1} and {a2} are not bonded"),
            Self::InvalidAtomNumber { atom, natoms } => {
                write!(f, "atom number {atom} out of range for {natoms} atoms")
            }
            Self::AtomCountMismatch { expected, got } => {
                write!(f, "atom count mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for MoleculeError {}

/// One SSSR ring: a cyclic atom sequence plus its derived aromaticity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub atoms: Vec<AtomNumber>,
    pub is_aromatic: bool,
}

impl Ring {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn contains(&self, a: AtomNumber) -> bool {
        self.atoms.contains(&a)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SymmetryInfo {
    pub symmetry_class: Vec<usize>,
    pub canonical_rank: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct FragmentInfo {
    pub membership: Vec<usize>,
    pub count: usize,
}

/// One defect found by [`Molecule::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    BondEndpointOutOfRange { bond: BondNumber, endpoint: AtomNumber },
    IncidentBondOutOfRange { atom: AtomNumber, bond: BondNumber },
    IncidentBondMismatch { atom: AtomNumber, bond: BondNumber },
    AsymmetricBond { a1: AtomNumber, a2: AtomNumber },
    ChargesLengthMismatch { len: usize, natoms: usize },
    AtomTypesLengthMismatch { len: usize, natoms: usize },
    RingCountInconsistent { nrings: Option<usize>, sssr: usize },
    ChiralCentreInvalidAtom { centre: AtomNumber, atom: AtomNumber },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BondEndpointOutOfRange { bond, endpoint } => {
                write!(f, "bond {bond} references out-of-range atom {endpoint}")
            }
            Self::IncidentBondOutOfRange { atom, bond } => {
                write!(f, "atom {atom} lists out-of-range bond {bond}")
            }
            Self::IncidentBondMismatch { atom, bond } => {
                write!(f, "atom {atom} lists bond {bond} which does not involve it")
            }
            Self::AsymmetricBond { a1, a2 } => {
                write!(f, "asymmetric bond: {a1} lists {a2} but not vice versa")
            }
            Self::ChargesLengthMismatch { len, natoms } => {
                write!(f, "charge array length {len} != atom count {natoms}")
            }
            Self::AtomTypesLengthMismatch { len, natoms } => {
                write!(f, "atom type array length {len} != atom count {natoms}")
            }
            Self::RingCountInconsistent { nrings, sssr } => {
                write!(f, "ring count {nrings:?} inconsistent with {sssr} SSSR rings")
            }
            Self::ChiralCentreInvalidAtom { centre, atom } => {
                write!(f, "chiral centre at {centre} references invalid atom {atom}")
            }
        }
    }
}

/// Structured result of the structural self-check. Never aborts; tests
/// and defensive callers inspect the issue list.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

/// A mutable molecular graph with cached derived properties.
///
/// Atoms are stored in an owned arena and addressed by dense
/// [`AtomNumber`] indices; removing an atom shifts every higher index
/// down and rewrites all index-holding structures. Bonds live in a
/// second arena, referenced from both endpoint atoms (symmetrically —
/// see [`Molecule::validate`]).
///
/// Derived properties (ring set, aromaticity, canonical ranks, fragment
/// membership, distances, serialization text) are computed lazily and
/// discarded by the invalidation cascade whenever a mutation could make
/// them stale. Mutators never return with a stale cache readable.
pub struct Molecule {
    pub(crate) name: String,
    pub(crate) atoms: Vec<Atom>,
    pub(crate) bonds: Vec<Bond>,
    pub(crate) chiral_centres: Vec<ChiralCentre>,
    pub(crate) charges: Option<Vec<f32>>,
    pub(crate) atom_types: Option<Vec<u32>>,
    pub(crate) records: Vec<DataRecord>,
    pub(crate) config: MolConfig,

    // Lazily computed caches. Option::None is the "not computed"
    // sentinel throughout.
    pub(crate) smiles: Option<String>,
    pub(crate) nrings: Option<usize>,
    pub(crate) sssr: Option<Vec<Ring>>,
    pub(crate) ring_membership: Option<Vec<u32>>,
    pub(crate) aromaticity: Option<Vec<bool>>,
    pub(crate) symmetry: Option<SymmetryInfo>,
    pub(crate) fragments: Option<FragmentInfo>,
    pub(crate) distances: Option<Vec<Vec<u32>>>,
}

impl Molecule {
    pub fn new() -> Molecule {
        Molecule::with_config(MolConfig::default())
    }

    pub fn with_config(config: MolConfig) -> Molecule {
        Molecule {
            name: String::new(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            chiral_centres: Vec::new(),
            charges: None,
            atom_types: None,
            records: Vec::new(),
            config,
            smiles: None,
            nrings: None,
            sssr: None,
            ring_membership: None,
            aromaticity: None,
            symmetry: None,
            fragments: None,
            distances: None,
        }
    }

    pub fn config(&self) -> &MolConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // ------------------------------------------------------------------
    // Basic queries
    // ------------------------------------------------------------------

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn nbonds(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atom(&self, a: AtomNumber) -> &Atom {
        &self.atoms[a]
    }

    pub fn bond(&self, b: BondNumber) -> &Bond {
        &self.bonds[b]
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn element(&self, a: AtomNumber) -> Option<Element> {
        self.atoms[a].element
    }

    pub fn isotope(&self, a: AtomNumber) -> u16 {
        self.atoms[a].isotope
    }

    pub fn formal_charge(&self, a: AtomNumber) -> i8 {
        self.atoms[a].formal_charge
    }

    /// Connectivity of atom `a`.
    pub fn ncon(&self, a: AtomNumber) -> usize {
        self.atoms[a].ncon()
    }

    /// Neighbours of `a` in connection order.
    pub fn neighbours(&self, a: AtomNumber) -> impl Iterator<Item = AtomNumber> + '_ {
        self.atoms[a]
            .bond_numbers()
            .iter()
            .map(move |&b| self.bonds[b].other(a))
    }

    pub fn other(&self, b: BondNumber, a: AtomNumber) -> AtomNumber {
        self.bonds[b].other(a)
    }

    pub fn are_bonded(&self, a1: AtomNumber, a2: AtomNumber) -> bool {
        self.bond_between_atoms(a1, a2).is_some()
    }

    pub fn bond_between_atoms(&self, a1: AtomNumber, a2: AtomNumber) -> Option<BondNumber> {
        self.atoms[a1]
            .bond_numbers()
            .iter()
            .copied()
            .find(|&b| self.bonds[b].joins(a1, a2))
    }

    pub fn chiral_centres(&self) -> &[ChiralCentre] {
        &self.chiral_centres
    }

    pub fn chiral_centre_at_atom(&self, a: AtomNumber) -> Option<&ChiralCentre> {
        self.chiral_centres.iter().find(|c| c.centre() == a)
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Appends a new atom and returns its number.
    pub fn add_atom(&mut self, element: Option<Element>) -> AtomNumber {
        let a = self.add_atom_no_cascade(element);
        self.invalidate(ChangeScope::Structural);
        a
    }

    /// Like [`add_atom`](Self::add_atom) but skips the invalidation
    /// cascade. For incremental builders only; the builder must call
    /// [`invalidate`](Self::invalidate) once construction is complete.
    pub fn add_atom_partial(&mut self, element: Option<Element>) -> AtomNumber {
        self.add_atom_no_cascade(element)
    }

    fn add_atom_no_cascade(&mut self, element: Option<Element>) -> AtomNumber {
        let a = self.atoms.len();
        self.atoms.push(Atom::new(element));
        if let Some(charges) = &mut self.charges {
            charges.push(0.0);
        }
        if let Some(types) = &mut self.atom_types {
            types.push(0);
        }
        a
    }

    /// Adds a bond between two existing, distinct atoms.
    ///
    /// Duplicate bonds are rejected with [`MoleculeError::AlreadyBonded`]
    /// unless [`MolConfig::duplicate_bond_fatal`] is set, in which case
    /// this panics after dumping the molecule.
    pub fn add_bond(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
        kind: BondKind,
    ) -> Result<BondNumber, MoleculeError> {
        let b = self.add_bond_no_cascade(a1, a2, kind)?;
        // The declared implicit hydrogen counts were for the old
        // connectivity.
        self.atoms[a1].unset_implicit_hydrogens();
        self.atoms[a2].unset_implicit_hydrogens();
        self.invalidate(ChangeScope::Structural);
        self.reconcile_chiral_centres_with_new_bond(a1, a2, b);
        Ok(b)
    }

    /// Partial-build variant: no cascade, no chiral reconciliation.
    pub fn add_bond_partial(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
        kind: BondKind,
    ) -> Result<BondNumber, MoleculeError> {
        self.add_bond_no_cascade(a1, a2, kind)
    }

    fn add_bond_no_cascade(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
        kind: BondKind,
    ) -> Result<BondNumber, MoleculeError> {
        self.assert_two_atoms(a1, a2);
        if self.are_bonded(a1, a2) {
            warn!(a1, a2, "attempt to add an existing bond");
            if self.config.duplicate_bond_fatal {
                debug!(molecule = ?self.debug_summary(), "duplicate bond, fatal policy");
                panic!("atoms {a1} and {a2} are already bonded");
            }
            return Err(MoleculeError::AlreadyBonded { a1, a2 });
        }
        let b = self.bonds.len();
        self.bonds.push(Bond::new(a1, a2, kind));
        self.atoms[a1].register_bond(b);
        self.atoms[a2].register_bond(b);
        Ok(b)
    }

    /// When a new bond lands on an atom that is a chiral centre, the
    /// centre must absorb the new neighbour into a free implicit-H or
    /// lone-pair slot, or be discarded if the arrangement is no longer
    /// tetrahedral (more than 4 connections, or a non-single bond).
    fn reconcile_chiral_centres_with_new_bond(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
        b: BondNumber,
    ) {
        let non_single = !self.bonds[b].is_single();
        let mut i = 0;
        while i < self.chiral_centres.len() {
            let centre_atom = self.chiral_centres[i].centre();
            let (zatom, zother) = if centre_atom == a1 {
                (a1, a2)
            } else if centre_atom == a2 {
                (a2, a1)
            } else {
                i += 1;
                continue;
            };

            self.atoms[zatom].unset_implicit_hydrogens();

            if self.atoms[zatom].ncon() > 4 || non_single {
                self.chiral_centres.remove(i);
                continue;
            }

            let c = &mut self.chiral_centres[i];
            if c.implicit_hydrogen_count() == 1 {
                c.implicit_hydrogen_becomes_atom(zother);
            } else if c.lone_pair_count() == 1 {
                c.lone_pair_becomes_atom(zother);
            } else if c.explicit_neighbour_count() > 0 {
                warn!(
                    atom = zatom,
                    "chiral centre has no free slot for new neighbour"
                );
            }
            i += 1;
        }
    }

    /// Registers a chiral centre. All referenced atom numbers must be
    /// valid.
    pub fn add_chiral_centre(&mut self, centre: ChiralCentre) -> Result<(), MoleculeError> {
        let n = self.natoms();
        let check = |a: AtomNumber| -> Result<(), MoleculeError> {
            if a >= n {
                return Err(MoleculeError::InvalidAtomNumber { atom: a, natoms: n });
            }
            Ok(())
        };
        check(centre.centre())?;
        for a in centre.explicit_neighbours() {
            check(a)?;
        }
        self.chiral_centres.push(centre);
        self.invalidate(ChangeScope::AtomProperty);
        Ok(())
    }

    pub fn remove_chiral_centre_at(&mut self, a: AtomNumber) {
        self.chiral_centres.retain(|c| c.centre() != a);
        self.invalidate(ChangeScope::AtomProperty);
    }

    // ------------------------------------------------------------------
    // Atom property mutation
    // ------------------------------------------------------------------

    pub fn set_element(&mut self, a: AtomNumber, element: Option<Element>) {
        self.assert_atom(a);
        self.atoms[a].element = element;
        self.invalidate(ChangeScope::AtomProperty);
    }

    pub fn set_isotope(&mut self, a: AtomNumber, isotope: u16) {
        self.assert_atom(a);
        self.atoms[a].isotope = isotope;
        self.invalidate(ChangeScope::Isotope);
    }

    pub fn set_formal_charge(&mut self, a: AtomNumber, charge: i8) {
        self.assert_atom(a);
        self.atoms[a].formal_charge = charge;
        self.invalidate(ChangeScope::AtomProperty);
    }

    /// Avoids the cascade when the charge is already the requested value.
    pub fn set_formal_charge_if_different(&mut self, a: AtomNumber, charge: i8) -> bool {
        self.assert_atom(a);
        if self.atoms[a].formal_charge == charge {
            return false;
        }
        self.set_formal_charge(a, charge);
        true
    }

    pub fn set_implicit_hydrogens(&mut self, a: AtomNumber, count: u8) {
        self.assert_atom(a);
        self.atoms[a].implicit_hydrogens = count;
        self.atoms[a].implicit_h_known = true;
        self.invalidate(ChangeScope::AtomProperty);
    }

    /// Coordinates are not part of any cached derived property, so no
    /// cascade runs.
    pub fn set_coordinates(&mut self, a: AtomNumber, x: f64, y: f64, z: f64) {
        self.assert_atom(a);
        let atom = &mut self.atoms[a];
        atom.x = x;
        atom.y = y;
        atom.z = z;
    }

    pub fn set_bond_direction(&mut self, b: BondNumber, direction: Direction) {
        self.bonds[b].direction = direction;
        self.smiles = None;
    }

    // ------------------------------------------------------------------
    // Removal and renumbering
    // ------------------------------------------------------------------

    /// Removes one atom: incident bonds go first, parallel arrays and
    /// chiral centres are adjusted, then every index above `a` shifts
    /// down by one.
    pub fn remove_atom(&mut self, a: AtomNumber) {
        self.assert_atom(a);
        self.remove_atom_internal(a);
        self.invalidate(ChangeScope::Structural);
    }

    /// Removes a set of atoms, processing in descending order so earlier
    /// removals do not disturb pending indices. Cascades once. Invalid
    /// indices are rejected up front and nothing is removed.
    pub fn remove_atoms(&mut self, atoms: &[AtomNumber]) -> Result<usize, MoleculeError> {
        if atoms.is_empty() {
            return Ok(0);
        }
        let n = self.natoms();
        if let Some(&bad) = atoms.iter().find(|&&a| a >= n) {
            warn!(atom = bad, natoms = n, "remove_atoms: invalid atom number");
            return Err(MoleculeError::InvalidAtomNumber { atom: bad, natoms: n });
        }
        let mut sorted = atoms.to_vec();
        sorted.sort_unstable_by(|x, y| y.cmp(x));
        sorted.dedup();
        for &a in &sorted {
            self.remove_atom_internal(a);
        }
        self.invalidate(ChangeScope::Structural);
        Ok(sorted.len())
    }

    fn remove_atom_internal(&mut self, a: AtomNumber) {
        let was_hydrogen = self.atoms[a].is_hydrogen();

        self.sever_directional_bonds(a);

        while self.atoms[a].ncon() > 0 {
            let b = self.atoms[a].bond_numbers()[0];
            self.remove_bond_entry(b);
        }

        if let Some(charges) = &mut self.charges {
            charges.remove(a);
        }
        if let Some(types) = &mut self.atom_types {
            types.remove(a);
        }

        self.chiral_centres
            .retain_mut(|c| c.adjust_for_removal(a, was_hydrogen));

        self.atoms.remove(a);
        for bond in &mut self.bonds {
            bond.shift_down_above(a);
        }
    }

    /// Directional markers encode the configuration of a nearby double
    /// bond. When `a` leaves the graph, any configuration it
    /// participated in loses its markers.
    fn sever_directional_bonds(&mut self, a: AtomNumber) {
        let mut doubles: Vec<BondNumber> = Vec::new();
        for &b in self.atoms[a].bond_numbers() {
            let bond = &self.bonds[b];
            if bond.kind == BondKind::Double {
                doubles.push(b);
            } else if bond.is_directional() {
                let o = bond.other(a);
                for &nb in self.atoms[o].bond_numbers() {
                    if self.bonds[nb].kind == BondKind::Double {
                        doubles.push(nb);
                    }
                }
            }
        }
        for d in doubles {
            let (e1, e2) = (self.bonds[d].a1, self.bonds[d].a2);
            for e in [e1, e2] {
                let incident: Vec<BondNumber> = self.atoms[e].bond_numbers().to_vec();
                for b in incident {
                    self.bonds[b].direction = Direction::None;
                }
            }
        }
    }

    /// Removes bond `b` from the bond list and both incident lists,
    /// shifting higher bond numbers down. No cascade.
    fn remove_bond_entry(&mut self, b: BondNumber) {
        let (a1, a2) = (self.bonds[b].a1, self.bonds[b].a2);
        self.atoms[a1].unregister_bond(b);
        self.atoms[a1].unset_implicit_hydrogens();
        self.atoms[a2].unregister_bond(b);
        self.atoms[a2].unset_implicit_hydrogens();
        self.bonds.remove(b);
        for atom in &mut self.atoms {
            atom.shift_bonds_above(b);
        }
    }

    pub fn remove_bond(&mut self, b: BondNumber) {
        assert!(b < self.bonds.len(), "bond number {b} out of range");
        self.remove_bond_entry(b);
        self.invalidate(ChangeScope::Structural);
    }

    pub fn remove_bond_between_atoms(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
    ) -> Result<(), MoleculeError> {
        self.assert_two_atoms(a1, a2);
        match self.bond_between_atoms(a1, a2) {
            Some(b) => {
                self.remove_bond_entry(b);
                self.invalidate(ChangeScope::Structural);
                Ok(())
            }
            None => Err(MoleculeError::NotBonded { a1, a2 }),
        }
    }

    pub fn remove_all_bonds(&mut self) {
        self.bonds.clear();
        for atom in &mut self.atoms {
            atom.bonds.clear();
        }
        self.chiral_centres.clear();
        self.invalidate(ChangeScope::Structural);
    }

    pub fn delete_all_atoms_and_bonds(&mut self) {
        self.atoms.clear();
        self.bonds.clear();
        self.chiral_centres.clear();
        if let Some(charges) = &mut self.charges {
            charges.clear();
        }
        if let Some(types) = &mut self.atom_types {
            types.clear();
        }
        self.invalidate(ChangeScope::Structural);
    }

    /// Truncates the molecule to its first `new_size` atoms. Bonds and
    /// chiral centres touching removed atoms are dropped. No-op when
    /// `new_size` is not smaller than the current atom count.
    pub fn resize(&mut self, new_size: usize) {
        if new_size >= self.natoms() {
            return;
        }
        let mut b = self.bonds.len();
        while b > 0 {
            b -= 1;
            if self.bonds[b].a1 >= new_size || self.bonds[b].a2 >= new_size {
                self.remove_bond_entry(b);
            }
        }
        self.chiral_centres
            .retain(|c| !c.references_at_or_above(new_size));
        self.atoms.truncate(new_size);
        if let Some(charges) = &mut self.charges {
            charges.truncate(new_size);
        }
        if let Some(types) = &mut self.atom_types {
            types.truncate(new_size);
        }
        self.invalidate(ChangeScope::Structural);
    }

    /// Exchanges the atom numbers of `i1` and `i2`, rewriting bonds,
    /// parallel arrays and chiral centres.
    pub fn swap_atoms(&mut self, i1: AtomNumber, i2: AtomNumber) {
        self.assert_two_atoms(i1, i2);
        self.atoms.swap(i1, i2);
        if let Some(charges) = &mut self.charges {
            charges.swap(i1, i2);
        }
        if let Some(types) = &mut self.atom_types {
            types.swap(i1, i2);
        }
        for c in &mut self.chiral_centres {
            if c.involves(i1) || c.involves(i2) {
                c.atom_numbers_swapped(i1, i2);
            }
        }
        let remap = |a: AtomNumber| {
            if a == i1 {
                i2
            } else if a == i2 {
                i1
            } else {
                a
            }
        };
        for bond in &mut self.bonds {
            bond.a1 = remap(bond.a1);
            bond.a2 = remap(bond.a2);
        }
        self.invalidate(ChangeScope::Structural);
    }

    /// Replaces atom `a1` with atom `a2` in every bond and chiral centre,
    /// leaving `a1` disconnected. Fails without mutating when the two
    /// atoms are directly bonded.
    ///
    /// When `a1` (or `a2`) is itself the centre atom of a chiral centre,
    /// the centre follows the renumbering and the vacancy left behind is
    /// filled with the unique neighbour of the abandoned atom — possible
    /// only when the centre has a free implicit-hydrogen or lone-pair
    /// slot and the replacement atom had exactly one connection;
    /// otherwise the centre is dropped.
    pub fn stereo_preserving_substitute(
        &mut self,
        a1: AtomNumber,
        a2: AtomNumber,
    ) -> Result<(), MoleculeError> {
        self.assert_two_atoms(a1, a2);
        if self.are_bonded(a1, a2) {
            return Err(MoleculeError::AlreadyBonded { a1, a2 });
        }

        let mut i = self.chiral_centres.len();
        while i > 0 {
            i -= 1;
            let involves_a1 = self.chiral_centres[i].involves(a1);
            let involves_a2 = self.chiral_centres[i].involves(a2);
            if !involves_a1 && !involves_a2 {
                continue;
            }
            if involves_a1 && involves_a2 {
                // Cannot arise from a consistent substitution request.
                continue;
            }

            let is_central1 = self.chiral_centres[i].centre() == a1;
            let is_central2 = self.chiral_centres[i].centre() == a2;

            if involves_a1 {
                self.chiral_centres[i].change_atom_number(a1, a2);
            }

            if !is_central1 && !is_central2 {
                continue;
            }

            let c = &self.chiral_centres[i];
            if c.implicit_hydrogen_count() == 0 && c.lone_pair_count() == 0 {
                self.chiral_centres.remove(i);
                continue;
            }

            let vacancy_fill = if is_central1 && self.atoms[a2].ncon() == 1 {
                Some(self.other(self.atoms[a2].bond_numbers()[0], a2))
            } else if is_central2 && self.atoms[a1].ncon() == 1 {
                Some(self.other(self.atoms[a1].bond_numbers()[0], a1))
            } else {
                None
            };

            match vacancy_fill {
                None => {
                    self.chiral_centres.remove(i);
                }
                Some(o) => {
                    let c = &mut self.chiral_centres[i];
                    if c.implicit_hydrogen_count() > 0 {
                        c.implicit_hydrogen_becomes_atom(o);
                    } else {
                        c.lone_pair_becomes_atom(o);
                    }
                }
            }
        }

        for b in 0..self.bonds.len() {
            let bond = &mut self.bonds[b];
            if bond.a1 == a1 {
                bond.a1 = a2;
            } else if bond.a2 == a1 {
                bond.a2 = a2;
            } else {
                continue;
            }
            self.atoms[a2].register_bond(b);
        }

        self.atoms[a2].unset_implicit_hydrogens();
        self.atoms[a1].bonds.clear();
        self.atoms[a1].unset_implicit_hydrogens();

        self.invalidate(ChangeScope::Structural);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parallel arrays: partial charges and atom types
    // ------------------------------------------------------------------

    pub fn has_charges(&self) -> bool {
        self.charges.is_some()
    }

    pub fn set_charge(&mut self, a: AtomNumber, charge: f32) {
        self.assert_atom(a);
        let n = self.natoms();
        self.charges.get_or_insert_with(|| vec![0.0; n])[a] = charge;
        self.invalidate(ChangeScope::AtomProperty);
    }

    pub fn charge_on_atom(&self, a: AtomNumber) -> f32 {
        self.charges.as_ref().map_or(0.0, |c| c[a])
    }

    /// Copies the charge array from another molecule of identical atom
    /// count; clears this molecule's charges when the source has none.
    pub fn copy_charges(&mut self, other: &Molecule) -> Result<(), MoleculeError> {
        if self.natoms() != other.natoms() {
            return Err(MoleculeError::AtomCountMismatch {
                expected: self.natoms(),
                got: other.natoms(),
            });
        }
        self.charges = other.charges.clone();
        Ok(())
    }

    pub fn invalidate_charges(&mut self) {
        self.charges = None;
    }

    pub fn has_atom_types(&self) -> bool {
        self.atom_types.is_some()
    }

    pub fn set_atom_type(&mut self, a: AtomNumber, t: u32) {
        self.assert_atom(a);
        let n = self.natoms();
        self.atom_types.get_or_insert_with(|| vec![0; n])[a] = t;
    }

    pub fn atom_type(&self, a: AtomNumber) -> u32 {
        self.atom_types.as_ref().map_or(0, |t| t[a])
    }

    pub fn copy_atom_types(&mut self, other: &Molecule) -> Result<(), MoleculeError> {
        if self.natoms() != other.natoms() {
            return Err(MoleculeError::AtomCountMismatch {
                expected: self.natoms(),
                got: other.natoms(),
            });
        }
        self.atom_types = other.atom_types.clone();
        Ok(())
    }

    pub fn invalidate_atom_types(&mut self) {
        self.atom_types = None;
    }

    // ------------------------------------------------------------------
    // Opaque metadata records
    // ------------------------------------------------------------------

    pub fn attach_record(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.records.push(DataRecord::new(tag, value));
    }

    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    pub fn records_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DataRecord> {
        self.records.iter().filter(move |r| r.tag == tag)
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// The invalidation cascade. Every mutator calls this exactly once
    /// before returning; partial-build callers invoke it themselves when
    /// construction finishes.
    pub fn invalidate(&mut self, scope: ChangeScope) {
        self.smiles = None;
        self.aromaticity = None;
        match scope {
            ChangeScope::Isotope => {
                if self.config.isotopes_affect_canonical_rank {
                    self.symmetry = None;
                }
            }
            _ => self.symmetry = None,
        }
        if scope == ChangeScope::Structural {
            self.nrings = None;
            self.sssr = None;
            self.ring_membership = None;
            self.distances = None;
            self.fragments = None;
            for bond in &mut self.bonds {
                bond.invalidate_computed();
            }
        }
    }

    // ------------------------------------------------------------------
    // Self-check
    // ------------------------------------------------------------------

    /// Verifies the structural invariants without aborting: bond
    /// endpoint bounds, bond-list symmetry, parallel-array lengths, the
    /// ring-count sentinel, and chiral-centre references.
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();
        let natoms = self.natoms();
        let nbonds = self.nbonds();

        for (i, bond) in self.bonds.iter().enumerate() {
            for endpoint in [bond.a1, bond.a2] {
                if endpoint >= natoms {
                    issues.push(ValidationIssue::BondEndpointOutOfRange { bond: i, endpoint });
                }
            }
        }

        for (a, atom) in self.atoms.iter().enumerate() {
            for &b in atom.bond_numbers() {
                if b >= nbonds {
                    issues.push(ValidationIssue::IncidentBondOutOfRange { atom: a, bond: b });
                    continue;
                }
                let bond = &self.bonds[b];
                if !bond.involves(a) {
                    issues.push(ValidationIssue::IncidentBondMismatch { atom: a, bond: b });
                    continue;
                }
                let o = bond.other(a);
                if o < natoms && !self.atoms[o].bond_numbers().contains(&b) {
                    issues.push(ValidationIssue::AsymmetricBond { a1: a, a2: o });
                }
            }
        }

        if let Some(charges) = &self.charges {
            if charges.len() != natoms {
                issues.push(ValidationIssue::ChargesLengthMismatch {
                    len: charges.len(),
                    natoms,
                });
            }
        }
        if let Some(types) = &self.atom_types {
            if types.len() != natoms {
                issues.push(ValidationIssue::AtomTypesLengthMismatch {
                    len: types.len(),
                    natoms,
                });
            }
        }

        match (&self.nrings, &self.sssr) {
            (None, Some(sssr)) if !sssr.is_empty() => {
                issues.push(ValidationIssue::RingCountInconsistent {
                    nrings: None,
                    sssr: sssr.len(),
                });
            }
            (Some(nrings), Some(sssr)) if sssr.len() > *nrings => {
                issues.push(ValidationIssue::RingCountInconsistent {
                    nrings: Some(*nrings),
                    sssr: sssr.len(),
                });
            }
            _ => {}
        }

        for c in &self.chiral_centres {
            if c.centre() >= natoms {
                issues.push(ValidationIssue::ChiralCentreInvalidAtom {
                    centre: c.centre(),
                    atom: c.centre(),
                });
            }
            for a in c.explicit_neighbours() {
                if a >= natoms {
                    issues.push(ValidationIssue::ChiralCentreInvalidAtom {
                        centre: c.centre(),
                        atom: a,
                    });
                }
            }
        }

        ValidationReport { issues }
    }

    // ------------------------------------------------------------------
    // Lazily computed derived properties
    // ------------------------------------------------------------------

    /// Cyclomatic ring count: bonds − atoms + fragments.
    pub fn nrings(&mut self) -> usize {
        if self.nrings.is_none() {
            let fragments = self.number_fragments();
            self.nrings = Some((self.nbonds() + fragments).saturating_sub(self.natoms()));
        }
        self.nrings.unwrap()
    }

    pub fn sssr_rings(&mut self) -> &[Ring] {
        self.ensure_rings();
        self.sssr.as_deref().unwrap()
    }

    /// Number of SSSR rings containing atom `a`.
    pub fn ring_membership(&mut self, a: AtomNumber) -> u32 {
        self.assert_atom(a);
        self.ensure_rings();
        self.ring_membership.as_ref().unwrap()[a]
    }

    pub fn is_ring_atom(&mut self, a: AtomNumber) -> bool {
        self.ring_membership(a) > 0
    }

    pub fn is_aromatic(&mut self, a: AtomNumber) -> bool {
        self.assert_atom(a);
        self.ensure_aromaticity();
        self.aromaticity.as_ref().unwrap()[a]
    }

    pub fn symmetry_class(&mut self, a: AtomNumber) -> usize {
        self.assert_atom(a);
        self.ensure_symmetry();
        self.symmetry.as_ref().unwrap().symmetry_class[a]
    }

    pub fn canonical_rank(&mut self, a: AtomNumber) -> usize {
        self.assert_atom(a);
        self.ensure_symmetry();
        self.symmetry.as_ref().unwrap().canonical_rank[a]
    }

    pub fn canonical_ranks(&mut self) -> Vec<usize> {
        self.ensure_symmetry();
        self.symmetry.as_ref().unwrap().canonical_rank.clone()
    }

    pub fn fragment_membership(&mut self, a: AtomNumber) -> usize {
        self.assert_atom(a);
        self.ensure_fragments();
        self.fragments.as_ref().unwrap().membership[a]
    }

    pub fn number_fragments(&mut self) -> usize {
        self.ensure_fragments();
        self.fragments.as_ref().unwrap().count
    }

    /// Topological distance in bonds, or `None` when the atoms are in
    /// different fragments.
    pub fn bonds_between(&mut self, a1: AtomNumber, a2: AtomNumber) -> Option<u32> {
        self.assert_atom(a1);
        self.assert_atom(a2);
        self.ensure_distances();
        let d = self.distances.as_ref().unwrap()[a1][a2];
        (d != u32::MAX).then_some(d)
    }

    /// The cached serialization of this molecule, computed with the
    /// default writer configuration.
    pub fn smiles(&mut self) -> &str {
        if self.smiles.is_none() {
            let text = crate::smiles::write_smiles(self, &crate::smiles::SmilesConfig::default());
            self.smiles = Some(text);
        }
        self.smiles.as_deref().unwrap()
    }

    /// Canonical serialization: independent of input atom order. Not
    /// cached; each call runs a fresh pass.
    pub fn unique_smiles(&mut self) -> String {
        crate::smiles::write_canonical_smiles(self, &crate::smiles::SmilesConfig::default())
    }

    pub(crate) fn ensure_rings(&mut self) {
        if self.sssr.is_some() {
            return;
        }
        crate::rings::perceive_sssr(self);
    }

    pub(crate) fn ensure_aromaticity(&mut self) {
        if self.aromaticity.is_some() {
            return;
        }
        self.ensure_rings();
        crate::aromaticity::derive(self);
    }

    fn ensure_symmetry(&mut self) {
        if self.symmetry.is_some() {
            return;
        }
        let info = crate::canonical::compute(self);
        self.symmetry = Some(info);
    }

    fn ensure_fragments(&mut self) {
        if self.fragments.is_some() {
            return;
        }
        let info = crate::graph_ops::assign_fragments(self);
        self.fragments = Some(info);
    }

    fn ensure_distances(&mut self) {
        if self.distances.is_some() {
            return;
        }
        let d = crate::graph_ops::distance_matrix(self);
        self.distances = Some(d);
    }

    // ------------------------------------------------------------------
    // Internal checks
    // ------------------------------------------------------------------

    fn assert_atom(&self, a: AtomNumber) {
        assert!(
            a < self.natoms(),
            "atom number {a} out of range for {} atoms",
            self.natoms()
        );
    }

    fn assert_two_atoms(&self, a1: AtomNumber, a2: AtomNumber) {
        self.assert_atom(a1);
        self.assert_atom(a2);
        assert!(a1 != a2, "operation requires two distinct atoms, got {a1} twice");
    }

    fn debug_summary(&self) -> String {
        format!(
            "{} atoms, {} bonds, {} chiral centres",
            self.natoms(),
            self.nbonds(),
            self.chiral_centres.len()
        )
    }
}

impl Default for Molecule {
    fn default() -> Self {
        Molecule::new()
    }
}

/// Deep copy: structure, parallel arrays, records and configuration are
/// carried over; caches are not — the copy recomputes on demand.
impl Clone for Molecule {
    fn clone(&self) -> Self {
        let mut copy = Molecule::with_config(self.config.clone());
        copy.name = self.name.clone();
        copy.atoms = self.atoms.clone();
        copy.bonds = self.bonds.clone();
        copy.chiral_centres = self.chiral_centres.clone();
        copy.charges = self.charges.clone();
        copy.atom_types = self.atom_types.clone();
        copy.records = self.records.clone();
        copy
    }
}

/// Structural equality: caches are ignored.
impl PartialEq for Molecule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.atoms == other.atoms
            && self.bonds == other.bonds
            && self.chiral_centres == other.chiral_centres
            && self.charges == other.charges
            && self.atom_types == other.atom_types
            && self.records == other.records
    }
}

impl fmt::Debug for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Molecule")
            .field("name", &self.name)
            .field("natoms", &self.natoms())
            .field("nbonds", &self.nbonds())
            .field("chiral_centres", &self.chiral_centres.len())
            .finish()
    }
}
