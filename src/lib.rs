//! A mutable molecular graph with cached derived properties and a
//! SMILES-style serializer.
//!
//! The [`Molecule`] owns its atoms and bonds in index-addressed arenas
//! and keeps a family of lazily computed properties (rings, aromaticity,
//! canonical ranks, fragments, distances, serialization text) consistent
//! through a single invalidation cascade. The [`smiles`] module writes
//! the linear notation, with [`smiles::RingNumberManager`] handing out
//! the numbered ring-closure back-references.

pub mod atom;
pub mod bond;
pub mod chirality;
pub mod element;
pub mod etrans;
pub mod molecule;
pub mod records;
pub mod smiles;

mod aromaticity;
mod canonical;
mod graph_ops;
mod rings;

pub use atom::Atom;
pub use bond::{AtomNumber, Bond, BondKind, BondNumber, Direction};
pub use chirality::{ChiralCentre, ChiralNeighbour};
pub use element::Element;
pub use etrans::{ElementTransformation, ElementTransformations, TransformError};
pub use molecule::{
    ChangeScope, MolConfig, Molecule, MoleculeError, Ring, ValidationIssue, ValidationReport,
};
pub use records::{parse_records, write_records, DataRecord, RecordError};
pub use smiles::{write_canonical_smiles, write_smiles, RingNumberManager, SmilesConfig};
