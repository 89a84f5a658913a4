//! Serialization of a molecule to linear notation.
//!
//! Only the writing half lives here; parsing is out of scope. The
//! interesting machinery is [`RingNumberManager`], which assigns the
//! numbered back-references that stand in for ring bonds.

mod ring_numbers;
mod writer;

pub use ring_numbers::RingNumberManager;
pub use writer::{write_canonical_smiles, write_smiles};

/// Writer configuration. One value per serialization pass; molecules
/// with different policies can be written concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilesConfig {
    /// Added to every ring-closure label before printing.
    pub ring_number_offset: usize,
    /// When set (the default), a closure number freed by a closing digit
    /// is immediately available for the next ring opening. When unset,
    /// every ring gets a fresh number.
    pub reuse_ring_closure_numbers: bool,
    /// Whether directional (cis/trans) bond markers appear in output at
    /// all.
    pub include_cis_trans: bool,
    /// Whether directional markers are allowed on ring-closure bonds
    /// specifically. Some consumers reject them there, so this is off by
    /// default; the bond is then written as a plain single bond.
    pub directional_ring_closures: bool,
}

impl Default for SmilesConfig {
    fn default() -> Self {
        SmilesConfig {
            ring_number_offset: 0,
            reuse_ring_closure_numbers: true,
            include_cis_trans: true,
            directional_ring_closures: false,
        }
    }
}
