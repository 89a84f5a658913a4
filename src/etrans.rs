//! Element transformations.
//!
//! A transformation is built from a string `E1=E2`: every atom matching
//! `E1` becomes `E2`. `E1` may be a concrete element symbol or the
//! literal `all`; `E2` may be a symbol, `*` (the unspecified element),
//! or an isotope-prefixed symbol such as `18O`. The molecule applies
//! matches per atom and never sees the grammar.

use std::fmt;

use crate::element::{parse_symbol_with_isotope, Element};
use crate::molecule::Molecule;

/// Error from building a transformation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The string is not of the form `E1=E2`.
    Malformed { text: String },
    /// A side of the `=` is not a recognised element.
    UnknownElement { text: String },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { text } => {
                write!(f, "element transformation must be 'E1=E2', got '{text}'")
            }
            Self::UnknownElement { text } => write!(f, "unknown element '{text}'"),
        }
    }
}

impl std::error::Error for TransformError {}

/// One `E1=E2` rule, with running usage counters.
#[derive(Debug, Clone)]
pub struct ElementTransformation {
    /// `None` matches every atom (`all`).
    from: Option<Element>,
    /// `None` is the `*` target.
    to: Option<Element>,
    isotope: u16,
    molecules_processed: usize,
    molecules_changed: usize,
    atoms_changed: usize,
}

impl ElementTransformation {
    pub fn build(text: &str) -> Result<ElementTransformation, TransformError> {
        let eq = text.find('=').ok_or_else(|| TransformError::Malformed {
            text: text.to_string(),
        })?;
        if eq == 0 || eq == text.len() - 1 {
            return Err(TransformError::Malformed {
                text: text.to_string(),
            });
        }

        let lhs = &text[..eq];
        let from = if lhs == "all" {
            None
        } else {
            Some(
                Element::from_symbol(lhs).ok_or_else(|| TransformError::UnknownElement {
                    text: lhs.to_string(),
                })?,
            )
        };

        let rhs = &text[eq + 1..];
        let (to, isotope) = if rhs == "*" {
            (None, 0)
        } else {
            let (element, isotope) =
                parse_symbol_with_isotope(rhs).ok_or_else(|| TransformError::UnknownElement {
                    text: rhs.to_string(),
                })?;
            (Some(element), isotope)
        };

        Ok(ElementTransformation {
            from,
            to,
            isotope,
            molecules_processed: 0,
            molecules_changed: 0,
            atoms_changed: 0,
        })
    }

    /// Applies the rule to every atom; returns the number of atoms
    /// changed. An atom already of the target element is touched (and
    /// counted) only when an isotope is being applied.
    pub fn process(&mut self, m: &mut Molecule) -> usize {
        self.molecules_processed += 1;

        let mut changed = 0;
        for a in 0..m.natoms() {
            let element = m.element(a);

            if element == self.to {
                if self.isotope != 0 {
                    m.set_isotope(a, self.isotope);
                    changed += 1;
                }
                continue;
            }

            if self.from.is_none() || element == self.from {
                m.set_element(a, self.to);
                if self.isotope != 0 {
                    m.set_isotope(a, self.isotope);
                }
                changed += 1;
            }
        }

        if changed > 0 {
            self.molecules_changed += 1;
            self.atoms_changed += changed;
        }
        changed
    }

    pub fn molecules_processed(&self) -> usize {
        self.molecules_processed
    }

    pub fn molecules_changed(&self) -> usize {
        self.molecules_changed
    }

    pub fn atoms_changed(&self) -> usize {
        self.atoms_changed
    }
}

/// An ordered collection of transformations, applied in sequence.
#[derive(Debug, Clone, Default)]
pub struct ElementTransformations {
    transformations: Vec<ElementTransformation>,
}

impl ElementTransformations {
    pub fn new() -> ElementTransformations {
        ElementTransformations::default()
    }

    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    pub fn add(&mut self, t: ElementTransformation) {
        self.transformations.push(t);
    }

    /// Builds from one directive token. The shortcut `HALOGEN` expands
    /// to the pair I→Cl and Br→Cl.
    pub fn add_token(&mut self, token: &str) -> Result<(), TransformError> {
        if token == "HALOGEN" {
            self.add(ElementTransformation::build("I=Cl").expect("literal rule"));
            self.add(ElementTransformation::build("Br=Cl").expect("literal rule"));
            return Ok(());
        }
        self.add(ElementTransformation::build(token)?);
        Ok(())
    }

    /// Total atoms changed across all rules.
    pub fn process(&mut self, m: &mut Molecule) -> usize {
        self.transformations
            .iter_mut()
            .map(|t| t.process(m))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond::BondKind;

    fn cchn() -> Molecule {
        let mut m = Molecule::new();
        m.add_atom(Some(Element::C));
        m.add_atom(Some(Element::C));
        m.add_atom(Some(Element::O));
        m.add_atom(Some(Element::N));
        m.add_bond(0, 1, BondKind::Single).unwrap();
        m.add_bond(1, 2, BondKind::Single).unwrap();
        m.add_bond(2, 3, BondKind::Single).unwrap();
        m
    }

    #[test]
    fn oxygen_to_sulphur_once() {
        let mut t = ElementTransformation::build("O=S").unwrap();
        let mut m = cchn();

        assert_eq!(t.process(&mut m), 1);
        assert_eq!(m.element(2), Some(Element::S));
        assert_eq!(t.atoms_changed(), 1);
        assert_eq!(t.molecules_changed(), 1);
        assert_eq!(t.molecules_processed(), 1);

        // Idempotent: no oxygens remain.
        assert_eq!(t.process(&mut m), 0);
        assert_eq!(t.atoms_changed(), 1);
        assert_eq!(t.molecules_changed(), 1);
        assert_eq!(t.molecules_processed(), 2);
    }

    #[test]
    fn all_matches_every_atom() {
        let mut t = ElementTransformation::build("all=C").unwrap();
        let mut m = cchn();
        // The two carbons are already the target and carry no isotope.
        assert_eq!(t.process(&mut m), 2);
        for a in 0..m.natoms() {
            assert_eq!(m.element(a), Some(Element::C));
        }
    }

    #[test]
    fn star_target_unspecifies() {
        let mut t = ElementTransformation::build("N=*").unwrap();
        let mut m = cchn();
        assert_eq!(t.process(&mut m), 1);
        assert_eq!(m.element(3), None);
    }

    #[test]
    fn isotope_in_target() {
        let mut t = ElementTransformation::build("O=18O").unwrap();
        let mut m = cchn();
        assert_eq!(t.process(&mut m), 1);
        assert_eq!(m.element(2), Some(Element::O));
        assert_eq!(m.isotope(2), 18);
        // Already the target element, but the isotope keeps applying.
        m.set_isotope(2, 0);
        assert_eq!(t.process(&mut m), 1);
        assert_eq!(m.isotope(2), 18);
    }

    #[test]
    fn halogen_shortcut() {
        let mut ts = ElementTransformations::new();
        ts.add_token("HALOGEN").unwrap();
        assert_eq!(ts.len(), 2);

        let mut m = Molecule::new();
        m.add_atom(Some(Element::I));
        m.add_atom(Some(Element::Br));
        m.add_atom(Some(Element::F));
        assert_eq!(ts.process(&mut m), 2);
        assert_eq!(m.element(0), Some(Element::Cl));
        assert_eq!(m.element(1), Some(Element::Cl));
        assert_eq!(m.element(2), Some(Element::F));
    }

    #[test]
    fn malformed_strings_rejected() {
        for bad in ["OS", "=S", "O=", "="] {
            assert!(matches!(
                ElementTransformation::build(bad),
                Err(TransformError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn unknown_elements_rejected() {
        assert!(matches!(
            ElementTransformation::build("Xq=S"),
            Err(TransformError::UnknownElement { .. })
        ));
        assert!(matches!(
            ElementTransformation::build("O=Qz"),
            Err(TransformError::UnknownElement { .. })
        ));
    }

    #[test]
    fn failed_build_leaves_nothing_applied() {
        let mut ts = ElementTransformations::new();
        assert!(ts.add_token("I=Cl").is_ok());
        assert!(ts.add_token("bogus").is_err());
        assert_eq!(ts.len(), 1);
    }
}
