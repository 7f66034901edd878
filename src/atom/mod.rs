//! Atom representation and related functionality

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Atom types understood by the force field and the scoring grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AtomType {
    // Non-hydrogen types
    Carbon,       // C
    Nitrogen,     // N
    NitrogenH,    // NA (hydrogen bond acceptor)
    Oxygen,       // O
    OxygenH,      // OA (hydrogen bond acceptor)
    Sulfur,       // S
    SulfurH,      // SA (hydrogen bond acceptor)
    Phosphorus,   // P
    Fluorine,     // F
    Chlorine,     // Cl
    Bromine,      // Br
    Iodine,       // I

    // Hydrogen types
    Hydrogen,     // H
    HydrogenD,    // HD (hydrogen bond donor)

    // Metal types
    Zinc,         // Zn
    Calcium,      // Ca
    Manganese,    // Mn
    Magnesium,    // Mg
    Iron,         // Fe

    // For atoms that don't match any of the above
    Unknown,
}

impl AtomType {
    /// Returns the van der Waals radius of the atom type in Angstroms
    pub fn radius(&self) -> f64 {
        match self {
            AtomType::Carbon => 2.0,
            AtomType::Nitrogen | AtomType::NitrogenH => 1.75,
            AtomType::Oxygen | AtomType::OxygenH => 1.6,
            AtomType::Sulfur | AtomType::SulfurH => 2.0,
            AtomType::Phosphorus => 2.1,
            AtomType::Fluorine => 1.54,
            AtomType::Chlorine => 2.04,
            AtomType::Bromine => 2.165,
            AtomType::Iodine => 2.36,
            AtomType::Hydrogen | AtomType::HydrogenD => 1.0,
            AtomType::Zinc => 1.48,
            AtomType::Calcium => 1.98,
            AtomType::Manganese | AtomType::Magnesium | AtomType::Iron => 1.3,
            AtomType::Unknown => 2.0,
        }
    }

    /// Covalent radius in Angstroms, used to infer bonds from coordinates
    pub fn covalent_radius(&self) -> f64 {
        match self {
            AtomType::Hydrogen | AtomType::HydrogenD => 0.31,
            AtomType::Carbon => 0.76,
            AtomType::Nitrogen | AtomType::NitrogenH => 0.71,
            AtomType::Oxygen | AtomType::OxygenH => 0.66,
            AtomType::Sulfur | AtomType::SulfurH => 1.05,
            AtomType::Phosphorus => 1.07,
            AtomType::Fluorine => 0.57,
            AtomType::Chlorine => 1.02,
            AtomType::Bromine => 1.20,
            AtomType::Iodine => 1.39,
            AtomType::Zinc => 1.22,
            AtomType::Calcium => 1.76,
            AtomType::Manganese => 1.39,
            AtomType::Magnesium => 1.41,
            AtomType::Iron => 1.32,
            AtomType::Unknown => 0.76,
        }
    }

    /// Guess the atom type from a PDB element symbol, falling back to the atom name.
    ///
    /// Polar atoms are typed as acceptors; hydrogens bonded to polar atoms are
    /// recognised later from the bond graph (see [`crate::molecule::Residue::assign_polar_hydrogens`]).
    pub fn from_element(element: &str, atom_name: &str) -> Self {
        let symbol = if element.trim().is_empty() {
            atom_name
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .chars()
                .next()
                .map(|c| c.to_string())
                .unwrap_or_default()
        } else {
            element.trim().to_string()
        };

        match symbol.to_uppercase().as_str() {
            "C" => AtomType::Carbon,
            "N" => AtomType::NitrogenH,
            "O" => AtomType::OxygenH,
            "S" => AtomType::Sulfur,
            "P" => AtomType::Phosphorus,
            "F" => AtomType::Fluorine,
            "CL" => AtomType::Chlorine,
            "BR" => AtomType::Bromine,
            "I" => AtomType::Iodine,
            "H" | "D" => AtomType::Hydrogen,
            "ZN" => AtomType::Zinc,
            "CA" => AtomType::Calcium,
            "MN" => AtomType::Manganese,
            "MG" => AtomType::Magnesium,
            "FE" => AtomType::Iron,
            _ => AtomType::Unknown,
        }
    }

    /// Short AutoDock-style label (`OA`, `HD`, ...) distinguishing polar variants
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomType::Carbon => "C",
            AtomType::Nitrogen => "N",
            AtomType::NitrogenH => "NA",
            AtomType::Oxygen => "O",
            AtomType::OxygenH => "OA",
            AtomType::Sulfur => "S",
            AtomType::SulfurH => "SA",
            AtomType::Phosphorus => "P",
            AtomType::Fluorine => "F",
            AtomType::Chlorine => "Cl",
            AtomType::Bromine => "Br",
            AtomType::Iodine => "I",
            AtomType::Hydrogen => "H",
            AtomType::HydrogenD => "HD",
            AtomType::Zinc => "Zn",
            AtomType::Calcium => "Ca",
            AtomType::Manganese => "Mn",
            AtomType::Magnesium => "Mg",
            AtomType::Iron => "Fe",
            AtomType::Unknown => "X",
        }
    }

    /// Element symbol written to PDB files
    pub fn element_symbol(&self) -> &'static str {
        match self {
            AtomType::Carbon => "C",
            AtomType::Nitrogen | AtomType::NitrogenH => "N",
            AtomType::Oxygen | AtomType::OxygenH => "O",
            AtomType::Sulfur | AtomType::SulfurH => "S",
            AtomType::Hydrogen | AtomType::HydrogenD => "H",
            other => other.type_name(),
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        matches!(self, AtomType::Hydrogen | AtomType::HydrogenD)
    }

    pub fn is_h_bond_donor(&self) -> bool {
        matches!(self, AtomType::HydrogenD)
    }

    pub fn is_h_bond_acceptor(&self) -> bool {
        matches!(
            self,
            AtomType::NitrogenH | AtomType::OxygenH | AtomType::SulfurH
        )
    }

    pub fn is_hydrophobic(&self) -> bool {
        matches!(
            self,
            AtomType::Carbon
                | AtomType::Chlorine
                | AtomType::Bromine
                | AtomType::Iodine
                | AtomType::Fluorine
        )
    }

    pub fn is_polar(&self) -> bool {
        matches!(
            self,
            AtomType::Nitrogen
                | AtomType::NitrogenH
                | AtomType::Oxygen
                | AtomType::OxygenH
                | AtomType::SulfurH
        )
    }
}

/// An atom in 3D space, owned by a residue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Atom name from PDB format (e.g., "CA", "N", "O")
    pub name: String,

    /// Atom type
    pub atom_type: AtomType,

    /// 3D coordinates (in Angstroms)
    pub coordinates: Vector3<f64>,

    /// Partial charge
    pub charge: f64,
}

impl Atom {
    pub fn new(name: &str, atom_type: AtomType, coordinates: Vector3<f64>) -> Self {
        Self {
            name: name.to_string(),
            atom_type,
            coordinates,
            charge: 0.0,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    /// Calculate distance to another atom
    pub fn distance(&self, other: &Atom) -> f64 {
        (self.coordinates - other.coordinates).norm()
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atom_type.is_hydrogen()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}({}, {}, {}) [{}]",
            self.name,
            self.atom_type.type_name(),
            self.coordinates.x,
            self.coordinates.y,
            self.coordinates.z,
            self.charge
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_type_radius() {
        assert_eq!(AtomType::Carbon.radius(), 2.0);
        assert_eq!(AtomType::Nitrogen.radius(), 1.75);
        assert_eq!(AtomType::Oxygen.radius(), 1.6);
        assert_eq!(AtomType::Hydrogen.radius(), 1.0);
    }

    #[test]
    fn test_atom_type_from_element_falls_back_to_name() {
        assert_eq!(AtomType::from_element("C", "CA"), AtomType::Carbon);
        assert_eq!(AtomType::from_element("", "CB"), AtomType::Carbon);
        assert_eq!(AtomType::from_element("", "1HB"), AtomType::Hydrogen);
        assert_eq!(AtomType::from_element("ZN", "ZN"), AtomType::Zinc);
        assert_eq!(AtomType::from_element("O", "OG1"), AtomType::OxygenH);
    }

    #[test]
    fn test_type_predicates() {
        assert!(AtomType::HydrogenD.is_hydrogen());
        assert!(AtomType::HydrogenD.is_h_bond_donor());
        assert!(AtomType::OxygenH.is_h_bond_acceptor());
        assert!(!AtomType::Carbon.is_h_bond_acceptor());
        assert!(AtomType::Carbon.is_hydrophobic());
        assert_eq!(AtomType::NitrogenH.element_symbol(), "N");
    }

    #[test]
    fn test_atom_distance() {
        let atom1 = Atom::new("CA", AtomType::Carbon, Vector3::new(0.0, 0.0, 0.0));
        let atom2 = Atom::new("CB", AtomType::Carbon, Vector3::new(1.0, 1.0, 1.0));

        // Distance should be sqrt(3)
        assert!((atom1.distance(&atom2) - 1.732).abs() < 0.001);
    }

    #[test]
    fn test_atom_display() {
        let atom = Atom::new("CA", AtomType::Carbon, Vector3::new(1.0, 2.0, 3.0)).with_charge(0.5);
        assert_eq!(format!("{}", atom), "CA:C(1, 2, 3) [0.5]");
    }
}
