//! Vina-like empirical pair terms

use crate::atom::{Atom, AtomType};
use crate::forcefield::{EnergyTerm, ForceField};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Parameters for the Vina-like force field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VinaParams {
    // Weights for each component of the scoring function
    pub weight_gauss1: f64,
    pub weight_repulsion: f64,
    pub weight_hydrophobic: f64,
    pub weight_hydrogen: f64,

    // Gaussian function parameters
    pub gaussian_offset: f64,
    pub gaussian_width: f64,

    pub hydrogen_bond_dist_cutoff: f64,

    /// Coulomb prefactor in kcal·Å/(mol·e²)
    pub coulomb_constant: f64,

    /// Distances are floored at this value before evaluating singular terms
    pub min_distance: f64,

    pub cutoff: f64,
}

impl Default for VinaParams {
    fn default() -> Self {
        Self {
            weight_gauss1: -0.0356,
            weight_repulsion: 0.840,
            weight_hydrophobic: -0.0351,
            weight_hydrogen: -0.587,

            gaussian_offset: 0.0,
            gaussian_width: 0.5,

            hydrogen_bond_dist_cutoff: 4.0,
            coulomb_constant: 332.0,
            min_distance: 0.5,
            cutoff: 8.0,
        }
    }
}

/// Implementation of the Vina-like scoring terms
#[derive(Debug, Clone, Default)]
pub struct VinaForceField {
    pub params: VinaParams,
}

impl VinaForceField {
    pub fn new(params: VinaParams) -> Self {
        Self { params }
    }

    /// Optimal contact distance: sum of the van der Waals radii, shrunk for hydrogens
    fn optimal_distance(atom1: &Atom, atom2: &Atom) -> f64 {
        let shrink = |t: AtomType| if t.is_hydrogen() { 0.5 } else { 0.0 };
        atom1.atom_type.radius() + atom2.atom_type.radius()
            - shrink(atom1.atom_type)
            - shrink(atom2.atom_type)
    }

    fn attractive(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        let optimal = Self::optimal_distance(atom1, atom2);
        self.params.weight_gauss1
            * (-(distance - optimal - self.params.gaussian_offset).powi(2)
                / (2.0 * self.params.gaussian_width.powi(2)))
            .exp()
    }

    fn repulsive(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        let optimal = Self::optimal_distance(atom1, atom2);
        let distance = distance.max(self.params.min_distance * 0.5);
        if distance < optimal {
            self.params.weight_repulsion * (optimal - distance).powi(2)
        } else {
            0.0
        }
    }

    fn hbond(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        let paired = (atom1.atom_type.is_h_bond_donor() && atom2.atom_type.is_h_bond_acceptor())
            || (atom2.atom_type.is_h_bond_donor() && atom1.atom_type.is_h_bond_acceptor());
        if !paired || distance > self.params.hydrogen_bond_dist_cutoff {
            return 0.0;
        }

        // full strength up to the typical H...A distance, then a linear fade
        let optimal_dist = 1.9;
        let strength = if distance <= optimal_dist {
            1.0
        } else {
            1.0 - (distance - optimal_dist) / (self.params.hydrogen_bond_dist_cutoff - optimal_dist)
        };
        self.params.weight_hydrogen * strength
    }

    fn hydrophobic(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        if !atom1.atom_type.is_hydrophobic() || !atom2.atom_type.is_hydrophobic() {
            return 0.0;
        }
        let optimal = Self::optimal_distance(atom1, atom2);
        let (good, bad) = (optimal + 0.5, optimal + 1.5);
        let factor = if distance <= good {
            1.0
        } else if distance >= bad {
            0.0
        } else {
            (bad - distance) / (bad - good)
        };
        self.params.weight_hydrophobic * factor
    }

    fn desolvation(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        let solvation = |t: AtomType| match t {
            AtomType::Carbon => 0.6,
            AtomType::Oxygen | AtomType::OxygenH => -1.0,
            AtomType::Nitrogen | AtomType::NitrogenH => -1.0,
            AtomType::Sulfur | AtomType::SulfurH => 0.6,
            _ => 0.0,
        };
        let cutoff = self.params.cutoff;
        if distance > cutoff {
            return 0.0;
        }
        // small prefactor keeps this a correction next to the contact terms
        0.01 * (1.0 - (distance / cutoff).powi(2)) * solvation(atom1.atom_type) * solvation(atom2.atom_type)
    }

    fn electrostatic(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        if atom1.charge == 0.0 || atom2.charge == 0.0 {
            return 0.0;
        }
        let d = distance.max(self.params.min_distance);
        // distance-dependent dielectric
        self.params.coulomb_constant * atom1.charge * atom2.charge / (4.0 * d * d)
    }
}

impl ForceField for VinaForceField {
    fn name(&self) -> &'static str {
        "Vina"
    }

    fn cutoff(&self) -> f64 {
        self.params.cutoff
    }

    fn term_energy(&self, term: EnergyTerm, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        if distance > self.params.cutoff {
            return 0.0;
        }
        match term {
            EnergyTerm::Attractive => self.attractive(atom1, atom2, distance),
            EnergyTerm::Repulsive => self.repulsive(atom1, atom2, distance),
            EnergyTerm::HBond => self.hbond(atom1, atom2, distance),
            EnergyTerm::Hydrophobic => self.hydrophobic(atom1, atom2, distance),
            EnergyTerm::Desolvation => self.desolvation(atom1, atom2, distance),
            EnergyTerm::Electrostatic => self.electrostatic(atom1, atom2, distance),
        }
    }

    fn atom_charge_energy(&self, atom: &Atom, charge: f64, position: &Vector3<f64>) -> f64 {
        let distance = (atom.coordinates - position).norm();
        if distance > self.params.cutoff || atom.charge == 0.0 {
            return 0.0;
        }
        let d = distance.max(self.params.min_distance);
        self.params.coulomb_constant * atom.charge * charge / (4.0 * d * d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(t: AtomType) -> Atom {
        Atom::new("X", t, Vector3::zeros())
    }

    #[test]
    fn test_hbond_requires_donor_and_acceptor() {
        let ff = VinaForceField::default();
        let donor = atom(AtomType::HydrogenD);
        let acceptor = atom(AtomType::OxygenH);
        let carbon = atom(AtomType::Carbon);

        assert!(ff.term_energy(EnergyTerm::HBond, &donor, &acceptor, 1.9) < 0.0);
        assert_eq!(
            ff.term_energy(EnergyTerm::HBond, &donor, &acceptor, 1.9),
            ff.term_energy(EnergyTerm::HBond, &acceptor, &donor, 1.9)
        );
        assert_eq!(ff.term_energy(EnergyTerm::HBond, &donor, &carbon, 1.9), 0.0);
        assert_eq!(ff.term_energy(EnergyTerm::HBond, &donor, &acceptor, 4.5), 0.0);
    }

    #[test]
    fn test_hydrophobic_only_between_apolar_atoms() {
        let ff = VinaForceField::default();
        let c = atom(AtomType::Carbon);
        let o = atom(AtomType::OxygenH);
        assert!(ff.term_energy(EnergyTerm::Hydrophobic, &c, &c, 4.0) < 0.0);
        assert_eq!(ff.term_energy(EnergyTerm::Hydrophobic, &c, &o, 4.0), 0.0);
        assert_eq!(ff.term_energy(EnergyTerm::Hydrophobic, &c, &c, 6.0), 0.0);
    }

    #[test]
    fn test_electrostatics_sign_and_unit_charge_potential() {
        let ff = VinaForceField::default();
        let plus = atom(AtomType::NitrogenH).with_charge(1.0);
        let minus = atom(AtomType::OxygenH).with_charge(-1.0);
        assert!(ff.term_energy(EnergyTerm::Electrostatic, &plus, &minus, 3.0) < 0.0);
        assert!(ff.term_energy(EnergyTerm::Electrostatic, &plus, &plus, 3.0) > 0.0);

        let position = Vector3::new(3.0, 0.0, 0.0);
        let potential = ff.atom_charge_energy(&plus, 1.0, &position);
        assert!((potential - ff.term_energy(EnergyTerm::Electrostatic, &plus, &plus, 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_attractive_minimum_at_contact() {
        let ff = VinaForceField::default();
        let c = atom(AtomType::Carbon);
        let at_contact = ff.term_energy(EnergyTerm::Attractive, &c, &c, 4.0);
        let off_contact = ff.term_energy(EnergyTerm::Attractive, &c, &c, 5.0);
        assert!(at_contact < off_contact);
    }
}
