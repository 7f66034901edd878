//! Pairwise force field terms and the exact (non-grid) energy function

pub mod vina;

use crate::atom::Atom;
use crate::molecule::{Residue, Structure};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use vina::{VinaForceField, VinaParams};

/// Energy terms a force field can evaluate for an atom pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyTerm {
    Attractive,
    Repulsive,
    HBond,
    Hydrophobic,
    Desolvation,
    Electrostatic,
}

impl EnergyTerm {
    pub const ALL: [EnergyTerm; 6] = [
        EnergyTerm::Attractive,
        EnergyTerm::Repulsive,
        EnergyTerm::HBond,
        EnergyTerm::Hydrophobic,
        EnergyTerm::Desolvation,
        EnergyTerm::Electrostatic,
    ];
}

/// Pair energy split into the channels stored on the scoring grid
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairEnergy {
    /// Attractive van der Waals, hydrogen bond, hydrophobic and desolvation terms
    pub attractive: f64,
    pub repulsive: f64,
    pub electrostatic: f64,
}

impl PairEnergy {
    pub fn total(&self, rep_weight: f64) -> f64 {
        self.attractive + rep_weight * self.repulsive + self.electrostatic
    }
}

/// A force field that evaluates interaction energies between atoms.
/// The Send + Sync bounds let independent docking jobs share one force field through an `Arc`.
pub trait ForceField: Send + Sync {
    fn name(&self) -> &'static str;

    /// Distance beyond which every term vanishes
    fn cutoff(&self) -> f64;

    /// Evaluate one term for an atom pair at the given distance
    fn term_energy(&self, term: EnergyTerm, atom1: &Atom, atom2: &Atom, distance: f64) -> f64;

    /// Potential felt by a unit charge at `position` due to `atom`
    fn atom_charge_energy(&self, atom: &Atom, charge: f64, position: &Vector3<f64>) -> f64;

    /// All terms of an atom pair, grouped by grid channel
    fn pair_energy(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> PairEnergy {
        if distance > self.cutoff() {
            return PairEnergy::default();
        }
        let attractive = self.term_energy(EnergyTerm::Attractive, atom1, atom2, distance)
            + self.term_energy(EnergyTerm::HBond, atom1, atom2, distance)
            + self.term_energy(EnergyTerm::Hydrophobic, atom1, atom2, distance)
            + self.term_energy(EnergyTerm::Desolvation, atom1, atom2, distance);
        PairEnergy {
            attractive,
            repulsive: self.term_energy(EnergyTerm::Repulsive, atom1, atom2, distance),
            electrostatic: self.term_energy(EnergyTerm::Electrostatic, atom1, atom2, distance),
        }
    }

    /// Total interaction energy of an atom pair with unit repulsive weight
    fn atom_pair_energy(&self, atom1: &Atom, atom2: &Atom, distance: f64) -> f64 {
        self.pair_energy(atom1, atom2, distance).total(1.0)
    }
}

/// Exact energy black box used for final re-scoring and minimization
pub trait EnergyFunction: Send + Sync {
    /// Total energy of the structure
    fn score(&self, structure: &Structure) -> f64;

    /// Energy of every interaction that involves at least one of `residues`
    fn score_residues(&self, structure: &Structure, residues: &[usize]) -> f64;
}

/// Minimum bond separation for intra-residue pairs to be scored
const MIN_INTRA_SEPARATION: usize = 4;

/// Pairwise energy over all atom pairs within the force field cutoff.
///
/// Intra-residue pairs separated by three bonds or fewer are skipped, as are backbone-backbone
/// pairs of consecutive polymer residues.
pub struct PairwiseEnergy {
    pub forcefield: Arc<dyn ForceField>,
    pub rep_weight: f64,
}

impl PairwiseEnergy {
    pub fn new(forcefield: Arc<dyn ForceField>) -> Self {
        Self {
            forcefield,
            rep_weight: 1.0,
        }
    }

    pub fn with_rep_weight(mut self, rep_weight: f64) -> Self {
        self.rep_weight = rep_weight;
        self
    }

    fn pair(&self, a: &Atom, b: &Atom) -> f64 {
        let d = a.distance(b);
        if d > self.forcefield.cutoff() {
            return 0.0;
        }
        self.forcefield.pair_energy(a, b, d).total(self.rep_weight)
    }

    /// Intra-residue energy
    pub fn residue_energy(&self, residue: &Residue) -> f64 {
        let separation = residue.bond_separation_matrix(MIN_INTRA_SEPARATION);
        let n = residue.atom_count();
        let mut energy = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                if separation[i][j] < MIN_INTRA_SEPARATION {
                    continue;
                }
                energy += self.pair(&residue.atoms[i], &residue.atoms[j]);
            }
        }
        energy
    }

    /// Interaction energy between two different residues of a structure
    pub fn residue_pair_energy(&self, structure: &Structure, r1: usize, r2: usize) -> f64 {
        let (res1, res2) = (&structure.residues[r1], &structure.residues[r2]);
        let cutoff = self.forcefield.cutoff();
        if let (Some(c1), Some(c2)) = (res1.center(), res2.center()) {
            if (c1 - c2).norm() > res1.radius() + res2.radius() + cutoff {
                return 0.0;
            }
        }

        let consecutive_polymer = res1.is_polymer() && res2.is_polymer() && r1.abs_diff(r2) == 1;
        let mut energy = 0.0;
        for (i, a) in res1.atoms.iter().enumerate() {
            for (j, b) in res2.atoms.iter().enumerate() {
                if consecutive_polymer && res1.is_backbone_atom(i) && res2.is_backbone_atom(j) {
                    continue;
                }
                energy += self.pair(a, b);
            }
        }
        energy
    }
}

impl EnergyFunction for PairwiseEnergy {
    fn score(&self, structure: &Structure) -> f64 {
        let n = structure.residue_count();
        let mut energy = 0.0;
        for r1 in 0..n {
            energy += self.residue_energy(&structure.residues[r1]);
            for r2 in (r1 + 1)..n {
                energy += self.residue_pair_energy(structure, r1, r2);
            }
        }
        energy
    }

    fn score_residues(&self, structure: &Structure, residues: &[usize]) -> f64 {
        let n = structure.residue_count();
        let mut energy = 0.0;
        for &r1 in residues.iter().filter(|&&r| r < n) {
            energy += self.residue_energy(&structure.residues[r1]);
            for r2 in 0..n {
                if r2 == r1 {
                    continue;
                }
                // pairs inside the set are counted once
                if residues.contains(&r2) && r2 < r1 {
                    continue;
                }
                energy += self.residue_pair_energy(structure, r1, r2);
            }
        }
        energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomType;
    use crate::molecule::test_util::{serine, small_ligand};

    #[test]
    fn test_pair_energy_vanishes_beyond_cutoff() {
        let ff = VinaForceField::default();
        let a = Atom::new("C1", AtomType::Carbon, Vector3::zeros());
        let b = Atom::new("C2", AtomType::Carbon, Vector3::new(20.0, 0.0, 0.0));
        assert_eq!(ff.pair_energy(&a, &b, 20.0), PairEnergy::default());
    }

    #[test]
    fn test_repulsion_grows_at_short_range() {
        let ff = VinaForceField::default();
        let a = Atom::new("C1", AtomType::Carbon, Vector3::zeros());
        let b = Atom::new("C2", AtomType::Carbon, Vector3::zeros());
        let close = ff.pair_energy(&a, &b, 1.5).repulsive;
        let far = ff.pair_energy(&a, &b, 3.0).repulsive;
        assert!(close > far);
        assert!(far >= 0.0);
    }

    #[test]
    fn test_score_residues_matches_total_difference() {
        let mut s = Structure::new("complex");
        s.add_residue(serine(1, Vector3::zeros()));
        s.add_residue(serine(2, Vector3::new(0.0, 0.0, 4.5)));
        s.add_residue(small_ligand(Vector3::new(3.0, 3.0, 0.0)));
        let energy = PairwiseEnergy::new(Arc::new(VinaForceField::default()));

        let total = energy.score(&s);
        let lig = energy.score_residues(&s, &[2]);

        let mut without_ligand = s.clone();
        without_ligand.residues.pop();
        let rest = energy.score(&without_ligand);
        assert!((total - (lig + rest)).abs() < 1e-9);

        // every residue listed reproduces the total
        assert!((energy.score_residues(&s, &[0, 1, 2]) - total).abs() < 1e-9);
    }
}
