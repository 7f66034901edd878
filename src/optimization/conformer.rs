//! Gene encoding of a ligand pose plus movable side-chain torsions

use crate::coords::CoordinateSet;
use crate::math::{dihedral, random_point_in_sphere, random_rotation, rotate_about_axis, wrap_degrees};
use crate::molecule::{Residue, Structure, StructureError};
use crate::optimization::OptimizationError;
use crate::rms::xyz_rmsd_no_super;
use crate::superposition::superimpose;
use log::debug;
use nalgebra::{DVector, Unit, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rotatable dihedral a-b-c-d inside one residue; `moving` lists the atoms on the c side
#[derive(Debug, Clone, PartialEq)]
pub struct TorsionDof {
    pub residue: usize,
    pub atoms: [usize; 4],
    pub moving: Vec<usize>,
}

impl TorsionDof {
    fn new(residue_idx: usize, residue: &Residue, atoms: [usize; 4]) -> Self {
        let [a, b, c, d] = atoms;
        let forward = residue.moving_side(b, c);
        // rotate whichever side is smaller
        if forward.len() * 2 > residue.atom_count() {
            let backward = residue.moving_side(c, b);
            if backward.len() < forward.len() {
                return Self {
                    residue: residue_idx,
                    atoms: [d, c, b, a],
                    moving: backward,
                };
            }
        }
        Self {
            residue: residue_idx,
            atoms,
            moving: forward,
        }
    }

    /// Current dihedral in degrees
    pub fn measure(&self, residue: &Residue) -> f64 {
        let [a, b, c, d] = self.atoms.map(|i| residue.atoms[i].coordinates);
        dihedral(&a, &b, &c, &d)
    }

    /// Rotate the moving side so the dihedral equals `target` degrees
    pub fn set(&self, residue: &mut Residue, target: f64) {
        let delta = wrap_degrees(target - self.measure(residue));
        if delta.abs() < 1e-9 {
            return;
        }
        let origin = residue.atoms[self.atoms[1]].coordinates;
        let axis = residue.atoms[self.atoms[2]].coordinates - origin;
        for &i in &self.moving {
            let p = residue.atoms[i].coordinates;
            residue.atoms[i].coordinates = rotate_about_axis(&p, &origin, &axis, delta);
        }
    }
}

/// One candidate solution: rigid-body placement of the ligand about its pivot, ligand
/// torsions and side-chain chis (degrees), and the last score assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub torsions: Vec<f64>,
    pub chis: Vec<f64>,
    pub score: f64,
    /// Ligand RMSD to the native pose, when one is known
    pub rms: Option<f64>,
}

impl Gene {
    pub fn n_dof(&self) -> usize {
        6 + self.torsions.len() + self.chis.len()
    }

    fn unscored(mut self) -> Self {
        self.score = f64::INFINITY;
        self.rms = None;
        self
    }
}

/// Magnitudes of the random perturbations applied by mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationScale {
    /// Angstroms
    pub translation: f64,
    pub rotation_deg: f64,
    pub torsion_deg: f64,
    pub chi_deg: f64,
    /// Chance that an individual torsion is perturbed
    pub dof_probability: f64,
}

impl Default for MutationScale {
    fn default() -> Self {
        Self {
            translation: 2.0,
            rotation_deg: 30.0,
            torsion_deg: 60.0,
            chi_deg: 30.0,
            dof_probability: 0.5,
        }
    }
}

/// Maps genes to coordinates of the moving residues of a fixed template structure
#[derive(Debug, Clone)]
pub struct ConformerModel {
    templates: BTreeMap<usize, Residue>,
    ligand_residues: Vec<usize>,
    movable_scs: Vec<usize>,
    pivot: Vector3<f64>,
    torsions: Vec<TorsionDof>,
    chis: Vec<TorsionDof>,
    /// Half-edge of the cube random placements are drawn from
    sample_radius: f64,
}

impl ConformerModel {
    pub fn new(
        structure: &Structure,
        ligand_residues: &[usize],
        movable_scs: &[usize],
    ) -> Result<Self, OptimizationError> {
        if ligand_residues.is_empty() {
            return Err(StructureError::EmptySelection.into());
        }
        let mut templates = BTreeMap::new();
        let mut torsions = Vec::new();
        for &r in ligand_residues {
            let res = structure.residue(r)?;
            for (b, c) in res.rotatable_bonds() {
                let a = res.heavy_neighbors(b).into_iter().find(|&n| n != c);
                let d = res.heavy_neighbors(c).into_iter().find(|&n| n != b);
                if let (Some(a), Some(d)) = (a, d) {
                    torsions.push(TorsionDof::new(r, res, [a, b, c, d]));
                }
            }
            templates.insert(r, res.clone());
        }

        let movable_scs: Vec<usize> = movable_scs
            .iter()
            .copied()
            .filter(|r| !ligand_residues.contains(r))
            .collect();
        let mut chis = Vec::new();
        for &r in &movable_scs {
            let res = structure.residue(r)?;
            for quad in res.chi_atoms() {
                if res.is_ring_bond(quad[1], quad[2]) {
                    continue;
                }
                chis.push(TorsionDof::new(r, res, quad));
            }
            templates.insert(r, res.clone());
        }

        let pivot = structure.centroid(ligand_residues)?;
        debug!(
            "Conformer model: {} ligand torsions, {} side-chain chis",
            torsions.len(),
            chis.len()
        );
        Ok(Self {
            templates,
            ligand_residues: ligand_residues.to_vec(),
            movable_scs,
            pivot,
            torsions,
            chis,
            sample_radius: 0.0,
        })
    }

    pub fn with_sample_radius(mut self, radius: f64) -> Self {
        self.sample_radius = radius.max(0.0);
        self
    }

    pub fn ligand_residues(&self) -> &[usize] {
        &self.ligand_residues
    }

    pub fn movable_scs(&self) -> &[usize] {
        &self.movable_scs
    }

    pub fn torsions(&self) -> &[TorsionDof] {
        &self.torsions
    }

    pub fn chis(&self) -> &[TorsionDof] {
        &self.chis
    }

    pub fn pivot(&self) -> Vector3<f64> {
        self.pivot
    }

    pub fn n_dof(&self) -> usize {
        6 + self.torsions.len() + self.chis.len()
    }

    fn check(&self, gene: &Gene) -> Result<(), OptimizationError> {
        if gene.torsions.len() != self.torsions.len() || gene.chis.len() != self.chis.len() {
            return Err(OptimizationError::GeneMismatch {
                expected: self.n_dof(),
                found: gene.n_dof(),
            });
        }
        Ok(())
    }

    fn template(&self, residue: usize) -> Result<&Residue, OptimizationError> {
        self.templates
            .get(&residue)
            .ok_or(OptimizationError::Structure(StructureError::InvalidResidueIndex(residue)))
    }

    /// Gene that reproduces the template pose
    pub fn identity_gene(&self) -> Gene {
        let measure = |dofs: &[TorsionDof]| -> Vec<f64> {
            dofs.iter()
                .map(|t| self.templates.get(&t.residue).map_or(0.0, |res| t.measure(res)))
                .collect()
        };
        Gene {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            torsions: measure(&self.torsions),
            chis: measure(&self.chis),
            score: f64::INFINITY,
            rms: None,
        }
    }

    /// Ligand residues with the gene's torsions and rigid-body placement applied
    pub fn posed_ligand(&self, gene: &Gene) -> Result<Vec<(usize, Residue)>, OptimizationError> {
        self.check(gene)?;
        let rotation = gene.rotation.to_rotation_matrix();
        let mut posed = Vec::with_capacity(self.ligand_residues.len());
        for &r in &self.ligand_residues {
            let mut res = self.template(r)?.clone();
            for (dof, &value) in self.torsions.iter().zip(&gene.torsions) {
                if dof.residue == r {
                    dof.set(&mut res, value);
                }
            }
            for atom in &mut res.atoms {
                atom.coordinates = rotation * (atom.coordinates - self.pivot) + self.pivot + gene.translation;
            }
            posed.push((r, res));
        }
        Ok(posed)
    }

    /// Write the gene's ligand and side-chain coordinates into `structure`
    pub fn apply(&self, gene: &Gene, structure: &mut Structure) -> Result<(), OptimizationError> {
        for (r, res) in self.posed_ligand(gene)? {
            *structure.residue_mut(r)? = res;
        }
        for &r in &self.movable_scs {
            let mut res = self.template(r)?.clone();
            for (dof, &value) in self.chis.iter().zip(&gene.chis) {
                if dof.residue == r {
                    dof.set(&mut res, value);
                }
            }
            *structure.residue_mut(r)? = res;
        }
        Ok(())
    }

    /// Ligand heavy-atom coordinates for the gene
    pub fn ligand_coordinates(&self, gene: &Gene) -> Result<Vec<Vector3<f64>>, OptimizationError> {
        Ok(self
            .posed_ligand(gene)?
            .iter()
            .flat_map(|(_, res)| {
                res.atoms
                    .iter()
                    .filter(|a| !a.is_hydrogen())
                    .map(|a| a.coordinates)
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Ligand heavy-atom coordinates currently held in `structure`
    pub fn structure_ligand_coordinates(&self, structure: &Structure) -> Result<Vec<Vector3<f64>>, OptimizationError> {
        let mut coords = Vec::new();
        for &r in &self.ligand_residues {
            let res = structure.residue(r)?;
            coords.extend(res.atoms.iter().filter(|a| !a.is_hydrogen()).map(|a| a.coordinates));
        }
        Ok(coords)
    }

    /// Keep the gene's internal torsions and fit its rigid-body part onto `target` heavy-atom coordinates
    pub fn align_to(&self, gene: &Gene, target: &[Vector3<f64>]) -> Result<Gene, OptimizationError> {
        let unplaced = Gene {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            ..gene.clone()
        };
        let mobile = CoordinateSet::new(self.ligand_coordinates(&unplaced)?);
        let fit = superimpose(&mobile, &CoordinateSet::new(target.to_vec()))?;

        // R x + t  ==  R (x - p) + p + t'
        let translation = fit.translation - self.pivot + fit.rotation * self.pivot;
        let rotation = UnitQuaternion::from_matrix(&fit.rotation);
        Ok(Gene {
            translation,
            rotation,
            ..unplaced.unscored()
        })
    }

    /// Encode the moving residues of `structure` as a gene
    pub fn gene_from_structure(&self, structure: &Structure) -> Result<Gene, OptimizationError> {
        let measure = |dofs: &[TorsionDof]| -> Result<Vec<f64>, OptimizationError> {
            dofs.iter()
                .map(|t| Ok(t.measure(structure.residue(t.residue)?)))
                .collect()
        };
        let gene = Gene {
            torsions: measure(&self.torsions)?,
            chis: measure(&self.chis)?,
            ..self.identity_gene()
        };
        self.align_to(&gene, &self.structure_ligand_coordinates(structure)?)
    }

    /// Uniform placement in the sampling cube with random orientation and torsions
    pub fn random_gene<R: Rng + ?Sized>(&self, rng: &mut R) -> Gene {
        let h = self.sample_radius;
        let mut uniform = |lo: f64, hi: f64| if hi > lo { rng.gen_range(lo..hi) } else { lo };
        let translation = Vector3::new(uniform(-h, h), uniform(-h, h), uniform(-h, h));
        let torsions = (0..self.torsions.len()).map(|_| uniform(-180.0, 180.0)).collect();
        let chis = (0..self.chis.len()).map(|_| uniform(-180.0, 180.0)).collect();
        Gene {
            translation,
            rotation: random_rotation(rng),
            torsions,
            chis,
            score: f64::INFINITY,
            rms: None,
        }
    }

    pub fn mutate<R: Rng + ?Sized>(&self, gene: &Gene, scale: &MutationScale, rng: &mut R) -> Gene {
        let mut child = gene.clone().unscored();
        child.translation += random_point_in_sphere(rng, scale.translation);

        let axis = random_point_in_sphere(rng, 1.0);
        if axis.norm() > 1e-6 && scale.rotation_deg > 0.0 {
            let angle = rng.gen_range(-scale.rotation_deg..scale.rotation_deg).to_radians();
            child.rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle) * child.rotation;
        }

        let mut perturb = |values: &mut Vec<f64>, range: f64| {
            for v in values.iter_mut() {
                if range > 0.0 && rng.gen::<f64>() < scale.dof_probability {
                    *v = wrap_degrees(*v + rng.gen_range(-range..range));
                }
            }
        };
        perturb(&mut child.torsions, scale.torsion_deg);
        perturb(&mut child.chis, scale.chi_deg);
        child
    }

    /// Child taking the rigid-body block from one parent and each torsion from either
    pub fn crossover<R: Rng + ?Sized>(&self, a: &Gene, b: &Gene, rng: &mut R) -> Gene {
        let rigid = if rng.gen::<bool>() { a } else { b };
        let mut pick = |x: &[f64], y: &[f64]| -> Vec<f64> {
            x.iter()
                .zip(y)
                .map(|(&u, &v)| if rng.gen::<bool>() { u } else { v })
                .collect()
        };
        let torsions = pick(&a.torsions, &b.torsions);
        let chis = pick(&a.chis, &b.chis);
        Gene {
            translation: rigid.translation,
            rotation: rigid.rotation,
            torsions,
            chis,
            score: f64::INFINITY,
            rms: None,
        }
    }

    /// Gene displaced by a local step: translation (Angstroms), rotation vector and torsions (radians)
    pub fn perturb(&self, gene: &Gene, step: &DVector<f64>) -> Gene {
        let mut out = gene.clone();
        if step.len() < 6 {
            return out;
        }
        out.translation += Vector3::new(step[0], step[1], step[2]);
        let rotvec = Vector3::new(step[3], step[4], step[5]);
        out.rotation = UnitQuaternion::from_scaled_axis(rotvec) * out.rotation;
        let nt = out.torsions.len();
        for (i, t) in out.torsions.iter_mut().enumerate() {
            if let Some(d) = step.get(6 + i) {
                *t = wrap_degrees(*t + d.to_degrees());
            }
        }
        for (i, c) in out.chis.iter_mut().enumerate() {
            if let Some(d) = step.get(6 + nt + i) {
                *c = wrap_degrees(*c + d.to_degrees());
            }
        }
        out
    }

    /// Which local degrees of freedom move during minimization
    pub fn dof_mask(&self, ligand: bool, sidechains: bool) -> Vec<bool> {
        let mut mask = vec![ligand; 6 + self.torsions.len()];
        mask.extend(std::iter::repeat(sidechains).take(self.chis.len()));
        mask
    }

    /// RMSD between the two genes' ligand heavy atoms, without superposition
    pub fn distance(&self, a: &Gene, b: &Gene) -> Result<f64, OptimizationError> {
        let ca = CoordinateSet::new(self.ligand_coordinates(a)?);
        let cb = CoordinateSet::new(self.ligand_coordinates(b)?);
        Ok(xyz_rmsd_no_super(&ca, &cb)?)
    }
}
