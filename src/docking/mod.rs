//! GA ligand docking driver: grid setup, GA protocol, final exact minimization, reporting

use crate::config::{ConfigError, DockingConfig, FinalMinimize, RunMode, SidechainMode};
use crate::coords::CoordinateSet;
use crate::forcefield::{EnergyFunction, ForceField, PairwiseEnergy};
use crate::grid::{GridError, ScoringGrid};
use crate::molecule::{Structure, StructureError};
use crate::optimization::{
    ConformerModel, GaOptimizer, Gene, LocalOptimizer, MutationScale, OptimizationError, PoolSources,
};
use crate::rms::{automorphic_rmsd, xyz_rmsd_no_super, RmsError};
use log::{debug, info, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that abort a docking run
#[derive(Error, Debug)]
pub enum DockingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Optimization error: {0}")]
    Optimization(#[from] OptimizationError),

    #[error("RMSD error: {0}")]
    Rms(#[from] RmsError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    #[error("No ligand residues in structure {0}")]
    NoLigand(String),

    #[error("Docking produced no poses")]
    NoPoses,
}

/// Binding free-energy estimate in energy-function units (for relative ranking only)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindingEstimate {
    /// complex - free ligand - free receptor
    pub dh: f64,
    /// -T dS from torsional sampling
    pub minus_tds: f64,
    pub dg: f64,
}

/// One reported pose
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockedPose {
    #[serde(skip)]
    pub structure: Structure,
    pub tag: String,
    /// 1-based rank by exact score
    pub rank: usize,
    /// Exact energy of the complex
    pub score: f64,
    /// Ligand RMSD to the native structure
    pub rms: Option<f64>,
    pub ligscore: f64,
    pub recscore: f64,
    pub ligand_name: String,
    pub binding: Option<BindingEstimate>,
}

/// Genetic-algorithm ligand docking on a precomputed receptor grid
pub struct GaLigandDock {
    config: DockingConfig,
    forcefield: Arc<dyn ForceField>,
    energy: Box<dyn EnergyFunction>,
    native: Option<Structure>,
    references: Vec<Structure>,
}

impl GaLigandDock {
    /// Create a docking driver; the configuration is validated here, before any grid work
    pub fn new(config: DockingConfig, forcefield: Arc<dyn ForceField>) -> Result<Self, DockingError> {
        config.validate()?;
        let energy = Box::new(PairwiseEnergy::new(forcefield.clone()));
        Ok(Self {
            config,
            forcefield,
            energy,
            native: None,
            references: Vec::new(),
        })
    }

    /// Replace the exact energy used for relaxation, final minimization and reporting
    pub fn with_energy_function(mut self, energy: Box<dyn EnergyFunction>) -> Self {
        self.energy = energy;
        self
    }

    pub fn with_native(mut self, native: Structure) -> Self {
        self.native = Some(native);
        self
    }

    pub fn with_references(mut self, references: Vec<Structure>) -> Self {
        self.references = references;
        self
    }

    pub fn config(&self) -> &DockingConfig {
        &self.config
    }

    fn ligand_residues(&self, structure: &Structure) -> Result<Vec<usize>, DockingError> {
        let ligands = match &self.config.ligand_residues {
            Some(list) => list.clone(),
            None => structure.ligand_residues(),
        };
        if ligands.is_empty() {
            return Err(DockingError::NoLigand(structure.name.clone()));
        }
        for &r in &ligands {
            if r >= structure.residue_count() {
                return Err(GridError::MissingLigandResidue(r).into());
            }
        }
        Ok(ligands)
    }

    /// Side chains allowed to move, per the configured selection mode
    pub fn movable_scs(
        &self,
        structure: &Structure,
        grid: &ScoringGrid,
        ligands: &[usize],
    ) -> Result<Vec<usize>, DockingError> {
        let movable = match &self.config.sidechains {
            SidechainMode::None => Vec::new(),
            SidechainMode::List(list) => {
                for &r in list {
                    structure.residue(r)?;
                }
                list.iter().copied().filter(|r| !ligands.contains(r)).collect()
            }
            SidechainMode::Auto => (0..structure.residue_count())
                .filter(|r| !ligands.contains(r))
                .filter(|&r| {
                    let res = &structure.residues[r];
                    res.is_protein()
                        && !res.chi_atoms().is_empty()
                        && res
                            .nbr_atom()
                            .and_then(|i| res.atom_xyz(i))
                            .map_or(false, |p| grid.in_shrunk_box(&p, self.config.sc_edge_buffer))
                })
                .collect(),
        };
        debug!("Movable side chains: {:?}", movable);
        Ok(movable)
    }

    /// Native residue paired with ligand residue `r`; a ligand in the last slot maps to the last native residue
    fn native_residue_index(structure: &Structure, other: &Structure, r: usize) -> usize {
        if r + 1 == structure.residue_count() && other.residue_count() > 0 {
            other.residue_count() - 1
        } else {
            r
        }
    }

    /// Heavy-atom coordinates of `other`'s copy of the ligand, in the input ligand's atom order
    fn matching_ligand_coordinates(
        structure: &Structure,
        other: &Structure,
        ligands: &[usize],
    ) -> Option<Vec<Vector3<f64>>> {
        let mut coords = Vec::new();
        for &r in ligands {
            let res = structure.residues.get(r)?;
            let other_res = other.residues.get(Self::native_residue_index(structure, other, r))?;
            for atom in res.atoms.iter().filter(|a| !a.is_hydrogen()) {
                let j = other_res.atom_index(&atom.name)?;
                coords.push(other_res.atoms[j].coordinates);
            }
        }
        Some(coords)
    }

    /// Ligand RMSD to the native: symmetry-aware for a single ligand residue, heavy atoms otherwise
    pub fn ligand_rms(&self, pose: &Structure, ligands: &[usize]) -> Result<Option<f64>, DockingError> {
        let native = match &self.native {
            Some(n) => n,
            None => return Ok(None),
        };
        let rms = if ligands.len() == 1 {
            let r = ligands[0];
            let native_res = native.residue(Self::native_residue_index(pose, native, r))?;
            automorphic_rmsd(native_res, pose.residue(r)?, false)?
        } else {
            let native_coords = match Self::matching_ligand_coordinates(pose, native, ligands) {
                Some(c) if !c.is_empty() => c,
                _ => {
                    warn!("Native structure does not contain the ligand atoms; RMSD not reported");
                    return Ok(None);
                }
            };
            let pose_coords: Vec<Vector3<f64>> = ligands
                .iter()
                .filter_map(|&r| pose.residues.get(r))
                .flat_map(|res| res.atoms.iter().filter(|a| !a.is_hydrogen()).map(|a| a.coordinates))
                .collect();
            xyz_rmsd_no_super(&CoordinateSet::new(native_coords), &CoordinateSet::new(pose_coords))?
        };
        Ok(Some(rms))
    }

    /// Copy of `structure` holding only the `listed` residues, or only the others
    fn subset(structure: &Structure, listed: &[usize], keep_listed: bool) -> Structure {
        let mut out = Structure::new(&structure.name);
        for (i, res) in structure.residues.iter().enumerate() {
            if listed.contains(&i) == keep_listed {
                out.add_residue(res.clone());
            }
        }
        out
    }

    /// Energy of the ligand alone
    pub fn free_ligand_score(&self, structure: &Structure, ligands: &[usize]) -> f64 {
        self.energy.score(&Self::subset(structure, ligands, true))
    }

    /// Energy of the receptor with the ligand removed
    pub fn free_receptor_score(&self, structure: &Structure, ligands: &[usize]) -> f64 {
        self.energy.score(&Self::subset(structure, ligands, false))
    }

    /// -T dS from the Boltzmann-weighted effective number of ligand torsion states
    pub fn estimate_entropy<R: Rng + ?Sized>(
        &self,
        structure: &Structure,
        ligands: &[usize],
        rng: &mut R,
    ) -> Result<f64, DockingError> {
        let model = ConformerModel::new(structure, ligands, &[])?;
        let niter = self.config.entropy_niter;
        if model.torsions().is_empty() || niter == 0 {
            return Ok(0.0);
        }
        let base = model.gene_from_structure(structure)?;
        let mut work = structure.clone();
        let kt = self.config.entropy_kt;

        let mut energies = Vec::with_capacity(niter);
        for _ in 0..niter {
            let mut gene = base.clone();
            for t in &mut gene.torsions {
                *t = rng.gen_range(-180.0..180.0);
            }
            model.apply(&gene, &mut work)?;
            energies.push(self.energy.score_residues(&work, ligands));
        }

        let e_min = energies.iter().copied().fold(f64::INFINITY, f64::min);
        let weights: Vec<f64> = energies.iter().map(|e| (-(e - e_min) / kt).exp()).collect();
        let sum: f64 = weights.iter().sum();
        let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
        let n_eff = sum * sum / sum_sq;
        Ok(-kt * (n_eff / niter as f64).ln())
    }

    fn binding_estimate<R: Rng + ?Sized>(
        &self,
        structure: &Structure,
        ligands: &[usize],
        complex: f64,
        ligscore: f64,
        recscore: f64,
        rng: &mut R,
    ) -> Result<BindingEstimate, DockingError> {
        let dh = complex - ligscore - recscore;
        let minus_tds = self.estimate_entropy(structure, ligands, rng)?;
        let estimate = BindingEstimate {
            dh,
            minus_tds,
            dg: dh + minus_tds,
        };
        info!(
            "Estimated binding free energy: dH {:.3}, -TdS {:.3}, dG {:.3}",
            estimate.dh, estimate.minus_tds, estimate.dg
        );
        Ok(estimate)
    }

    fn ligand_name(structure: &Structure, ligands: &[usize]) -> String {
        ligands
            .iter()
            .filter_map(|&r| structure.residues.get(r).map(|res| res.name.clone()))
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Score the input pose without searching
    pub fn eval(&self, structure: &Structure) -> Result<DockedPose, DockingError> {
        let ligands = self.ligand_residues(structure)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let score = self.energy.score(structure);
        let ligscore = self.free_ligand_score(structure, &ligands);
        let recscore = self.free_receptor_score(structure, &ligands);
        let binding = self.binding_estimate(structure, &ligands, score, ligscore, recscore, &mut rng)?;
        Ok(DockedPose {
            structure: structure.clone(),
            tag: format!("{}_eval", structure.name),
            rank: 1,
            score,
            rms: self.ligand_rms(structure, &ligands)?,
            ligscore,
            recscore,
            ligand_name: Self::ligand_name(structure, &ligands),
            binding: Some(binding),
        })
    }

    /// Dock the ligand of `structure` and return up to `nreport` poses ranked by exact energy
    pub fn apply(&self, structure: &Structure) -> Result<Vec<DockedPose>, DockingError> {
        self.dock_with_seed(structure, self.config.seed)
    }

    /// Dock independent structures in parallel; job `i` uses seed `seed + i`
    pub fn dock_batch(&self, structures: &[Structure]) -> Vec<Result<Vec<DockedPose>, DockingError>> {
        structures
            .par_iter()
            .enumerate()
            .map(|(i, s)| self.dock_with_seed(s, self.config.seed.wrapping_add(i as u64)))
            .collect()
    }

    fn initial_sources<R: Rng + ?Sized>(
        &self,
        structure: &Structure,
        model: &ConformerModel,
        ligands: &[usize],
        npool: usize,
        rng: &mut R,
    ) -> Result<PoolSources, DockingError> {
        let input = model.gene_from_structure(structure)?;
        let mut sources = PoolSources {
            inputs: vec![input.clone()],
            references: Vec::new(),
            random_oversample: self.config.random_oversample,
            reference_oversample: self.config.reference_oversample,
            reference_frac: self.config.reference_frac,
        };

        if self.config.runmode == RunMode::Refine {
            let scale = MutationScale {
                translation: 1.0,
                rotation_deg: 15.0,
                torsion_deg: 30.0,
                chi_deg: 20.0,
                dof_probability: 0.5,
            };
            while sources.inputs.len() < npool {
                sources.inputs.push(model.mutate(&input, &scale, rng));
            }
            return Ok(sources);
        }

        for (i, reference) in self.references.iter().enumerate() {
            match Self::matching_ligand_coordinates(structure, reference, ligands) {
                Some(coords) => sources.references.push(coords),
                None => warn!("Reference {} ({}) does not contain the ligand atoms; skipped", i, reference.name),
            }
        }
        Ok(sources)
    }

    fn final_minimize(
        &self,
        model: &ConformerModel,
        gene: &Gene,
        structure: &Structure,
    ) -> Result<Structure, DockingError> {
        let mut posed = structure.clone();
        let mode = self.config.final_exact_minimize;
        let (mask, rounds) = match mode {
            FinalMinimize::None => (None, 0),
            FinalMinimize::LigandOnly => (Some(model.dof_mask(true, false)), 1),
            FinalMinimize::Sidechain => (Some(model.dof_mask(true, true)), 1),
            FinalMinimize::BackboneSidechain { extra_cycles } => (Some(model.dof_mask(true, true)), 1 + extra_cycles),
        };

        let mut best = gene.clone();
        if let Some(mask) = mask {
            let mut moving = model.ligand_residues().to_vec();
            if mode.moves_sidechains() {
                moving.extend_from_slice(model.movable_scs());
            }
            let optimizer = LocalOptimizer::new().with_max_iterations(self.config.final_maxiter);
            let mut work = structure.clone();
            for _ in 0..rounds {
                let (next, _) = optimizer.minimize(model, &best, &mask, |g| {
                    model.apply(g, &mut work)?;
                    Ok(self.energy.score_residues(&work, &moving))
                })?;
                best = next;
            }
        }
        model.apply(&best, &mut posed)?;
        Ok(posed)
    }

    fn dock_with_seed(&self, structure: &Structure, seed: u64) -> Result<Vec<DockedPose>, DockingError> {
        if self.config.runmode == RunMode::Eval {
            return Ok(vec![self.eval(structure)?]);
        }
        let start = Instant::now();
        let ligands = self.ligand_residues(structure)?;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut grid = ScoringGrid::new(self.config.grid.clone(), self.forcefield.clone());
        grid.prepare_grid(structure, &ligands)?;
        let movable = self.movable_scs(structure, &grid, &ligands)?;
        grid.get_grid_atomtypes(structure, &movable)?;
        grid.calculate_grid(structure)?;
        info!(
            "Grid for {} built in {:.2}s",
            structure.name,
            start.elapsed().as_secs_f64()
        );

        let model = ConformerModel::new(structure, &ligands, &movable)?.with_sample_radius(self.config.sample_radius());
        let stages = self.config.stage_protocol();
        let first = stages.first().ok_or(DockingError::NoPoses)?;

        let mut ga = GaOptimizer::new(&grid, &model, structure)
            .with_exact(self.energy.as_ref())
            .with_nrelax(self.config.nrelax);
        if let Some(native) = &self.native {
            match Self::matching_ligand_coordinates(structure, native, &ligands) {
                Some(coords) => ga = ga.with_native(coords),
                None => warn!("Native structure does not contain the ligand atoms; RMSD tracking disabled"),
            }
        }

        let sources = self.initial_sources(structure, &model, &ligands, first.npool, &mut rng)?;
        let weights = ga.weights_for(first, 0);
        let pool = ga.initial_pool(&sources, first.npool, first.rmsthreshold, &weights, &mut rng)?;
        let pool = ga.run(pool, &stages, &mut rng)?;

        let nreport = self.config.nreport.min(pool.len());
        let mut poses = Vec::with_capacity(nreport);
        for gene in pool.iter().take(nreport) {
            let posed = self.final_minimize(&model, gene, structure)?;
            let score = self.energy.score(&posed);
            let ligscore = self.free_ligand_score(&posed, &ligands);
            let recscore = self.free_receptor_score(&posed, &ligands);
            poses.push(DockedPose {
                rms: self.ligand_rms(&posed, &ligands)?,
                structure: posed,
                tag: String::new(),
                rank: 0,
                score,
                ligscore,
                recscore,
                ligand_name: Self::ligand_name(structure, &ligands),
                binding: None,
            });
        }
        if poses.is_empty() {
            return Err(DockingError::NoPoses);
        }

        poses.sort_by(|a, b| a.score.total_cmp(&b.score));
        for (i, pose) in poses.iter_mut().enumerate() {
            pose.rank = i + 1;
            pose.tag = format!("{}_{:04}", structure.name, i + 1);
        }

        if self.config.estimate_dg {
            let best = &poses[0];
            let estimate = self.binding_estimate(
                &best.structure,
                &ligands,
                best.score,
                best.ligscore,
                best.recscore,
                &mut rng,
            )?;
            poses[0].binding = Some(estimate);
        }

        info!(
            "Docked {} in {:.2}s: best score {:.3}{}",
            structure.name,
            start.elapsed().as_secs_f64(),
            poses[0].score,
            poses[0].rms.map_or(String::new(), |r| format!(", rms {:.2}", r))
        );
        Ok(poses)
    }
}
