//! Genetic-algorithm driver: initial pool, generations of crossover/mutation/refinement, diverse selection

use crate::coords::CoordinateSet;
use crate::forcefield::EnergyFunction;
use crate::grid::{ScoreWeights, ScoringGrid};
use crate::molecule::Structure;
use crate::optimization::conformer::{ConformerModel, Gene, MutationScale};
use crate::optimization::local::{LocalOptimizer, LocalOptimizerParams};
use crate::optimization::{GaDockStageParams, OptimizationError};
use crate::rms::xyz_rmsd_no_super;
use log::{debug, info, warn};
use nalgebra::Vector3;
use rand::Rng;

/// Where the initial population comes from
#[derive(Debug, Clone)]
pub struct PoolSources {
    /// Genes encoding user-supplied input poses; always kept
    pub inputs: Vec<Gene>,
    /// Reference ligand heavy-atom coordinates to align random conformers onto
    pub references: Vec<Vec<Vector3<f64>>>,
    pub random_oversample: usize,
    pub reference_oversample: usize,
    /// Share of the free pool slots seeded from references
    pub reference_frac: f64,
}

impl Default for PoolSources {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            references: Vec::new(),
            random_oversample: 10,
            reference_oversample: 2,
            reference_frac: 0.5,
        }
    }
}

fn pair_distance(a: &CoordinateSet, b: &CoordinateSet) -> f64 {
    xyz_rmsd_no_super(a, b).unwrap_or(f64::INFINITY)
}

/// Pick `n` candidates following `order`; the first `fixed` entries of `order` are always taken.
/// Others are taken only if at least `threshold` away from everything already picked, and
/// leftover slots are filled in order regardless of distance.
fn select_in_order(coords: &[CoordinateSet], order: &[usize], fixed: usize, n: usize, threshold: f64) -> Vec<usize> {
    let mut selected: Vec<usize> = order.iter().take(fixed.min(n)).copied().collect();
    for &i in order.iter().skip(fixed) {
        if selected.len() >= n {
            break;
        }
        if selected
            .iter()
            .all(|&j| pair_distance(&coords[i], &coords[j]) >= threshold)
        {
            selected.push(i);
        }
    }

    if selected.len() < n {
        let before = selected.len();
        for &i in order.iter().skip(fixed) {
            if selected.len() >= n {
                break;
            }
            if !selected.contains(&i) {
                selected.push(i);
            }
        }
        if selected.len() > before {
            debug!(
                "Only {} diverse candidates within {:.2} A; filled {} slots by score",
                before,
                threshold,
                selected.len() - before
            );
        }
    }
    selected
}

fn score_order(genes: &[Gene]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..genes.len()).collect();
    order.sort_by(|&a, &b| genes[a].score.total_cmp(&genes[b].score));
    order
}

/// Indices of up to `n` genes chosen best-score-first under the diversity constraint
pub fn select_diverse(genes: &[Gene], coords: &[CoordinateSet], n: usize, threshold: f64) -> Vec<usize> {
    select_in_order(coords, &score_order(genes), 0, n, threshold)
}

/// Number of pairs closer than `threshold`
pub fn count_diversity_violations(coords: &[CoordinateSet], threshold: f64) -> usize {
    let mut count = 0;
    for i in 0..coords.len() {
        for j in (i + 1)..coords.len() {
            if pair_distance(&coords[i], &coords[j]) < threshold {
                count += 1;
            }
        }
    }
    count
}

/// Evolves a population of genes against a ready scoring grid
pub struct GaOptimizer<'a> {
    grid: &'a ScoringGrid,
    model: &'a ConformerModel,
    exact: Option<&'a dyn EnergyFunction>,
    work: Structure,
    native: Option<CoordinateSet>,
    /// Survivors refined with the exact energy between stages and kept after the last one
    pub nrelax: usize,
    pub mutation: MutationScale,
    pub local: LocalOptimizerParams,
}

impl<'a> GaOptimizer<'a> {
    pub fn new(grid: &'a ScoringGrid, model: &'a ConformerModel, structure: &Structure) -> Self {
        Self {
            grid,
            model,
            exact: None,
            work: structure.clone(),
            native: None,
            nrelax: 20,
            mutation: MutationScale::default(),
            local: LocalOptimizerParams::default(),
        }
    }

    pub fn with_exact(mut self, energy: &'a dyn EnergyFunction) -> Self {
        self.exact = Some(energy);
        self
    }

    /// Track ligand RMSD to these native heavy-atom coordinates
    pub fn with_native(mut self, native: Vec<Vector3<f64>>) -> Self {
        self.native = Some(CoordinateSet::new(native));
        self
    }

    pub fn with_nrelax(mut self, nrelax: usize) -> Self {
        self.nrelax = nrelax;
        self
    }

    pub fn with_mutation(mut self, mutation: MutationScale) -> Self {
        self.mutation = mutation;
        self
    }

    /// Grid weights for `generation` of `stage`
    pub fn weights_for(&self, stage: &GaDockStageParams, generation: usize) -> ScoreWeights {
        ScoreWeights {
            w_rep: self.grid.params().fa_rep_grid * stage.ramp_at(generation),
            smoothing: stage.smoothing_at(generation),
            elec_scale: stage.elec_scale,
        }
    }

    fn moving_residues(&self) -> Vec<usize> {
        let mut residues = self.model.ligand_residues().to_vec();
        residues.extend_from_slice(self.model.movable_scs());
        residues
    }

    /// Grid energy of the gene plus the pair energy among its moving atoms
    pub fn grid_score(&mut self, gene: &Gene, weights: &ScoreWeights) -> Result<f64, OptimizationError> {
        self.model.apply(gene, &mut self.work)?;
        let grid_energy = self.grid.score_weighted(&self.work, weights)?;
        Ok(grid_energy + self.grid.moving_pair_energy(&self.work, weights.w_rep))
    }

    /// Exact energy of every interaction involving a moving residue; falls back to the full-weight grid
    pub fn exact_score(&mut self, gene: &Gene) -> Result<f64, OptimizationError> {
        match self.exact {
            Some(energy) => {
                self.model.apply(gene, &mut self.work)?;
                let residues = self.moving_residues();
                Ok(energy.score_residues(&self.work, &residues))
            }
            None => self.grid_score(gene, &ScoreWeights::default()),
        }
    }

    fn native_rms(&self, gene: &Gene) -> Result<Option<f64>, OptimizationError> {
        match &self.native {
            Some(native) => {
                let coords = CoordinateSet::new(self.model.ligand_coordinates(gene)?);
                Ok(Some(xyz_rmsd_no_super(&coords, native)?))
            }
            None => Ok(None),
        }
    }

    fn evaluate(&mut self, gene: &mut Gene, weights: &ScoreWeights) -> Result<(), OptimizationError> {
        gene.score = self.grid_score(gene, weights)?;
        gene.rms = self.native_rms(gene)?;
        Ok(())
    }

    fn coordinates(&self, genes: &[Gene]) -> Result<Vec<CoordinateSet>, OptimizationError> {
        genes
            .iter()
            .map(|g| Ok(CoordinateSet::new(self.model.ligand_coordinates(g)?)))
            .collect()
    }

    /// Greedy random chi trials, keeping only improvements
    fn pack_sidechains<R: Rng + ?Sized>(
        &mut self,
        gene: Gene,
        cycles: usize,
        weights: &ScoreWeights,
        rng: &mut R,
    ) -> Result<Gene, OptimizationError> {
        if gene.chis.is_empty() || cycles == 0 {
            return Ok(gene);
        }
        let mut best = gene;
        best.score = self.grid_score(&best, weights)?;
        for _ in 0..cycles {
            let mut trial = best.clone();
            let k = rng.gen_range(0..trial.chis.len());
            trial.chis[k] = rng.gen_range(-180.0..180.0);
            let score = self.grid_score(&trial, weights)?;
            if score < best.score {
                trial.score = score;
                best = trial;
            }
        }
        Ok(best)
    }

    fn minimize_on_grid(&mut self, gene: &Gene, maxiter: usize, weights: &ScoreWeights) -> Result<Gene, OptimizationError> {
        let model = self.model;
        let optimizer = LocalOptimizer::with_params(self.local.clone()).with_max_iterations(maxiter);
        let mask = model.dof_mask(true, true);
        let (best, _) = optimizer.minimize(model, gene, &mask, |g| self.grid_score(g, weights))?;
        Ok(best)
    }

    fn minimize_exact(&mut self, gene: &Gene, maxiter: usize) -> Result<Gene, OptimizationError> {
        let model = self.model;
        let optimizer = LocalOptimizer::with_params(self.local.clone()).with_max_iterations(maxiter);
        let mask = model.dof_mask(true, true);
        let (best, _) = optimizer.minimize(model, gene, &mask, |g| self.exact_score(g))?;
        Ok(best)
    }

    /// Seed a population of `npool` genes from inputs, references and random placements
    pub fn initial_pool<R: Rng + ?Sized>(
        &mut self,
        sources: &PoolSources,
        npool: usize,
        rmsthreshold: f64,
        weights: &ScoreWeights,
        rng: &mut R,
    ) -> Result<Vec<Gene>, OptimizationError> {
        let mut inputs: Vec<Gene> = sources.inputs.iter().take(npool).cloned().collect();
        for gene in &mut inputs {
            self.evaluate(gene, weights)?;
        }
        let free = npool - inputs.len();

        let n_ref = if sources.references.is_empty() {
            0
        } else {
            ((sources.reference_frac * free as f64).round() as usize).min(free)
        };
        let mut references = Vec::new();
        if n_ref > 0 {
            let mut candidates = Vec::with_capacity(n_ref * sources.reference_oversample.max(1));
            for _ in 0..n_ref * sources.reference_oversample.max(1) {
                let target = &sources.references[rng.gen_range(0..sources.references.len())];
                let mut gene = self.model.align_to(&self.model.random_gene(rng), target)?;
                self.evaluate(&mut gene, weights)?;
                candidates.push(gene);
            }
            let coords = self.coordinates(&candidates)?;
            references = select_diverse(&candidates, &coords, n_ref, rmsthreshold)
                .into_iter()
                .map(|i| candidates[i].clone())
                .collect();
        }

        let fixed: Vec<Gene> = inputs.into_iter().chain(references).collect();
        let n_random = npool - fixed.len();
        let mut randoms = Vec::with_capacity(n_random * sources.random_oversample.max(1));
        for _ in 0..n_random * sources.random_oversample.max(1) {
            let mut gene = self.model.random_gene(rng);
            self.evaluate(&mut gene, weights)?;
            randoms.push(gene);
        }

        let n_fixed = fixed.len();
        let candidates: Vec<Gene> = fixed.into_iter().chain(randoms).collect();
        let mut order: Vec<usize> = (0..n_fixed).collect();
        let mut random_order: Vec<usize> = (n_fixed..candidates.len()).collect();
        random_order.sort_by(|&a, &b| candidates[a].score.total_cmp(&candidates[b].score));
        order.extend(random_order);

        let coords = self.coordinates(&candidates)?;
        let mut pool: Vec<Gene> = select_in_order(&coords, &order, n_fixed, npool, rmsthreshold)
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect();
        pool.sort_by(|a, b| a.score.total_cmp(&b.score));
        info!(
            "Initial pool: {} genes ({} fixed, {} random candidates), best {:.3}",
            pool.len(),
            n_fixed,
            candidates.len() - n_fixed,
            pool.first().map_or(f64::NAN, |g| g.score)
        );
        Ok(pool)
    }

    /// Run one stage and return the final pool sorted by score
    pub fn run_stage<R: Rng + ?Sized>(
        &mut self,
        mut pool: Vec<Gene>,
        stage: &GaDockStageParams,
        rng: &mut R,
    ) -> Result<Vec<Gene>, OptimizationError> {
        stage.validate()?;
        if pool.is_empty() {
            return Err(OptimizationError::EmptyPopulation);
        }

        for generation in 0..stage.repeats {
            let weights = self.weights_for(stage, generation);
            for gene in &mut pool {
                self.evaluate(gene, &weights)?;
            }

            let mut children = Vec::with_capacity(stage.npool);
            for _ in 0..stage.npool {
                let a = &pool[rng.gen_range(0..pool.len())];
                let b = &pool[rng.gen_range(0..pool.len())];
                let mut child = self.model.crossover(a, b, rng);
                if rng.gen::<f64>() < stage.pmut {
                    child = self.model.mutate(&child, &self.mutation, rng);
                }
                child = self.pack_sidechains(child, stage.packcycles, &weights, rng)?;
                if stage.maxiter > 0 {
                    child = self.minimize_on_grid(&child, stage.maxiter, &weights)?;
                }
                self.evaluate(&mut child, &weights)?;
                children.push(child);
            }

            let combined: Vec<Gene> = pool.into_iter().chain(children).collect();
            let coords = self.coordinates(&combined)?;
            pool = select_diverse(&combined, &coords, stage.npool, stage.rmsthreshold)
                .into_iter()
                .map(|i| combined[i].clone())
                .collect();
            // fill-in genes come after the diverse ones
            pool.sort_by(|a, b| a.score.total_cmp(&b.score));

            let mean = pool.iter().map(|g| g.score).sum::<f64>() / pool.len() as f64;
            match pool[0].rms {
                Some(rms) => info!(
                    "Generation {}/{}: best {:.3} (rms {:.2}), mean {:.3}, w_rep {:.3}",
                    generation + 1,
                    stage.repeats,
                    pool[0].score,
                    rms,
                    mean,
                    weights.w_rep
                ),
                None => info!(
                    "Generation {}/{}: best {:.3}, mean {:.3}, w_rep {:.3}",
                    generation + 1,
                    stage.repeats,
                    pool[0].score,
                    mean,
                    weights.w_rep
                ),
            }
        }

        Ok(pool)
    }

    fn relax_count(&self, pool_len: usize) -> usize {
        if self.nrelax > pool_len {
            warn!(
                "nrelax ({}) exceeds the pool size ({}); relaxing the whole pool",
                self.nrelax, pool_len
            );
            pool_len
        } else {
            self.nrelax
        }
    }

    /// Minimize the top `nrelax` genes with the exact energy, re-scored on the grid for the next stage
    pub fn refine_exact(
        &mut self,
        mut pool: Vec<Gene>,
        stage: &GaDockStageParams,
    ) -> Result<Vec<Gene>, OptimizationError> {
        if self.exact.is_none() || stage.maxiter == 0 {
            return Ok(pool);
        }
        let weights = self.weights_for(stage, stage.repeats.saturating_sub(1));
        for i in 0..self.relax_count(pool.len()) {
            let mut relaxed = self.minimize_exact(&pool[i], stage.maxiter)?;
            self.evaluate(&mut relaxed, &weights)?;
            pool[i] = relaxed;
        }
        pool.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(pool)
    }

    /// Keep the top `nrelax` genes, minimize them with the exact energy and rank them by it
    pub fn relax_final(&mut self, pool: Vec<Gene>, maxiter: usize) -> Result<Vec<Gene>, OptimizationError> {
        let n = self.relax_count(pool.len());
        let mut relaxed = Vec::with_capacity(n);
        for gene in pool.iter().take(n) {
            let mut gene = if maxiter > 0 {
                self.minimize_exact(gene, maxiter)?
            } else {
                gene.clone()
            };
            gene.score = self.exact_score(&gene)?;
            gene.rms = self.native_rms(&gene)?;
            relaxed.push(gene);
        }
        relaxed.sort_by(|a, b| a.score.total_cmp(&b.score));
        debug!(
            "Relaxed {} of {} genes, best exact score {:.3}",
            relaxed.len(),
            pool.len(),
            relaxed.first().map_or(f64::NAN, |g| g.score)
        );
        Ok(relaxed)
    }

    /// Run every stage in order; the result holds at most `nrelax` genes ranked by exact energy
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        mut pool: Vec<Gene>,
        stages: &[GaDockStageParams],
        rng: &mut R,
    ) -> Result<Vec<Gene>, OptimizationError> {
        for (i, stage) in stages.iter().enumerate() {
            info!(
                "Stage {}/{}: {} generations, pool {}, pmut {:.2}, rmsthreshold {:.2}",
                i + 1,
                stages.len(),
                stage.repeats,
                stage.npool,
                stage.pmut,
                stage.rmsthreshold
            );
            pool = self.run_stage(pool, stage, rng)?;
            if i + 1 < stages.len() {
                pool = self.refine_exact(pool, stage)?;
            }
        }
        let maxiter = stages.last().map_or(0, |s| s.maxiter);
        self.relax_final(pool, maxiter)
    }

    pub fn model(&self) -> &ConformerModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcefield::{PairwiseEnergy, VinaForceField};
    use crate::grid::test_util::pocket_complex;
    use crate::grid::GridParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn gene_with(score: f64) -> Gene {
        Gene {
            translation: Vector3::zeros(),
            rotation: nalgebra::UnitQuaternion::identity(),
            torsions: Vec::new(),
            chis: Vec::new(),
            score,
            rms: None,
        }
    }

    fn point_set(x: f64) -> CoordinateSet {
        CoordinateSet::new(vec![Vector3::new(x, 0.0, 0.0), Vector3::new(x, 1.0, 0.0)])
    }

    #[test]
    fn test_select_diverse_skips_near_duplicates() {
        let genes = vec![gene_with(-3.0), gene_with(-2.9), gene_with(-1.0), gene_with(0.0)];
        let coords = vec![point_set(0.0), point_set(0.2), point_set(5.0), point_set(10.0)];

        let picked = select_diverse(&genes, &coords, 3, 1.0);
        assert_eq!(picked, vec![0, 2, 3]);
        let chosen: Vec<CoordinateSet> = picked.iter().map(|&i| coords[i].clone()).collect();
        assert_eq!(count_diversity_violations(&chosen, 1.0), 0);
    }

    #[test]
    fn test_select_diverse_fills_by_score_when_short() {
        let genes = vec![gene_with(-3.0), gene_with(-2.9), gene_with(-1.0)];
        let coords = vec![point_set(0.0), point_set(0.2), point_set(0.4)];
        let picked = select_diverse(&genes, &coords, 3, 1.0);
        assert_eq!(picked, vec![0, 1, 2]);
        assert_eq!(count_diversity_violations(&coords, 1.0), 3);
    }

    fn setup() -> (ScoringGrid, ConformerModel, Structure, PairwiseEnergy) {
        let s = pocket_complex();
        let lig = s.ligand_residues();
        let params = GridParams {
            grid_step: 0.5,
            padding: 3.0,
            ..GridParams::default()
        };
        let grid = ScoringGrid::build(params, Arc::new(VinaForceField::default()), &s, &lig, &[]).unwrap();
        let model = ConformerModel::new(&s, &lig, &[]).unwrap().with_sample_radius(1.5);
        let energy = PairwiseEnergy::new(Arc::new(VinaForceField::default()));
        (grid, model, s, energy)
    }

    fn small_stage() -> GaDockStageParams {
        GaDockStageParams {
            repeats: 2,
            npool: 6,
            rmsthreshold: 0.5,
            maxiter: 3,
            packcycles: 0,
            ..GaDockStageParams::default()
        }
    }

    #[test]
    fn test_initial_pool_keeps_inputs_and_size() {
        let (grid, model, s, _) = setup();
        let mut ga = GaOptimizer::new(&grid, &model, &s);
        let mut rng = StdRng::seed_from_u64(7);
        let sources = PoolSources {
            inputs: vec![model.identity_gene()],
            references: vec![model.structure_ligand_coordinates(&s).unwrap()],
            random_oversample: 3,
            ..PoolSources::default()
        };
        let pool = ga
            .initial_pool(&sources, 8, 0.5, &ScoreWeights::default(), &mut rng)
            .unwrap();
        assert_eq!(pool.len(), 8);
        assert!(pool.windows(2).all(|w| w[0].score <= w[1].score));
        // the input pose survives selection
        assert!(pool.iter().any(|g| model.distance(g, &model.identity_gene()).unwrap() < 1e-9));
    }

    #[test]
    fn test_run_stage_with_exact_relax() {
        let (grid, model, s, energy) = setup();
        let native = model.structure_ligand_coordinates(&s).unwrap();
        let mut ga = GaOptimizer::new(&grid, &model, &s)
            .with_exact(&energy)
            .with_native(native)
            .with_nrelax(50);
        let mut rng = StdRng::seed_from_u64(42);
        let stage = small_stage();
        let weights = ga.weights_for(&stage, 0);
        let pool = ga
            .initial_pool(&PoolSources::default(), stage.npool, stage.rmsthreshold, &weights, &mut rng)
            .unwrap();

        // nrelax larger than the pool only warns
        let result = ga.run(pool, &[stage.clone()], &mut rng).unwrap();
        assert_eq!(result.len(), stage.npool);
        assert!(result.windows(2).all(|w| w[0].score <= w[1].score));
        assert!(result.iter().all(|g| g.score.is_finite() && g.rms.is_some()));
    }

    #[test]
    fn test_run_keeps_nrelax_genes_ranked_by_exact_energy() {
        let (grid, model, s, energy) = setup();
        let mut ga = GaOptimizer::new(&grid, &model, &s).with_exact(&energy).with_nrelax(2);
        let mut rng = StdRng::seed_from_u64(11);
        let stage = small_stage();
        let weights = ga.weights_for(&stage, 0);
        let pool = ga
            .initial_pool(&PoolSources::default(), stage.npool, stage.rmsthreshold, &weights, &mut rng)
            .unwrap();

        let result = ga.run(pool, &[stage.clone(), stage], &mut rng).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].score <= result[1].score);
        for gene in &result {
            assert!((gene.score - ga.exact_score(gene).unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_run_stage_sorts_fill_in_genes() {
        let (grid, model, s, _) = setup();
        let mut ga = GaOptimizer::new(&grid, &model, &s);
        let mut rng = StdRng::seed_from_u64(3);
        // a radius wider than the sampling sphere leaves most slots to fill-in
        let stage = GaDockStageParams {
            rmsthreshold: 5.0,
            maxiter: 0,
            ..small_stage()
        };
        let weights = ga.weights_for(&stage, 0);
        let pool = ga
            .initial_pool(&PoolSources::default(), stage.npool, stage.rmsthreshold, &weights, &mut rng)
            .unwrap();

        let result = ga.run_stage(pool, &stage, &mut rng).unwrap();
        assert_eq!(result.len(), stage.npool);
        assert!(result.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn test_ga_pools_respect_diversity_radius() {
        let (grid, model, s, _) = setup();
        let mut ga = GaOptimizer::new(&grid, &model, &s);
        let mut rng = StdRng::seed_from_u64(21);
        let stage = GaDockStageParams {
            rmsthreshold: 0.25,
            maxiter: 0,
            ..small_stage()
        };
        let weights = ga.weights_for(&stage, 0);
        let sources = PoolSources {
            random_oversample: 4,
            ..PoolSources::default()
        };

        let pool = ga
            .initial_pool(&sources, stage.npool, stage.rmsthreshold, &weights, &mut rng)
            .unwrap();
        let coords = ga.coordinates(&pool).unwrap();
        assert_eq!(count_diversity_violations(&coords, stage.rmsthreshold), 0);

        let pool = ga.run_stage(pool, &stage, &mut rng).unwrap();
        let coords = ga.coordinates(&pool).unwrap();
        assert_eq!(pool.len(), stage.npool);
        assert_eq!(count_diversity_violations(&coords, stage.rmsthreshold), 0);
    }

    #[test]
    fn test_empty_pool_is_an_error() {
        let (grid, model, s, _) = setup();
        let mut ga = GaOptimizer::new(&grid, &model, &s);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            ga.run_stage(Vec::new(), &small_stage(), &mut rng),
            Err(OptimizationError::EmptyPopulation)
        ));
    }
}
