//! Genetic-algorithm search over ligand and side-chain conformations

pub mod conformer;
pub mod genetic;
pub mod local;

use crate::coords::GeometryError;
use crate::grid::GridError;
use crate::molecule::StructureError;
use crate::rms::RmsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use conformer::{ConformerModel, Gene, MutationScale, TorsionDof};
pub use genetic::{count_diversity_violations, select_diverse, GaOptimizer, PoolSources};
pub use local::{LocalOptimizer, LocalOptimizerParams};

/// Errors that can occur during optimization
#[derive(Error, Debug)]
pub enum OptimizationError {
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("RMSD error: {0}")]
    Rms(#[from] RmsError),

    #[error("Invalid stage parameters: {0}")]
    InvalidStage(String),

    #[error("Gene has {found} degrees of freedom, model expects {expected}")]
    GeneMismatch { expected: usize, found: usize },

    #[error("Population is empty")]
    EmptyPopulation,
}

/// One stage of the GA protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaDockStageParams {
    /// Number of generations
    pub repeats: usize,
    pub npool: usize,
    /// Diversity radius used during selection
    pub rmsthreshold: f64,
    pub pmut: f64,
    /// Grid minimization steps per child
    pub maxiter: usize,
    /// Greedy side-chain trials per child when side chains move
    pub packcycles: usize,
    /// Initial repulsive smoothing; decays to zero over the stage
    pub smoothing: f64,
    /// Repulsive weight fractions interpolated across the generations
    pub ramp_schedule: Vec<f64>,
    pub elec_scale: f64,
}

impl Default for GaDockStageParams {
    fn default() -> Self {
        Self {
            repeats: 10,
            npool: 100,
            rmsthreshold: 2.0,
            pmut: 0.2,
            maxiter: 50,
            packcycles: 100,
            smoothing: 0.375,
            ramp_schedule: vec![0.1, 1.0],
            elec_scale: 1.0,
        }
    }
}

impl GaDockStageParams {
    pub fn validate(&self) -> Result<(), OptimizationError> {
        if self.repeats == 0 {
            return Err(OptimizationError::InvalidStage("repeats must be positive".into()));
        }
        if self.npool == 0 {
            return Err(OptimizationError::InvalidStage("npool must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.pmut) {
            return Err(OptimizationError::InvalidStage(format!(
                "pmut {} outside [0, 1]",
                self.pmut
            )));
        }
        if self.rmsthreshold < 0.0 || self.smoothing < 0.0 {
            return Err(OptimizationError::InvalidStage(
                "rmsthreshold and smoothing must be non-negative".into(),
            ));
        }
        if self.ramp_schedule.is_empty() {
            return Err(OptimizationError::InvalidStage("empty ramp schedule".into()));
        }
        if self.ramp_schedule.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(OptimizationError::InvalidStage(
                "ramp schedule weights must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    fn progress(&self, generation: usize) -> f64 {
        if self.repeats <= 1 {
            1.0
        } else {
            generation as f64 / (self.repeats - 1) as f64
        }
    }

    /// Smoothing for `generation`, decreasing linearly to zero at the last generation
    pub fn smoothing_at(&self, generation: usize) -> f64 {
        if self.repeats <= 1 {
            return self.smoothing;
        }
        self.smoothing * (1.0 - self.progress(generation))
    }

    /// Ramp fraction for `generation`, interpolated piecewise-linearly over the schedule
    pub fn ramp_at(&self, generation: usize) -> f64 {
        let ramp = &self.ramp_schedule;
        match ramp.len() {
            0 => 1.0,
            1 => ramp[0],
            n => {
                let t = self.progress(generation) * (n - 1) as f64;
                let i = (t.floor() as usize).min(n - 2);
                let frac = t - i as f64;
                ramp[i] * (1.0 - frac) + ramp[i + 1] * frac
            }
        }
    }
}
