//! Local optimization module using gradient-based methods
//!
//! This module implements L-BFGS refinement of a gene against an arbitrary energy,
//! with finite-difference gradients over the gene's degrees of freedom.

use nalgebra::DVector;

use crate::optimization::conformer::{ConformerModel, Gene};
use crate::optimization::OptimizationError;

/// Parameters for local optimization
#[derive(Debug, Clone)]
pub struct LocalOptimizerParams {
    /// Step size for finite difference gradient computation
    pub gradient_step: f64,

    /// Initial step size for line search
    pub initial_step: f64,

    /// Longest allowed search direction, in Angstroms / radians
    pub max_step: f64,

    /// Convergence tolerance for energy
    pub energy_tolerance: f64,

    /// Convergence tolerance for gradient
    pub gradient_tolerance: f64,

    /// Maximum number of iterations
    pub max_iterations: usize,

    /// Armijo parameter for line search (c1)
    pub armijo_c1: f64,

    /// Number of corrections kept in the L-BFGS history
    pub history: usize,
}

impl Default for LocalOptimizerParams {
    fn default() -> Self {
        Self {
            gradient_step: 0.01,      // Angstroms for translation, radians for rotation/torsions
            initial_step: 1.0,
            max_step: 1.0,
            energy_tolerance: 1e-6,   // kcal/mol
            gradient_tolerance: 1e-4,
            max_iterations: 100,
            armijo_c1: 1e-4,
            history: 10,
        }
    }
}

/// Local optimizer using L-BFGS method
#[derive(Debug, Clone, Default)]
pub struct LocalOptimizer {
    pub params: LocalOptimizerParams,
}

impl LocalOptimizer {
    /// Create a new local optimizer with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new local optimizer with custom parameters
    pub fn with_params(params: LocalOptimizerParams) -> Self {
        Self { params }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.max_iterations = max_iterations;
        self
    }

    /// Minimize `objective` starting from `gene`, moving only the degrees of freedom set in `mask`.
    ///
    /// Returns the best gene found (with its `score` set) and its energy. The energy never
    /// exceeds that of the starting gene.
    pub fn minimize<F>(
        &self,
        model: &ConformerModel,
        gene: &Gene,
        mask: &[bool],
        mut objective: F,
    ) -> Result<(Gene, f64), OptimizationError>
    where
        F: FnMut(&Gene) -> Result<f64, OptimizationError>,
    {
        let n_dof = model.n_dof();
        if mask.len() != n_dof || gene.n_dof() != n_dof {
            return Err(OptimizationError::GeneMismatch {
                expected: n_dof,
                found: gene.n_dof(),
            });
        }

        let mut energy_at = |x: &DVector<f64>| objective(&model.perturb(gene, x));

        let mut x = DVector::zeros(n_dof);
        let mut energy = energy_at(&x)?;

        if self.params.max_iterations > 0 && mask.iter().any(|&m| m) {
            // L-BFGS history
            let m = self.params.history.max(1);
            let mut s_history: Vec<DVector<f64>> = Vec::with_capacity(m);
            let mut y_history: Vec<DVector<f64>> = Vec::with_capacity(m);
            let mut rho_history: Vec<f64> = Vec::with_capacity(m);

            let mut grad = self.compute_gradient(&mut energy_at, &x, energy, mask)?;

            for _ in 0..self.params.max_iterations {
                // Check convergence
                if grad.norm() < self.params.gradient_tolerance {
                    break;
                }

                // Compute search direction using L-BFGS two-loop recursion
                let mut direction = self.lbfgs_direction(&grad, &s_history, &y_history, &rho_history);
                let length = direction.norm();
                if length > self.params.max_step {
                    direction *= self.params.max_step / length;
                }

                let (step_size, new_energy) = self.line_search(&mut energy_at, &x, &direction, energy, &grad)?;
                if step_size < 1e-10 {
                    // Line search failed, stop optimization
                    break;
                }

                let new_x = &x + step_size * &direction;
                let new_grad = self.compute_gradient(&mut energy_at, &new_x, new_energy, mask)?;

                // Update L-BFGS history
                let s = &new_x - &x;
                let y = &new_grad - &grad;
                let sy = s.dot(&y);
                if sy > 1e-10 {
                    // Only add to history if curvature condition is satisfied
                    if s_history.len() >= m {
                        s_history.remove(0);
                        y_history.remove(0);
                        rho_history.remove(0);
                    }
                    s_history.push(s);
                    y_history.push(y);
                    rho_history.push(1.0 / sy);
                }

                let energy_change = (new_energy - energy).abs();
                x = new_x;
                energy = new_energy;
                grad = new_grad;

                if energy_change < self.params.energy_tolerance {
                    break;
                }
            }
        }

        let mut best = model.perturb(gene, &x);
        best.score = energy;
        Ok((best, energy))
    }

    /// Forward-difference gradient over the active degrees of freedom
    fn compute_gradient<F>(
        &self,
        energy_at: &mut F,
        x: &DVector<f64>,
        base_energy: f64,
        mask: &[bool],
    ) -> Result<DVector<f64>, OptimizationError>
    where
        F: FnMut(&DVector<f64>) -> Result<f64, OptimizationError>,
    {
        let h = self.params.gradient_step;
        let mut grad = DVector::zeros(x.len());
        for i in 0..x.len() {
            if !mask[i] {
                continue;
            }
            let mut x_plus = x.clone();
            x_plus[i] += h;
            let energy_plus = energy_at(&x_plus)?;
            grad[i] = (energy_plus - base_energy) / h;
        }
        Ok(grad)
    }

    /// L-BFGS two-loop recursion to compute search direction
    fn lbfgs_direction(
        &self,
        grad: &DVector<f64>,
        s_history: &[DVector<f64>],
        y_history: &[DVector<f64>],
        rho_history: &[f64],
    ) -> DVector<f64> {
        if s_history.is_empty() {
            // If no history, use steepest descent
            return -grad.clone();
        }

        let k = s_history.len();
        let mut q = grad.clone();
        let mut alpha = vec![0.0; k];

        // First loop (backward)
        for i in (0..k).rev() {
            alpha[i] = rho_history[i] * s_history[i].dot(&q);
            q = &q - alpha[i] * &y_history[i];
        }

        // Initial Hessian approximation (scaled identity)
        let gamma = s_history[k - 1].dot(&y_history[k - 1]) / y_history[k - 1].dot(&y_history[k - 1]);
        let mut r = gamma * q;

        // Second loop (forward)
        for i in 0..k {
            let beta = rho_history[i] * y_history[i].dot(&r);
            r = &r + (alpha[i] - beta) * &s_history[i];
        }

        -r
    }

    /// Backtracking line search with Armijo condition
    fn line_search<F>(
        &self,
        energy_at: &mut F,
        x: &DVector<f64>,
        direction: &DVector<f64>,
        current_energy: f64,
        grad: &DVector<f64>,
    ) -> Result<(f64, f64), OptimizationError>
    where
        F: FnMut(&DVector<f64>) -> Result<f64, OptimizationError>,
    {
        let mut step = self.params.initial_step;
        let c1 = self.params.armijo_c1;
        let rho = 0.5; // Step reduction factor

        let directional_derivative = grad.dot(direction);

        // If direction is not a descent direction, return failure
        if directional_derivative >= 0.0 {
            return Ok((0.0, current_energy));
        }

        for _ in 0..20 {
            let new_x = x + step * direction;
            let new_energy = energy_at(&new_x)?;

            // Armijo condition
            if new_energy <= current_energy + c1 * step * directional_derivative {
                return Ok((step, new_energy));
            }

            step *= rho;
        }

        // Line search failed
        Ok((0.0, current_energy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::test_util::{serine, small_ligand};
    use crate::molecule::Structure;
    use nalgebra::Vector3;

    fn model() -> ConformerModel {
        let mut s = Structure::new("complex");
        s.add_residue(serine(1, Vector3::new(6.0, 0.0, 0.0)));
        s.add_residue(small_ligand(Vector3::zeros()));
        ConformerModel::new(&s, &[1], &[0]).unwrap()
    }

    #[test]
    fn test_minimize_quadratic_translation() {
        let model = model();
        let target = Vector3::new(1.0, -2.0, 0.5);
        let start = model.identity_gene();
        let mask = model.dof_mask(true, false);

        let (best, energy) = LocalOptimizer::new()
            .minimize(&model, &start, &mask, |g| Ok((g.translation - target).norm_squared()))
            .unwrap();
        assert!(energy < 1e-3);
        assert!((best.translation - target).norm() < 0.05);
        assert_eq!(best.score, energy);
        // chis were masked out
        assert_eq!(best.chis, start.chis);
    }

    #[test]
    fn test_minimize_never_worsens() {
        let model = model();
        let start = model.identity_gene();
        let mask = model.dof_mask(true, true);
        let objective = |g: &Gene| -> Result<f64, OptimizationError> {
            Ok(g.torsions.iter().map(|t| t.to_radians().cos()).sum())
        };
        let initial = objective(&start).unwrap();
        let (_, energy) = LocalOptimizer::new()
            .with_max_iterations(10)
            .minimize(&model, &start, &mask, objective)
            .unwrap();
        assert!(energy <= initial);
    }

    #[test]
    fn test_mask_length_checked() {
        let model = model();
        let start = model.identity_gene();
        let result = LocalOptimizer::new().minimize(&model, &start, &[true], |_| Ok(0.0));
        assert!(matches!(result, Err(OptimizationError::GeneMismatch { .. })));
    }
}
