//! Precomputed receptor interaction grids for fast ligand scoring

pub mod hash;

use crate::atom::{Atom, AtomType};
use crate::forcefield::ForceField;
use crate::molecule::{AtomId, Structure};
use hash::AtomHash;
use log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when building or querying grids
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid dimension: {0}")]
    InvalidDimension(String),

    #[error("Point {0:?} is outside grid bounds")]
    OutOfBounds(Vector3<f64>),

    #[error("Ligand residue {0} is not present in the structure")]
    MissingLigandResidue(usize),

    #[error("No ligand residues given")]
    NoLigand,

    #[error("No receptor atoms fall inside the bounding box")]
    EmptyBoundingBox,

    #[error("Grid is in state {found:?}, expected {expected:?}")]
    InvalidState { expected: GridState, found: GridState },

    #[error("No grid channel for atom type {0:?}")]
    MissingChannel(AtomType),
}

/// A 3D grid of values sampled at regularly spaced points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    /// Origin of the grid (minimum corner) in Angstroms
    pub origin: Vector3<f64>,

    /// Grid point spacing in Angstroms
    pub spacing: f64,

    /// Number of grid points in each dimension
    pub dimensions: Vector3<usize>,

    /// Grid data - stored as a flattened 3D array
    pub data: Vec<f64>,
}

impl Grid {
    /// Create a new grid with the specified dimensions and initialize all values to zero
    pub fn new(origin: Vector3<f64>, spacing: f64, dimensions: Vector3<usize>) -> Result<Self, GridError> {
        if dimensions.x == 0 || dimensions.y == 0 || dimensions.z == 0 {
            return Err(GridError::InvalidDimension(format!("{:?}", dimensions)));
        }
        if spacing <= 0.0 {
            return Err(GridError::InvalidDimension(format!("spacing {}", spacing)));
        }
        let total_points = dimensions.x * dimensions.y * dimensions.z;
        Ok(Self {
            origin,
            spacing,
            dimensions,
            data: vec![0.0; total_points],
        })
    }

    // Row-major order: (x * ny * nz) + (y * nz) + z
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.dimensions.y * self.dimensions.z) + (y * self.dimensions.z) + z
    }

    /// Real-space position of a grid point
    pub fn point(&self, x: usize, y: usize, z: usize) -> Vector3<f64> {
        self.origin + Vector3::new(x as f64, y as f64, z as f64) * self.spacing
    }

    pub fn get_value_at_indices(&self, x: usize, y: usize, z: usize) -> Result<f64, GridError> {
        if x >= self.dimensions.x || y >= self.dimensions.y || z >= self.dimensions.z {
            return Err(GridError::OutOfBounds(Vector3::new(x as f64, y as f64, z as f64)));
        }
        Ok(self.data[self.index(x, y, z)])
    }

    pub fn set_value_at_indices(&mut self, x: usize, y: usize, z: usize, value: f64) -> Result<(), GridError> {
        if x >= self.dimensions.x || y >= self.dimensions.y || z >= self.dimensions.z {
            return Err(GridError::OutOfBounds(Vector3::new(x as f64, y as f64, z as f64)));
        }
        let idx = self.index(x, y, z);
        self.data[idx] = value;
        Ok(())
    }

    /// Trilinear interpolation at a real-space position; the far faces are inclusive
    pub fn get_value(&self, position: &Vector3<f64>) -> Result<f64, GridError> {
        let f = (position - self.origin) / self.spacing;
        let tol = 1e-9;
        let dims = self.dimensions;
        let max = Vector3::new(dims.x as f64 - 1.0, dims.y as f64 - 1.0, dims.z as f64 - 1.0);
        if (0..3).any(|k| f[k] < -tol || f[k] > max[k] + tol) {
            return Err(GridError::OutOfBounds(*position));
        }
        let f = Vector3::new(f.x.clamp(0.0, max.x), f.y.clamp(0.0, max.y), f.z.clamp(0.0, max.z));

        let x0 = f.x.floor() as usize;
        let y0 = f.y.floor() as usize;
        let z0 = f.z.floor() as usize;

        // Handle edge case at the maximum boundary
        let x1 = (x0 + 1).min(dims.x - 1);
        let y1 = (y0 + 1).min(dims.y - 1);
        let z1 = (z0 + 1).min(dims.z - 1);

        let dx = f.x - x0 as f64;
        let dy = f.y - y0 as f64;
        let dz = f.z - z0 as f64;

        let v = |x, y, z| self.data[self.index(x, y, z)];
        let c00 = v(x0, y0, z0) * (1.0 - dx) + v(x1, y0, z0) * dx;
        let c01 = v(x0, y0, z1) * (1.0 - dx) + v(x1, y0, z1) * dx;
        let c10 = v(x0, y1, z0) * (1.0 - dx) + v(x1, y1, z0) * dx;
        let c11 = v(x0, y1, z1) * (1.0 - dx) + v(x1, y1, z1) * dx;

        let c0 = c00 * (1.0 - dy) + c10 * dy;
        let c1 = c01 * (1.0 - dy) + c11 * dy;

        Ok(c0 * (1.0 - dz) + c1 * dz)
    }
}

/// Grid construction and scoring parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// Voxel edge length in Angstroms
    pub grid_step: f64,
    /// Margin added around the ligand extent
    pub padding: f64,
    /// Edge length of the receptor hash cells before subdivision
    pub hashsize: f64,
    /// Number of finer bins per hash cell edge
    pub subhash: usize,
    /// Repulsive weight used while the GA explores
    pub fa_rep_grid: f64,
    /// Repulsive weight of the soft scoring variant
    pub soft_rep_weight: f64,
    /// Energy charged for every atom outside the bounding box
    pub grid_bound_penalty: f64,
    /// Overrides the ligand radius when sizing the box
    pub max_radius: Option<f64>,
    /// Score by direct pair sums instead of interpolation
    pub exact: bool,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            grid_step: 0.25,
            padding: 4.0,
            hashsize: 8.0,
            subhash: 3,
            fa_rep_grid: 0.2,
            soft_rep_weight: 0.02,
            grid_bound_penalty: 100.0,
            max_radius: None,
            exact: false,
        }
    }
}

/// Term weights applied when a grid is queried
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub w_rep: f64,
    /// Softens repulsion as `rep / (1 + smoothing * rep)`; 0 leaves it unchanged
    pub smoothing: f64,
    pub elec_scale: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            w_rep: 1.0,
            smoothing: 0.0,
            elec_scale: 1.0,
        }
    }
}

fn smooth_repulsion(rep: f64, smoothing: f64) -> f64 {
    if smoothing <= 0.0 || rep <= 0.0 {
        rep
    } else {
        rep / (1.0 + smoothing * rep)
    }
}

/// Construction stages of a [`ScoringGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridState {
    Uninitialized,
    BoundingBoxComputed,
    Populated,
    Ready,
}

/// Receptor interaction grids around a ligand site.
///
/// Built in three steps: [`prepare_grid`](Self::prepare_grid) sizes the box,
/// [`get_grid_atomtypes`](Self::get_grid_atomtypes) fixes the moving atoms and probe channels,
/// [`calculate_grid`](Self::calculate_grid) fills the voxels. Only a `Ready` grid answers queries.
pub struct ScoringGrid {
    params: GridParams,
    forcefield: Arc<dyn ForceField>,
    state: GridState,
    center: Vector3<f64>,
    half_width: f64,
    lower: Vector3<f64>,
    upper: Vector3<f64>,
    ligand_residues: Vec<usize>,
    movable_scs: Vec<usize>,
    probe_types: BTreeSet<AtomType>,
    attractive: BTreeMap<AtomType, Grid>,
    repulsive: BTreeMap<AtomType, Grid>,
    electrostatic: Option<Grid>,
    receptor: AtomHash<Atom>,
}

impl ScoringGrid {
    pub fn new(params: GridParams, forcefield: Arc<dyn ForceField>) -> Self {
        let cell = params.hashsize / params.subhash.max(1) as f64;
        Self {
            params,
            forcefield,
            state: GridState::Uninitialized,
            center: Vector3::zeros(),
            half_width: 0.0,
            lower: Vector3::zeros(),
            upper: Vector3::zeros(),
            ligand_residues: Vec::new(),
            movable_scs: Vec::new(),
            probe_types: BTreeSet::new(),
            attractive: BTreeMap::new(),
            repulsive: BTreeMap::new(),
            electrostatic: None,
            receptor: AtomHash::new(cell),
        }
    }

    /// Run all three construction steps
    pub fn build(
        params: GridParams,
        forcefield: Arc<dyn ForceField>,
        structure: &Structure,
        ligand_residues: &[usize],
        movable_scs: &[usize],
    ) -> Result<Self, GridError> {
        let mut grid = Self::new(params, forcefield);
        grid.prepare_grid(structure, ligand_residues)?;
        grid.get_grid_atomtypes(structure, movable_scs)?;
        grid.calculate_grid(structure)?;
        Ok(grid)
    }

    fn expect_state(&self, expected: GridState) -> Result<(), GridError> {
        if self.state != expected {
            return Err(GridError::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Center the box on the ligand; half-width is the ligand radius (or `max_radius`) plus padding
    pub fn prepare_grid(&mut self, structure: &Structure, ligand_residues: &[usize]) -> Result<(), GridError> {
        if ligand_residues.is_empty() {
            return Err(GridError::NoLigand);
        }
        if let Some(&missing) = ligand_residues.iter().find(|&&r| r >= structure.residue_count()) {
            return Err(GridError::MissingLigandResidue(missing));
        }

        let atoms: Vec<Vector3<f64>> = ligand_residues
            .iter()
            .flat_map(|&r| structure.residues[r].atoms.iter().map(|a| a.coordinates))
            .collect();
        if atoms.is_empty() {
            return Err(GridError::NoLigand);
        }
        let center = crate::math::centroid(&atoms);
        let ligand_radius = atoms.iter().map(|p| (p - center).norm()).fold(0.0, f64::max);
        let radius = self.params.max_radius.unwrap_or(ligand_radius);

        self.center = center;
        self.half_width = radius + self.params.padding;
        let h = Vector3::repeat(self.half_width);
        self.lower = center - h;
        self.upper = center + h;
        self.ligand_residues = ligand_residues.to_vec();
        self.state = GridState::BoundingBoxComputed;
        debug!(
            "Grid box centered at ({:.2}, {:.2}, {:.2}) with half-width {:.2}",
            center.x, center.y, center.z, self.half_width
        );
        Ok(())
    }

    /// Fix which atoms move (ligand plus side chains of `movable_scs`) and the probe channels they need
    pub fn get_grid_atomtypes(&mut self, structure: &Structure, movable_scs: &[usize]) -> Result<(), GridError> {
        self.expect_state(GridState::BoundingBoxComputed)?;
        if let Some(&missing) = movable_scs.iter().find(|&&r| r >= structure.residue_count()) {
            return Err(GridError::MissingLigandResidue(missing));
        }
        self.movable_scs = movable_scs
            .iter()
            .copied()
            .filter(|r| !self.ligand_residues.contains(r))
            .collect();

        self.probe_types = self
            .moving_atom_ids(structure)
            .iter()
            .map(|id| structure.residues[id.residue].atoms[id.atom].atom_type)
            .collect();
        self.state = GridState::Populated;
        debug!(
            "Grid channels for atom types [{}], {} movable side chains",
            self.probe_types
                .iter()
                .map(|t| t.type_name())
                .collect::<Vec<_>>()
                .join(" "),
            self.movable_scs.len()
        );
        Ok(())
    }

    /// Hash the static receptor atoms and evaluate every channel at every voxel
    pub fn calculate_grid(&mut self, structure: &Structure) -> Result<(), GridError> {
        self.expect_state(GridState::Populated)?;
        let cutoff = self.forcefield.cutoff();

        let mut receptor = AtomHash::new(self.params.hashsize / self.params.subhash.max(1) as f64);
        let mut inside = 0usize;
        for (r, residue) in structure.residues.iter().enumerate() {
            for (i, atom) in residue.atoms.iter().enumerate() {
                if self.is_moving(structure, r, i) {
                    continue;
                }
                let p = atom.coordinates;
                if self.in_box_with_margin(&p, cutoff) {
                    receptor.insert(p, atom.clone());
                    if self.in_box(&p) {
                        inside += 1;
                    }
                }
            }
        }
        if inside == 0 {
            return Err(GridError::EmptyBoundingBox);
        }
        self.receptor = receptor;

        if !self.params.exact {
            self.fill_channels()?;
        }
        self.state = GridState::Ready;
        info!(
            "Grid ready: {} receptor atoms hashed, {} probe types{}",
            self.receptor.len(),
            self.probe_types.len(),
            if self.params.exact { " (exact mode)" } else { "" }
        );
        Ok(())
    }

    fn fill_channels(&mut self) -> Result<(), GridError> {
        let step = self.params.grid_step;
        let n = (2.0 * self.half_width / step).ceil() as usize + 1;
        let dims = Vector3::new(n, n, n);
        let template = Grid::new(self.lower, step, dims)?;
        let cutoff = self.forcefield.cutoff();

        let mut attractive: BTreeMap<AtomType, Grid> =
            self.probe_types.iter().map(|&t| (t, template.clone())).collect();
        let mut repulsive = attractive.clone();
        let mut electrostatic = template.clone();

        let probes: Vec<Atom> = self
            .probe_types
            .iter()
            .map(|&t| Atom::new("PRB", t, Vector3::zeros()))
            .collect();
        let mut attr_acc = vec![0.0; probes.len()];
        let mut rep_acc = vec![0.0; probes.len()];

        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let position = template.point(x, y, z);
                    attr_acc.iter_mut().for_each(|v| *v = 0.0);
                    rep_acc.iter_mut().for_each(|v| *v = 0.0);
                    let mut potential = 0.0;

                    self.receptor.for_each_within(&position, cutoff, |_, atom, d| {
                        for (k, probe) in probes.iter().enumerate() {
                            let e = self.forcefield.pair_energy(probe, atom, d);
                            attr_acc[k] += e.attractive;
                            rep_acc[k] += e.repulsive;
                        }
                        potential += self.forcefield.atom_charge_energy(atom, 1.0, &position);
                    });

                    for (k, probe) in probes.iter().enumerate() {
                        if let Some(g) = attractive.get_mut(&probe.atom_type) {
                            g.set_value_at_indices(x, y, z, attr_acc[k])?;
                        }
                        if let Some(g) = repulsive.get_mut(&probe.atom_type) {
                            g.set_value_at_indices(x, y, z, rep_acc[k])?;
                        }
                    }
                    electrostatic.set_value_at_indices(x, y, z, potential)?;
                }
            }
        }

        self.attractive = attractive;
        self.repulsive = repulsive;
        self.electrostatic = Some(electrostatic);
        Ok(())
    }

    fn is_moving(&self, structure: &Structure, residue: usize, atom: usize) -> bool {
        if self.ligand_residues.contains(&residue) {
            return true;
        }
        self.movable_scs.contains(&residue) && !structure.residues[residue].is_backbone_atom(atom)
    }

    /// Atoms scored against the grid: all ligand atoms and the side-chain atoms of movable residues
    pub fn moving_atom_ids(&self, structure: &Structure) -> Vec<AtomId> {
        let mut ids = Vec::new();
        let mut residues: Vec<usize> = self.ligand_residues.clone();
        residues.extend(self.movable_scs.iter().copied());
        for r in residues {
            if let Some(res) = structure.residues.get(r) {
                for i in 0..res.atom_count() {
                    if self.is_moving(structure, r, i) {
                        ids.push(AtomId::new(r, i));
                    }
                }
            }
        }
        ids
    }

    /// Inclusive box test: points on a face are inside
    pub fn in_box(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|k| p[k] >= self.lower[k] && p[k] <= self.upper[k])
    }

    fn in_box_with_margin(&self, p: &Vector3<f64>, margin: f64) -> bool {
        (0..3).all(|k| p[k] >= self.lower[k] - margin && p[k] <= self.upper[k] + margin)
    }

    /// Box test after shrinking every face inwards by `buffer`
    pub fn in_shrunk_box(&self, p: &Vector3<f64>, buffer: f64) -> bool {
        self.in_box_with_margin(p, -buffer)
    }

    fn atom_score(&self, atom: &Atom, weights: &ScoreWeights) -> Result<f64, GridError> {
        let p = atom.coordinates;
        if !self.in_box(&p) {
            return Ok(self.params.grid_bound_penalty);
        }

        let (attr, rep, potential) = if self.params.exact {
            let mut attr = 0.0;
            let mut rep = 0.0;
            let mut potential = 0.0;
            let probe = Atom::new("PRB", atom.atom_type, p);
            self.receptor.for_each_within(&p, self.forcefield.cutoff(), |_, other, d| {
                let e = self.forcefield.pair_energy(&probe, other, d);
                attr += e.attractive;
                rep += e.repulsive;
                potential += self.forcefield.atom_charge_energy(other, 1.0, &p);
            });
            (attr, rep, potential)
        } else {
            let t = atom.atom_type;
            let attr = self
                .attractive
                .get(&t)
                .ok_or(GridError::MissingChannel(t))?
                .get_value(&p)?;
            let rep = self
                .repulsive
                .get(&t)
                .ok_or(GridError::MissingChannel(t))?
                .get_value(&p)?;
            let potential = match &self.electrostatic {
                Some(g) if atom.charge != 0.0 => g.get_value(&p)?,
                _ => 0.0,
            };
            (attr, rep, potential)
        };

        Ok(attr
            + weights.w_rep * smooth_repulsion(rep, weights.smoothing)
            + weights.elec_scale * atom.charge * potential)
    }

    /// Sum of per-atom grid energies of the given atoms
    pub fn score_atoms<'a, I>(&self, atoms: I, weights: &ScoreWeights) -> Result<f64, GridError>
    where
        I: IntoIterator<Item = &'a Atom>,
    {
        self.expect_state(GridState::Ready)?;
        atoms
            .into_iter()
            .map(|a| self.atom_score(a, weights))
            .sum()
    }

    /// Grid energy of every moving atom of `structure`
    pub fn score_weighted(&self, structure: &Structure, weights: &ScoreWeights) -> Result<f64, GridError> {
        self.expect_state(GridState::Ready)?;
        let ids = self.moving_atom_ids(structure);
        self.score_atoms(
            ids.iter().map(|id| &structure.residues[id.residue].atoms[id.atom]),
            weights,
        )
    }

    /// Grid energy with either the soft or the full repulsive weight
    pub fn score(&self, structure: &Structure, soft: bool) -> Result<f64, GridError> {
        let weights = ScoreWeights {
            w_rep: if soft { self.params.soft_rep_weight } else { 1.0 },
            ..ScoreWeights::default()
        };
        self.score_weighted(structure, &weights)
    }

    /// Pair energy among the moving atoms themselves, which the grid cannot represent
    pub fn moving_pair_energy(&self, structure: &Structure, w_rep: f64) -> f64 {
        let ids = self.moving_atom_ids(structure);
        let cutoff = self.forcefield.cutoff();
        let separations: BTreeMap<usize, Vec<Vec<usize>>> = ids
            .iter()
            .map(|id| id.residue)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|r| (r, structure.residues[r].bond_separation_matrix(4)))
            .collect();

        let mut energy = 0.0;
        for (k, a) in ids.iter().enumerate() {
            for b in &ids[k + 1..] {
                if a.residue == b.residue && separations[&a.residue][a.atom][b.atom] < 4 {
                    continue;
                }
                let atom_a = &structure.residues[a.residue].atoms[a.atom];
                let atom_b = &structure.residues[b.residue].atoms[b.atom];
                let d = atom_a.distance(atom_b);
                if d <= cutoff {
                    energy += self.forcefield.pair_energy(atom_a, atom_b, d).total(w_rep);
                }
            }
        }
        energy
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    pub fn forcefield(&self) -> &Arc<dyn ForceField> {
        &self.forcefield
    }

    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    /// Lower and upper corners of the bounding box
    pub fn bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.lower, self.upper)
    }

    pub fn ligand_residues(&self) -> &[usize] {
        &self.ligand_residues
    }

    pub fn movable_scs(&self) -> &[usize] {
        &self.movable_scs
    }

    pub fn probe_types(&self) -> &BTreeSet<AtomType> {
        &self.probe_types
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::pocket_complex;
    use super::*;
    use crate::forcefield::VinaForceField;
    use assert_approx_eq::assert_approx_eq;

    fn coarse_params() -> GridParams {
        GridParams {
            grid_step: 0.5,
            padding: 3.0,
            ..GridParams::default()
        }
    }

    fn ready_grid(params: GridParams) -> (ScoringGrid, Structure) {
        let s = pocket_complex();
        let lig = s.ligand_residues();
        let grid = ScoringGrid::build(params, Arc::new(VinaForceField::default()), &s, &lig, &[]).unwrap();
        (grid, s)
    }

    #[test]
    fn test_trilinear_interpolation() {
        let mut grid = Grid::new(Vector3::zeros(), 1.0, Vector3::new(2, 2, 2)).unwrap();
        grid.set_value_at_indices(1, 1, 1, 8.0).unwrap();
        assert_approx_eq!(grid.get_value(&Vector3::new(0.5, 0.5, 0.5)).unwrap(), 1.0);
        assert_approx_eq!(grid.get_value(&Vector3::new(1.0, 1.0, 1.0)).unwrap(), 8.0);
        assert!(grid.get_value(&Vector3::new(1.5, 0.0, 0.0)).is_err());
        assert!(Grid::new(Vector3::zeros(), 1.0, Vector3::new(0, 2, 2)).is_err());
    }

    #[test]
    fn test_state_machine_order() {
        let s = pocket_complex();
        let lig = s.ligand_residues();
        let mut grid = ScoringGrid::new(coarse_params(), Arc::new(VinaForceField::default()));
        assert_eq!(grid.state(), GridState::Uninitialized);
        assert!(matches!(
            grid.calculate_grid(&s),
            Err(GridError::InvalidState { .. })
        ));
        assert!(matches!(grid.score(&s, false), Err(GridError::InvalidState { .. })));

        grid.prepare_grid(&s, &lig).unwrap();
        assert_eq!(grid.state(), GridState::BoundingBoxComputed);
        grid.get_grid_atomtypes(&s, &[]).unwrap();
        assert_eq!(grid.state(), GridState::Populated);
        grid.calculate_grid(&s).unwrap();
        assert_eq!(grid.state(), GridState::Ready);
        assert!(grid.score(&s, false).unwrap().is_finite());
    }

    #[test]
    fn test_missing_ligand_and_empty_box() {
        let s = pocket_complex();
        let mut grid = ScoringGrid::new(coarse_params(), Arc::new(VinaForceField::default()));
        assert_eq!(grid.prepare_grid(&s, &[42]), Err(GridError::MissingLigandResidue(42)));
        assert_eq!(grid.prepare_grid(&s, &[]), Err(GridError::NoLigand));

        // ligand alone, nothing to build a field from
        let mut lonely = Structure::new("lonely");
        lonely.add_residue(s.residues[6].clone());
        let result = ScoringGrid::build(
            coarse_params(),
            Arc::new(VinaForceField::default()),
            &lonely,
            &[0],
            &[],
        );
        assert!(matches!(result, Err(GridError::EmptyBoundingBox)));
    }

    #[test]
    fn test_out_of_box_ligand_costs_penalty_per_atom() {
        let (grid, mut s) = ready_grid(coarse_params());
        let lig = s.ligand_residues()[0];
        let n_atoms = s.residues[lig].atom_count();
        s.transform_residues(
            &[lig],
            &nalgebra::Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::new(100.0, 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(grid.score(&s, false).unwrap(), n_atoms as f64 * 100.0);
        assert_eq!(grid.score(&s, true).unwrap(), n_atoms as f64 * 100.0);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let (grid, _) = ready_grid(coarse_params());
        let (_, upper) = grid.bounds();
        let center = grid.center();

        let on_face = Atom::new("C", AtomType::Carbon, Vector3::new(upper.x, center.y, center.z));
        let beyond = Atom::new("C", AtomType::Carbon, Vector3::new(upper.x + 1.0, center.y, center.z));
        let weights = ScoreWeights::default();

        let on_face_score = grid.score_atoms([&on_face], &weights).unwrap();
        assert!(on_face_score < 100.0);
        assert_eq!(grid.score_atoms([&beyond], &weights).unwrap(), 100.0);
    }

    #[test]
    fn test_grid_tracks_exact_scoring() {
        let (grid, s) = ready_grid(GridParams {
            grid_step: 0.25,
            padding: 3.0,
            ..GridParams::default()
        });
        let (exact_grid, _) = ready_grid(GridParams {
            padding: 3.0,
            exact: true,
            ..GridParams::default()
        });

        let weights = ScoreWeights::default();
        let interpolated = grid.score_weighted(&s, &weights).unwrap();
        let exact = exact_grid.score_weighted(&s, &weights).unwrap();
        assert!((interpolated - exact).abs() < 0.2 * exact.abs().max(1.0));
    }

    #[test]
    fn test_smoothing_and_soft_weight_reduce_repulsion() {
        let (grid, s) = ready_grid(coarse_params());
        let lig = s.ligand_residues()[0];
        let mut clash = s.clone();
        // push the ligand into a wall atom
        clash
            .transform_residues(&[lig], &nalgebra::Matrix3::identity(), &Vector3::zeros(), &Vector3::new(3.0, 0.5, 0.0))
            .unwrap();

        let hard = grid.score(&clash, false).unwrap();
        let soft = grid.score(&clash, true).unwrap();
        assert!(soft < hard);

        let smoothed = grid
            .score_weighted(
                &clash,
                &ScoreWeights {
                    smoothing: 1.0,
                    ..ScoreWeights::default()
                },
            )
            .unwrap();
        assert!(smoothed < hard);
    }

    #[test]
    fn test_movable_side_chain_atoms_are_moving() {
        let s = pocket_complex();
        let lig = s.ligand_residues();
        let grid = ScoringGrid::build(coarse_params(), Arc::new(VinaForceField::default()), &s, &lig, &[0]).unwrap();
        let ids = grid.moving_atom_ids(&s);
        // ligand atoms plus both atoms of the first wall residue
        assert_eq!(ids.len(), s.residues[6].atom_count() + 2);
        assert!(grid.probe_types().contains(&AtomType::OxygenH));
        assert!(grid.moving_pair_energy(&s, 1.0).is_finite());
    }
}
