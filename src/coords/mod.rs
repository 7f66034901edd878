//! Flat coordinate sets with optional per-point weights

use crate::molecule::{AtomId, Residue, Structure, StructureError};
use nalgebra::Vector3;
use thiserror::Error;

/// Errors raised for malformed coordinate input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Coordinate sets differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Coordinate set is empty")]
    Empty,

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// An ordered sequence of points plus an optional parallel sequence of weights.
///
/// The weight list is either empty (all points weigh 1) or exactly as long as the point list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateSet {
    points: Vec<Vector3<f64>>,
    weights: Vec<f64>,
}

impl CoordinateSet {
    pub fn new(points: Vec<Vector3<f64>>) -> Self {
        Self {
            points,
            weights: Vec::new(),
        }
    }

    /// Build a weighted set; weights must match in length, be non-negative and not all zero
    pub fn with_weights(points: Vec<Vector3<f64>>, weights: Vec<f64>) -> Result<Self, GeometryError> {
        if weights.len() != points.len() {
            return Err(GeometryError::InvalidWeights(format!(
                "{} weights for {} points",
                weights.len(),
                points.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GeometryError::InvalidWeights(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        if !points.is_empty() && weights.iter().all(|w| *w == 0.0) {
            return Err(GeometryError::InvalidWeights("all weights are zero".to_string()));
        }
        Ok(Self { points, weights })
    }

    /// Collect the atoms selected by `predicate(residue, atom_index)`, in residue then atom order
    pub fn from_structure<F>(structure: &Structure, predicate: F) -> Self
    where
        F: Fn(&Residue, usize) -> bool,
    {
        let points = structure
            .residues
            .iter()
            .flat_map(|res| {
                (0..res.atom_count())
                    .filter(|&i| predicate(res, i))
                    .map(|i| res.atoms[i].coordinates)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self::new(points)
    }

    /// Collect the listed atoms in order
    pub fn from_atom_ids(structure: &Structure, ids: &[AtomId]) -> Result<Self, GeometryError> {
        let points = ids
            .iter()
            .map(|&id| structure.xyz(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(points))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn weights(&self) -> Option<&[f64]> {
        if self.weights.is_empty() {
            None
        } else {
            Some(&self.weights)
        }
    }

    /// Weight of point `i`; 1.0 for unweighted sets
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.get(i).copied().unwrap_or(1.0)
    }

    pub fn total_weight(&self) -> f64 {
        if self.weights.is_empty() {
            self.points.len() as f64
        } else {
            self.weights.iter().sum()
        }
    }

    /// Weighted centroid; `None` for an empty or zero-weight set
    pub fn centroid(&self) -> Option<Vector3<f64>> {
        let total = self.total_weight();
        if self.points.is_empty() || total <= 0.0 {
            return None;
        }
        let sum = self
            .points
            .iter()
            .enumerate()
            .fold(Vector3::zeros(), |acc, (i, p)| acc + p * self.weight(i));
        Some(sum / total)
    }

    /// Keep only the points at `indices`, carrying weights along
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            weights: if self.weights.is_empty() {
                Vec::new()
            } else {
                indices.iter().map(|&i| self.weights[i]).collect()
            },
        }
    }

    /// Per-point distances to another set of equal length
    pub fn distances(&self, other: &CoordinateSet) -> Result<Vec<f64>, GeometryError> {
        check_pair(self, other)?;
        Ok(self
            .points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| (a - b).norm())
            .collect())
    }
}

impl From<Vec<Vector3<f64>>> for CoordinateSet {
    fn from(points: Vec<Vector3<f64>>) -> Self {
        Self::new(points)
    }
}

/// Equal, non-zero length check shared by every pairwise operation
pub fn check_pair(a: &CoordinateSet, b: &CoordinateSet) -> Result<(), GeometryError> {
    if a.len() != b.len() {
        return Err(GeometryError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(GeometryError::Empty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::test_util::small_ligand;

    #[test]
    fn test_weight_validation() {
        let pts = vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)];
        assert!(CoordinateSet::with_weights(pts.clone(), vec![1.0]).is_err());
        assert!(CoordinateSet::with_weights(pts.clone(), vec![-1.0, 1.0]).is_err());
        assert!(CoordinateSet::with_weights(pts.clone(), vec![0.0, 0.0]).is_err());
        let set = CoordinateSet::with_weights(pts, vec![0.0, 2.0]).unwrap();
        assert_eq!(set.centroid().unwrap(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(set.total_weight(), 2.0);
    }

    #[test]
    fn test_from_structure_with_predicate() {
        let mut s = Structure::new("lig");
        s.add_residue(small_ligand(Vector3::zeros()));
        let heavy = CoordinateSet::from_structure(&s, |res, i| !res.atom_is_hydrogen(i));
        assert_eq!(heavy.len(), 4);
        assert!(heavy.weights().is_none());
        assert_eq!(heavy.weight(0), 1.0);
    }

    #[test]
    fn test_check_pair() {
        let a = CoordinateSet::new(vec![Vector3::zeros()]);
        let b = CoordinateSet::new(vec![Vector3::zeros(), Vector3::zeros()]);
        assert_eq!(
            check_pair(&a, &b),
            Err(GeometryError::LengthMismatch { left: 1, right: 2 })
        );
        let empty = CoordinateSet::default();
        assert_eq!(check_pair(&empty, &empty), Err(GeometryError::Empty));
    }

    #[test]
    fn test_subset_keeps_weights() {
        let pts = vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)];
        let set = CoordinateSet::with_weights(pts, vec![1.0, 2.0, 3.0]).unwrap();
        let sub = set.subset(&[2, 0]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.weights(), Some(&[3.0, 1.0][..]));
    }
}
