//! Least-squares rigid superposition (Kabsch fit) of coordinate sets and whole structures

use crate::coords::{check_pair, CoordinateSet, GeometryError};
use crate::molecule::{AtomId, Structure};
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

/// RMSD values below this are reported as exactly zero
pub const RMSD_EPSILON: f64 = 1e-5;

/// Suppress floating-point noise in RMSD values
pub fn clamp_rmsd(rmsd: f64) -> f64 {
    if rmsd < RMSD_EPSILON {
        0.0
    } else {
        rmsd
    }
}

/// Outcome of a rigid fit mapping the mobile set onto the reference set
#[derive(Debug, Clone, PartialEq)]
pub struct SuperpositionResult {
    /// Proper rotation (det = +1)
    pub rotation: Matrix3<f64>,

    /// Translation applied after rotation
    pub translation: Vector3<f64>,

    /// Weighted RMSD over the fitted points after the fit
    pub rmsd: f64,

    /// The rotation is under-determined (fewer than three non-collinear points)
    pub degenerate: bool,
}

impl SuperpositionResult {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
            rmsd: 0.0,
            degenerate: false,
        }
    }

    /// Map one point with `R x + t`
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Transformed copy of `set`, keeping its weights
    pub fn apply_to_set(&self, set: &CoordinateSet) -> Result<CoordinateSet, GeometryError> {
        let points = set.points().iter().map(|p| self.apply(p)).collect();
        match set.weights() {
            Some(w) => CoordinateSet::with_weights(points, w.to_vec()),
            None => Ok(CoordinateSet::new(points)),
        }
    }
}

/// Fit `mobile` onto `reference`, using the mobile set's weights when it carries any
pub fn superimpose(
    mobile: &CoordinateSet,
    reference: &CoordinateSet,
) -> Result<SuperpositionResult, GeometryError> {
    check_pair(mobile, reference)?;
    let weights: Vec<f64> = (0..mobile.len()).map(|i| mobile.weight(i)).collect();
    kabsch(mobile.points(), reference.points(), &weights)
}

/// Fit with explicit per-point weights
pub fn superimpose_weighted(
    mobile: &CoordinateSet,
    reference: &CoordinateSet,
    weights: &[f64],
) -> Result<SuperpositionResult, GeometryError> {
    check_pair(mobile, reference)?;
    if weights.len() != mobile.len() {
        return Err(GeometryError::InvalidWeights(format!(
            "{} weights for {} points",
            weights.len(),
            mobile.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(GeometryError::InvalidWeights(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    if weights.iter().all(|w| *w == 0.0) {
        return Err(GeometryError::InvalidWeights("all weights are zero".to_string()));
    }
    kabsch(mobile.points(), reference.points(), weights)
}

/// Fit using only the points where `mask` is true; the RMSD covers the masked points only
pub fn superimpose_masked(
    mobile: &CoordinateSet,
    reference: &CoordinateSet,
    mask: &[bool],
) -> Result<SuperpositionResult, GeometryError> {
    check_pair(mobile, reference)?;
    if mask.len() != mobile.len() {
        return Err(GeometryError::LengthMismatch {
            left: mobile.len(),
            right: mask.len(),
        });
    }
    let weights: Vec<f64> = mask
        .iter()
        .enumerate()
        .map(|(i, &m)| if m { mobile.weight(i) } else { 0.0 })
        .collect();
    if weights.iter().all(|w| *w == 0.0) {
        return Err(GeometryError::Empty);
    }
    kabsch(mobile.points(), reference.points(), &weights)
}

/// Superimpose `mobile` onto `reference` using the given atom correspondences
/// and carry every atom of `mobile` along with the fitted transform.
pub fn superimpose_structure(
    mobile: &mut Structure,
    reference: &Structure,
    atom_map: &[(AtomId, AtomId)],
) -> Result<SuperpositionResult, GeometryError> {
    let (mobile_ids, reference_ids): (Vec<AtomId>, Vec<AtomId>) = atom_map.iter().copied().unzip();
    let mobile_set = CoordinateSet::from_atom_ids(mobile, &mobile_ids)?;
    let reference_set = CoordinateSet::from_atom_ids(reference, &reference_ids)?;

    let fit = superimpose(&mobile_set, &reference_set)?;
    mobile.transform(&fit.rotation, &fit.translation);
    debug!(
        "Superimposed {} onto {} over {} atoms, rmsd {:.3}",
        mobile.name,
        reference.name,
        atom_map.len(),
        fit.rmsd
    );
    Ok(fit)
}

/// Superimpose on the CA atoms of residues that carry one in both structures
pub fn calpha_superimpose_structure(
    mobile: &mut Structure,
    reference: &Structure,
) -> Result<SuperpositionResult, GeometryError> {
    let n = mobile.residue_count().min(reference.residue_count());
    let mut atom_map = Vec::new();
    for r in 0..n {
        let (m, f) = (&mobile.residues[r], &reference.residues[r]);
        if !m.is_protein() || !f.is_protein() {
            continue;
        }
        if let (Some(a), Some(b)) = (m.atom_index("CA"), f.atom_index("CA")) {
            atom_map.push((AtomId::new(r, a), AtomId::new(r, b)));
        }
    }
    if atom_map.is_empty() {
        return Err(GeometryError::Empty);
    }
    superimpose_structure(mobile, reference, &atom_map)
}

fn kabsch(
    mobile: &[Vector3<f64>],
    reference: &[Vector3<f64>],
    weights: &[f64],
) -> Result<SuperpositionResult, GeometryError> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(GeometryError::InvalidWeights("all weights are zero".to_string()));
    }

    let weighted_centroid = |points: &[Vector3<f64>]| {
        points
            .iter()
            .zip(weights.iter())
            .fold(Vector3::zeros(), |acc, (p, w)| acc + p * *w)
            / total
    };
    let mobile_centroid = weighted_centroid(mobile);
    let reference_centroid = weighted_centroid(reference);

    let h = mobile
        .iter()
        .zip(reference.iter())
        .zip(weights.iter())
        .fold(Matrix3::zeros(), |acc, ((a, b), w)| {
            acc + (a - mobile_centroid) * (b - reference_centroid).transpose() * *w
        });

    let scale = mobile
        .iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w > 0.0)
        .map(|(a, _)| (a - mobile_centroid).norm())
        .fold(0.0, f64::max)
        .max(1.0);

    let (rotation, degenerate) = if h.norm() < 1e-10 * scale * scale {
        warn!(
            "Superposition of {} points is under-determined; using identity rotation",
            mobile.len()
        );
        (Matrix3::identity(), true)
    } else {
        let svd = h.svd(true, true);
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => {
                return Err(GeometryError::InvalidWeights(
                    "singular value decomposition failed".to_string(),
                ))
            }
        };
        let v = v_t.transpose();
        let d = (v * u.transpose()).determinant();
        let mut correction = Matrix3::identity();
        if d < 0.0 {
            // flip the axis of the smallest singular value
            let smallest = svd.singular_values.imin();
            correction[(smallest, smallest)] = -1.0;
        }

        let mut sv: Vec<f64> = svd.singular_values.iter().copied().collect();
        sv.sort_by(|a, b| b.total_cmp(a));
        let collinear = sv[1] < 1e-8 * sv[0];
        if collinear {
            warn!(
                "Superposition points are collinear; rotation about the common axis is arbitrary"
            );
        }
        (v * correction * u.transpose(), collinear)
    };

    let translation = reference_centroid - rotation * mobile_centroid;

    let sum_sq: f64 = mobile
        .iter()
        .zip(reference.iter())
        .zip(weights.iter())
        .map(|((a, b), w)| w * (rotation * a + translation - b).norm_squared())
        .sum();
    let rmsd = clamp_rmsd((sum_sq / total).max(0.0).sqrt());

    Ok(SuperpositionResult {
        rotation,
        translation,
        rmsd,
        degenerate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::test_util::{serine, small_ligand};
    use nalgebra::{Rotation3, Unit};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_square() -> CoordinateSet {
        CoordinateSet::new(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ])
    }

    fn irregular_set() -> CoordinateSet {
        CoordinateSet::new(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.5, 0.2, -0.3),
            Vector3::new(2.1, 1.7, 0.4),
            Vector3::new(-0.8, 2.2, 1.1),
            Vector3::new(0.3, -1.4, 2.0),
            Vector3::new(3.0, -0.5, -1.2),
        ])
    }

    #[test]
    fn test_apply_to_set_maps_onto_reference() {
        let mobile = irregular_set();
        let rot = Rotation3::from_euler_angles(0.3, -0.7, 1.1);
        let shift = Vector3::new(2.0, -1.0, 0.5);
        let reference = CoordinateSet::new(mobile.points().iter().map(|p| rot * p + shift).collect());
        let fit = superimpose(&mobile, &reference).unwrap();

        let weighted = CoordinateSet::with_weights(mobile.points().to_vec(), vec![1.0, 2.0, 1.0, 0.5, 1.0, 3.0]).unwrap();
        let moved = fit.apply_to_set(&weighted).unwrap();
        assert_eq!(moved.weights(), weighted.weights());
        for (p, q) in moved.points().iter().zip(reference.points()) {
            assert!((p - q).norm() < 1e-9);
        }
        assert!(fit.apply_to_set(&mobile).unwrap().weights().is_none());
    }

    #[test]
    fn test_identical_squares_give_identity() {
        let square = unit_square();
        let fit = superimpose(&square, &square).unwrap();
        assert!((fit.rotation - Matrix3::identity()).norm() < 1e-9);
        assert!(fit.translation.norm() < 1e-9);
        assert_eq!(fit.rmsd, 0.0);
        assert!(!fit.degenerate);
    }

    #[test]
    fn test_recovers_z_rotation_and_translation() {
        let square = unit_square();
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let shift = Vector3::new(1.0, 0.0, 0.0);
        let moved = CoordinateSet::new(square.points().iter().map(|p| rz * p + shift).collect());

        let fit = superimpose(&square, &moved).unwrap();
        assert!((fit.rotation - rz.matrix()).norm() < 1e-6);
        assert!((fit.translation - shift).norm() < 1e-6);
        assert_eq!(fit.rmsd, 0.0);
    }

    #[test]
    fn test_rotation_is_proper_for_mirror_images() {
        let a = irregular_set();
        let mirrored = CoordinateSet::new(
            a.points()
                .iter()
                .map(|p| Vector3::new(p.x, p.y, -p.z))
                .collect(),
        );
        let fit = superimpose(&a, &mirrored).unwrap();
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-9);
        assert!((fit.rotation * fit.rotation.transpose() - Matrix3::identity()).norm() < 1e-9);
        assert!(fit.rmsd > 0.0);
    }

    #[test]
    fn test_noisy_fit_converges_to_true_rotation() {
        let a = irregular_set();
        let axis = Unit::new_normalize(Vector3::new(0.3, -0.5, 0.8));
        let r0 = Rotation3::from_axis_angle(&axis, 1.1);
        let t0 = Vector3::new(-2.0, 4.0, 0.5);
        let mut rng = StdRng::seed_from_u64(42);

        let mut previous_error = f64::MAX;
        for &noise in &[0.1, 0.01, 0.001] {
            let b = CoordinateSet::new(
                a.points()
                    .iter()
                    .map(|p| {
                        let eps = Vector3::new(
                            rng.gen_range(-noise..noise),
                            rng.gen_range(-noise..noise),
                            rng.gen_range(-noise..noise),
                        );
                        r0 * p + t0 + eps
                    })
                    .collect(),
            );
            let fit = superimpose(&a, &b).unwrap();
            let error = (fit.rotation - r0.matrix()).norm();
            assert!(fit.rmsd >= 0.0);
            assert!(fit.rmsd < 2.0 * noise);
            assert!(error < previous_error.max(1e-12) * 1.5);
            previous_error = error;
        }
        assert!(previous_error < 1e-2);
    }

    #[test]
    fn test_weighted_and_masked_fit() {
        let a = irregular_set();
        let mut shifted: Vec<Vector3<f64>> = a.points().to_vec();
        shifted[5] += Vector3::new(5.0, 0.0, 0.0);
        let b = CoordinateSet::new(shifted);

        let mask = vec![true, true, true, true, true, false];
        let masked = superimpose_masked(&a, &b, &mask).unwrap();
        assert_eq!(masked.rmsd, 0.0);

        let weights = vec![1.0, 1.0, 1.0, 1.0, 1.0, 0.0];
        let weighted = superimpose_weighted(&a, &b, &weights).unwrap();
        assert!((weighted.rotation - masked.rotation).norm() < 1e-9);

        assert!(superimpose_weighted(&a, &b, &[0.0; 6]).is_err());
        assert!(superimpose_masked(&a, &b, &[false; 6]).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        let a = unit_square();
        let b = CoordinateSet::new(vec![Vector3::zeros()]);
        assert!(matches!(
            superimpose(&a, &b),
            Err(GeometryError::LengthMismatch { .. })
        ));
        let empty = CoordinateSet::default();
        assert_eq!(superimpose(&empty, &empty), Err(GeometryError::Empty));
    }

    #[test]
    fn test_degenerate_inputs_still_give_rotation() {
        let single = CoordinateSet::new(vec![Vector3::new(1.0, 2.0, 3.0)]);
        let target = CoordinateSet::new(vec![Vector3::new(4.0, 5.0, 6.0)]);
        let fit = superimpose(&single, &target).unwrap();
        assert!(fit.degenerate);
        assert_eq!(fit.rotation, Matrix3::identity());
        assert!((fit.apply(&single.points()[0]) - target.points()[0]).norm() < 1e-12);

        let line = CoordinateSet::new(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ]);
        let line_y = CoordinateSet::new(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
        ]);
        let fit = superimpose(&line, &line_y).unwrap();
        assert!(fit.degenerate);
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-9);
        assert_eq!(fit.rmsd, 0.0);
    }

    #[test]
    fn test_superimpose_structure_carries_unfitted_atoms() {
        let mut reference = Structure::new("ref");
        reference.add_residue(serine(1, Vector3::zeros()));
        reference.add_residue(small_ligand(Vector3::new(4.0, 0.0, 0.0)));

        let mut mobile = reference.clone();
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.7);
        mobile.transform(rot.matrix(), &Vector3::new(3.0, -1.0, 2.0));

        let fit = calpha_superimpose_structure(&mut mobile, &reference);
        // a single CA cannot fix the rotation
        assert!(fit.unwrap().degenerate);

        let map: Vec<(AtomId, AtomId)> = (0..reference.residues[0].atom_count())
            .map(|i| (AtomId::new(0, i), AtomId::new(0, i)))
            .collect();
        let fit = superimpose_structure(&mut mobile, &reference, &map).unwrap();
        assert_eq!(fit.rmsd, 0.0);

        for (rm, rr) in mobile.residues.iter().zip(reference.residues.iter()) {
            for (am, ar) in rm.atoms.iter().zip(rr.atoms.iter()) {
                assert!((am.coordinates - ar.coordinates).norm() < 1e-6);
            }
        }
    }

    #[test]
    fn test_rmsd_clamp() {
        assert_eq!(clamp_rmsd(9.9e-6), 0.0);
        assert_eq!(clamp_rmsd(2e-5), 2e-5);
    }
}
