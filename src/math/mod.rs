//! Small geometric helpers shared by the conformer model and the docking driver

use nalgebra::{Unit, UnitQuaternion, Vector3};
use rand::Rng;
use std::f64::consts::PI;

/// Dihedral angle a-b-c-d in degrees, in (-180, 180]
pub fn dihedral(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
) -> f64 {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);

    let x = n1.dot(&n2);
    let y = n1.cross(&n2).dot(&b2.normalize());

    wrap_degrees(y.atan2(x).to_degrees())
}

/// Wrap an angle in degrees into (-180, 180]
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Rotate `point` by `angle_deg` around the axis passing through `origin` along `axis`
pub fn rotate_about_axis(
    point: &Vector3<f64>,
    origin: &Vector3<f64>,
    axis: &Vector3<f64>,
    angle_deg: f64,
) -> Vector3<f64> {
    if axis.norm() < 1e-12 {
        return *point;
    }
    let rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle_deg.to_radians());
    origin + rotation * (point - origin)
}

/// Uniformly distributed random rotation (Shoemake's method)
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<f64> {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();
    let u3: f64 = rng.gen();

    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    let q = nalgebra::Quaternion::new(
        b * (2.0 * PI * u3).cos(),
        a * (2.0 * PI * u2).sin(),
        a * (2.0 * PI * u2).cos(),
        b * (2.0 * PI * u3).sin(),
    );
    UnitQuaternion::from_quaternion(q)
}

/// Random point uniformly distributed inside a sphere of the given radius
pub fn random_point_in_sphere<R: Rng + ?Sized>(rng: &mut R, radius: f64) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.norm_squared() <= 1.0 {
            return v * radius;
        }
    }
}

/// Unweighted centroid of a set of points; zero for an empty slice
pub fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dihedral_known_values() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 1.0, 0.0);

        let trans = Vector3::new(-1.0, 1.0, 0.0);
        assert!((dihedral(&a, &b, &c, &trans).abs() - 180.0).abs() < 1e-9);

        let cis = Vector3::new(1.0, 1.0, 0.0);
        assert!(dihedral(&a, &b, &c, &cis).abs() < 1e-9);

        let plus = Vector3::new(0.0, 1.0, 1.0);
        let minus = Vector3::new(0.0, 1.0, -1.0);
        assert!((dihedral(&a, &b, &c, &plus) + 90.0).abs() < 1e-9);
        assert!((dihedral(&a, &b, &c, &minus) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_changes_dihedral_by_angle() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 1.0, 0.0);
        let d = Vector3::new(1.0, 1.0, 0.0);

        let before = dihedral(&a, &b, &c, &d);
        let moved = rotate_about_axis(&d, &c, &(c - b), 60.0);
        let after = dihedral(&a, &b, &c, &moved);
        assert!((wrap_degrees(after - before) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(725.0), 5.0);
    }

    #[test]
    fn test_random_rotation_is_normalized() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let q = random_rotation(&mut rng);
            assert!((q.quaternion().norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_random_point_in_sphere() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            assert!(random_point_in_sphere(&mut rng, 3.0).norm() <= 3.0 + 1e-12);
        }
    }
}
