//! Uniform spatial hash for neighbour lookups around grid points

use nalgebra::Vector3;
use std::collections::HashMap;

type CellKey = (i64, i64, i64);

/// Points bucketed into cubic cells of a fixed edge length
#[derive(Debug, Clone)]
pub struct AtomHash<T> {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<(Vector3<f64>, T)>>,
    len: usize,
}

impl<T> AtomHash<T> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            cells: HashMap::new(),
            len: 0,
        }
    }

    fn key(&self, p: &Vector3<f64>) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    pub fn insert(&mut self, position: Vector3<f64>, value: T) {
        let key = self.key(&position);
        self.cells.entry(key).or_default().push((position, value));
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Visit every stored point within `radius` of `center` with its distance
    pub fn for_each_within<F>(&self, center: &Vector3<f64>, radius: f64, mut visit: F)
    where
        F: FnMut(&Vector3<f64>, &T, f64),
    {
        let reach = (radius / self.cell_size).ceil() as i64;
        let (cx, cy, cz) = self.key(center);
        let radius_sq = radius * radius;
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        for (p, value) in bucket {
                            let d2 = (p - center).norm_squared();
                            if d2 <= radius_sq {
                                visit(p, value, d2.sqrt());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Number of stored points within `radius` of `center`
    pub fn count_within(&self, center: &Vector3<f64>, radius: f64) -> usize {
        let mut n = 0;
        self.for_each_within(center, radius, |_, _, _| n += 1);
        n
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vector3<f64>, T)> {
        self.cells.values().flat_map(|bucket| bucket.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbour_query_matches_brute_force() {
        let mut hash = AtomHash::new(1.5);
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let p = Vector3::new(i as f64 * 0.7, j as f64 * 0.9, ((i * j) % 5) as f64 * 0.6);
                hash.insert(p, i * 10 + j);
                points.push(p);
            }
        }
        assert_eq!(hash.len(), 100);

        let center = Vector3::new(3.1, 4.2, 1.0);
        let radius = 2.3;
        let brute = points.iter().filter(|p| (*p - center).norm() <= radius).count();
        assert_eq!(hash.count_within(&center, radius), brute);
    }

    #[test]
    fn test_negative_coordinates() {
        let mut hash = AtomHash::new(2.0);
        hash.insert(Vector3::new(-0.5, -0.5, -0.5), "a");
        hash.insert(Vector3::new(0.5, 0.5, 0.5), "b");
        let mut found = Vec::new();
        hash.for_each_within(&Vector3::zeros(), 1.0, |_, v, _| found.push(*v));
        found.sort();
        assert_eq!(found, vec!["a", "b"]);
    }
}
