//! Graph automorphisms of a residue's heavy-atom skeleton and the automorphism-invariant RMSD

use super::{clamp_rmsd, RmsError};
use crate::atom::AtomType;
use crate::coords::CoordinateSet;
use crate::molecule::Residue;
use crate::superposition::superimpose;
use log::{debug, info};
use std::collections::VecDeque;

/// Lazily enumerates the topology-preserving renamings of a residue's heavy atoms.
///
/// Each item maps heavy-atom position `i` (in residue order, hydrogens skipped) to the position
/// it is renamed to. Atoms may only map onto atoms of the same type and heavy-atom degree, and
/// bonded pairs must stay bonded. The identity mapping is always produced first.
pub struct AutomorphismIterator {
    labels: Vec<(AtomType, usize)>,
    bonded: Vec<Vec<bool>>,
    order: Vec<usize>,
    candidates: Vec<Vec<usize>>,
    cursor: Vec<usize>,
    assigned: Vec<Option<usize>>,
    used: Vec<bool>,
    depth: usize,
    started: bool,
    done: bool,
}

impl AutomorphismIterator {
    pub fn new(residue: &Residue) -> Self {
        let heavy: Vec<usize> = (0..residue.atom_count())
            .filter(|&i| !residue.atom_is_hydrogen(i))
            .collect();
        let n = heavy.len();

        let mut bonded = vec![vec![false; n]; n];
        for (p, &i) in heavy.iter().enumerate() {
            for (q, &j) in heavy.iter().enumerate() {
                if p != q && residue.bonded(i, j) {
                    bonded[p][q] = true;
                }
            }
        }
        let labels: Vec<(AtomType, usize)> = (0..n)
            .map(|p| {
                let degree = bonded[p].iter().filter(|&&b| b).count();
                (residue.atoms[heavy[p]].atom_type, degree)
            })
            .collect();

        // Breadth-first visiting order so every atom after the first of a component
        // is constrained by an already-placed neighbour
        let mut order = Vec::with_capacity(n);
        let mut seen = vec![false; n];
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut queue = VecDeque::from([start]);
            while let Some(cur) = queue.pop_front() {
                order.push(cur);
                for next in 0..n {
                    if bonded[cur][next] && !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        let candidates = order
            .iter()
            .map(|&atom| {
                let mut c = vec![atom];
                c.extend((0..n).filter(|&other| other != atom && labels[other] == labels[atom]));
                c
            })
            .collect();

        Self {
            labels,
            bonded,
            order,
            candidates,
            cursor: vec![0; n],
            assigned: vec![None; n],
            used: vec![false; n],
            depth: 0,
            started: false,
            done: false,
        }
    }

    fn consistent(&self, depth: usize, image: usize) -> bool {
        let atom = self.order[depth];
        if self.labels[atom] != self.labels[image] {
            return false;
        }
        (0..depth).all(|e| {
            let other = self.order[e];
            match self.assigned[e] {
                Some(other_image) => self.bonded[atom][other] == self.bonded[image][other_image],
                None => true,
            }
        })
    }

    fn current_mapping(&self) -> Vec<usize> {
        let mut mapping = vec![0; self.order.len()];
        for (d, &atom) in self.order.iter().enumerate() {
            if let Some(image) = self.assigned[d] {
                mapping[atom] = image;
            }
        }
        mapping
    }
}

impl Iterator for AutomorphismIterator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let n = self.order.len();
        if n == 0 {
            self.done = true;
            return Some(Vec::new());
        }
        if self.started {
            self.depth = n - 1;
        }

        loop {
            let depth = self.depth;
            if let Some(prev) = self.assigned[depth].take() {
                self.used[prev] = false;
            }

            let mut found = None;
            while self.cursor[depth] < self.candidates[depth].len() {
                let image = self.candidates[depth][self.cursor[depth]];
                self.cursor[depth] += 1;
                if !self.used[image] && self.consistent(depth, image) {
                    found = Some(image);
                    break;
                }
            }

            match found {
                Some(image) => {
                    self.assigned[depth] = Some(image);
                    self.used[image] = true;
                    if depth + 1 == n {
                        self.started = true;
                        return Some(self.current_mapping());
                    }
                    self.depth += 1;
                    self.cursor[self.depth] = 0;
                }
                None => {
                    if depth == 0 {
                        self.done = true;
                        return None;
                    }
                    self.depth -= 1;
                }
            }
        }
    }
}

/// Minimum heavy-atom RMSD between two residues of the same type over all automorphisms of the first.
///
/// With `superimpose` each renaming is re-fitted before measuring. The first minimum found wins.
pub fn automorphic_rmsd(rsd1: &Residue, rsd2: &Residue, superimpose_each: bool) -> Result<f64, RmsError> {
    if rsd1.name != rsd2.name {
        return Err(RmsError::ResidueMismatch {
            residue: rsd1.number.max(0) as usize,
            reason: format!("residue type {} vs {}", rsd1.name, rsd2.name),
        });
    }
    if rsd1.heavy_atom_count() != rsd2.heavy_atom_count() {
        return Err(RmsError::ResidueMismatch {
            residue: rsd1.number.max(0) as usize,
            reason: format!(
                "heavy atom count {} vs {}",
                rsd1.heavy_atom_count(),
                rsd2.heavy_atom_count()
            ),
        });
    }

    let heavy1: Vec<_> = rsd1
        .atoms
        .iter()
        .filter(|a| !a.is_hydrogen())
        .map(|a| a.coordinates)
        .collect();
    let heavy2: Vec<_> = rsd2
        .atoms
        .iter()
        .filter(|a| !a.is_hydrogen())
        .map(|a| a.coordinates)
        .collect();
    if heavy1.is_empty() {
        return Err(crate::coords::GeometryError::Empty.into());
    }

    let reference = CoordinateSet::new(heavy1.clone());
    let mut best = f64::MAX;
    let mut counter = 0usize;
    for old2new in AutomorphismIterator::new(rsd1) {
        counter += 1;
        if counter % 10_000 == 0 {
            info!("{} automorphisms so far...", counter);
        }
        let renamed: Vec<_> = old2new.iter().map(|&j| heavy2[j]).collect();
        let rms = if superimpose_each {
            superimpose(&reference, &CoordinateSet::new(renamed))?.rmsd
        } else {
            let sum: f64 = heavy1
                .iter()
                .zip(renamed.iter())
                .map(|(p, q)| (p - q).norm_squared())
                .sum();
            (sum / heavy1.len() as f64).sqrt()
        };
        if rms < best {
            best = rms;
        }
    }
    debug!("{} automorphisms from iterator; best rms is {:.4}", counter, best);
    Ok(clamp_rmsd(best))
}
