//! Minimum RMSD over subunit reassignments of a symmetric complex

use super::{is_protein_ca, paired_coordinates, RmsError};
use crate::coords::{check_pair, CoordinateSet};
use crate::superposition::superimpose;
use log::{debug, warn};

/// Largest subunit count the permutation search accepts (8! = 40320 assignments)
pub const MAX_SYMMETRIC_SUBUNITS: usize = 8;

/// Lazy lexicographic sequence of all permutations of `0..n`, starting with the identity
#[derive(Debug, Clone)]
pub struct SubunitPermutations {
    current: Vec<usize>,
    done: bool,
}

impl SubunitPermutations {
    pub fn new(n: usize) -> Self {
        Self {
            current: (0..n).collect(),
            done: false,
        }
    }
}

impl Iterator for SubunitPermutations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let item = self.current.clone();

        // advance to the next permutation in lexicographic order
        let p = &mut self.current;
        match (1..p.len()).rev().find(|&i| p[i - 1] < p[i]) {
            Some(i) => {
                let pivot = i - 1;
                let successor = (i..p.len())
                    .rev()
                    .find(|&j| p[j] > p[pivot])
                    .unwrap_or(i);
                p.swap(pivot, successor);
                p[i..].reverse();
            }
            None => self.done = true,
        }
        Some(item)
    }
}

/// Minimum superposition RMSD of `model` onto `native` over every assignment of the
/// model's `n_subunits` equal-length contiguous blocks to the native's blocks.
///
/// Returns `-1.0` with a warning when the point count is not a multiple of the subunit count.
pub fn symmetric_rmsd(
    native: &CoordinateSet,
    model: &CoordinateSet,
    n_subunits: usize,
) -> Result<f64, RmsError> {
    check_pair(native, model)?;
    if n_subunits > MAX_SYMMETRIC_SUBUNITS {
        return Err(RmsError::TooManySubunits {
            subunits: n_subunits,
            limit: MAX_SYMMETRIC_SUBUNITS,
        });
    }
    if n_subunits == 0 || native.len() % n_subunits != 0 {
        warn!(
            "{} atoms is not a multiple of {} subunits; symmetric rmsd not computed",
            native.len(),
            n_subunits
        );
        return Ok(-1.0);
    }

    let per_subunit = native.len() / n_subunits;
    let model_points = model.points();
    let mut best = f64::MAX;
    let mut count = 0usize;
    for permutation in SubunitPermutations::new(n_subunits) {
        let shuffled: Vec<_> = permutation
            .iter()
            .flat_map(|&block| model_points[block * per_subunit..(block + 1) * per_subunit].iter().copied())
            .collect();
        let rms = superimpose(&CoordinateSet::new(shuffled), native)?.rmsd;
        if rms < best {
            best = rms;
        }
        count += 1;
    }
    debug!("Checked {} subunit assignments, best rms {:.4}", count, best);
    Ok(best)
}

/// CA RMSD of a symmetric complex, minimised over subunit assignments
pub fn ca_rmsd_symmetric(
    native: &crate::molecule::Structure,
    model: &crate::molecule::Structure,
    n_subunits: usize,
) -> Result<f64, RmsError> {
    let (pn, pm) = paired_coordinates(native, model, is_protein_ca, None)?;
    symmetric_rmsd(&pn, &pm, n_subunits)
}
