//! MaxSub alignment length and the GDT-MM composite score
//!
//! Candidate subsets are grown from every contiguous seed window by repeated superposition:
//! fit on the current subset, then keep every point within a distance threshold of its partner.
//! Each candidate records its size, post-fit RMSD and largest post-fit distance. The candidate
//! pool does not depend on the tolerances, so the accepted alignment length can only grow as
//! `rmstol` or `disttol` grow.

use super::{is_protein_ca, paired_coordinates, RmsError};
use crate::coords::{check_pair, CoordinateSet};
use crate::molecule::Structure;
use crate::superposition::superimpose;
use log::{trace, warn};

/// Default distance tolerance for a single MaxSub call
pub const DEFAULT_DISTTOL: f64 = 3.5;

/// Default RMSD tolerance for [`ca_maxsub`]
pub const DEFAULT_RMSTOL: f64 = 4.0;

const SEED_LENGTH: usize = 4;
const EXTENSION_ITERATIONS: usize = 4;
const THRESHOLD_LADDER: [f64; 16] = [
    0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 5.5, 6.0, 6.5, 7.0, 7.5, 8.0,
];

/// One superimposable subset found by seed extension
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    size: usize,
    rms: f64,
    max_dist: f64,
}

/// Result of one MaxSub query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxSubResult {
    /// Number of aligned points
    pub aligned: usize,
    /// RMSD of the aligned subset
    pub rms: f64,
    /// Aligned fraction of all points (0 for empty input)
    pub fraction: f64,
}

/// Every candidate subset for one coordinate pair; queried once per tolerance pair
#[derive(Debug, Clone)]
pub struct MaxSubCandidates {
    natoms: usize,
    candidates: Vec<Candidate>,
}

impl MaxSubCandidates {
    pub fn compute(a: &CoordinateSet, b: &CoordinateSet) -> Result<Self, RmsError> {
        if a.is_empty() && b.is_empty() {
            warn!("MaxSub called with zero atoms; alignment length is 0");
            return Ok(Self {
                natoms: 0,
                candidates: Vec::new(),
            });
        }
        check_pair(a, b)?;

        let n = a.len();
        let seed_len = SEED_LENGTH.min(n);
        let mut candidates = Vec::new();

        for start in 0..=(n - seed_len) {
            let seed: Vec<usize> = (start..start + seed_len).collect();
            candidates.push(evaluate(a, b, &seed)?.0);

            for &threshold in THRESHOLD_LADDER.iter() {
                let mut subset = seed.clone();
                for _ in 0..EXTENSION_ITERATIONS {
                    let (_, distances) = evaluate(a, b, &subset)?;
                    let next: Vec<usize> = (0..n).filter(|&i| distances[i] <= threshold).collect();
                    if next.is_empty() || next == subset {
                        break;
                    }
                    subset = next;
                    candidates.push(evaluate(a, b, &subset)?.0);
                }
            }
        }
        trace!("MaxSub collected {} candidates over {} atoms", candidates.len(), n);
        Ok(Self {
            natoms: n,
            candidates,
        })
    }

    /// Largest candidate with rms <= `rmstol` and every member within `disttol`
    pub fn query(&self, rmstol: f64, disttol: f64) -> MaxSubResult {
        let best = self
            .candidates
            .iter()
            .filter(|c| c.rms <= rmstol && c.max_dist <= disttol)
            .fold(None::<Candidate>, |best, c| match best {
                Some(b) if b.size > c.size || (b.size == c.size && b.rms <= c.rms) => Some(b),
                _ => Some(*c),
            });
        match best {
            Some(c) => MaxSubResult {
                aligned: c.size,
                rms: c.rms,
                fraction: c.size as f64 / self.natoms as f64,
            },
            None => MaxSubResult {
                aligned: 0,
                rms: 0.0,
                fraction: 0.0,
            },
        }
    }
}

/// Fit on `subset`; returns the candidate record and post-fit distances of all points
fn evaluate(
    a: &CoordinateSet,
    b: &CoordinateSet,
    subset: &[usize],
) -> Result<(Candidate, Vec<f64>), RmsError> {
    let fit = superimpose(&a.subset(subset), &b.subset(subset))?;
    let distances: Vec<f64> = a
        .points()
        .iter()
        .zip(b.points().iter())
        .map(|(p, q)| (fit.apply(p) - q).norm())
        .collect();
    let max_dist = subset.iter().map(|&i| distances[i]).fold(0.0, f64::max);
    Ok((
        Candidate {
            size: subset.len(),
            rms: fit.rmsd,
            max_dist,
        },
        distances,
    ))
}

/// MaxSub alignment for one tolerance pair
pub fn maxsub(a: &CoordinateSet, b: &CoordinateSet, rmstol: f64, disttol: f64) -> Result<MaxSubResult, RmsError> {
    Ok(MaxSubCandidates::compute(a, b)?.query(rmstol, disttol))
}

/// MaxSub alignment length with the default tolerances
pub fn xyz_maxsub(a: &CoordinateSet, b: &CoordinateSet) -> Result<usize, RmsError> {
    Ok(maxsub(a, b, DEFAULT_RMSTOL, DEFAULT_DISTTOL)?.aligned)
}

/// MaxSub over protein CA atoms
pub fn ca_maxsub(a: &Structure, b: &Structure, rms: f64) -> Result<usize, RmsError> {
    let (pa, pb) = paired_coordinates(a, b, is_protein_ca, None)?;
    Ok(maxsub(&pa, &pb, rms, DEFAULT_DISTTOL)?.aligned)
}

/// MaxSub over the CA atoms at the given positions (indices into the CA list)
pub fn ca_maxsub_selection(a: &Structure, b: &Structure, selection: &[usize], rms: f64) -> Result<usize, RmsError> {
    let (pa, pb) = select_ca(a, b, selection)?;
    Ok(maxsub(&pa, &pb, rms, DEFAULT_DISTTOL)?.aligned)
}

fn select_ca(a: &Structure, b: &Structure, selection: &[usize]) -> Result<(CoordinateSet, CoordinateSet), RmsError> {
    let (pa, pb) = paired_coordinates(a, b, is_protein_ca, None)?;
    let mut indices: Vec<usize> = selection.iter().copied().filter(|&i| i < pa.len()).collect();
    indices.sort_unstable();
    indices.dedup();
    Ok((pa.subset(&indices), pb.subset(&indices)))
}

/// Component fractions of GDT-MM, named `m_<disttol>_<rmstol>`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GdtComponents {
    pub m_1_1: f64,
    pub m_2_2: f64,
    pub m_3_3: f64,
    pub m_4_3: f64,
    /// Reported for reference; not part of the mean
    pub m_7_4: f64,
}

impl GdtComponents {
    /// Mean of the four scored components
    pub fn gdtmm(&self) -> f64 {
        (self.m_1_1 + self.m_2_2 + self.m_3_3 + self.m_4_3) / 4.0
    }
}

/// GDT-MM components for a coordinate pair: (rmstol, disttol) = (1,1), (2,2), (3,3), (3,4), and (4,7)
pub fn xyz_gdtmm(a: &CoordinateSet, b: &CoordinateSet) -> Result<GdtComponents, RmsError> {
    let candidates = MaxSubCandidates::compute(a, b)?;
    let frac = |rmstol: f64, disttol: f64| {
        trace!("maxsub with rmstol {} and disttol {}", rmstol, disttol);
        candidates.query(rmstol, disttol).fraction
    };
    Ok(GdtComponents {
        m_1_1: frac(1.0, 1.0),
        m_2_2: frac(2.0, 2.0),
        m_3_3: frac(3.0, 3.0),
        m_4_3: frac(3.0, 4.0),
        m_7_4: frac(4.0, 7.0),
    })
}

pub fn ca_gdtmm(a: &Structure, b: &Structure) -> Result<GdtComponents, RmsError> {
    let (pa, pb) = paired_coordinates(a, b, is_protein_ca, None)?;
    xyz_gdtmm(&pa, &pb)
}

pub fn ca_gdtmm_selection(a: &Structure, b: &Structure, selection: &[usize]) -> Result<GdtComponents, RmsError> {
    let (pa, pb) = select_ca(a, b, selection)?;
    xyz_gdtmm(&pa, &pb)
}

/// GDT-MM of `model` against `native`, skipping excluded native residues
pub fn native_ca_gdtmm(native: &Structure, model: &Structure, exclude: &[usize]) -> Result<f64, RmsError> {
    if exclude.is_empty() {
        return Ok(ca_gdtmm(native, model)?.gdtmm());
    }
    let residues = super::invert_exclude_residues(native.residue_count(), exclude);
    let (pa, pb) = paired_coordinates(native, model, is_protein_ca, Some(&residues))?;
    Ok(xyz_gdtmm(&pa, &pb)?.gdtmm())
}
