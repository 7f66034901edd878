//! RMSD and alignment metrics between structures
//!
//! Atom selections are expressed as predicates over `(residue, atom index)`. Coordinates are
//! paired residue by residue, matching atoms by name, so the two structures must have the same
//! number of residues.
//!
//! The no-superposition variants are symmetric in their arguments. The superposition variants
//! fit the first structure onto the second; their result is symmetric only up to floating-point
//! rounding.

pub mod automorphism;
pub mod maxsub;
pub mod symmetric;

use crate::coords::{check_pair, CoordinateSet, GeometryError};
use crate::molecule::{AtomId, Residue, Structure, StructureError};
use crate::superposition::superimpose;
use log::debug;
use std::collections::BTreeMap;
use thiserror::Error;

pub use crate::superposition::{clamp_rmsd, RMSD_EPSILON};
pub use automorphism::{automorphic_rmsd, AutomorphismIterator};
pub use maxsub::{
    ca_gdtmm, ca_gdtmm_selection, ca_maxsub, ca_maxsub_selection, maxsub, native_ca_gdtmm,
    xyz_gdtmm, xyz_maxsub, GdtComponents, MaxSubCandidates, MaxSubResult,
};
pub use symmetric::{ca_rmsd_symmetric, symmetric_rmsd, SubunitPermutations, MAX_SYMMETRIC_SUBUNITS};

/// Errors raised by RMSD computations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RmsError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("Structures differ in residue count: {left} vs {right}")]
    ResidueCountMismatch { left: usize, right: usize },

    #[error("Residue {residue} cannot be compared: {reason}")]
    ResidueMismatch { residue: usize, reason: String },

    #[error("Symmetric RMSD over {subunits} subunits exceeds the limit of {limit}")]
    TooManySubunits { subunits: usize, limit: usize },
}

/// Mapping from atoms of one structure onto atoms of another
pub type AtomCorrespondence = BTreeMap<AtomId, AtomId>;

/// Selection predicate over `(residue, atom index)`
pub type AtomPredicate = fn(&Residue, usize) -> bool;

fn atom_named(res: &Residue, atom: usize, names: &[&str]) -> bool {
    res.atoms
        .get(atom)
        .map_or(false, |a| names.contains(&a.name.as_str()))
}

pub fn is_protein_ca(res: &Residue, atom: usize) -> bool {
    res.is_protein() && atom_named(res, atom, &["CA"])
}

pub fn is_protein_ca_or_cb(res: &Residue, atom: usize) -> bool {
    res.is_protein() && atom_named(res, atom, &["CA", "CB"])
}

pub fn is_protein_backbone(res: &Residue, atom: usize) -> bool {
    res.is_protein() && atom_named(res, atom, &["N", "CA", "C"])
}

pub fn is_protein_backbone_including_o(res: &Residue, atom: usize) -> bool {
    res.is_protein() && atom_named(res, atom, &["N", "CA", "C", "O"])
}

pub fn is_protein_sidechain_heavyatom(res: &Residue, atom: usize) -> bool {
    res.is_protein() && !res.atom_is_hydrogen(atom) && !res.is_backbone_atom(atom) && atom < res.atom_count()
}

pub fn is_ligand_heavyatom(res: &Residue, atom: usize) -> bool {
    !res.is_polymer() && atom < res.atom_count() && !res.atom_is_hydrogen(atom)
}

pub fn is_polymer_heavyatom(res: &Residue, atom: usize) -> bool {
    res.is_polymer() && atom < res.atom_count() && !res.atom_is_hydrogen(atom)
}

pub fn is_heavyatom(res: &Residue, atom: usize) -> bool {
    atom < res.atom_count() && !res.atom_is_hydrogen(atom)
}

pub fn is_nbr_atom(res: &Residue, atom: usize) -> bool {
    res.nbr_atom() == Some(atom)
}

/// Residue indices `0..nres` with the excluded ones removed
pub fn invert_exclude_residues(nres: usize, exclude: &[usize]) -> Vec<usize> {
    (0..nres).filter(|i| !exclude.contains(i)).collect()
}

/// Paired coordinates of the atoms selected in both structures, optionally restricted to a residue subset
pub fn paired_coordinates<F>(
    a: &Structure,
    b: &Structure,
    predicate: F,
    residues: Option<&[usize]>,
) -> Result<(CoordinateSet, CoordinateSet), RmsError>
where
    F: Fn(&Residue, usize) -> bool,
{
    if a.residue_count() != b.residue_count() {
        return Err(RmsError::ResidueCountMismatch {
            left: a.residue_count(),
            right: b.residue_count(),
        });
    }

    let all: Vec<usize>;
    let selection = match residues {
        Some(list) => list,
        None => {
            all = (0..a.residue_count()).collect();
            &all
        }
    };

    let mut pa = Vec::new();
    let mut pb = Vec::new();
    for &r in selection {
        let ra = a.residue(r)?;
        let rb = b.residue(r)?;
        for (i, atom) in ra.atoms.iter().enumerate() {
            if !predicate(ra, i) {
                continue;
            }
            let j = rb
                .atom_index(&atom.name)
                .ok_or_else(|| StructureError::UnknownAtomName {
                    residue: r,
                    name: atom.name.clone(),
                })?;
            if !predicate(rb, j) {
                continue;
            }
            pa.push(atom.coordinates);
            pb.push(rb.atoms[j].coordinates);
        }
    }
    Ok((CoordinateSet::new(pa), CoordinateSet::new(pb)))
}

/// RMSD between paired points without any fitting
pub fn xyz_rmsd_no_super(a: &CoordinateSet, b: &CoordinateSet) -> Result<f64, RmsError> {
    check_pair(a, b)?;
    let sum: f64 = a
        .points()
        .iter()
        .zip(b.points().iter())
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    Ok(clamp_rmsd((sum / a.len() as f64).sqrt()))
}

/// RMSD after optimal superposition of `a` onto `b`
pub fn xyz_rmsd_with_super(a: &CoordinateSet, b: &CoordinateSet) -> Result<f64, RmsError> {
    Ok(superimpose(a, b)?.rmsd)
}

pub fn rmsd_with_super<F>(a: &Structure, b: &Structure, predicate: F) -> Result<f64, RmsError>
where
    F: Fn(&Residue, usize) -> bool,
{
    let (pa, pb) = paired_coordinates(a, b, predicate, None)?;
    xyz_rmsd_with_super(&pa, &pb)
}

pub fn rmsd_no_super<F>(a: &Structure, b: &Structure, predicate: F) -> Result<f64, RmsError>
where
    F: Fn(&Residue, usize) -> bool,
{
    let (pa, pb) = paired_coordinates(a, b, predicate, None)?;
    xyz_rmsd_no_super(&pa, &pb)
}

pub fn rmsd_with_super_subset<F>(
    a: &Structure,
    b: &Structure,
    residues: &[usize],
    predicate: F,
) -> Result<f64, RmsError>
where
    F: Fn(&Residue, usize) -> bool,
{
    let (pa, pb) = paired_coordinates(a, b, predicate, Some(residues))?;
    xyz_rmsd_with_super(&pa, &pb)
}

pub fn rmsd_no_super_subset<F>(
    a: &Structure,
    b: &Structure,
    residues: &[usize],
    predicate: F,
) -> Result<f64, RmsError>
where
    F: Fn(&Residue, usize) -> bool,
{
    let (pa, pb) = paired_coordinates(a, b, predicate, Some(residues))?;
    xyz_rmsd_no_super(&pa, &pb)
}

pub fn ca_rmsd(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_with_super(a, b, is_protein_ca)
}

/// CA RMSD over residues `start..=end`
pub fn ca_rmsd_range(a: &Structure, b: &Structure, start: usize, end: usize) -> Result<f64, RmsError> {
    if start > end {
        return Err(GeometryError::Empty.into());
    }
    let residues: Vec<usize> = (start..=end).collect();
    rmsd_with_super_subset(a, b, &residues, is_protein_ca)
}

pub fn ca_rmsd_selection(a: &Structure, b: &Structure, residues: &[usize]) -> Result<f64, RmsError> {
    rmsd_with_super_subset(a, b, residues, is_protein_ca)
}

pub fn bb_rmsd(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_with_super(a, b, is_protein_backbone)
}

pub fn bb_rmsd_including_o(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_with_super(a, b, is_protein_backbone_including_o)
}

pub fn all_atom_rmsd(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_with_super(a, b, is_heavyatom)
}

pub fn all_atom_rmsd_nosuper(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_no_super(a, b, is_heavyatom)
}

pub fn nbr_atom_rmsd(a: &Structure, b: &Structure) -> Result<f64, RmsError> {
    rmsd_with_super(a, b, is_nbr_atom)
}

/// CA RMSD of `model` to `native`, skipping the excluded native residues
pub fn native_ca_rmsd(native: &Structure, model: &Structure, exclude: &[usize]) -> Result<f64, RmsError> {
    if exclude.is_empty() {
        return ca_rmsd(native, model);
    }
    let residues = invert_exclude_residues(native.residue_count(), exclude);
    ca_rmsd_selection(native, model, &residues)
}

/// Paired coordinates for every entry of an atom map
fn corresponding_sets<'a, I>(
    mobile: &Structure,
    reference: &Structure,
    pairs: I,
) -> Result<(CoordinateSet, CoordinateSet), RmsError>
where
    I: Iterator<Item = (&'a AtomId, &'a AtomId)>,
{
    let mut pm = Vec::new();
    let mut pr = Vec::new();
    for (&m, &r) in pairs {
        pm.push(mobile.xyz(m)?);
        pr.push(reference.xyz(r)?);
    }
    Ok((CoordinateSet::new(pm), CoordinateSet::new(pr)))
}

/// Superposition RMSD over the mapped atoms whose mobile residue is in `calc_rms_res`
pub fn rms_at_corresponding_atoms(
    mobile: &Structure,
    reference: &Structure,
    atom_map: &AtomCorrespondence,
    calc_rms_res: &[usize],
) -> Result<f64, RmsError> {
    let (pm, pr) = corresponding_sets(
        mobile,
        reference,
        atom_map.iter().filter(|(m, _)| calc_rms_res.contains(&m.residue)),
    )?;
    xyz_rmsd_with_super(&pm, &pr)
}

pub fn rms_at_all_corresponding_atoms(
    mobile: &Structure,
    reference: &Structure,
    atom_map: &AtomCorrespondence,
) -> Result<f64, RmsError> {
    let (pm, pr) = corresponding_sets(mobile, reference, atom_map.iter())?;
    xyz_rmsd_with_super(&pm, &pr)
}

pub fn rms_at_corresponding_atoms_no_super(
    mobile: &Structure,
    reference: &Structure,
    atom_map: &AtomCorrespondence,
) -> Result<f64, RmsError> {
    let (pm, pr) = corresponding_sets(mobile, reference, atom_map.iter())?;
    xyz_rmsd_no_super(&pm, &pr)
}

pub fn rms_at_corresponding_heavy_atoms(mobile: &Structure, reference: &Structure) -> Result<f64, RmsError> {
    let map = setup_matching_heavy_atoms(mobile, reference)?;
    rms_at_all_corresponding_atoms(mobile, reference, &map)
}

/// Match atoms with the given names in residues that carry them in both structures
pub fn setup_matching_atoms_with_given_names(
    a: &Structure,
    b: &Structure,
    names: &[&str],
) -> Result<AtomCorrespondence, RmsError> {
    if a.residue_count() != b.residue_count() {
        return Err(RmsError::ResidueCountMismatch {
            left: a.residue_count(),
            right: b.residue_count(),
        });
    }
    let mut map = AtomCorrespondence::new();
    for (r, (ra, rb)) in a.residues.iter().zip(b.residues.iter()).enumerate() {
        for name in names {
            if let (Some(i), Some(j)) = (ra.atom_index(name), rb.atom_index(name)) {
                map.insert(AtomId::new(r, i), AtomId::new(r, j));
            }
        }
    }
    Ok(map)
}

pub fn setup_matching_ca_atoms(a: &Structure, b: &Structure) -> Result<AtomCorrespondence, RmsError> {
    setup_matching_atoms_with_given_names(a, b, &["CA"])
}

pub fn setup_matching_protein_backbone_heavy_atoms(
    a: &Structure,
    b: &Structure,
) -> Result<AtomCorrespondence, RmsError> {
    setup_matching_atoms_with_given_names(a, b, &["N", "CA", "C", "O"])
}

/// Match heavy atoms by name within residues of the same name
pub fn setup_matching_heavy_atoms(a: &Structure, b: &Structure) -> Result<AtomCorrespondence, RmsError> {
    if a.residue_count() != b.residue_count() {
        return Err(RmsError::ResidueCountMismatch {
            left: a.residue_count(),
            right: b.residue_count(),
        });
    }
    let mut map = AtomCorrespondence::new();
    for (r, (ra, rb)) in a.residues.iter().zip(b.residues.iter()).enumerate() {
        if ra.name != rb.name {
            debug!("Skipping residue {}: {} vs {}", r, ra.name, rb.name);
            continue;
        }
        for (i, atom) in ra.atoms.iter().enumerate() {
            if atom.is_hydrogen() {
                continue;
            }
            if let Some(j) = rb.atom_index(&atom.name) {
                map.insert(AtomId::new(r, i), AtomId::new(r, j));
            }
        }
    }
    Ok(map)
}

fn functional_group_atoms(name: &str) -> &'static [&'static str] {
    match name {
        "GLY" => &["CA"],
        "ALA" => &["CB"],
        "SER" => &["OG"],
        "THR" => &["OG1"],
        "CYS" => &["SG"],
        "VAL" => &["CG1", "CG2"],
        "LEU" => &["CD1", "CD2"],
        "ILE" => &["CD1", "CG2"],
        "MET" => &["CE", "SD"],
        "PRO" => &["CG"],
        "PHE" => &["CZ", "CE1", "CE2"],
        "TYR" => &["OH"],
        "TRP" => &["NE1"],
        "ASP" => &["OD1", "OD2"],
        "GLU" => &["OE1", "OE2"],
        "ASN" => &["OD1", "ND2"],
        "GLN" => &["OE1", "NE2"],
        "HIS" => &["ND1", "NE2"],
        "LYS" => &["NZ"],
        "ARG" => &["NH1", "NH2"],
        _ => &[],
    }
}

/// Side-chain heavy-atom RMSD between two residues of the same type, without fitting.
///
/// With `fxnal_group_only` only the terminal functional-group atoms are compared.
pub fn residue_sc_rmsd_no_super(
    res1: &Residue,
    res2: &Residue,
    fxnal_group_only: bool,
) -> Result<f64, RmsError> {
    if res1.name != res2.name {
        return Err(RmsError::ResidueMismatch {
            residue: res1.number.max(0) as usize,
            reason: format!("residue type {} vs {}", res1.name, res2.name),
        });
    }

    let names: Vec<&str> = if fxnal_group_only {
        functional_group_atoms(&res1.name).to_vec()
    } else {
        res1.atoms
            .iter()
            .enumerate()
            .filter(|(i, a)| !a.is_hydrogen() && !res1.is_backbone_atom(*i))
            .map(|(_, a)| a.name.as_str())
            .collect()
    };

    let mut sum = 0.0;
    let mut n = 0usize;
    for name in names {
        if let (Some(i), Some(j)) = (res1.atom_index(name), res2.atom_index(name)) {
            sum += (res1.atoms[i].coordinates - res2.atoms[j].coordinates).norm_squared();
            n += 1;
        }
    }
    if n == 0 {
        return Err(GeometryError::Empty.into());
    }
    Ok(clamp_rmsd((sum / n as f64).sqrt()))
}
