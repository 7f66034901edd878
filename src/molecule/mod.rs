//! Residue and structure representation consumed by the superposition, RMSD and docking code

use crate::atom::{Atom, AtomType};
use nalgebra::{Matrix3, Vector3};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur when working with structures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("Invalid residue index: {0}")]
    InvalidResidueIndex(usize),

    #[error("Invalid atom index {atom} in residue {residue}")]
    InvalidAtomIndex { residue: usize, atom: usize },

    #[error("Atom {name} not found in residue {residue}")]
    UnknownAtomName { residue: usize, name: String },

    #[error("Invalid bond: atoms {0} and {1} not found")]
    InvalidBond(usize, usize),

    #[error("No atoms in selection")]
    EmptySelection,
}

/// Identity of one atom: residue index plus atom index within the residue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId {
    pub residue: usize,
    pub atom: usize,
}

impl AtomId {
    pub fn new(residue: usize, atom: usize) -> Self {
        Self { residue, atom }
    }
}

/// Represents a covalent bond between two atoms of the same residue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    /// Index of the first atom
    pub atom1_idx: usize,

    /// Index of the second atom
    pub atom2_idx: usize,
}

const BACKBONE_ATOMS: [&str; 7] = ["N", "CA", "C", "O", "OXT", "H", "HA"];

const AMINO_ACIDS: [&str; 20] = [
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE", "LEU", "LYS", "MET",
    "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
];

/// Side-chain chi definitions by residue name
fn chi_definitions(residue_name: &str) -> &'static [[&'static str; 4]] {
    match residue_name {
        "ARG" => &[
            ["N", "CA", "CB", "CG"],
            ["CA", "CB", "CG", "CD"],
            ["CB", "CG", "CD", "NE"],
            ["CG", "CD", "NE", "CZ"],
        ],
        "ASN" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "OD1"]],
        "ASP" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "OD1"]],
        "CYS" => &[["N", "CA", "CB", "SG"]],
        "GLN" | "GLU" => &[
            ["N", "CA", "CB", "CG"],
            ["CA", "CB", "CG", "CD"],
            ["CB", "CG", "CD", "OE1"],
        ],
        "HIS" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "ND1"]],
        "ILE" => &[["N", "CA", "CB", "CG1"], ["CA", "CB", "CG1", "CD1"]],
        "LEU" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
        "LYS" => &[
            ["N", "CA", "CB", "CG"],
            ["CA", "CB", "CG", "CD"],
            ["CB", "CG", "CD", "CE"],
            ["CG", "CD", "CE", "NZ"],
        ],
        "MET" => &[
            ["N", "CA", "CB", "CG"],
            ["CA", "CB", "CG", "SD"],
            ["CB", "CG", "SD", "CE"],
        ],
        "PHE" | "TYR" | "TRP" => &[["N", "CA", "CB", "CG"], ["CA", "CB", "CG", "CD1"]],
        "SER" => &[["N", "CA", "CB", "OG"]],
        "THR" => &[["N", "CA", "CB", "OG1"]],
        "VAL" => &[["N", "CA", "CB", "CG1"]],
        _ => &[],
    }
}

/// A residue: an ordered list of named atoms plus its intra-residue bond graph
#[derive(Debug, Clone)]
pub struct Residue {
    /// Residue name (three-letter code for amino acids)
    pub name: String,

    /// Chain identifier
    pub chain: char,

    /// Residue sequence number from the input file
    pub number: i32,

    /// Atoms in input order
    pub atoms: Vec<Atom>,

    /// Intra-residue bonds
    pub bonds: Vec<Bond>,

    is_protein: bool,
    is_polymer: bool,
}

impl Residue {
    /// Create an empty residue; amino-acid names are flagged as protein and polymer
    pub fn new(name: &str, chain: char, number: i32) -> Self {
        let is_protein = AMINO_ACIDS.contains(&name.trim());
        Self {
            name: name.trim().to_string(),
            chain,
            number,
            atoms: Vec::new(),
            bonds: Vec::new(),
            is_protein,
            is_polymer: is_protein,
        }
    }

    /// Override the polymer flag (nucleic acids, non-standard polymer residues)
    pub fn with_polymer(mut self, is_polymer: bool) -> Self {
        self.is_polymer = is_polymer;
        self
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        let idx = self.atoms.len();
        self.atoms.push(atom);
        idx
    }

    pub fn add_bond(&mut self, atom1_idx: usize, atom2_idx: usize) -> Result<(), StructureError> {
        if atom1_idx >= self.atoms.len() || atom2_idx >= self.atoms.len() || atom1_idx == atom2_idx {
            return Err(StructureError::InvalidBond(atom1_idx, atom2_idx));
        }
        if !self.bonded(atom1_idx, atom2_idx) {
            self.bonds.push(Bond {
                atom1_idx,
                atom2_idx,
            });
        }
        Ok(())
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.is_hydrogen()).count()
    }

    pub fn is_protein(&self) -> bool {
        self.is_protein
    }

    pub fn is_polymer(&self) -> bool {
        self.is_polymer
    }

    pub fn is_ligand(&self) -> bool {
        !self.is_polymer
    }

    /// Coordinates of atom `idx`
    pub fn atom_xyz(&self, idx: usize) -> Option<Vector3<f64>> {
        self.atoms.get(idx).map(|a| a.coordinates)
    }

    pub fn atom_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.atoms.iter().position(|a| a.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.atom_index(name).is_some()
    }

    pub fn atom_is_hydrogen(&self, idx: usize) -> bool {
        self.atoms.get(idx).map_or(false, |a| a.is_hydrogen())
    }

    /// Backbone atoms of a protein residue; ligands have none
    pub fn is_backbone_atom(&self, idx: usize) -> bool {
        self.is_protein
            && self
                .atoms
                .get(idx)
                .map_or(false, |a| BACKBONE_ATOMS.contains(&a.name.as_str()))
    }

    /// Neighbour atom used as the residue's representative position:
    /// CB (CA for glycine) in proteins, the heavy atom closest to the heavy-atom centroid otherwise.
    pub fn nbr_atom(&self) -> Option<usize> {
        if self.is_protein {
            return self.atom_index("CB").or_else(|| self.atom_index("CA"));
        }
        let heavy: Vec<usize> = (0..self.atoms.len())
            .filter(|&i| !self.atoms[i].is_hydrogen())
            .collect();
        if heavy.is_empty() {
            return None;
        }
        let center = heavy
            .iter()
            .fold(Vector3::zeros(), |acc, &i| acc + self.atoms[i].coordinates)
            / heavy.len() as f64;
        heavy.into_iter().min_by(|&a, &b| {
            let da = (self.atoms[a].coordinates - center).norm_squared();
            let db = (self.atoms[b].coordinates - center).norm_squared();
            da.total_cmp(&db)
        })
    }

    pub fn bonded(&self, a: usize, b: usize) -> bool {
        self.bonds.iter().any(|bond| {
            (bond.atom1_idx == a && bond.atom2_idx == b) || (bond.atom1_idx == b && bond.atom2_idx == a)
        })
    }

    /// Bonded neighbours of atom `idx`
    pub fn neighbors(&self, idx: usize) -> Vec<usize> {
        self.bonds
            .iter()
            .filter_map(|b| {
                if b.atom1_idx == idx {
                    Some(b.atom2_idx)
                } else if b.atom2_idx == idx {
                    Some(b.atom1_idx)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn heavy_neighbors(&self, idx: usize) -> Vec<usize> {
        self.neighbors(idx)
            .into_iter()
            .filter(|&n| !self.atoms[n].is_hydrogen())
            .collect()
    }

    /// Number of bonds on the shortest path between two atoms, `None` when disconnected
    pub fn bond_separation(&self, a: usize, b: usize) -> Option<usize> {
        if a == b {
            return Some(0);
        }
        let adjacency = self.adjacency();
        let mut dist = vec![usize::MAX; self.atoms.len()];
        let mut queue = VecDeque::new();
        dist[a] = 0;
        queue.push_back(a);
        while let Some(cur) = queue.pop_front() {
            for &n in &adjacency[cur] {
                if dist[n] == usize::MAX {
                    dist[n] = dist[cur] + 1;
                    if n == b {
                        return Some(dist[n]);
                    }
                    queue.push_back(n);
                }
            }
        }
        None
    }

    /// All-pairs bond separations, capped at `cap`
    pub fn bond_separation_matrix(&self, cap: usize) -> Vec<Vec<usize>> {
        let adjacency = self.adjacency();
        let n = self.atoms.len();
        let mut matrix = vec![vec![cap; n]; n];
        for start in 0..n {
            matrix[start][start] = 0;
            let mut queue = VecDeque::new();
            queue.push_back(start);
            while let Some(cur) = queue.pop_front() {
                let d = matrix[start][cur];
                if d + 1 >= cap {
                    continue;
                }
                for &nb in &adjacency[cur] {
                    if matrix[start][nb] == cap && nb != start {
                        matrix[start][nb] = d + 1;
                        queue.push_back(nb);
                    }
                }
            }
        }
        matrix
    }

    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.atoms.len()];
        for bond in &self.bonds {
            adjacency[bond.atom1_idx].push(bond.atom2_idx);
            adjacency[bond.atom2_idx].push(bond.atom1_idx);
        }
        adjacency
    }

    /// Atoms reachable from `to` without crossing the `from`-`to` bond, `to` included
    pub fn moving_side(&self, from: usize, to: usize) -> Vec<usize> {
        let reached = self.reachable_without_bond(from, to);
        (0..self.atoms.len()).filter(|&i| reached[i] && i != from).collect()
    }

    /// True when the bond lies on a ring
    pub fn is_ring_bond(&self, a: usize, b: usize) -> bool {
        self.reachable_without_bond(a, b)[a]
    }

    fn reachable_without_bond(&self, from: usize, to: usize) -> Vec<bool> {
        let adjacency = self.adjacency();
        let mut seen = vec![false; self.atoms.len()];
        seen[to] = true;
        let mut stack = vec![to];
        while let Some(cur) = stack.pop() {
            for &n in &adjacency[cur] {
                if (cur == to && n == from) || (cur == from && n == to) {
                    continue;
                }
                if !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        seen
    }

    /// Rotatable bonds: acyclic bonds between two heavy atoms that each carry another heavy neighbour
    pub fn rotatable_bonds(&self) -> Vec<(usize, usize)> {
        self.bonds
            .iter()
            .filter(|b| {
                let (a, c) = (b.atom1_idx, b.atom2_idx);
                !self.atoms[a].is_hydrogen()
                    && !self.atoms[c].is_hydrogen()
                    && self.heavy_neighbors(a).len() >= 2
                    && self.heavy_neighbors(c).len() >= 2
                    && !self.is_ring_bond(a, c)
            })
            .map(|b| (b.atom1_idx, b.atom2_idx))
            .collect()
    }

    /// Side-chain chi quadruples present in this residue
    pub fn chi_atoms(&self) -> Vec<[usize; 4]> {
        if !self.is_protein {
            return Vec::new();
        }
        chi_definitions(&self.name)
            .iter()
            .map_while(|names| {
                let mut quad = [0usize; 4];
                for (slot, name) in quad.iter_mut().zip(names.iter()) {
                    *slot = self.atom_index(name)?;
                }
                Some(quad)
            })
            .collect()
    }

    /// Retype hydrogens bonded to N/O as donors
    pub fn assign_polar_hydrogens(&mut self) {
        let polar: Vec<usize> = (0..self.atoms.len())
            .filter(|&i| self.atoms[i].is_hydrogen())
            .filter(|&i| {
                self.neighbors(i)
                    .iter()
                    .any(|&n| self.atoms[n].atom_type.is_polar())
            })
            .collect();
        for i in polar {
            self.atoms[i].atom_type = AtomType::HydrogenD;
        }
    }

    /// Infer bonds from covalent radii, replacing any existing bonds
    pub fn infer_bonds(&mut self) {
        self.bonds.clear();
        let n = self.atoms.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let a = &self.atoms[i];
                let b = &self.atoms[j];
                if a.is_hydrogen() && b.is_hydrogen() {
                    continue;
                }
                let max_dist = a.atom_type.covalent_radius() + b.atom_type.covalent_radius() + 0.45;
                let d = a.distance(b);
                if d > 0.4 && d < max_dist {
                    self.bonds.push(Bond {
                        atom1_idx: i,
                        atom2_idx: j,
                    });
                }
            }
        }
    }

    pub fn center(&self) -> Option<Vector3<f64>> {
        if self.atoms.is_empty() {
            return None;
        }
        let sum = self.atoms.iter().fold(Vector3::zeros(), |acc, a| acc + a.coordinates);
        Some(sum / self.atoms.len() as f64)
    }

    /// Largest distance from the centre to any atom
    pub fn radius(&self) -> f64 {
        match self.center() {
            Some(c) => self
                .atoms
                .iter()
                .map(|a| (a.coordinates - c).norm())
                .fold(0.0, f64::max),
            None => 0.0,
        }
    }
}

/// A structure: an ordered list of residues
#[derive(Debug, Clone, Default)]
pub struct Structure {
    pub name: String,
    pub residues: Vec<Residue>,
}

impl Structure {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            residues: Vec::new(),
        }
    }

    pub fn add_residue(&mut self, residue: Residue) -> usize {
        let idx = self.residues.len();
        self.residues.push(residue);
        idx
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn residue(&self, idx: usize) -> Result<&Residue, StructureError> {
        self.residues
            .get(idx)
            .ok_or(StructureError::InvalidResidueIndex(idx))
    }

    pub fn residue_mut(&mut self, idx: usize) -> Result<&mut Residue, StructureError> {
        self.residues
            .get_mut(idx)
            .ok_or(StructureError::InvalidResidueIndex(idx))
    }

    /// Total number of atoms over all residues
    pub fn atom_count(&self) -> usize {
        self.residues.iter().map(|r| r.atom_count()).sum()
    }

    pub fn xyz(&self, id: AtomId) -> Result<Vector3<f64>, StructureError> {
        self.residue(id.residue)?
            .atom_xyz(id.atom)
            .ok_or(StructureError::InvalidAtomIndex {
                residue: id.residue,
                atom: id.atom,
            })
    }

    pub fn set_xyz(&mut self, id: AtomId, xyz: Vector3<f64>) -> Result<(), StructureError> {
        let atom = self
            .residue_mut(id.residue)?
            .atoms
            .get_mut(id.atom)
            .ok_or(StructureError::InvalidAtomIndex {
                residue: id.residue,
                atom: id.atom,
            })?;
        atom.coordinates = xyz;
        Ok(())
    }

    /// Look up an atom by residue index and atom name
    pub fn atom_id(&self, residue: usize, name: &str) -> Result<AtomId, StructureError> {
        let atom = self
            .residue(residue)?
            .atom_index(name)
            .ok_or_else(|| StructureError::UnknownAtomName {
                residue,
                name: name.to_string(),
            })?;
        Ok(AtomId::new(residue, atom))
    }

    /// Apply `x -> R x + t` to every atom
    pub fn transform(&mut self, rotation: &Matrix3<f64>, translation: &Vector3<f64>) {
        for residue in &mut self.residues {
            for atom in &mut residue.atoms {
                atom.coordinates = rotation * atom.coordinates + translation;
            }
        }
    }

    /// Apply `x -> R (x - pivot) + pivot + t` to the atoms of the listed residues
    pub fn transform_residues(
        &mut self,
        residues: &[usize],
        rotation: &Matrix3<f64>,
        pivot: &Vector3<f64>,
        translation: &Vector3<f64>,
    ) -> Result<(), StructureError> {
        for &r in residues {
            for atom in &mut self.residue_mut(r)?.atoms {
                atom.coordinates = rotation * (atom.coordinates - pivot) + pivot + translation;
            }
        }
        Ok(())
    }

    /// Indices of non-polymer residues
    pub fn ligand_residues(&self) -> Vec<usize> {
        (0..self.residues.len())
            .filter(|&i| self.residues[i].is_ligand())
            .collect()
    }

    /// Every atom of the listed residues, in residue then atom order
    pub fn atom_ids(&self, residues: &[usize]) -> Result<Vec<AtomId>, StructureError> {
        let mut ids = Vec::new();
        for &r in residues {
            let res = self.residue(r)?;
            ids.extend((0..res.atom_count()).map(|a| AtomId::new(r, a)));
        }
        Ok(ids)
    }

    /// Heavy-atom centroid of the listed residues
    pub fn centroid(&self, residues: &[usize]) -> Result<Vector3<f64>, StructureError> {
        let mut sum = Vector3::zeros();
        let mut n = 0usize;
        for &r in residues {
            for atom in &self.residue(r)?.atoms {
                if !atom.is_hydrogen() {
                    sum += atom.coordinates;
                    n += 1;
                }
            }
        }
        if n == 0 {
            return Err(StructureError::EmptySelection);
        }
        Ok(sum / n as f64)
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_residue_flags() {
        let ser = serine(1, Vector3::zeros());
        assert!(ser.is_protein());
        assert!(ser.is_polymer());
        assert!(ser.has("CA"));
        assert!(ser.is_backbone_atom(ser.atom_index("CA").unwrap()));
        assert!(!ser.is_backbone_atom(ser.atom_index("OG").unwrap()));
        assert_eq!(ser.nbr_atom(), ser.atom_index("CB"));

        let lig = small_ligand(Vector3::zeros());
        assert!(lig.is_ligand());
        assert!(!lig.is_backbone_atom(0));
    }

    #[test]
    fn test_infer_bonds_and_separation() {
        let lig = small_ligand(Vector3::zeros());
        assert!(lig.bonded(0, 1));
        assert!(lig.bonded(1, 2));
        assert!(lig.bonded(2, 3));
        assert!(lig.bonded(0, 4));
        assert!(!lig.bonded(0, 3));
        assert_eq!(lig.bond_separation(0, 3), Some(3));
        assert_eq!(lig.bond_separation(4, 3), Some(4));

        let matrix = lig.bond_separation_matrix(4);
        assert_eq!(matrix[0][2], 2);
        assert_eq!(matrix[4][3], 4);
    }

    #[test]
    fn test_rotatable_bonds_and_moving_side() {
        let lig = small_ligand(Vector3::zeros());
        let rotatable = lig.rotatable_bonds();
        // C1 and C4 are terminal heavy atoms, so only C2-O3 rotates
        assert_eq!(rotatable, vec![(1, 2)]);

        let side = lig.moving_side(1, 2);
        assert_eq!(side, vec![2, 3]);
        assert!(!lig.is_ring_bond(1, 2));
    }

    #[test]
    fn test_chi_atoms() {
        let ser = serine(1, Vector3::zeros());
        let chis = ser.chi_atoms();
        assert_eq!(chis.len(), 1);
        assert_eq!(chis[0][3], ser.atom_index("OG").unwrap());
    }

    #[test]
    fn test_structure_accessors() {
        let mut s = Structure::new("test");
        s.add_residue(serine(1, Vector3::zeros()));
        s.add_residue(small_ligand(Vector3::new(5.0, 0.0, 0.0)));

        assert_eq!(s.residue_count(), 2);
        assert_eq!(s.atom_count(), 11);
        assert_eq!(s.ligand_residues(), vec![1]);

        let id = s.atom_id(1, "C2").unwrap();
        assert!((s.xyz(id).unwrap() - Vector3::new(6.52, 0.0, 0.0)).norm() < 1e-12);
        assert!(matches!(
            s.atom_id(0, "XX"),
            Err(StructureError::UnknownAtomName { .. })
        ));
        assert!(s.residue(5).is_err());

        s.transform(&Matrix3::identity(), &Vector3::new(0.0, 1.0, 0.0));
        assert!((s.xyz(id).unwrap() - Vector3::new(6.52, 1.0, 0.0)).norm() < 1e-12);
    }
}
