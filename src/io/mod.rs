//! Reading complexes from PDB files and writing docked poses, score tables and run summaries

use log::debug;
use nalgebra::Vector3;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::atom::{Atom, AtomType};
use crate::docking::DockedPose;
use crate::molecule::{Residue, Structure};

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fixed-column fields of one ATOM/HETATM record
struct AtomRecord {
    hetero: bool,
    atom: Atom,
    residue_name: String,
    chain: char,
    residue_number: i32,
    insertion_code: char,
}

fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        ""
    } else {
        line.get(start..end).unwrap_or("")
    }
}

fn parse_coordinate(line: &str, start: usize, line_number: usize, axis: char) -> Result<f64, IoError> {
    let field = column(line, start, start + 8);
    field.trim().parse::<f64>().map_err(|_| IoError::Parse {
        line: line_number,
        message: format!("Invalid {} coordinate: '{}'", axis, field),
    })
}

/// Parse an atom record from a PDB file
fn parse_atom_record(line: &str, line_number: usize) -> Result<AtomRecord, IoError> {
    if line.len() < 54 {
        return Err(IoError::Parse {
            line: line_number,
            message: format!("Line too short for atom record: {}", line),
        });
    }

    let name = column(line, 12, 16).trim().to_string();
    let residue_name = column(line, 17, 20).trim().to_string();
    let chain = column(line, 21, 22).chars().next().filter(|c| *c != ' ').unwrap_or('A');
    let residue_number = column(line, 22, 26)
        .trim()
        .parse::<i32>()
        .map_err(|_| IoError::Parse {
            line: line_number,
            message: format!("Invalid residue number: '{}'", column(line, 22, 26)),
        })?;
    let insertion_code = column(line, 26, 27).chars().next().unwrap_or(' ');

    let coordinates = Vector3::new(
        parse_coordinate(line, 30, line_number, 'x')?,
        parse_coordinate(line, 38, line_number, 'y')?,
        parse_coordinate(line, 46, line_number, 'z')?,
    );

    // Partial charge in the otherwise blank columns 69-76, as written by `write_structure`
    let charge = column(line, 68, 76).trim().parse::<f64>().unwrap_or(0.0);
    let atom_type = AtomType::from_element(column(line, 76, 78), &name);

    Ok(AtomRecord {
        hetero: line.starts_with("HETATM"),
        atom: Atom::new(&name, atom_type, coordinates).with_charge(charge),
        residue_name,
        chain,
        residue_number,
        insertion_code,
    })
}

fn finish_residue(residue: &mut Residue) {
    residue.infer_bonds();
    residue.assign_polar_hydrogens();
}

/// Parse PDB text into a structure. Only the first model is read; waters are dropped.
pub fn parse_pdb_str(content: &str, name: &str) -> Result<Structure, IoError> {
    let mut structure = Structure::new(name);
    let mut current: Option<(Residue, (char, i32, char, String))> = None;
    let mut waters = 0;

    for (i, line) in content.lines().enumerate() {
        let line_number = i + 1;
        if line.starts_with("END") {
            break;
        }
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }

        let record = parse_atom_record(line, line_number)?;
        if record.residue_name == "HOH" || record.residue_name == "WAT" {
            waters += 1;
            continue;
        }

        let key = (
            record.chain,
            record.residue_number,
            record.insertion_code,
            record.residue_name.clone(),
        );
        let same = current.as_ref().map_or(false, |(_, k)| *k == key);
        if !same {
            if let Some((mut residue, _)) = current.take() {
                finish_residue(&mut residue);
                structure.add_residue(residue);
            }
            let residue = Residue::new(&record.residue_name, record.chain, record.residue_number);
            let polymer = residue.is_protein() || !record.hetero;
            current = Some((residue.with_polymer(polymer), key));
        }
        if let Some((residue, _)) = current.as_mut() {
            residue.add_atom(record.atom);
        }
    }

    if let Some((mut residue, _)) = current.take() {
        finish_residue(&mut residue);
        structure.add_residue(residue);
    }
    if structure.residue_count() == 0 {
        return Err(IoError::InvalidFormat(format!("no atom records in {}", name)));
    }
    debug!(
        "Read {}: {} residues, {} atoms ({} waters skipped)",
        name,
        structure.residue_count(),
        structure.atom_count(),
        waters
    );
    Ok(structure)
}

/// Parse a PDB file into a structure named after the file stem
pub fn parse_pdb<P: AsRef<Path>>(path: P) -> Result<Structure, IoError> {
    let path = path.as_ref();
    let mut content = String::new();
    for line in BufReader::new(File::open(path)?).lines() {
        content.push_str(&line?);
        content.push('\n');
    }
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown");
    parse_pdb_str(&content, name)
}

/// PDB atom-name field: names shorter than four characters start in column 14
fn format_atom_name(name: &str) -> String {
    if name.len() >= 4 {
        name[..4].to_string()
    } else {
        format!(" {:<3}", name)
    }
}

/// Write the atom records of a structure, followed by `TER`
pub fn write_structure<W: Write>(out: &mut W, structure: &Structure) -> Result<(), IoError> {
    let mut serial = 1;
    for residue in &structure.residues {
        let record = if residue.is_polymer() { "ATOM  " } else { "HETATM" };
        for atom in &residue.atoms {
            writeln!(
                out,
                "{}{:5} {} {:>3} {}{:4}    {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}  {:8.3}{:>2}",
                record,
                serial % 100_000,
                format_atom_name(&atom.name),
                residue.name,
                residue.chain,
                residue.number,
                atom.coordinates.x,
                atom.coordinates.y,
                atom.coordinates.z,
                1.0, // Occupancy
                0.0, // Temperature factor
                atom.charge,
                atom.atom_type.element_symbol()
            )?;
            serial += 1;
        }
    }
    writeln!(out, "TER")?;
    Ok(())
}

/// Write a structure to a PDB file
pub fn write_pdb<P: AsRef<Path>>(structure: &Structure, path: P) -> Result<(), IoError> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "REMARK PDB file generated by rustdock-ga")?;
    write_structure(&mut file, structure)?;
    writeln!(file, "END")?;
    Ok(())
}

fn write_pose_remarks<W: Write>(out: &mut W, pose: &DockedPose) -> Result<(), IoError> {
    writeln!(out, "REMARK GADOCK TAG {}", pose.tag)?;
    writeln!(out, "REMARK GADOCK RANK {}", pose.rank)?;
    writeln!(out, "REMARK GADOCK LIGAND {}", pose.ligand_name)?;
    writeln!(out, "REMARK GADOCK SCORE {:.3}", pose.score)?;
    writeln!(out, "REMARK GADOCK LIGSCORE {:.3}", pose.ligscore)?;
    writeln!(out, "REMARK GADOCK RECSCORE {:.3}", pose.recscore)?;
    if let Some(rms) = pose.rms {
        writeln!(out, "REMARK GADOCK RMS {:.3}", rms)?;
    }
    if let Some(binding) = &pose.binding {
        writeln!(
            out,
            "REMARK GADOCK DG {:.3} DH {:.3} -TDS {:.3}",
            binding.dg, binding.dh, binding.minus_tds
        )?;
    }
    Ok(())
}

/// Write all poses as models of one PDB file, each preceded by its REMARK tags
pub fn write_poses<P: AsRef<Path>>(poses: &[DockedPose], path: P) -> Result<(), IoError> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "REMARK PDB file generated by rustdock-ga")?;
    writeln!(file, "REMARK Contains {} docked models", poses.len())?;
    for (i, pose) in poses.iter().enumerate() {
        writeln!(file, "MODEL {:>8}", i + 1)?;
        write_pose_remarks(&mut file, pose)?;
        write_structure(&mut file, &pose.structure)?;
        writeln!(file, "ENDMDL")?;
    }
    writeln!(file, "END")?;
    Ok(())
}

const SCORE_COLUMNS: [&str; 8] = [
    "total_score",
    "rms",
    "ligscore",
    "recscore",
    "dH",
    "-TdS",
    "dG",
    "ligandname",
];

fn score_row(pose: &DockedPose) -> String {
    let opt = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |x| format!("{:.3}", x));
    format!(
        "SCORE: {:>12.3} {:>8} {:>10.3} {:>10.3} {:>10} {:>10} {:>10} {:>12} {}",
        pose.score,
        opt(pose.rms),
        pose.ligscore,
        pose.recscore,
        opt(pose.binding.map(|b| b.dh)),
        opt(pose.binding.map(|b| b.minus_tds)),
        opt(pose.binding.map(|b| b.dg)),
        pose.ligand_name,
        pose.tag
    )
}

/// Append one `SCORE:` row per pose to a score table, writing the header when the file is new
pub fn write_score_file<P: AsRef<Path>>(poses: &[DockedPose], path: P) -> Result<(), IoError> {
    let path = path.as_ref();
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = BufWriter::new(OpenOptions::new().create(true).append(true).open(path)?);
    if is_new {
        writeln!(
            file,
            "SCORE: {:>12} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>12} description",
            SCORE_COLUMNS[0],
            SCORE_COLUMNS[1],
            SCORE_COLUMNS[2],
            SCORE_COLUMNS[3],
            SCORE_COLUMNS[4],
            SCORE_COLUMNS[5],
            SCORE_COLUMNS[6],
            SCORE_COLUMNS[7]
        )?;
    }
    for pose in poses {
        writeln!(file, "{}", score_row(pose))?;
    }
    Ok(())
}

/// Write the pose records (without coordinates) as pretty-printed JSON
pub fn write_summary_json<P: AsRef<Path>>(poses: &[DockedPose], path: P) -> Result<(), IoError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, poses)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docking::BindingEstimate;
    use crate::molecule::test_util::{serine, small_ligand};
    use assert_approx_eq::assert_approx_eq;
    use tempfile::tempdir;

    const PDB: &str = "\
REMARK test complex
ATOM      1  N   SER A   1      -0.525   1.363   0.000  1.00  0.00           N
ATOM      2  CA  SER A   1       0.000   0.000   0.000  1.00  0.00           C
ATOM      3  C   SER A   1       1.526   0.000   0.000  1.00  0.00           C
ATOM      4  O   SER A   1       2.153  -1.062   0.000  1.00  0.00           O
ATOM      5  CB  SER A   1      -0.529  -0.774  -1.205  1.00  0.00           C
ATOM      6  OG  SER A   1      -1.937  -0.829  -1.194  1.00  0.00           O
HETATM    7  O   HOH A 101      10.000  10.000  10.000  1.00  0.00           O
HETATM    8  C1  LIG X 201       5.000   0.000   0.000  1.00  0.00           C
HETATM    9  C2  LIG X 201       6.520   0.000   0.000  1.00  0.00           C
HETATM   10  O3  LIG X 201       7.030   1.350   0.000  1.00  0.00           O
HETATM   11  H3  LIG X 201       7.900   1.500   0.000  1.00  0.00           H
END
HETATM   12  C1  XXX X 301       0.000   0.000   0.000  1.00  0.00           C
";

    fn pose(structure: Structure) -> DockedPose {
        DockedPose {
            structure,
            tag: "complex_0001".into(),
            rank: 1,
            score: -4.25,
            rms: Some(0.8),
            ligscore: 0.5,
            recscore: -1.0,
            ligand_name: "LIG".into(),
            binding: Some(BindingEstimate {
                dh: -3.75,
                minus_tds: 0.5,
                dg: -3.25,
            }),
        }
    }

    #[test]
    fn test_parse_pdb_groups_residues() {
        let s = parse_pdb_str(PDB, "complex").unwrap();
        assert_eq!(s.residue_count(), 2);
        assert_eq!(s.atom_count(), 10);

        let ser = s.residue(0).unwrap();
        assert!(ser.is_protein());
        assert_eq!(ser.chi_atoms().len(), 1);

        let lig = s.residue(1).unwrap();
        assert!(lig.is_ligand());
        assert_eq!(lig.number, 201);
        assert_eq!(s.ligand_residues(), vec![1]);
        // Hydroxyl hydrogen is retyped as a donor once bonds are known
        let h = lig.atom_index("H3").unwrap();
        assert_eq!(lig.atoms[h].atom_type, AtomType::HydrogenD);
        assert!(!lig.bonds.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let bad = "ATOM      1  CA  SER A   1       0.000   abc     0.000  1.00  0.00           C\n";
        assert!(matches!(
            parse_pdb_str(bad, "bad"),
            Err(IoError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_pdb_str("REMARK nothing\n", "empty"),
            Err(IoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_write_then_read_keeps_charges() {
        let mut s = Structure::new("complex");
        s.add_residue(serine(1, Vector3::zeros()));
        let mut lig = small_ligand(Vector3::new(5.0, 0.0, 0.0));
        lig.atoms[2].charge = -0.35;
        s.add_residue(lig);

        let dir = tempdir().unwrap();
        let path = dir.path().join("complex.pdb");
        write_pdb(&s, &path).unwrap();
        let read = parse_pdb(&path).unwrap();

        assert_eq!(read.name, "complex");
        assert_eq!(read.residue_count(), 2);
        assert!(read.residue(0).unwrap().is_polymer());
        assert!(read.residue(1).unwrap().is_ligand());
        let o3 = read.residue(1).unwrap().atom_index("O3").unwrap();
        assert_approx_eq!(read.residues[1].atoms[o3].charge, -0.35);
        assert_approx_eq!(read.residues[1].atoms[0].coordinates.x, 5.0);
    }

    #[test]
    fn test_pose_file_and_score_table() {
        let s = parse_pdb_str(PDB, "complex").unwrap();
        let poses = vec![pose(s)];
        let dir = tempdir().unwrap();

        let pdb_path = dir.path().join("poses.pdb");
        write_poses(&poses, &pdb_path).unwrap();
        let text = std::fs::read_to_string(&pdb_path).unwrap();
        assert!(text.contains("REMARK GADOCK TAG complex_0001"));
        assert!(text.contains("REMARK GADOCK RMS 0.800"));
        assert!(text.contains("REMARK GADOCK DG -3.250"));
        assert_eq!(text.matches("ENDMDL").count(), 1);

        let sc_path = dir.path().join("score.sc");
        write_score_file(&poses, &sc_path).unwrap();
        write_score_file(&poses, &sc_path).unwrap();
        let table = std::fs::read_to_string(&sc_path).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("total_score"));
        assert!(lines.iter().all(|l| l.starts_with("SCORE:")));
        assert!(lines[1].ends_with("complex_0001"));

        let json_path = dir.path().join("summary.json");
        write_summary_json(&poses, &json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value[0]["tag"], "complex_0001");
        assert_eq!(value[0]["binding"]["dg"], -3.25);
        assert!(value[0].get("structure").is_none());
    }
}
