//! Integration tests for the rustdock-ga superposition, RMSD and docking library

use assert_approx_eq::assert_approx_eq;
use nalgebra::{Rotation3, Vector3};
use rustdock_ga::config::{DockingConfig, FinalMinimize, RunMode, SidechainMode};
use rustdock_ga::coords::CoordinateSet;
use rustdock_ga::docking::{DockingError, GaLigandDock};
use rustdock_ga::forcefield::VinaForceField;
use rustdock_ga::grid::{GridParams, ScoringGrid};
use rustdock_ga::io::{parse_pdb, write_poses, write_score_file, write_summary_json};
use rustdock_ga::molecule::Structure;
use rustdock_ga::optimization::GaDockStageParams;
use rustdock_ga::rms;
use rustdock_ga::superposition::superimpose;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

/// Get the path to test data directory
fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test_data")
}

fn complex() -> Structure {
    parse_pdb(test_data_dir().join("complex.pdb")).expect("Failed to parse test complex")
}

fn unit_square() -> CoordinateSet {
    CoordinateSet::new(vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
    ])
}

fn quick_config() -> DockingConfig {
    DockingConfig {
        stages: Some(vec![GaDockStageParams {
            repeats: 3,
            npool: 8,
            rmsthreshold: 0.5,
            maxiter: 5,
            packcycles: 2,
            ..GaDockStageParams::default()
        }]),
        nrelax: 2,
        nreport: 4,
        random_oversample: 2,
        final_maxiter: 5,
        sample_radius: Some(1.5),
        grid: GridParams {
            grid_step: 0.5,
            padding: 3.0,
            ..GridParams::default()
        },
        ..DockingConfig::default()
    }
}

#[test]
fn test_parse_complex() {
    let s = complex();
    assert_eq!(s.name, "complex");
    // six alanines, one serine and the ligand; the water is dropped
    assert_eq!(s.residue_count(), 8);
    assert_eq!(s.ligand_residues(), vec![7]);
    assert_eq!(s.residues[7].name, "LIG");
    assert_eq!(s.residues[6].chi_atoms().len(), 1);
}

#[test]
fn test_identical_squares_superimpose_to_identity() {
    let square = unit_square();
    let fit = superimpose(&square, &square).unwrap();
    assert!((fit.rotation - nalgebra::Matrix3::identity()).norm() < 1e-9);
    assert!(fit.translation.norm() < 1e-9);
    assert_eq!(fit.rmsd, 0.0);
}

#[test]
fn test_rotated_square_recovers_transform() {
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
fn test_single_displaced_atom_rmsd() {
    let a = complex();
    let mut b = a.clone();
    b.residues[2].atoms[1].coordinates.z += 10.0;
    // all-atom metrics run over heavy atoms
    let n = a.residues.iter().map(|r| r.heavy_atom_count()).sum::<usize>() as f64;

    let rmsd = rms::all_atom_rmsd_nosuper(&a, &b).unwrap();
    assert_approx_eq!(rmsd, 10.0 / n.sqrt(), 1e-9);
}

#[test]
fn test_ca_metrics_on_identical_structures() {
    let a = complex();
    assert_eq!(rms::ca_rmsd(&a, &a).unwrap(), 0.0);
    let gdt = rms::ca_gdtmm(&a, &a).unwrap();
    assert_approx_eq!(gdt.gdtmm(), 1.0);
}

#[test]
fn test_ligand_outside_box_costs_bound_penalty() {
    let s = complex();
    let params = GridParams {
        grid_step: 0.5,
        padding: 3.0,
        ..GridParams::default()
    };
    let grid = ScoringGrid::build(params, Arc::new(VinaForceField::default()), &s, &[7], &[]).unwrap();

    let mut far = s.clone();
    let shift = Vector3::new(100.0, 0.0, 0.0);
    for atom in &mut far.residues[7].atoms {
        atom.coordinates += shift;
    }
    let n = far.residues[7].atom_count() as f64;
    assert_eq!(grid.score(&far, false).unwrap(), n * 100.0);
}

#[test]
fn test_dock_complex_and_write_outputs() {
    let s = complex();
    let driver = GaLigandDock::new(quick_config(), Arc::new(VinaForceField::default()))
        .unwrap()
        .with_native(s.clone())
        .with_references(vec![s.clone()]);

    let poses = driver.apply(&s).unwrap();
    assert!(!poses.is_empty() && poses.len() <= 4);
    assert!(poses.windows(2).all(|w| w[0].score <= w[1].score));
    for (i, pose) in poses.iter().enumerate() {
        assert_eq!(pose.rank, i + 1);
        assert!(pose.score.is_finite());
        assert!(pose.rms.unwrap() >= 0.0);
        assert_eq!(pose.structure.residue_count(), s.residue_count());
    }

    let dir = tempdir().unwrap();
    let pdb_path = dir.path().join("docked.pdb");
    write_poses(&poses, &pdb_path).unwrap();
    write_score_file(&poses, dir.path().join("score.sc")).unwrap();
    write_summary_json(&poses, dir.path().join("summary.json")).unwrap();

    // The first model reads back as the best pose
    let best = parse_pdb(&pdb_path).unwrap();
    assert_eq!(best.residue_count(), s.residue_count());
    let rmsd = rms::all_atom_rmsd_nosuper(&best, &poses[0].structure).unwrap();
    assert!(rmsd < 1e-2);
}

#[test]
fn test_docking_is_reproducible_for_a_seed() {
    let s = complex();
    let config = DockingConfig {
        runmode: RunMode::DockRigid,
        final_exact_minimize: FinalMinimize::LigandOnly,
        ..quick_config()
    };
    let driver = GaLigandDock::new(config, Arc::new(VinaForceField::default())).unwrap();
    let a = driver.apply(&s).unwrap();
    let b = driver.apply(&s).unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.score, y.score);
    }
}

#[test]
fn test_flexible_sidechain_docking() {
    let s = complex();
    let config = DockingConfig {
        sidechains: SidechainMode::List(vec![6]),
        final_exact_minimize: FinalMinimize::BackboneSidechain { extra_cycles: 1 },
        ..quick_config()
    };
    let driver = GaLigandDock::new(config, Arc::new(VinaForceField::default())).unwrap();
    let poses = driver.apply(&s).unwrap();
    let ser = &poses[0].structure.residues[6];
    // backbone atoms stay in place
    for name in ["N", "CA", "C", "O"] {
        let i = ser.atom_index(name).unwrap();
        assert!((ser.atoms[i].coordinates - s.residues[6].atoms[i].coordinates).norm() < 1e-9);
    }
}

#[test]
fn test_eval_reports_binding_estimate() {
    let s = complex();
    let config = DockingConfig {
        runmode: RunMode::Eval,
        entropy_niter: 100,
        ..quick_config()
    };
    let driver = GaLigandDock::new(config, Arc::new(VinaForceField::default()))
        .unwrap()
        .with_native(s.clone());
    let pose = driver.eval(&s).unwrap();
    assert_eq!(pose.rms, Some(0.0));
    let binding = pose.binding.unwrap();
    assert_approx_eq!(binding.dh, pose.score - pose.ligscore - pose.recscore, 1e-9);
    assert_approx_eq!(binding.dg, binding.dh + binding.minus_tds, 1e-12);
}

#[test]
fn test_config_file_and_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "runmode": "vsx", "grid_step": 0.5, "final_exact_minimize": "bbsc2", "nreport": 5 }"#,
    )
    .unwrap();
    let config = DockingConfig::from_file(&path).unwrap();
    assert_eq!(config.runmode, RunMode::VsExpress);
    assert_eq!(config.grid.grid_step, 0.5);
    assert_eq!(
        config.final_exact_minimize,
        FinalMinimize::BackboneSidechain { extra_cycles: 2 }
    );

    std::fs::write(&path, r#"{ "final_exact_minimize": "everything" }"#).unwrap();
    assert!(DockingConfig::from_file(&path).is_err());

    let no_ligand = DockingConfig {
        ligand_residues: Some(vec![]),
        ..quick_config()
    };
    let driver = GaLigandDock::new(no_ligand, Arc::new(VinaForceField::default())).unwrap();
    assert!(matches!(driver.apply(&complex()), Err(DockingError::NoLigand(_))));
}
