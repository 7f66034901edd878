use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rustdock_ga::forcefield::VinaForceField;
use rustdock_ga::grid::{GridParams, ScoreWeights, ScoringGrid};
use rustdock_ga::io::parse_pdb;
use rustdock_ga::molecule::Structure;
use std::path::PathBuf;
use std::sync::Arc;

fn complex() -> Structure {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test_data")
        .join("complex.pdb");
    parse_pdb(path).expect("Failed to parse test complex")
}

fn params() -> GridParams {
    GridParams {
        grid_step: 0.375,
        ..GridParams::default()
    }
}

fn bench_grid_construction(c: &mut Criterion) {
    let s = complex();
    let ligands = s.ligand_residues();
    c.bench_function("grid_construction", |b| {
        b.iter(|| {
            let grid = ScoringGrid::build(params(), Arc::new(VinaForceField::default()), &s, &ligands, &[]);
            black_box(grid)
        })
    });
}

fn bench_grid_scoring(c: &mut Criterion) {
    let s = complex();
    let ligands = s.ligand_residues();
    let grid = ScoringGrid::build(params(), Arc::new(VinaForceField::default()), &s, &ligands, &[])
        .expect("Failed to build grid");
    let weights = ScoreWeights {
        w_rep: 0.2,
        smoothing: 0.375,
        elec_scale: 1.0,
    };
    c.bench_function("grid_score", |b| b.iter(|| black_box(grid.score_weighted(&s, &weights))));

    let exact = ScoringGrid::build(
        GridParams {
            exact: true,
            ..params()
        },
        Arc::new(VinaForceField::default()),
        &s,
        &ligands,
        &[],
    )
    .expect("Failed to build exact scorer");
    c.bench_function("exact_score", |b| b.iter(|| black_box(exact.score_weighted(&s, &weights))));
}

criterion_group!(grid_benches, bench_grid_construction, bench_grid_scoring);
criterion_main!(grid_benches);
