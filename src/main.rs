//! Main executable for rustdock-ga

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustdock_ga::config::{DockingConfig, RunMode};
use rustdock_ga::docking::GaLigandDock;
use rustdock_ga::forcefield::VinaForceField;
use rustdock_ga::io::{parse_pdb, write_poses, write_score_file, write_summary_json};
use rustdock_ga::molecule::Structure;
use rustdock_ga::rms;

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "gadock",
    version = rustdock_ga::VERSION,
    about = "Grid-based genetic-algorithm ligand docking and structure comparison"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dock the ligand of one or more receptor-ligand complexes
    Dock {
        /// PDB files, each containing a receptor and the ligand as HETATM records
        #[clap(required = true, value_parser)]
        complexes: Vec<PathBuf>,

        /// JSON configuration file
        #[clap(long, short, value_parser)]
        config: Option<PathBuf>,

        /// Run mode preset (dockrigid, dockflex, vsh, vsx, refine, eval)
        #[clap(long)]
        runmode: Option<String>,

        /// Native complex for ligand RMSD reporting
        #[clap(long, value_parser)]
        native: Option<PathBuf>,

        /// Complexes whose ligand placements seed the initial pool
        #[clap(long, value_parser, value_delimiter = ',')]
        reference: Vec<PathBuf>,

        /// Grid spacing in Angstroms
        #[clap(long)]
        grid_step: Option<f64>,

        /// Margin added around the ligand bounding box
        #[clap(long)]
        padding: Option<f64>,

        /// Population size
        #[clap(long)]
        npool: Option<usize>,

        /// Generations per stage
        #[clap(long)]
        ngen: Option<usize>,

        /// Mutation probability
        #[clap(long)]
        pmut: Option<f64>,

        /// Diversity radius for selection
        #[clap(long)]
        rmsdthreshold: Option<f64>,

        /// Initial repulsive softening
        #[clap(long)]
        smoothing: Option<f64>,

        /// Score with the exact energy instead of the grid
        #[clap(long)]
        exact: bool,

        /// Movable side chains: none, auto, or a comma-separated residue index list
        #[clap(long)]
        sidechains: Option<String>,

        /// Final exact minimization: none, ligandonly, sc, bbsc[N]
        #[clap(long)]
        final_minimize: Option<String>,

        /// Estimate the binding free energy of the best pose
        #[clap(long)]
        estimate_dg: bool,

        /// Random seed
        #[clap(long)]
        seed: Option<u64>,

        /// Number of poses to report
        #[clap(long)]
        nreport: Option<usize>,

        /// Output directory for poses, score table and summary
        #[clap(long, short, default_value = ".")]
        out: PathBuf,
    },

    /// Score input complexes without searching and estimate binding free energy
    Eval {
        #[clap(required = true, value_parser)]
        complexes: Vec<PathBuf>,

        #[clap(long, short, value_parser)]
        config: Option<PathBuf>,

        #[clap(long, value_parser)]
        native: Option<PathBuf>,

        /// Score table to append to
        #[clap(long, default_value = "score.sc")]
        scorefile: PathBuf,
    },

    /// Compare two structures
    Rmsd {
        /// Reference structure
        #[clap(long, value_parser)]
        native: PathBuf,

        /// Model structure(s)
        #[clap(required = true, value_parser)]
        models: Vec<PathBuf>,

        /// Atom selection
        #[clap(long, value_enum, default_value_t = RmsdMode::Ca)]
        mode: RmsdMode,

        /// Also report GDT-MM over CA atoms
        #[clap(long)]
        gdt: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RmsdMode {
    /// CA atoms, superimposed
    Ca,
    /// Backbone N, CA, C, superimposed
    Bb,
    /// All heavy atoms, superimposed
    All,
    /// All heavy atoms, no superposition
    Nosuper,
    /// Symmetry-aware RMSD of the last residue, no superposition
    Ligand,
}

fn load(path: &Path) -> Result<Structure> {
    info!("Loading {}", path.display());
    parse_pdb(path).with_context(|| format!("Failed to parse structure file: {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<DockingConfig> {
    match path {
        Some(p) => DockingConfig::from_file(p).with_context(|| format!("Failed to read config file: {}", p.display())),
        None => Ok(DockingConfig::default()),
    }
}

fn build_driver(config: DockingConfig, native: Option<&Path>, references: &[PathBuf]) -> Result<GaLigandDock> {
    let mut driver = GaLigandDock::new(config, Arc::new(VinaForceField::default()))
        .context("Invalid docking configuration")?;
    if let Some(path) = native {
        driver = driver.with_native(load(path)?);
    }
    if !references.is_empty() {
        let refs = references.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;
        driver = driver.with_references(refs);
    }
    Ok(driver)
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Parse command-line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Dock {
            complexes,
            config,
            runmode,
            native,
            reference,
            grid_step,
            padding,
            npool,
            ngen,
            pmut,
            rmsdthreshold,
            smoothing,
            exact,
            sidechains,
            final_minimize,
            estimate_dg,
            seed,
            nreport,
            out,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(mode) = runmode {
                let mode = RunMode::try_from(mode).context("Invalid run mode")?;
                config = config.with_runmode(mode);
            }
            if let Some(v) = grid_step {
                config.grid.grid_step = v;
            }
            if let Some(v) = padding {
                config.grid.padding = v;
            }
            config.grid.exact |= exact;
            config.npool = npool.or(config.npool);
            config.ngen = ngen.or(config.ngen);
            config.pmut = pmut.or(config.pmut);
            config.rmsdthreshold = rmsdthreshold.or(config.rmsdthreshold);
            config.smoothing = smoothing.or(config.smoothing);
            if let Some(s) = sidechains {
                config.sidechains = s.parse().context("Invalid side-chain selection")?;
            }
            if let Some(f) = final_minimize {
                config.final_exact_minimize = f.parse().context("Invalid final minimization mode")?;
            }
            config.estimate_dg |= estimate_dg;
            if let Some(s) = seed {
                config.seed = s;
            }
            if let Some(n) = nreport {
                config.nreport = n;
            }

            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create output directory: {}", out.display()))?;
            let driver = build_driver(config, native.as_deref(), &reference)?;
            let structures = complexes.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;

            info!("Docking {} complexes in {} mode", structures.len(), driver.config().runmode);
            let results = driver.dock_batch(&structures);

            let scorefile = out.join("score.sc");
            let mut failures = 0;
            for (structure, result) in structures.iter().zip(results) {
                let poses = match result {
                    Ok(poses) => poses,
                    Err(e) => {
                        warn!("Docking {} failed: {}", structure.name, e);
                        failures += 1;
                        continue;
                    }
                };
                let pdb_path = out.join(format!("{}_docked.pdb", structure.name));
                write_poses(&poses, &pdb_path)
                    .with_context(|| format!("Failed to write poses to {}", pdb_path.display()))?;
                write_score_file(&poses, &scorefile)
                    .with_context(|| format!("Failed to write score file {}", scorefile.display()))?;
                let json_path = out.join(format!("{}_summary.json", structure.name));
                write_summary_json(&poses, &json_path)
                    .with_context(|| format!("Failed to write summary to {}", json_path.display()))?;
                info!("Wrote {} poses to {}", poses.len(), pdb_path.display());
            }
            if failures == structures.len() {
                bail!("All {} docking jobs failed", failures);
            }
            info!("Docking completed successfully");
        }

        Commands::Eval {
            complexes,
            config,
            native,
            scorefile,
        } => {
            let config = load_config(config.as_deref())?.with_runmode(RunMode::Eval);
            let driver = build_driver(config, native.as_deref(), &[])?;
            for path in &complexes {
                let structure = load(path)?;
                let pose = driver
                    .eval(&structure)
                    .with_context(|| format!("Failed to evaluate {}", path.display()))?;
                if let Some(b) = &pose.binding {
                    println!(
                        "{}\tscore {:.3}\tdH {:.3}\t-TdS {:.3}\tdG {:.3}",
                        pose.tag, pose.score, b.dh, b.minus_tds, b.dg
                    );
                }
                write_score_file(std::slice::from_ref(&pose), &scorefile)
                    .with_context(|| format!("Failed to write score file {}", scorefile.display()))?;
            }
        }

        Commands::Rmsd {
            native,
            models,
            mode,
            gdt,
        } => {
            let native = load(&native)?;
            for path in &models {
                let model = load(path)?;
                let value = match mode {
                    RmsdMode::Ca => rms::ca_rmsd(&native, &model),
                    RmsdMode::Bb => rms::bb_rmsd(&native, &model),
                    RmsdMode::All => rms::all_atom_rmsd(&native, &model),
                    RmsdMode::Nosuper => rms::all_atom_rmsd_nosuper(&native, &model),
                    RmsdMode::Ligand => {
                        let a = native.residues.last().context("Native structure is empty")?;
                        let b = model.residues.last().context("Model structure is empty")?;
                        rms::automorphic_rmsd(a, b, false)
                    }
                }
                .with_context(|| format!("Failed to compare {}", path.display()))?;

                if gdt {
                    let components = rms::ca_gdtmm(&native, &model)
                        .with_context(|| format!("Failed to compute GDT-MM for {}", path.display()))?;
                    println!(
                        "{}\trmsd {:.3}\tgdtmm {:.4}\t(1,1) {:.3} (2,2) {:.3} (3,3) {:.3} (4,3) {:.3}",
                        path.display(),
                        value,
                        components.gdtmm(),
                        components.m_1_1,
                        components.m_2_2,
                        components.m_3_3,
                        components.m_4_3
                    );
                } else {
                    println!("{}\trmsd {:.3}", path.display(), value);
                }
            }
        }
    }

    Ok(())
}
