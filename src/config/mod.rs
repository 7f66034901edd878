//! Docking configuration: run-mode presets, stage overrides and validation

use crate::grid::GridParams;
use crate::optimization::{GaDockStageParams, OptimizationError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown run mode: {0}")]
    UnknownRunMode(String),

    #[error("Unrecognized final minimization option: {0}")]
    UnknownFinalMinimize(String),

    #[error("Invalid side-chain selection: {0}")]
    InvalidSidechains(String),

    #[error("Invalid stage: {0}")]
    Stage(#[from] OptimizationError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Protocol presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RunMode {
    DockRigid,
    DockFlex,
    /// Virtual screening, high resolution
    VsHiRes,
    /// Virtual screening, express
    VsExpress,
    /// Short perturbation search around the input pose
    Refine,
    /// Score the input pose without searching
    Eval,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dockrigid" => Ok(RunMode::DockRigid),
            "dockflex" => Ok(RunMode::DockFlex),
            "vsh" | "vshires" => Ok(RunMode::VsHiRes),
            "vsx" | "vsexpress" => Ok(RunMode::VsExpress),
            "refine" => Ok(RunMode::Refine),
            "eval" => Ok(RunMode::Eval),
            _ => Err(ConfigError::UnknownRunMode(s.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::DockRigid => "dockrigid",
            RunMode::DockFlex => "dockflex",
            RunMode::VsHiRes => "VSH",
            RunMode::VsExpress => "VSX",
            RunMode::Refine => "refine",
            RunMode::Eval => "eval",
        };
        write!(f, "{}", name)
    }
}

impl TryFrom<String> for RunMode {
    type Error = ConfigError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RunMode> for String {
    fn from(mode: RunMode) -> String {
        mode.to_string()
    }
}

fn stage(
    repeats: usize,
    npool: usize,
    rmsthreshold: f64,
    pmut: f64,
    maxiter: usize,
    packcycles: usize,
    smoothing: f64,
) -> GaDockStageParams {
    GaDockStageParams {
        repeats,
        npool,
        rmsthreshold,
        pmut,
        maxiter,
        packcycles,
        smoothing,
        ramp_schedule: vec![0.1, 1.0],
        elec_scale: 1.0,
    }
}

impl RunMode {
    /// Stage protocol of the preset; `Eval` has none
    pub fn stages(&self) -> Vec<GaDockStageParams> {
        match self {
            RunMode::DockRigid => vec![stage(10, 100, 1.0, 0.2, 100, 100, 0.375)],
            RunMode::DockFlex => vec![stage(10, 100, 2.0, 0.2, 100, 100, 0.375)],
            RunMode::VsHiRes => vec![
                GaDockStageParams {
                    elec_scale: 3.0,
                    ..stage(5, 100, 2.0, 0.2, 25, 100, 0.75)
                },
                stage(5, 100, 2.0, 0.2, 25, 100, 0.375),
            ],
            RunMode::VsExpress => vec![stage(5, 50, 2.0, 0.2, 50, 25, 0.375)],
            RunMode::Refine => vec![GaDockStageParams {
                ramp_schedule: vec![1.0],
                ..stage(3, 20, 1.0, 0.1, 50, 25, 0.0)
            }],
            RunMode::Eval => Vec::new(),
        }
    }
}

/// Exact minimization applied to the final poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FinalMinimize {
    None,
    /// Ligand rigid body and torsions only
    LigandOnly,
    /// Ligand plus movable side chains
    Sidechain,
    /// Ligand and side chains with `extra_cycles` additional minimization rounds
    BackboneSidechain { extra_cycles: usize },
}

impl FromStr for FinalMinimize {
    type Err = ConfigError;

    /// `bbsc[N]` is checked before `sc`, then `ligandonly`; matching is case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let option = s.trim().to_ascii_lowercase();
        if option.is_empty() || option == "none" {
            return Ok(FinalMinimize::None);
        }
        if let Some(rest) = option.strip_prefix("bbsc") {
            let extra_cycles = if rest.is_empty() {
                0
            } else {
                rest.parse::<usize>()
                    .map_err(|_| ConfigError::UnknownFinalMinimize(s.to_string()))?
            };
            return Ok(FinalMinimize::BackboneSidechain { extra_cycles });
        }
        match option.as_str() {
            "sc" => Ok(FinalMinimize::Sidechain),
            "ligandonly" => Ok(FinalMinimize::LigandOnly),
            _ => Err(ConfigError::UnknownFinalMinimize(s.to_string())),
        }
    }
}

impl fmt::Display for FinalMinimize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalMinimize::None => write!(f, "none"),
            FinalMinimize::LigandOnly => write!(f, "ligandonly"),
            FinalMinimize::Sidechain => write!(f, "sc"),
            FinalMinimize::BackboneSidechain { extra_cycles: 0 } => write!(f, "bbsc"),
            FinalMinimize::BackboneSidechain { extra_cycles } => write!(f, "bbsc{}", extra_cycles),
        }
    }
}

impl TryFrom<String> for FinalMinimize {
    type Error = ConfigError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FinalMinimize> for String {
    fn from(value: FinalMinimize) -> String {
        value.to_string()
    }
}

impl FinalMinimize {
    pub fn moves_sidechains(&self) -> bool {
        matches!(self, FinalMinimize::Sidechain | FinalMinimize::BackboneSidechain { .. })
    }
}

/// Which receptor side chains move with the ligand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SidechainMode {
    None,
    /// Side chains whose neighbour atom lies inside the grid box shrunk by `sc_edge_buffer`
    Auto,
    /// Explicit residue indices (0-based)
    List(Vec<usize>),
}

impl FromStr for SidechainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SidechainMode::None),
            "auto" => Ok(SidechainMode::Auto),
            list => list
                .split(',')
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|_| ConfigError::InvalidSidechains(s.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SidechainMode::List),
        }
    }
}

impl fmt::Display for SidechainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidechainMode::None => write!(f, "none"),
            SidechainMode::Auto => write!(f, "auto"),
            SidechainMode::List(list) => {
                let items: Vec<String> = list.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

impl TryFrom<String> for SidechainMode {
    type Error = ConfigError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SidechainMode> for String {
    fn from(value: SidechainMode) -> String {
        value.to_string()
    }
}

/// Complete docking run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockingConfig {
    pub runmode: RunMode,

    /// Grid parameters (`grid_step`, `padding`, `exact`, ...) at the top level
    #[serde(flatten)]
    pub grid: GridParams,

    /// Replaces the preset protocol when given
    pub stages: Option<Vec<GaDockStageParams>>,

    // Overrides applied to every stage
    pub ngen: Option<usize>,
    pub npool: Option<usize>,
    pub pmut: Option<f64>,
    pub rmsdthreshold: Option<f64>,
    pub smoothing: Option<f64>,
    pub maxiter: Option<usize>,

    /// Top genes refined with the exact energy between stages; only these reach final minimization
    pub nrelax: usize,
    /// Poses reported at the end of the run
    pub nreport: usize,

    pub random_oversample: usize,
    pub reference_oversample: usize,
    pub reference_frac: f64,

    /// Half-edge of the cube random placements are drawn from; defaults to `padding`
    pub sample_radius: Option<f64>,

    pub final_exact_minimize: FinalMinimize,
    /// Minimization iterations of the final exact pass
    pub final_maxiter: usize,

    pub sidechains: SidechainMode,
    pub sc_edge_buffer: f64,

    /// Ligand residue indices; all non-polymer residues when absent
    pub ligand_residues: Option<Vec<usize>>,

    pub estimate_dg: bool,
    pub entropy_niter: usize,
    pub entropy_kt: f64,

    pub seed: u64,
}

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            runmode: RunMode::DockFlex,
            grid: GridParams::default(),
            stages: None,
            ngen: None,
            npool: None,
            pmut: None,
            rmsdthreshold: None,
            smoothing: None,
            maxiter: None,
            nrelax: 20,
            nreport: 20,
            random_oversample: 10,
            reference_oversample: 2,
            reference_frac: 0.5,
            sample_radius: None,
            final_exact_minimize: FinalMinimize::Sidechain,
            final_maxiter: 50,
            sidechains: SidechainMode::None,
            sc_edge_buffer: 2.0,
            ligand_residues: None,
            estimate_dg: false,
            entropy_niter: 2000,
            entropy_kt: 1.0,
            seed: 42,
        }
    }
}

impl DockingConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DockingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_json(&text)
    }

    pub fn with_runmode(mut self, runmode: RunMode) -> Self {
        self.runmode = runmode;
        self
    }

    /// Preset (or explicit) stages with the per-stage overrides applied
    pub fn stage_protocol(&self) -> Vec<GaDockStageParams> {
        let mut stages = self.stages.clone().unwrap_or_else(|| self.runmode.stages());
        for stage in &mut stages {
            if let Some(v) = self.ngen {
                stage.repeats = v;
            }
            if let Some(v) = self.npool {
                stage.npool = v;
            }
            if let Some(v) = self.pmut {
                stage.pmut = v;
            }
            if let Some(v) = self.rmsdthreshold {
                stage.rmsthreshold = v;
            }
            if let Some(v) = self.smoothing {
                stage.smoothing = v;
            }
            if let Some(v) = self.maxiter {
                stage.maxiter = v;
            }
        }
        stages
    }

    pub fn sample_radius(&self) -> f64 {
        self.sample_radius.unwrap_or(self.grid.padding)
    }

    /// Reject nonsensical settings before any grid is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: f64| -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    field,
                    message: format!("{} must be positive", value),
                })
            }
        };
        positive("grid_step", self.grid.grid_step)?;
        positive("hashsize", self.grid.hashsize)?;
        if self.grid.padding < 0.0 || !self.grid.padding.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "padding",
                message: format!("{} must be non-negative", self.grid.padding),
            });
        }
        if self.grid.subhash == 0 {
            return Err(ConfigError::InvalidValue {
                field: "subhash",
                message: "must be at least 1".into(),
            });
        }
        if let Some(r) = self.grid.max_radius {
            positive("max_radius", r)?;
        }
        if !(0.0..=1.0).contains(&self.reference_frac) {
            return Err(ConfigError::InvalidValue {
                field: "reference_frac",
                message: format!("{} outside [0, 1]", self.reference_frac),
            });
        }
        if self.random_oversample == 0 {
            return Err(ConfigError::InvalidValue {
                field: "random_oversample",
                message: "must be at least 1".into(),
            });
        }
        if self.nrelax == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nrelax",
                message: "must be at least 1".into(),
            });
        }
        if self.nreport == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nreport",
                message: "must be at least 1".into(),
            });
        }
        if self.estimate_dg || self.runmode == RunMode::Eval {
            if self.entropy_niter == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "entropy_niter",
                    message: "must be at least 1".into(),
                });
            }
            positive("entropy_kt", self.entropy_kt)?;
        }
        if let SidechainMode::List(list) = &self.sidechains {
            if list.is_empty() {
                return Err(ConfigError::InvalidSidechains("empty residue list".into()));
            }
        }
        for stage in self.stage_protocol() {
            stage.validate()?;
        }
        Ok(())
    }
}
