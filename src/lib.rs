//! RustDock-GA: structural superposition, RMSD/GDT metrics and grid-based genetic-algorithm
//! ligand docking
//!
//! The library is layered bottom-up: coordinate sets and optimal superposition, RMSD and GDT
//! metrics over structures, a precomputed receptor scoring grid, the genetic-algorithm
//! optimizer over ligand and side-chain conformations, and the docking driver on top.

pub mod atom;
pub mod config;
pub mod coords;
pub mod docking;
pub mod forcefield;
pub mod grid;
pub mod io;
pub mod math;
pub mod molecule;
pub mod optimization;
pub mod rms;
pub mod superposition;

// Re-export commonly used types and functions
pub use atom::{Atom, AtomType};
pub use config::{DockingConfig, RunMode};
pub use coords::CoordinateSet;
pub use docking::{DockedPose, GaLigandDock};
pub use grid::{GridParams, ScoringGrid};
pub use molecule::{Residue, Structure};
pub use superposition::{superimpose, SuperpositionResult};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
