//! A three-dimensional cellular-automaton simulator of Portland cement
//! hydration.
//!
//! A rectilinear lattice of cubic voxels carries phase identifiers; discrete
//! cycles dissolve soluble phases at solid–water interfaces, random-walk the
//! dissolved species through the pore network, and precipitate hydration
//! products by stoichiometric rule. Auxiliary submodels track heat,
//! non-evaporable water, chemical shrinkage, pore-solution chemistry,
//! percolation of pores and solids, and the mapping of cycles onto real
//! time.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod analysis;
pub mod chemistry;
pub mod core;
pub mod engine;
pub mod io;
pub mod math;

// ============================================================================
// RE-EXPORTS (Public API)
// ============================================================================
pub use crate::engine::Simulation;
pub use crate::io::output::{OutputPaths, RunSummary};
pub use crate::io::params::{read_params, SimParams};

use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;

/// Typed error kinds the engine distinguishes; everything else travels as a
/// context-chained [`anyhow::Error`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error("parameter file: expected key `{expected}`, found `{found}` (line {line})")]
    KeyMismatch {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("microstructure files disagree on lattice size: {0}")]
    SizeMismatch(String),
    #[error(
        "unsupported microstructure version {0}: legacy z-outermost voxel ordering; \
         re-export with the z-innermost layout"
    )]
    LegacyOrdering(f64),
    #[error("time step became non-positive during calibration extrapolation")]
    DegenerateTimeStep,
}

// ============================================================================
// HIGH-LEVEL INTERFACE
// ============================================================================

/// The master pipeline: parse parameters, load the microstructure and the
/// auxiliary data from `workdir`, run the hydration loop, and return the
/// completion summary.
pub fn run_simulation(
    workdir: &Path,
    params_path: &Path,
    progress_json: &Path,
) -> Result<RunSummary> {
    let params = io::params::read_params(params_path)
        .with_context(|| format!("parameter file {:?}", params_path))?;
    let paths = OutputPaths::new(workdir, &params.output_base);
    std::fs::write(paths.params_echo(), io::params::echo_params(&params))
        .with_context(|| format!("could not echo parameters to {:?}", paths.params_echo()))?;
    let mut sim = Simulation::new(workdir, params)?;
    sim.run(&paths, progress_json)
}
