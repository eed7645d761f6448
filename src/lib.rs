use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::iter::Sum;
use tracing::info;

pub mod comm;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod flds;
pub mod grid;
pub mod save;
pub mod spectrum;
pub mod timing;

pub use comm::{Communicator, SingleProcess, ThreadComm, ThreadWorld};
pub use config::Config;
pub use driver::Report;
pub use engine::{EngineKind, TransformEngine};
pub use error::SpectrumError;
pub use flds::{FieldKind, GridDims, Layout, LocalIndexRange};
pub use grid::{select_grid, ProcessGrid};
pub use spectrum::{compute_local_spectrum, reduce_spectrum, RadialSpectrum};

/// Rank that reads the configuration and receives the reduced spectrum.
pub const ROOT: usize = 0;

#[cfg(test)]
pub(crate) const E_TOL: f64 = 1e-10;

/// Working precision of the field and its transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    Double,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Double
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Single => write!(f, "Single precision"),
            Precision::Double => write!(f, "Double precision"),
        }
    }
}

/// Scalar type the field, the transform and the binner input are generic
/// over. Energies are always accumulated in `f64`.
pub trait SpectralFloat:
    rustfft::FftNum + num_traits::Float + Sum + fmt::Display
{
    const PRECISION: Precision;

    /// Rounds an `f64` to this precision.
    fn of(v: f64) -> Self;

    fn widen(self) -> f64;
}

impl SpectralFloat for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline(always)]
    fn of(v: f64) -> Self {
        v as f32
    }

    #[inline(always)]
    fn widen(self) -> f64 {
        self as f64
    }
}

impl SpectralFloat for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline(always)]
    fn of(v: f64) -> Self {
        v
    }

    #[inline(always)]
    fn widen(self) -> f64 {
        self
    }
}

/// Runs the whole pipeline on an in-process world of `cfg.run.ranks` ranks
/// and prints the root's spectrum.
pub fn run(cfg: Config) -> Result<()> {
    let report = match cfg.run.precision {
        Precision::Single => launch::<f32>(cfg.clone())?,
        Precision::Double => launch::<f64>(cfg.clone())?,
    };
    let report = report.context("root rank returned no spectrum")?;

    save::print_report(&report);
    if cfg.output.write_output {
        save::save_spectrum(&report.spectrum, &cfg.output.path)?;
        info!("spectrum written to {}", cfg.output.path.display());
    }
    Ok(())
}

/// Starts one thread per rank, hands the configuration to the root only and
/// returns the root's report.
pub fn launch<T: SpectralFloat>(cfg: Config) -> Result<Option<Report>> {
    let ranks = cfg.run.ranks;
    let results = ThreadWorld::run(ranks, |comm| {
        let mine = if comm.rank() == ROOT {
            Some(cfg.clone())
        } else {
            None
        };
        driver::execute::<T, _>(&comm, mine)
    })?;
    let mut root_report = None;
    for (rank, res) in results.into_iter().enumerate() {
        let report = res.with_context(|| format!("rank {} failed", rank))?;
        if rank == ROOT {
            root_report = report;
        }
    }
    Ok(root_report)
}
