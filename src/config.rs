use crate::engine::EngineKind;
use crate::error::SpectrumError;
use crate::flds::{FieldKind, GridDims};
use crate::grid;
use crate::Precision;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub decomposition: Decomposition,
    #[serde(default)]
    pub run: Run,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Grid {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Decomposition {
    /// 1 for slabs, 2 for pencils.
    pub ndim: u32,
    /// Optional process grid hint.
    #[serde(default)]
    pub dims: Option<[usize; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    #[serde(default = "one")]
    pub repetitions: u32,
    #[serde(default = "one_rank")]
    pub ranks: usize,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub field: FieldKind,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub engine: EngineKind,
    /// Permission handed to the transform engine at setup.
    #[serde(default)]
    pub overwrite_input: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Output {
    pub write_output: bool,
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

fn one() -> u32 {
    1
}

fn one_rank() -> usize {
    1
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output/spectrum.npy")
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            size_x: 128,
            size_y: 128,
            size_z: 128,
        }
    }
}

impl Default for Decomposition {
    fn default() -> Self {
        Decomposition { ndim: 2, dims: None }
    }
}

impl Default for Run {
    fn default() -> Self {
        Run {
            repetitions: 1,
            ranks: 1,
            precision: Precision::default(),
            field: FieldKind::default(),
            seed: 0,
            engine: EngineKind::default(),
            overwrite_input: false,
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write_output: false,
            path: default_output_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            grid: Grid::default(),
            decomposition: Decomposition::default(),
            run: Run::default(),
            output: Output::default(),
        }
    }
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not open the {} file", path.display()))?;
        Config::from_toml(&contents)
            .with_context(|| format!("Could not parse Config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Config> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads `path`, falling back to a 128^3 pencil run when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Cannot open {}. Setting to default nx=ny=nz=128, ndim=2, n=1.",
                path.display()
            );
            return Ok(Config::default());
        }
        Config::from_path(path)
    }

    /// Reads the plain-text inputs: `<dir>/stdin` holding
    /// `Nx Ny Nz Ndim Nrep` and an optional `<dir>/dims` grid hint.
    pub fn from_legacy_dir<P: AsRef<Path>>(dir: P) -> Result<Config> {
        let dir = dir.as_ref();
        let stdin = dir.join("stdin");
        let mut cfg = if stdin.exists() {
            let line = fs::read_to_string(&stdin)
                .with_context(|| format!("Could not open {}", stdin.display()))?;
            Config::from_legacy_line(&line)
                .with_context(|| format!("Could not parse {}", stdin.display()))?
        } else {
            warn!("Cannot open file. Setting to default nx=ny=nz=128, ndim=2, n=1.");
            Config::default()
        };
        if let Some((d0, d1)) = grid::read_hint_file(dir.join("dims"))? {
            cfg.decomposition.dims = Some([d0, d1]);
        }
        Ok(cfg)
    }

    pub fn from_legacy_line(line: &str) -> Result<Config> {
        let vals = line
            .split_whitespace()
            .take(5)
            .map(|v| v.parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("expected integers")?;
        let (nx, ny, nz, ndim, nrep) = match vals[..] {
            [nx, ny, nz, ndim, nrep] => (nx, ny, nz, ndim, nrep),
            _ => anyhow::bail!("expected five integers: Nx Ny Nz Ndim Nrep"),
        };
        let positive = |v: i64, what: &str| -> Result<usize> {
            if v <= 0 {
                anyhow::bail!("{} must be positive, got {}", what, v);
            }
            Ok(v as usize)
        };
        let mut cfg = Config::default();
        cfg.grid = Grid {
            size_x: positive(nx, "Nx")?,
            size_y: positive(ny, "Ny")?,
            size_z: positive(nz, "Nz")?,
        };
        cfg.decomposition.ndim = u32::try_from(ndim).context("Ndim out of range")?;
        cfg.run.repetitions = u32::try_from(positive(nrep, "Nrep")?).context("Nrep out of range")?;
        Ok(cfg)
    }

    pub fn dims(&self) -> Result<GridDims, SpectrumError> {
        GridDims::new(self.grid.size_x, self.grid.size_y, self.grid.size_z)
    }

    pub fn hint(&self) -> Option<(usize, usize)> {
        self.decomposition.dims.map(|[d0, d1]| (d0, d1))
    }

    /// Checks everything that does not depend on the number of ranks.
    pub fn validate(&self) -> Result<(), SpectrumError> {
        self.dims()?;
        if self.run.repetitions == 0 {
            return Err(SpectrumError::config("repetitions must be at least 1"));
        }
        if self.run.ranks == 0 {
            return Err(SpectrumError::config("ranks must be at least 1"));
        }
        if !(1..=2).contains(&self.decomposition.ndim) {
            return Err(SpectrumError::config(format!(
                "decomposition dimensionality must be 1 or 2, got {}",
                self.decomposition.ndim
            )));
        }
        Ok(())
    }
}
