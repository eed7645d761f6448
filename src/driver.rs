use crate::comm::Communicator;
use crate::config::Config;
use crate::engine::{EngineKind, GatheredEngine, PencilEngine, TransformEngine};
use crate::error::{Result, SpectrumError};
use crate::flds::{synthesize, Layout};
use crate::grid::{select_grid, ProcessGrid};
use crate::spectrum::{compute_local_spectrum, normalize, reduce_spectrum, RadialSpectrum};
use crate::timing::TransformTimings;
use crate::{SpectralFloat, ROOT};
use tracing::{debug, info};

/// What the root ends up with.
#[derive(Debug, Clone)]
pub struct Report {
    pub grid: ProcessGrid,
    pub spectrum: RadialSpectrum,
    /// Slowest rank's mean seconds per forward transform.
    pub time_per_loop: f64,
}

/// Full pipeline on one rank. `cfg` is only read on the root; every other
/// rank receives it by broadcast. Returns the report on the root and `None`
/// elsewhere.
pub fn execute<T: SpectralFloat, C: Communicator>(
    comm: &C,
    cfg: Option<Config>,
) -> Result<Option<Report>> {
    let cfg = comm.broadcast(cfg, ROOT)?;

    // The grid is chosen and checked on the root only, then every rank gets
    // the same verdict before anything else is collective.
    let choice = if comm.rank() == ROOT {
        Some(choose_grid::<T>(&cfg, comm.size()))
    } else {
        None
    };
    let grid = comm.broadcast(choice, ROOT)??;
    execute_on_grid::<T, C>(comm, &cfg, grid)
}

fn choose_grid<T: SpectralFloat>(cfg: &Config, nprocs: usize) -> Result<ProcessGrid> {
    cfg.validate()?;
    let dims = cfg.dims()?;
    info!("{}", T::PRECISION);
    info!("{} grid", dims);
    info!("{} proc. dimensions", cfg.decomposition.ndim);
    let grid = select_grid(nprocs, cfg.decomposition.ndim, cfg.hint())?;
    info!("Using processor grid {}", grid);
    Ok(grid)
}

/// Pipeline on an already chosen grid, with the engine named in `cfg`. A grid
/// that does not match the world is rejected here, on every rank alike,
/// before any collective runs.
pub fn execute_on_grid<T: SpectralFloat, C: Communicator>(
    comm: &C,
    cfg: &Config,
    grid: ProcessGrid,
) -> Result<Option<Report>> {
    grid.ensure_matches(comm.size())?;
    let dims = cfg.dims()?;
    let overwrite = cfg.run.overwrite_input;
    match cfg.run.engine {
        EngineKind::Pencil => {
            let engine = PencilEngine::<T, C>::setup(comm, grid, dims, overwrite)?;
            execute_with_engine(comm, cfg, grid, engine)
        }
        EngineKind::Gathered => {
            let engine = GatheredEngine::<T, C>::setup(comm, grid, dims, overwrite)?;
            execute_with_engine(comm, cfg, grid, engine)
        }
    }
}

/// Pipeline with an engine that is already set up. Everything past setup
/// only sees the engine through [`TransformEngine`] and the ranges it hands
/// out.
pub fn execute_with_engine<T, C, E>(
    comm: &C,
    cfg: &Config,
    grid: ProcessGrid,
    mut engine: E,
) -> Result<Option<Report>>
where
    T: SpectralFloat,
    C: Communicator,
    E: TransformEngine<T>,
{
    let dims = cfg.dims()?;
    let real_range = engine.local_range(Layout::Real);
    let spectral_range = engine.local_range(Layout::Spectral);
    let fld: Vec<T> = synthesize(&dims, &real_range, cfg.run.field, cfg.run.seed)?;
    let mut spectral = vec![T::zero(); 2 * spectral_range.volume()];
    if engine.overwrites_input() {
        debug!("rank {}: engine may use its input as scratch", comm.rank());
    }

    let mut timings = TransformTimings::new();
    comm.barrier();
    for _ in 0..cfg.run.repetitions {
        timings.time(|| engine.forward(&fld, &mut spectral))?;
    }
    debug!(
        "rank {}: {} transforms, {:.3e} s per loop",
        comm.rank(),
        timings.count(),
        timings.per_loop()
    );
    normalize(&mut spectral, &dims);

    let local = compute_local_spectrum(&spectral, &spectral_range, &dims, dims.kmax());
    // everyone has to learn about a bad block before the reduction
    let all_ok = comm.all_agree(local.is_ok())?;
    let local = local?;
    if !all_ok {
        return Err(SpectrumError::input(format!(
            "rank {}: another rank failed to bin its spectral block",
            comm.rank()
        )));
    }

    let spectrum = reduce_spectrum(comm, &local, ROOT)?;
    let time_per_loop = timings.reduce_max(comm, ROOT)?;
    engine.cleanup();

    Ok(spectrum.map(|spectrum| Report {
        grid,
        spectrum,
        time_per_loop: time_per_loop.unwrap_or(0.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SingleProcess, ThreadWorld};
    use crate::engine::Decomposition;
    use crate::flds::{GridDims, LocalIndexRange, Pos};

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.grid.size_x = 8;
        cfg.grid.size_y = 8;
        cfg.grid.size_z = 8;
        cfg
    }

    #[test]
    fn single_process_run() {
        let report = execute::<f64, _>(&SingleProcess, Some(small_config()))
            .unwrap()
            .unwrap();
        assert_eq!(report.grid, ProcessGrid::new(1, 1).unwrap());
        assert_eq!(report.spectrum.kmax(), 7);
        assert!((report.spectrum.energy()[2] - 0.1875).abs() < 1e-10);
        assert!(report.time_per_loop >= 0.0);
    }

    #[test]
    fn bad_config_fails_on_every_rank() {
        let mut cfg = small_config();
        cfg.decomposition.ndim = 3;
        let out = ThreadWorld::run(3, |comm| {
            let mine = if comm.rank() == ROOT { Some(cfg.clone()) } else { None };
            execute::<f64, _>(&comm, mine)
        })
        .unwrap();
        for res in out {
            assert!(matches!(res, Err(SpectrumError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn bad_hint_fails_on_every_rank() {
        let mut cfg = small_config();
        cfg.decomposition.dims = Some([5, 1]);
        let out = ThreadWorld::run(4, |comm| {
            let mine = if comm.rank() == ROOT { Some(cfg.clone()) } else { None };
            execute::<f64, _>(&comm, mine)
        })
        .unwrap();
        for res in out {
            assert!(matches!(res, Err(SpectrumError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn grid_world_mismatch_is_rejected_up_front() {
        let cfg = small_config();
        let out = ThreadWorld::run(2, |comm| {
            execute_on_grid::<f64, _>(&comm, &cfg, ProcessGrid::new(2, 2).unwrap())
        })
        .unwrap();
        for res in out {
            assert!(matches!(res, Err(SpectrumError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn repetitions_give_the_same_spectrum() {
        let mut cfg = small_config();
        cfg.run.field = crate::FieldKind::Normal;
        let once = execute::<f32, _>(&SingleProcess, Some(cfg.clone())).unwrap().unwrap();
        cfg.run.repetitions = 3;
        cfg.run.overwrite_input = true;
        let thrice = execute::<f32, _>(&SingleProcess, Some(cfg)).unwrap().unwrap();
        assert_eq!(once.spectrum, thrice.spectrum);
    }

    #[test]
    fn both_engines_give_the_same_spectrum() {
        let mut cfg = small_config();
        cfg.run.field = crate::FieldKind::Uniform;
        let run = |cfg: Config| {
            ThreadWorld::run(4, |comm| {
                execute_on_grid::<f64, _>(&comm, &cfg, ProcessGrid::new(2, 2).unwrap()).unwrap()
            })
            .unwrap()
            .remove(ROOT)
            .unwrap()
        };
        cfg.run.engine = EngineKind::Pencil;
        let pencil = run(cfg.clone());
        cfg.run.engine = EngineKind::Gathered;
        let gathered = run(cfg);
        for (a, b) in pencil.spectrum.energy().iter().zip(gathered.spectrum.energy()) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
    }

    /// Hands out the pencil layout and fills its block with one known mode,
    /// without transforming anything.
    struct OneModeEngine {
        spectral_range: LocalIndexRange,
        real_range: LocalIndexRange,
        dims: GridDims,
        mode: Pos,
        calls: u32,
    }

    impl TransformEngine<f64> for OneModeEngine {
        fn local_range(&self, layout: Layout) -> LocalIndexRange {
            match layout {
                Layout::Real => self.real_range,
                Layout::Spectral => self.spectral_range,
            }
        }

        fn forward(&mut self, _real: &[f64], spectral: &mut [f64]) -> Result<()> {
            self.calls += 1;
            spectral.iter_mut().for_each(|v| *v = 0.0);
            let r = self.spectral_range;
            let inside = (r.start[0] - 1..r.end[0]).contains(&self.mode.x)
                && (r.start[1] - 1..r.end[1]).contains(&self.mode.y)
                && (r.start[2] - 1..r.end[2]).contains(&self.mode.z);
            if inside {
                let at = r.get_index(Pos {
                    x: self.mode.x + 1 - r.start[0],
                    y: self.mode.y + 1 - r.start[1],
                    z: self.mode.z + 1 - r.start[2],
                });
                // cancels the 1/N normalisation
                spectral[2 * at] = self.dims.total() as f64;
            }
            Ok(())
        }

        fn overwrites_input(&self) -> bool {
            false
        }

        fn cleanup(self) {
            assert_eq!(self.calls, 2);
        }
    }

    #[test]
    fn binner_only_needs_the_engine_ranges() {
        let mut cfg = small_config();
        cfg.run.repetitions = 2;
        let dims = cfg.dims().unwrap();
        let grid = ProcessGrid::new(2, 2).unwrap();
        let decomp = Decomposition::new(grid, dims).unwrap();
        let out = ThreadWorld::run(4, |comm| {
            let engine = OneModeEngine {
                spectral_range: decomp.range(comm.rank(), Layout::Spectral),
                real_range: decomp.range(comm.rank(), Layout::Real),
                dims,
                // (kx, ky, kz) = (1, 2, -2): k2 = 9
                mode: Pos { x: 1, y: 2, z: 6 },
                calls: 0,
            };
            execute_with_engine::<f64, _, _>(&comm, &cfg, grid, engine).unwrap()
        })
        .unwrap();
        let report = out[ROOT].as_ref().unwrap();
        assert_eq!(report.spectrum.energy()[3], 9.0);
        assert_eq!(report.spectrum.total(), 9.0);
        assert!(out[1..].iter().all(Option::is_none));
    }
}
