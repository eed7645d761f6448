//! Boundary to the distributed 3D transform.
//!
//! The binner only relies on [`LocalIndexRange`]: a 1-based, inclusive block of
//! the global index space for each layout, stored x fastest. How an engine moves
//! data between ranks to produce it is its own business.

use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, Layout, LocalIndexRange};
use crate::grid::ProcessGrid;
use crate::SpectralFloat;
use serde::Deserialize;

pub mod fft_3d;
pub mod gathered;
pub mod pencil;

pub use fft_3d::Fft3D;
pub use gathered::GatheredEngine;
pub use pencil::PencilEngine;

/// Which transform engine the driver sets up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Distributed transform with two all-to-all transposes.
    Pencil,
    /// Gathers the whole field on every rank. Reference only.
    Gathered,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Pencil
    }
}

pub trait TransformEngine<T: SpectralFloat> {
    /// This rank's block in the given layout.
    fn local_range(&self, layout: Layout) -> LocalIndexRange;

    /// Forward real-to-complex transform of this rank's real block into its
    /// spectral block. `spectral` holds interleaved (re, im) pairs. Collective.
    fn forward(&mut self, real: &[T], spectral: &mut [T]) -> Result<()>;

    /// The overwrite permission the engine was set up with. `forward` takes
    /// its input by shared reference, so the permission is only recorded and
    /// the caller's buffer is never modified.
    fn overwrites_input(&self) -> bool;

    fn cleanup(self)
    where
        Self: Sized;
}

/// `(zero based start, size)` of part `index` when `n` points are dealt out to
/// `parts` ranks. The first `n % parts` ranks get one extra point.
pub fn block_split(n: usize, parts: usize, index: usize) -> (usize, usize) {
    let base = n / parts;
    let rem = n % parts;
    let size = base + usize::from(index < rem);
    let start = index * base + index.min(rem);
    (start, size)
}

/// Pencil decomposition over a 2D process grid.
///
/// Rank `r` sits at `(r % dim0, r / dim0)`. Real space keeps x whole and cuts
/// y over `dim0`, z over `dim1`. Spectral space keeps z whole and cuts the
/// halved x axis over `dim0`, y over `dim1`.
#[derive(Debug, Clone, Copy)]
pub struct Decomposition {
    grid: ProcessGrid,
    dims: GridDims,
}

impl Decomposition {
    pub fn new(grid: ProcessGrid, dims: GridDims) -> Result<Decomposition> {
        let spectral = dims.spectral_extent();
        let cuts = [
            ("y", dims.size_y, grid.dim0()),
            ("z", dims.size_z, grid.dim1()),
            ("spectral x", spectral[0], grid.dim0()),
            ("spectral y", dims.size_y, grid.dim1()),
        ];
        for &(axis, n, parts) in &cuts {
            if n < parts {
                return Err(SpectrumError::config(format!(
                    "cannot split {} points along {} over {} ranks of grid {}",
                    n, axis, parts, grid
                )));
            }
        }
        Ok(Decomposition { grid, dims })
    }

    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn range(&self, rank: usize, layout: Layout) -> LocalIndexRange {
        let ip = rank % self.grid.dim0();
        let jp = rank / self.grid.dim0();
        let (start, size) = match layout {
            Layout::Real => {
                let (y0, ny) = block_split(self.dims.size_y, self.grid.dim0(), ip);
                let (z0, nz) = block_split(self.dims.size_z, self.grid.dim1(), jp);
                ([0, y0, z0], [self.dims.size_x, ny, nz])
            }
            Layout::Spectral => {
                let nxh = self.dims.spectral_extent()[0];
                let (x0, nx) = block_split(nxh, self.grid.dim0(), ip);
                let (y0, ny) = block_split(self.dims.size_y, self.grid.dim1(), jp);
                ([x0, y0, 0], [nx, ny, self.dims.size_z])
            }
        };
        LocalIndexRange::new([start[0] + 1, start[1] + 1, start[2] + 1], size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_axis() {
        for n in 1..20 {
            for parts in 1..=n {
                let mut next = 0;
                for i in 0..parts {
                    let (start, size) = block_split(n, parts, i);
                    assert_eq!(start, next);
                    assert!(size >= 1);
                    next += size;
                }
                assert_eq!(next, n);
            }
        }
        assert_eq!(block_split(10, 4, 0), (0, 3));
        assert_eq!(block_split(10, 4, 1), (3, 3));
        assert_eq!(block_split(10, 4, 2), (6, 2));
        assert_eq!(block_split(10, 4, 3), (8, 2));
    }

    #[test]
    fn ranges_tile_both_layouts() {
        let dims = GridDims::new(8, 6, 5).unwrap();
        let grid = ProcessGrid::new(2, 3).unwrap();
        let decomp = Decomposition::new(grid, dims).unwrap();
        for (layout, extent) in [
            (Layout::Real, dims.as_array()),
            (Layout::Spectral, dims.spectral_extent()),
        ] {
            let mut owner = vec![0_u32; extent.iter().product()];
            for rank in 0..grid.size() {
                let r = decomp.range(rank, layout);
                assert!(r.fits(extent));
                for z in r.start[2]..=r.end[2] {
                    for y in r.start[1]..=r.end[1] {
                        for x in r.start[0]..=r.end[0] {
                            owner[(x - 1) + extent[0] * ((y - 1) + extent[1] * (z - 1))] += 1;
                        }
                    }
                }
            }
            assert!(owner.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn pencils_keep_one_axis_whole() {
        let dims = GridDims::new(16, 8, 8).unwrap();
        let grid = ProcessGrid::new(2, 2).unwrap();
        let decomp = Decomposition::new(grid, dims).unwrap();
        let real = decomp.range(3, Layout::Real);
        assert_eq!(real.start, [1, 5, 5]);
        assert_eq!(real.size, [16, 4, 4]);
        let spec = decomp.range(1, Layout::Spectral);
        assert_eq!(spec.start, [6, 1, 1]);
        assert_eq!(spec.size, [4, 4, 8]);
    }

    #[test]
    fn too_many_ranks_for_axis() {
        let dims = GridDims::new(8, 2, 8).unwrap();
        let grid = ProcessGrid::new(4, 1).unwrap();
        assert!(matches!(
            Decomposition::new(grid, dims),
            Err(SpectrumError::InvalidConfiguration(_))
        ));
    }
}
