use super::{Decomposition, Fft3D, TransformEngine};
use crate::comm::Communicator;
use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, Layout, LocalIndexRange};
use crate::grid::ProcessGrid;
use crate::SpectralFloat;
use itertools::iproduct;
use tracing::debug;

/// Reference engine: gathers the real field onto every rank and transforms it
/// there. Exact and simple, so it is what the pipeline is validated against;
/// its memory use grows with the global grid.
pub struct GatheredEngine<'a, T: SpectralFloat, C: Communicator> {
    comm: &'a C,
    decomp: Decomposition,
    real_range: LocalIndexRange,
    spectral_range: LocalIndexRange,
    fft: Fft3D<T>,
    overwrite: bool,
}

impl<'a, T: SpectralFloat, C: Communicator> GatheredEngine<'a, T, C> {
    /// Engine setup. Fails without communicating when `grid` does not match
    /// the communicator or the field is too small for the grid.
    pub fn setup(
        comm: &'a C,
        grid: ProcessGrid,
        dims: GridDims,
        overwrite: bool,
    ) -> Result<GatheredEngine<'a, T, C>> {
        grid.ensure_matches(comm.size())?;
        let decomp = Decomposition::new(grid, dims)?;
        let real_range = decomp.range(comm.rank(), Layout::Real);
        let spectral_range = decomp.range(comm.rank(), Layout::Spectral);
        debug!(
            "rank {}: real block start {:?} size {:?}, spectral block start {:?} size {:?}",
            comm.rank(),
            real_range.start,
            real_range.size,
            spectral_range.start,
            spectral_range.size
        );
        Ok(GatheredEngine {
            comm,
            decomp,
            real_range,
            spectral_range,
            fft: Fft3D::new(dims),
            overwrite,
        })
    }

    fn assemble(&self, blocks: Vec<(LocalIndexRange, Vec<T>)>) -> Vec<T> {
        let dims = self.decomp.dims();
        let (nx, ny) = (dims.size_x, dims.size_y);
        let mut full = vec![T::zero(); dims.total()];
        for (range, data) in blocks {
            let lines = iproduct!(range.start[2] - 1..range.end[2], range.start[1] - 1..range.end[1]);
            for ((z, y), line) in lines.zip(data.chunks_exact(range.size[0])) {
                let at = range.start[0] - 1 + nx * (y + ny * z);
                full[at..at + range.size[0]].copy_from_slice(line);
            }
        }
        full
    }
}

impl<'a, T: SpectralFloat, C: Communicator> TransformEngine<T> for GatheredEngine<'a, T, C> {
    fn local_range(&self, layout: Layout) -> LocalIndexRange {
        match layout {
            Layout::Real => self.real_range,
            Layout::Spectral => self.spectral_range,
        }
    }

    fn forward(&mut self, real: &[T], spectral: &mut [T]) -> Result<()> {
        if real.len() != self.real_range.volume() {
            return Err(SpectrumError::input(format!(
                "real buffer holds {} values, block needs {}",
                real.len(),
                self.real_range.volume()
            )));
        }
        if spectral.len() != 2 * self.spectral_range.volume() {
            return Err(SpectrumError::input(format!(
                "spectral buffer holds {} scalars, block needs {}",
                spectral.len(),
                2 * self.spectral_range.volume()
            )));
        }

        let blocks = self.comm.all_gather((self.real_range, real.to_vec()))?;
        let full = self.assemble(blocks);
        let coeffs = self.fft.r2c(&full);

        let dims = self.decomp.dims();
        let [nxh, ny, _] = dims.spectral_extent();
        let r = self.spectral_range;
        let mut out = spectral.chunks_exact_mut(2);
        for (z, y) in iproduct!(r.start[2] - 1..r.end[2], r.start[1] - 1..r.end[1]) {
            let at = r.start[0] - 1 + nxh * (y + ny * z);
            for (c, pair) in coeffs[at..at + r.size[0]].iter().zip(out.by_ref()) {
                pair[0] = c.re;
                pair[1] = c.im;
            }
        }
        Ok(())
    }

    fn overwrites_input(&self) -> bool {
        self.overwrite
    }

    fn cleanup(self) {
        debug!("rank {}: transform engine released", self.comm.rank());
    }
}
