use super::{Decomposition, TransformEngine};
use crate::comm::Communicator;
use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, Layout, LocalIndexRange, Pos};
use crate::grid::ProcessGrid;
use crate::SpectralFloat;
use itertools::iproduct;
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::debug;

/// Distributed 3D real-to-complex transform over a pencil decomposition.
///
/// Each rank transforms x on its own real pencil, swaps y for x with the
/// ranks of its grid row, transforms y, swaps z for y with the ranks of its
/// grid column and transforms z. No rank holds more than its own blocks and
/// one exchange's worth of messages.
pub struct PencilEngine<'a, T: SpectralFloat, C: Communicator> {
    comm: &'a C,
    decomp: Decomposition,
    real_range: LocalIndexRange,
    // x half-axis split over dim0, y whole, z still split over dim1
    mid_range: LocalIndexRange,
    spectral_range: LocalIndexRange,
    fft_x: Arc<dyn Fft<T>>,
    fft_y: Arc<dyn Fft<T>>,
    fft_z: Arc<dyn Fft<T>>,
    line: Vec<Complex<T>>,
    scratch: Vec<Complex<T>>,
    overwrite: bool,
}

impl<'a, T: SpectralFloat, C: Communicator> PencilEngine<'a, T, C> {
    /// Plans the three 1D transforms and works out this rank's blocks.
    /// Fails without communicating when `grid` does not match the
    /// communicator or an axis is too short for the ranks it is split over.
    pub fn setup(
        comm: &'a C,
        grid: ProcessGrid,
        dims: GridDims,
        overwrite: bool,
    ) -> Result<PencilEngine<'a, T, C>> {
        grid.ensure_matches(comm.size())?;
        let decomp = Decomposition::new(grid, dims)?;
        let real_range = decomp.range(comm.rank(), Layout::Real);
        let spectral_range = decomp.range(comm.rank(), Layout::Spectral);
        let mid_range = LocalIndexRange::new(
            [spectral_range.start[0], 1, real_range.start[2]],
            [spectral_range.size[0], dims.size_y, real_range.size[2]],
        );

        let mut planner = FftPlanner::new();
        let fft_x = planner.plan_fft_forward(dims.size_x);
        let fft_y = planner.plan_fft_forward(dims.size_y);
        let fft_z = planner.plan_fft_forward(dims.size_z);
        let scratch_len = [&fft_x, &fft_y, &fft_z]
            .iter()
            .map(|f| f.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        let longest = dims.as_array().iter().copied().max().unwrap_or(0);

        debug!(
            "rank {}: pencil engine, real {:?}+{:?}, spectral {:?}+{:?}",
            comm.rank(),
            real_range.start,
            real_range.size,
            spectral_range.start,
            spectral_range.size
        );
        Ok(PencilEngine {
            comm,
            decomp,
            real_range,
            mid_range,
            spectral_range,
            fft_x,
            fft_y,
            fft_z,
            line: vec![Complex::zero(); longest],
            scratch: vec![Complex::zero(); scratch_len],
            overwrite,
        })
    }

    /// Grid coordinates of this rank.
    fn coords(&self) -> (usize, usize) {
        let d0 = self.decomp.grid().dim0();
        (self.comm.rank() % d0, self.comm.rank() / d0)
    }

    /// x transform of every local line, keeping the non-negative half.
    fn transform_x(&mut self, real: &[T]) -> Vec<Complex<T>> {
        let nx = self.decomp.dims().size_x;
        let nxh = nx / 2 + 1;
        let mut half = Vec::with_capacity(nxh * real.len() / nx);
        let line = &mut self.line[..nx];
        for src in real.chunks_exact(nx) {
            for (c, &v) in line.iter_mut().zip(src) {
                *c = Complex::new(v, T::zero());
            }
            self.fft_x.process_with_scratch(line, &mut self.scratch);
            half.extend_from_slice(&line[..nxh]);
        }
        half
    }

    /// Trades the y split for the x split inside this rank's grid row.
    fn swap_rows(&self, half: &[Complex<T>]) -> Result<Vec<Complex<T>>> {
        let grid = self.decomp.grid();
        let (_, jp) = self.coords();
        let r = self.real_range;
        let nxh = self.decomp.dims().spectral_extent()[0];
        let held = LocalIndexRange::new([1, r.start[1], r.start[2]], [nxh, r.size[1], r.size[2]]);

        let mut outgoing = vec![Vec::new(); self.comm.size()];
        for peer in (0..grid.dim0()).map(|i| i + grid.dim0() * jp) {
            let dest = self.decomp.range(peer, Layout::Spectral);
            let mut msg = Vec::with_capacity(dest.size[0] * r.size[1] * r.size[2]);
            for (z, y) in iproduct!(0..r.size[2], 0..r.size[1]) {
                let at = held.get_index(Pos { x: dest.start[0] - 1, y, z });
                msg.extend_from_slice(&half[at..at + dest.size[0]]);
            }
            outgoing[peer] = msg;
        }
        let incoming = self.comm.all_to_all(outgoing)?;

        let m = self.mid_range;
        let mut out = vec![Complex::zero(); m.volume()];
        for peer in (0..grid.dim0()).map(|i| i + grid.dim0() * jp) {
            let src = self.decomp.range(peer, Layout::Real);
            let ys = src.start[1] - 1..src.end[1];
            for ((z, y), part) in iproduct!(0..m.size[2], ys).zip(incoming[peer].chunks_exact(m.size[0])) {
                let at = m.get_index(Pos { x: 0, y, z });
                out[at..at + m.size[0]].copy_from_slice(part);
            }
        }
        Ok(out)
    }

    /// Trades the z split for the y split inside this rank's grid column.
    fn swap_columns(&self, mid: &[Complex<T>]) -> Result<Vec<Complex<T>>> {
        let grid = self.decomp.grid();
        let (ip, _) = self.coords();
        let m = self.mid_range;

        let mut outgoing = vec![Vec::new(); self.comm.size()];
        for peer in (0..grid.dim1()).map(|j| ip + grid.dim0() * j) {
            let dest = self.decomp.range(peer, Layout::Spectral);
            let ys = dest.start[1] - 1..dest.end[1];
            let mut msg = Vec::with_capacity(m.size[0] * dest.size[1] * m.size[2]);
            for (z, y) in iproduct!(0..m.size[2], ys) {
                let at = m.get_index(Pos { x: 0, y, z });
                msg.extend_from_slice(&mid[at..at + m.size[0]]);
            }
            outgoing[peer] = msg;
        }
        let incoming = self.comm.all_to_all(outgoing)?;

        let s = self.spectral_range;
        let mut out = vec![Complex::zero(); s.volume()];
        for peer in (0..grid.dim1()).map(|j| ip + grid.dim0() * j) {
            let src = self.decomp.range(peer, Layout::Real);
            let zs = src.start[2] - 1..src.end[2];
            for ((z, y), part) in iproduct!(zs, 0..s.size[1]).zip(incoming[peer].chunks_exact(s.size[0])) {
                let at = s.get_index(Pos { x: 0, y, z });
                out[at..at + s.size[0]].copy_from_slice(part);
            }
        }
        Ok(out)
    }
}

/// Transforms the lines of `n` points that start at each of `firsts` and
/// step through `data` by `stride`.
fn transform_strided<T: SpectralFloat>(
    fft: &Arc<dyn Fft<T>>,
    data: &mut [Complex<T>],
    n: usize,
    stride: usize,
    firsts: impl Iterator<Item = usize>,
    line: &mut [Complex<T>],
    scratch: &mut [Complex<T>],
) {
    let line = &mut line[..n];
    for first in firsts {
        for (i, c) in line.iter_mut().enumerate() {
            *c = data[first + i * stride];
        }
        fft.process_with_scratch(line, scratch);
        for (i, c) in line.iter().enumerate() {
            data[first + i * stride] = *c;
        }
    }
}

impl<'a, T: SpectralFloat, C: Communicator> TransformEngine<T> for PencilEngine<'a, T, C> {
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

        let half = self.transform_x(real);

        let mut mid = self.swap_rows(&half)?;
        let m = self.mid_range;
        let firsts = iproduct!(0..m.size[2], 0..m.size[0]).map(|(z, x)| m.get_index(Pos { x, y: 0, z }));
        transform_strided(&self.fft_y, &mut mid, m.size[1], m.size[0], firsts, &mut self.line, &mut self.scratch);

        let mut pencil = self.swap_columns(&mid)?;
        let s = self.spectral_range;
        let firsts = iproduct!(0..s.size[1], 0..s.size[0]).map(|(y, x)| s.get_index(Pos { x, y, z: 0 }));
        let stride = s.size[0] * s.size[1];
        transform_strided(&self.fft_z, &mut pencil, s.size[2], stride, firsts, &mut self.line, &mut self.scratch);

        for (c, pair) in pencil.iter().zip(spectral.chunks_exact_mut(2)) {
            pair[0] = c.re;
            pair[1] = c.im;
        }
        Ok(())
    }

    fn overwrites_input(&self) -> bool {
        self.overwrite
    }

    fn cleanup(self) {
        debug!("rank {}: pencil engine released", self.comm.rank());
    }
}
