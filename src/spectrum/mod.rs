//! Radial binning of spectral energy and its reduction across ranks.

use crate::comm::Communicator;
use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, LocalIndexRange, WaveNumbers};
use crate::SpectralFloat;

/// Shell of a mode with squared wavenumber `k2`: `round(sqrt(k2))`, half away
/// from zero.
#[inline(always)]
pub fn shell_index(k2: u64) -> usize {
    (k2 as f64).sqrt().round() as usize
}

/// Scales a freshly transformed buffer by `1 / (Nx * Ny * Nz)`.
pub fn normalize<T: SpectralFloat>(spectral: &mut [T], dims: &GridDims) {
    let factor = T::of(1.0 / dims.total() as f64);
    for v in spectral.iter_mut() {
        *v = *v * factor;
    }
}

/// Energy per shell of this rank's spectral block, `k2 * |c|^2` summed into
/// `round(|k|)`. `spectral` is interleaved (re, im) pairs over `range`, x
/// fastest, with one pair per stored frequency.
pub fn compute_local_spectrum<T: SpectralFloat>(
    spectral: &[T],
    range: &LocalIndexRange,
    dims: &GridDims,
    kmax: usize,
) -> Result<Vec<f64>> {
    if spectral.len() % 2 != 0 {
        return Err(SpectrumError::input(format!(
            "spectral buffer has an odd number of scalars ({})",
            spectral.len()
        )));
    }
    if spectral.len() / 2 != range.volume() {
        return Err(SpectrumError::input(format!(
            "spectral buffer holds {} complex values but the local range has volume {}",
            spectral.len() / 2,
            range.volume()
        )));
    }
    if !range.fits(dims.spectral_extent()) {
        return Err(SpectrumError::input(format!(
            "spectral range {:?}..={:?} reaches outside the spectral extent {:?}",
            range.start,
            range.end,
            dims.spectral_extent()
        )));
    }
    let waves = WaveNumbers::new(range, dims)?;

    let mut el = vec![0.0_f64; kmax + 1];
    let mut pairs = spectral.chunks_exact(2);
    for &kz in &waves.k_z {
        for &ky in &waves.k_y {
            let kyz = ky * ky + kz * kz;
            for (&kx, pair) in waves.k_x.iter().zip(pairs.by_ref()) {
                let k2 = (kx * kx + kyz) as u64;
                let ik = shell_index(k2);
                let re = pair[0].widen();
                let im = pair[1].widen();
                match el.get_mut(ik) {
                    Some(e) => *e += k2 as f64 * (re * re + im * im),
                    None => {
                        return Err(SpectrumError::input(format!(
                            "mode ({}, {}, {}) falls in shell {} beyond kmax {}",
                            kx, ky, kz, ik, kmax
                        )))
                    }
                }
            }
        }
    }
    Ok(el)
}

/// Global spectrum, only ever held by the root after the reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialSpectrum {
    energy: Vec<f64>,
}

impl RadialSpectrum {
    pub fn new(energy: Vec<f64>) -> RadialSpectrum {
        RadialSpectrum { energy }
    }

    pub fn kmax(&self) -> usize {
        self.energy.len().saturating_sub(1)
    }

    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    pub fn total(&self) -> f64 {
        self.energy.iter().sum()
    }

    /// `(shell, energy)` pairs from shell 0 up to kmax.
    pub fn shells(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.energy.iter().copied().enumerate()
    }
}

/// Sums every rank's accumulator onto `root`. Collective; ranks other than
/// the root get `None`.
pub fn reduce_spectrum<C: Communicator>(
    comm: &C,
    local: &[f64],
    root: usize,
) -> Result<Option<RadialSpectrum>> {
    Ok(comm.reduce_sum(local, root)?.map(RadialSpectrum::new))
}
