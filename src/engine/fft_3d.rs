use crate::flds::GridDims;
use crate::SpectralFloat;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::FftPlanner;
use std::sync::Arc;

/// Serial 3D real-to-complex transform over a whole field, x fastest.
///
/// Output keeps `size_x / 2 + 1` frequencies along x and every frequency along
/// y and z, same order as the input. Unnormalised.
pub struct Fft3D<T: SpectralFloat> {
    dims: GridDims,
    fft_x: Arc<dyn rustfft::Fft<T>>,
    fft_y: Arc<dyn rustfft::Fft<T>>,
    fft_z: Arc<dyn rustfft::Fft<T>>,
    scratch: Vec<Complex<T>>,
    wrkspace: Vec<Complex<T>>,
}

impl<T: SpectralFloat> Fft3D<T> {
    pub fn new(dims: GridDims) -> Fft3D<T> {
        let mut planner = FftPlanner::new();
        let fft_x = planner.plan_fft_forward(dims.size_x);
        let fft_y = planner.plan_fft_forward(dims.size_y);
        let fft_z = planner.plan_fft_forward(dims.size_z);
        let scratch_len = [&fft_x, &fft_y, &fft_z]
            .iter()
            .map(|f| f.get_outofplace_scratch_len())
            .max()
            .unwrap_or(0);
        let scratch = vec![Complex::zero(); scratch_len];
        let wrkspace = vec![Complex::zero(); dims.total()];

        Fft3D {
            dims,
            fft_x,
            fft_y,
            fft_z,
            scratch,
            wrkspace,
        }
    }

    /// Transposes every `rows x cols` plane of the buffer in turn.
    fn transpose_out_of_place(
        in_vec: &[Complex<T>],
        out_vec: &mut [Complex<T>],
        rows: usize,
        cols: usize,
    ) {
        let plane = rows * cols;
        debug_assert_eq!(in_vec.len(), out_vec.len());
        debug_assert_eq!(in_vec.len() % plane, 0);

        out_vec
            .par_chunks_mut(plane)
            .zip(in_vec.par_chunks(plane))
            .for_each(|(out_p, in_p)| {
                for i in 0..rows {
                    for j in 0..cols {
                        out_p[j * rows + i] = in_p[i * cols + j];
                    }
                }
            });
    }

    /// Forward transform of `real` (length `size_x * size_y * size_z`).
    pub fn r2c(&mut self, real: &[T]) -> Vec<Complex<T>> {
        let nx = self.dims.size_x;
        let ny = self.dims.size_y;
        let nz = self.dims.size_z;
        let nxh = nx / 2 + 1;
        assert_eq!(real.len(), nx * ny * nz);

        // x: full complex transform of every line, keep the non-negative half
        let mut lines: Vec<Complex<T>> = real.iter().map(|&v| Complex::new(v, T::zero())).collect();
        self.fft_x
            .process_outofplace_with_scratch(&mut lines, &mut self.wrkspace, &mut self.scratch);
        let mut spectral: Vec<Complex<T>> = self
            .wrkspace
            .chunks_exact(nx)
            .flat_map(|line| line[..nxh].iter().copied())
            .collect();

        // y: bring y to the front of every z plane, transform, put it back
        let mut wrk = vec![Complex::zero(); spectral.len()];
        Self::transpose_out_of_place(&spectral, &mut wrk, ny, nxh);
        self.fft_y
            .process_outofplace_with_scratch(&mut wrk, &mut spectral, &mut self.scratch);
        Self::transpose_out_of_place(&spectral, &mut wrk, nxh, ny);

        // z: same with the x-y plane flattened into one axis
        Self::transpose_out_of_place(&wrk, &mut spectral, nz, nxh * ny);
        self.fft_z
            .process_outofplace_with_scratch(&mut spectral, &mut wrk, &mut self.scratch);
        Self::transpose_out_of_place(&wrk, &mut spectral, nxh * ny, nz);

        spectral
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::E_TOL;

    /// Direct O(N^2) DFT of the whole field, for comparison.
    fn naive_dft(real: &[f64], dims: GridDims, k: [usize; 3]) -> Complex<f64> {
        let two_pi = 2.0 * std::f64::consts::PI;
        let mut acc = Complex::new(0.0, 0.0);
        for z in 0..dims.size_z {
            for y in 0..dims.size_y {
                for x in 0..dims.size_x {
                    let phase = -two_pi
                        * ((k[0] * x) as f64 / dims.size_x as f64
                            + (k[1] * y) as f64 / dims.size_y as f64
                            + (k[2] * z) as f64 / dims.size_z as f64);
                    let v = real[x + dims.size_x * (y + dims.size_y * z)];
                    acc += Complex::new(phase.cos(), phase.sin()) * v;
                }
            }
        }
        acc
    }

    fn test_field(dims: GridDims) -> Vec<f64> {
        (0..dims.total())
            .map(|i| ((i * 7919) % 101) as f64 / 101.0 - 0.5)
            .collect()
    }

    #[test]
    fn transpose() {
        let input: Vec<Complex<f64>> = (0..24).map(|i| Complex::new(i as f64, -(i as f64))).collect();
        let mut out = vec![Complex::zero(); 24];
        // two planes of 3 rows x 4 cols
        Fft3D::transpose_out_of_place(&input, &mut out, 3, 4);
        for p in 0..2 {
            for i in 0..3 {
                for j in 0..4 {
                    assert_eq!(out[p * 12 + j * 3 + i], input[p * 12 + i * 4 + j]);
                }
            }
        }
    }

    #[test]
    fn matches_direct_dft() {
        let dims = GridDims::new(6, 4, 5).unwrap();
        let real = test_field(dims);
        let mut fft = Fft3D::<f64>::new(dims);
        let out = fft.r2c(&real);
        let nxh = dims.spectral_extent()[0];
        assert_eq!(out.len(), nxh * 4 * 5);
        for z in 0..5 {
            for y in 0..4 {
                for x in 0..nxh {
                    let expected = naive_dft(&real, dims, [x, y, z]);
                    let got = out[x + nxh * (y + 4 * z)];
                    assert!((got - expected).norm() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn constant_field_is_dc_only() {
        let dims = GridDims::new(4, 4, 4).unwrap();
        let mut fft = Fft3D::<f64>::new(dims);
        let out = fft.r2c(&vec![1.0; dims.total()]);
        assert!((out[0].re - 64.0).abs() < E_TOL);
        assert!(out[1..].iter().all(|c| c.norm() < E_TOL));
    }

    #[test]
    fn reusable() {
        let dims = GridDims::new(8, 4, 2).unwrap();
        let real = test_field(dims);
        let mut fft = Fft3D::<f64>::new(dims);
        let first = fft.r2c(&real);
        let second = fft.r2c(&real);
        assert_eq!(first, second);
    }
}
