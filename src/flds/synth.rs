use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, LocalIndexRange};
use crate::SpectralFloat;
use rand::prelude::*;
use rand_distr::{Standard, StandardNormal};
use serde::Deserialize;

/// Test input fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// `sin(2 pi x / Nx) * sin(2 pi y / Ny) * sin(2 pi z / Nz)`. Its whole
    /// spectrum sits at |k| = sqrt(3).
    Sine,
    /// Uniform noise on [0, 1).
    Uniform,
    /// Standard normal noise.
    Normal,
}

impl Default for FieldKind {
    fn default() -> Self {
        FieldKind::Sine
    }
}

/// One period of `sin` across the axis, sampled at this block's points.
fn sin_table<T: SpectralFloat>(start: usize, size: usize, n: usize) -> Vec<T> {
    let two_pi = 2.0 * std::f64::consts::PI;
    (0..size)
        .map(|i| {
            // start is 1-based
            let global = (start + i - 1) as f64;
            T::of((global * two_pi / n as f64).sin())
        })
        .collect()
}

/// Fills this rank's real-space block, x fastest. Noise fields are seeded per
/// global (y, z) line, so the result does not depend on how the grid is cut.
/// The block has to lie inside the grid under the 1-based convention.
pub fn synthesize<T: SpectralFloat>(
    dims: &GridDims,
    range: &LocalIndexRange,
    kind: FieldKind,
    seed: u64,
) -> Result<Vec<T>> {
    if !range.fits(dims.as_array()) {
        return Err(SpectrumError::input(format!(
            "real range {:?}..={:?} is not a 1-based block of the {} grid",
            range.start, range.end, dims
        )));
    }
    let mut fld = Vec::with_capacity(range.volume());
    match kind {
        FieldKind::Sine => {
            let sin_x: Vec<T> = sin_table(range.start[0], range.size[0], dims.size_x);
            let sin_y: Vec<T> = sin_table(range.start[1], range.size[1], dims.size_y);
            let sin_z: Vec<T> = sin_table(range.start[2], range.size[2], dims.size_z);
            for &sz in &sin_z {
                for &sy in &sin_y {
                    let syz = sy * sz;
                    fld.extend(sin_x.iter().map(|&sx| sx * syz));
                }
            }
        }
        FieldKind::Uniform | FieldKind::Normal => {
            for iz in 0..range.size[2] {
                let gz = (range.start[2] + iz - 1) as u64;
                for iy in 0..range.size[1] {
                    let gy = (range.start[1] + iy - 1) as u64;
                    let line = gz * dims.size_y as u64 + gy;
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ line);
                    // skip to this block's first x so split x-axes still agree
                    for _ in 1..range.start[0] {
                        let _: f64 = sample(&mut rng, kind);
                    }
                    fld.extend((0..range.size[0]).map(|_| T::of(sample(&mut rng, kind))));
                }
            }
        }
    }
    Ok(fld)
}

fn sample(rng: &mut StdRng, kind: FieldKind) -> f64 {
    match kind {
        FieldKind::Normal => rng.sample(StandardNormal),
        _ => rng.sample(Standard),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::E_TOL;

    #[test]
    fn sine_is_separable() {
        let dims = GridDims::new(8, 4, 6).unwrap();
        let range = LocalIndexRange::whole(dims.as_array());
        let fld: Vec<f64> = synthesize(&dims, &range, FieldKind::Sine, 0).unwrap();
        assert_eq!(fld.len(), 8 * 4 * 6);
        let two_pi = 2.0 * std::f64::consts::PI;
        for z in 0..6 {
            for y in 0..4 {
                for x in 0..8 {
                    let expected = (two_pi * x as f64 / 8.0).sin()
                        * (two_pi * y as f64 / 4.0).sin()
                        * (two_pi * z as f64 / 6.0).sin();
                    let v = fld[x + 8 * (y + 4 * z)];
                    assert!((v - expected).abs() < E_TOL);
                }
            }
        }
    }

    #[test]
    fn blocks_match_the_whole_field() {
        let dims = GridDims::new(8, 6, 4).unwrap();
        let whole = LocalIndexRange::whole(dims.as_array());
        let block = LocalIndexRange::new([3, 4, 2], [4, 3, 2]);
        for kind in [FieldKind::Sine, FieldKind::Uniform, FieldKind::Normal] {
            let full: Vec<f64> = synthesize(&dims, &whole, kind, 11).unwrap();
            let part: Vec<f64> = synthesize(&dims, &block, kind, 11).unwrap();
            assert_eq!(part.len(), block.volume());
            for z in 0..2 {
                for y in 0..3 {
                    for x in 0..4 {
                        let g = (x + 2) + 8 * ((y + 3) + 6 * (z + 1));
                        let l = x + 4 * (y + 3 * z);
                        assert_eq!(part[l], full[g]);
                    }
                }
            }
        }
    }

    #[test]
    fn noise_depends_on_seed() {
        let dims = GridDims::new(4, 4, 4).unwrap();
        let whole = LocalIndexRange::whole(dims.as_array());
        let a: Vec<f64> = synthesize(&dims, &whole, FieldKind::Uniform, 1).unwrap();
        let b: Vec<f64> = synthesize(&dims, &whole, FieldKind::Uniform, 2).unwrap();
        assert!(a.iter().zip(b.iter()).any(|(x, y)| x != y));
        assert!(a.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn single_precision_sine() {
        let dims = GridDims::new(8, 8, 8).unwrap();
        let whole = LocalIndexRange::whole(dims.as_array());
        let single: Vec<f32> = synthesize(&dims, &whole, FieldKind::Sine, 0).unwrap();
        let double: Vec<f64> = synthesize(&dims, &whole, FieldKind::Sine, 0).unwrap();
        for (s, d) in single.iter().zip(double.iter()) {
            assert!((*s as f64 - d).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_based_or_oversized_ranges_are_rejected() {
        let dims = GridDims::new(4, 4, 4).unwrap();
        for range in [
            LocalIndexRange::new([0, 1, 1], [4, 4, 4]),
            LocalIndexRange::new([1, 2, 1], [4, 4, 4]),
        ] {
            for kind in [FieldKind::Sine, FieldKind::Normal] {
                assert!(matches!(
                    synthesize::<f64>(&dims, &range, kind, 0),
                    Err(SpectrumError::InvalidInput(_))
                ));
            }
        }
    }
}
