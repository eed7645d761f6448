use crate::error::{Result, SpectrumError};
use std::fmt;

pub mod synth;
pub mod wave_num;

pub use synth::{synthesize, FieldKind};
pub use wave_num::WaveNumbers;

pub struct Pos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

/// Global resolution of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
}

impl GridDims {
    pub fn new(size_x: usize, size_y: usize, size_z: usize) -> Result<GridDims> {
        if size_x == 0 || size_y == 0 || size_z == 0 {
            return Err(SpectrumError::config(format!(
                "grid dimensions must be positive, got ({} {} {})",
                size_x, size_y, size_z
            )));
        }
        Ok(GridDims {
            size_x,
            size_y,
            size_z,
        })
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.size_x, self.size_y, self.size_z]
    }

    pub fn total(&self) -> usize {
        self.size_x * self.size_y * self.size_z
    }

    /// Extents of the real-to-complex output: only `size_x / 2 + 1`
    /// frequencies are kept along x.
    pub fn spectral_extent(&self) -> [usize; 3] {
        [self.size_x / 2 + 1, self.size_y, self.size_z]
    }

    /// Largest radial shell, `round(sqrt(Nx^2 + Ny^2 + Nz^2) / 2)`.
    pub fn kmax(&self) -> usize {
        let sum: f64 = self
            .as_array()
            .iter()
            .map(|&n| (n as f64) * (n as f64))
            .sum();
        (sum.sqrt() * 0.5).round() as usize
    }
}

impl fmt::Display for GridDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.size_x, self.size_y, self.size_z)
    }
}

/// Which of the two layouts a transform engine keeps a field in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Physical space, real scalars.
    Real,
    /// Wavenumber space, complex coefficients.
    Spectral,
}

/// One rank's block of the global index space.
///
/// `start` is 1-based and `end` is inclusive, so `end = start + size - 1`
/// along every axis. Buffers over the block are stored x fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalIndexRange {
    pub start: [usize; 3],
    pub size: [usize; 3],
    pub end: [usize; 3],
}

impl LocalIndexRange {
    pub fn new(start: [usize; 3], size: [usize; 3]) -> LocalIndexRange {
        let mut end = [0; 3];
        for axis in 0..3 {
            end[axis] = (start[axis] + size[axis]).saturating_sub(1);
        }
        LocalIndexRange { start, size, end }
    }

    /// The block covering all of `extent`.
    pub fn whole(extent: [usize; 3]) -> LocalIndexRange {
        LocalIndexRange::new([1, 1, 1], extent)
    }

    pub fn volume(&self) -> usize {
        self.size.iter().product()
    }

    pub fn get_index(&self, pos: Pos) -> usize {
        // Position of a local point in a flat buffer.
        // x runs fastest, then y, then z:
        //
        //        z = 0                z = 1
        // ---------------------  ---------------------
        // | [0] | [1] | [2] |    | [6] | [7] | [8] |
        // | y 0 | y 0 | y 0 |    | y 0 | y 0 | y 0 |
        // ---------------------  ---------------------
        // | [3] | [4] | [5] |    | [9] | [10]| [11]|
        // | y 1 | y 1 | y 1 |    | y 1 | y 1 | y 1 |
        // ---------------------  ---------------------
        debug_assert!(pos.x < self.size[0]);
        debug_assert!(pos.y < self.size[1]);
        debug_assert!(pos.z < self.size[2]);

        pos.x + self.size[0] * (pos.y + self.size[1] * pos.z)
    }

    /// True when the block lies inside `extent` under the 1-based convention.
    pub fn fits(&self, extent: [usize; 3]) -> bool {
        (0..3).all(|axis| {
            self.size[axis] == 0 || (self.start[axis] >= 1 && self.end[axis] <= extent[axis])
        })
    }
}
