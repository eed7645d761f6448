use crate::error::{Result, SpectrumError};
use crate::flds::{GridDims, LocalIndexRange};

/// Maps a stored frequency index back into the first Brillouin zone:
/// indices above the Nyquist midpoint stand for negative frequencies.
#[inline(always)]
pub fn fold(coord: i64, n: usize) -> i64 {
    let n = n as i64;
    if coord > n / 2 {
        n - coord
    } else {
        coord
    }
}

/// Folded integer wavenumbers along each axis of one spectral block.
pub struct WaveNumbers {
    pub k_x: Vec<i64>,
    pub k_y: Vec<i64>,
    pub k_z: Vec<i64>,
}

impl WaveNumbers {
    pub fn new(range: &LocalIndexRange, dims: &GridDims) -> Result<WaveNumbers> {
        let n = dims.as_array();
        let mut axes: [Vec<i64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (axis, k) in axes.iter_mut().enumerate() {
            // start is 1-based
            let offset = range.start[axis] as i64 - 1;
            *k = (0..range.size[axis] as i64)
                .map(|i| fold(offset + i, n[axis]))
                .collect();
            if let Some(bad) = k.iter().find(|&&v| v < 0) {
                return Err(SpectrumError::input(format!(
                    "negative wavenumber {} along axis {} (start {}, size {}, global {})",
                    bad, axis, range.start[axis], range.size[axis], n[axis]
                )));
            }
        }
        let [k_x, k_y, k_z] = axes;
        Ok(WaveNumbers { k_x, k_y, k_z })
    }
}
