use crate::error::{Result, SpectrumError};
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;

/// The 2D process grid the transform engine decomposes over.
/// `dim0 * dim1` is always the number of ranks it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    dim0: usize,
    dim1: usize,
}

impl ProcessGrid {
    pub fn new(dim0: usize, dim1: usize) -> Result<ProcessGrid> {
        if dim0 == 0 || dim1 == 0 {
            return Err(SpectrumError::config(format!(
                "process grid {} x {} has an empty axis",
                dim0, dim1
            )));
        }
        Ok(ProcessGrid { dim0, dim1 })
    }

    pub fn dim0(&self) -> usize {
        self.dim0
    }

    pub fn dim1(&self) -> usize {
        self.dim1
    }

    pub fn size(&self) -> usize {
        self.dim0 * self.dim1
    }

    /// Fails unless the grid covers exactly `nprocs` ranks. Must be checked
    /// before anything collective runs on this grid.
    pub fn ensure_matches(&self, nprocs: usize) -> Result<()> {
        if self.size() != nprocs {
            return Err(SpectrumError::config(format!(
                "process grid {} has {} slots but {} processes were launched",
                self,
                self.size(),
                nprocs
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ProcessGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.dim0, self.dim1)
    }
}

/// Largest divisor of `n` not above `sqrt(n)`, paired with its cofactor.
pub fn near_square_factors(n: usize) -> (usize, usize) {
    let mut best = 1;
    let mut d = 1;
    while d * d <= n {
        if n % d == 0 {
            best = d;
        }
        d += 1;
    }
    (best, n / best)
}

/// Picks the process grid for `total_procs` ranks.
///
/// * `ndim == 1` gives the degenerate `1 x P` grid.
/// * `ndim == 2` with a hint trusts the first hint value and recomputes the
///   second from it; the first value has to divide `total_procs`.
/// * `ndim == 2` without a hint uses the most square factorisation, smaller
///   factor first.
pub fn select_grid(
    total_procs: usize,
    ndim: u32,
    hint: Option<(usize, usize)>,
) -> Result<ProcessGrid> {
    if total_procs == 0 {
        return Err(SpectrumError::config("process count must be positive"));
    }
    match ndim {
        1 => ProcessGrid::new(1, total_procs),
        2 => match hint {
            Some((h0, h1)) => {
                if h0 == 0 {
                    return Err(SpectrumError::config(
                        "process grid hint has a zero first dimension",
                    ));
                }
                if h0.checked_mul(h1) == Some(total_procs) {
                    return ProcessGrid::new(h0, h1);
                }
                if total_procs % h0 != 0 {
                    return Err(SpectrumError::config(format!(
                        "process grid hint {} x {} does not fit {} processes: {} does not divide {}",
                        h0, h1, total_procs, h0, total_procs
                    )));
                }
                ProcessGrid::new(h0, total_procs / h0)
            }
            None => {
                let (mut d0, mut d1) = near_square_factors(total_procs);
                if d0 > d1 {
                    std::mem::swap(&mut d0, &mut d1);
                }
                ProcessGrid::new(d0, d1)
            }
        },
        other => Err(SpectrumError::config(format!(
            "decomposition dimensionality must be 1 or 2, got {}",
            other
        ))),
    }
}

/// Reads a grid hint file: two integers on the first line. A missing file
/// is not an error, it just means there is no hint.
pub fn read_hint_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<(usize, usize)>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    info!("Reading proc. grid from file {}", path.display());
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not open grid hint file {}", path.display()))?;
    parse_hint(&contents)
        .with_context(|| format!("Could not parse grid hint file {}", path.display()))
        .map(Some)
}

pub(crate) fn parse_hint(contents: &str) -> anyhow::Result<(usize, usize)> {
    let vals = contents
        .split_whitespace()
        .take(2)
        .map(|v| v.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match vals[..] {
        [d0, d1] => Ok((d0, d1)),
        _ => Err(anyhow::Error::msg("expected two integers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_is_degenerate() {
        let grid = select_grid(12, 1, None).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (1, 12));
        // the hint is ignored for slabs
        let grid = select_grid(12, 1, Some((3, 4))).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (1, 12));
    }

    #[test]
    fn automatic_is_near_square() {
        let grid = select_grid(12, 2, None).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (3, 4));
        let grid = select_grid(16, 2, None).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (4, 4));
        let grid = select_grid(7, 2, None).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (1, 7));
        let grid = select_grid(1, 2, None).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (1, 1));
    }

    #[test]
    fn exact_hint_is_used_as_is() {
        let grid = select_grid(12, 2, Some((6, 2))).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (6, 2));
    }

    #[test]
    fn hint_second_value_is_recomputed() {
        let grid = select_grid(12, 2, Some((2, 5))).unwrap();
        assert_eq!((grid.dim0(), grid.dim1()), (2, 6));
    }

    #[test]
    fn hint_not_dividing_is_rejected() {
        let err = select_grid(12, 2, Some((5, 3))).unwrap_err();
        assert!(matches!(err, SpectrumError::InvalidConfiguration(_)));
        let err = select_grid(12, 2, Some((0, 12))).unwrap_err();
        assert!(matches!(err, SpectrumError::InvalidConfiguration(_)));
    }

    #[test]
    fn bad_arguments() {
        assert!(matches!(
            select_grid(0, 2, None),
            Err(SpectrumError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            select_grid(8, 3, None),
            Err(SpectrumError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            select_grid(8, 0, None),
            Err(SpectrumError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn process_count_mismatch() {
        let grid = ProcessGrid::new(2, 3).unwrap();
        assert!(grid.ensure_matches(6).is_ok());
        assert!(matches!(
            grid.ensure_matches(4),
            Err(SpectrumError::InvalidConfiguration(_))
        ));
        assert!(ProcessGrid::new(0, 3).is_err());
    }

    #[test]
    fn hint_parsing() {
        assert_eq!(parse_hint("2 8\n").unwrap(), (2, 8));
        assert_eq!(parse_hint("  4\t4  extra").unwrap(), (4, 4));
        assert!(parse_hint("4").is_err());
        assert!(parse_hint("a b").is_err());
    }

    #[test]
    fn hint_file() {
        let dir = std::env::temp_dir().join(format!("pencil_spectrum_dims_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dims");
        assert_eq!(read_hint_file(&path).unwrap(), None);
        fs::write(&path, "3 5\n").unwrap();
        assert_eq!(read_hint_file(&path).unwrap(), Some((3, 5)));
        fs::write(&path, "3\n").unwrap();
        assert!(read_hint_file(&path).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
