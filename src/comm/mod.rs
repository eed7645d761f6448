//! Collective operations between the ranks of an SPMD run.
//!
//! Every method here is collective: all ranks of the world have to call it,
//! in the same order, or the run blocks. There are no timeouts.

use crate::error::{Result, SpectrumError};
use std::ops::AddAssign;

pub mod threads;
pub use threads::{ThreadComm, ThreadWorld};

pub trait Communicator {
    /// This rank's index, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the world.
    fn size(&self) -> usize;

    fn barrier(&self);

    /// Collects one value from every rank onto `root`, in rank order.
    /// Non-root ranks get `None`.
    fn gather<T: Clone + Send + 'static>(&self, local: T, root: usize) -> Result<Option<Vec<T>>>;

    /// Hands the root's value to every rank. Only the root's `value` is read.
    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>, root: usize) -> Result<T>;

    /// Sends `outgoing[r]` to rank `r` and returns what every rank sent here,
    /// indexed by source rank. `outgoing` must hold one message per rank.
    /// A failure on any rank is returned on every rank.
    fn all_to_all<T: Clone + Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>>;

    fn all_gather<T: Clone + Send + 'static>(&self, local: T) -> Result<Vec<T>> {
        check_root(0, self.size())?;
        // the root's verdict travels with the data so every rank sees it
        let gathered = self.gather(local, 0).transpose();
        self.broadcast(gathered, 0)?
    }

    /// Element-wise sum across ranks, delivered to `root` only.
    ///
    /// The root adds contributions in rank order, so the result does not depend
    /// on which rank arrived first. A mismatch found on the root is returned on
    /// every rank.
    fn reduce_sum<T>(&self, local: &[T], root: usize) -> Result<Option<Vec<T>>>
    where
        T: Copy + AddAssign + Send + 'static,
    {
        check_root(root, self.size())?;
        let summed = match self.gather(local.to_vec(), root) {
            Ok(parts) => parts.map(sum_in_rank_order),
            Err(e) => Some(Err(e)),
        };
        let verdict = summed
            .as_ref()
            .map(|s| s.as_ref().map(|_| ()).map_err(Clone::clone));
        self.broadcast(verdict, root)??;
        summed.transpose()
    }

    fn reduce_max(&self, local: f64, root: usize) -> Result<Option<f64>> {
        Ok(self
            .gather(local, root)?
            .map(|vals| vals.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    }

    /// True on every rank iff `ok` was true on every rank. Used so that a
    /// local failure never leaves peers waiting inside a later collective.
    fn all_agree(&self, ok: bool) -> Result<bool> {
        Ok(self.all_gather(ok)?.into_iter().all(|v| v))
    }
}

fn sum_in_rank_order<T: Copy + AddAssign>(parts: Vec<Vec<T>>) -> Result<Vec<T>> {
    let mut parts = parts.into_iter().enumerate();
    let mut total = match parts.next() {
        Some((_, first)) => first,
        None => return Err(SpectrumError::collective("sum over an empty world")),
    };
    for (rank, part) in parts {
        if part.len() != total.len() {
            return Err(SpectrumError::collective(format!(
                "rank {} contributed {} values to a sum of length {}",
                rank,
                part.len(),
                total.len()
            )));
        }
        for (t, p) in total.iter_mut().zip(part) {
            *t += p;
        }
    }
    Ok(total)
}

/// World of one rank. Every collective is a local copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn gather<T: Clone + Send + 'static>(&self, local: T, root: usize) -> Result<Option<Vec<T>>> {
        check_root(root, 1)?;
        Ok(Some(vec![local]))
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>, root: usize) -> Result<T> {
        check_root(root, 1)?;
        value.ok_or_else(|| SpectrumError::collective("root did not supply a value to broadcast"))
    }

    fn all_to_all<T: Clone + Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>> {
        if outgoing.len() != 1 {
            return Err(SpectrumError::collective(format!(
                "all-to-all needs one message per rank, got {} for a world of 1",
                outgoing.len()
            )));
        }
        Ok(outgoing)
    }
}

pub(crate) fn check_root(root: usize, size: usize) -> Result<()> {
    if root >= size {
        return Err(SpectrumError::collective(format!(
            "root rank {} outside world of size {}",
            root, size
        )));
    }
    Ok(())
}
