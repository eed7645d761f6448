use crate::comm::Communicator;
use crate::error::Result;
use std::time::{Duration, Instant};

/// Wall time spent in forward transforms over one run. Owned by the driver,
/// filled once per repetition and reduced only when the run is over.
#[derive(Debug, Clone, Default)]
pub struct TransformTimings {
    total: Duration,
    count: u32,
}

impl TransformTimings {
    pub fn new() -> TransformTimings {
        TransformTimings::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.count += 1;
    }

    /// Runs `f` and records how long it took.
    pub fn time<R, F: FnOnce() -> R>(&mut self, f: F) -> R {
        let start = Instant::now();
        let out = f();
        self.record(start.elapsed());
        out
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Mean seconds per recorded transform.
    pub fn per_loop(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() / self.count as f64
    }

    /// Slowest rank's time per loop, on `root` only. Collective.
    pub fn reduce_max<C: Communicator>(&self, comm: &C, root: usize) -> Result<Option<f64>> {
        comm.reduce_max(self.per_loop(), root)
    }
}
