use super::{check_root, Communicator};
use crate::error::{Result, SpectrumError};
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::sync::{Arc, Barrier};
use std::thread;

type Slot = Option<Box<dyn Any + Send>>;

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// One rank's handle into an in-process world. Ranks run on their own
/// threads and meet at a shared barrier for every collective.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

/// Launches SPMD runs with one thread per rank.
pub struct ThreadWorld;

impl ThreadWorld {
    /// Builds the rank handles of a world of `size` ranks without starting
    /// any threads.
    pub fn handles(size: usize) -> Result<Vec<ThreadComm>> {
        if size == 0 {
            return Err(SpectrumError::config("a world needs at least one rank"));
        }
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        Ok((0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    /// Runs `f` on every rank of a fresh world and returns the per-rank
    /// results in rank order. Blocks until every rank has returned.
    pub fn run<R, F>(size: usize, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let handles = ThreadWorld::handles(size)?;
        let f = &f;
        thread::scope(|scope| {
            let mut joins = Vec::with_capacity(size);
            for comm in handles {
                let rank = comm.rank;
                let join = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || f(comm))
                    .map_err(|e| {
                        SpectrumError::collective(format!("could not start rank {}: {}", rank, e))
                    })?;
                joins.push(join);
            }
            joins
                .into_iter()
                .enumerate()
                .map(|(rank, join)| {
                    join.join()
                        .map_err(|_| SpectrumError::collective(format!("rank {} panicked", rank)))
                })
                .collect()
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn gather<T: Clone + Send + 'static>(&self, local: T, root: usize) -> Result<Option<Vec<T>>> {
        check_root(root, self.shared.size)?;
        let boxed: Box<dyn Any + Send> = Box::new(local);
        self.shared.slots.lock()[self.rank] = Some(boxed);
        self.barrier();
        let out = if self.rank == root {
            let taken: Vec<Slot> = self.shared.slots.lock().iter_mut().map(Option::take).collect();
            Some(unpack::<T>(taken))
        } else {
            None
        };
        // nobody may start the next collective before the root emptied the slots
        self.barrier();
        out.transpose()
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>, root: usize) -> Result<T> {
        check_root(root, self.shared.size)?;
        if self.rank == root {
            if let Some(v) = value {
                let boxed: Box<dyn Any + Send> = Box::new(v);
                self.shared.slots.lock()[root] = Some(boxed);
            }
        }
        self.barrier();
        let out = match &self.shared.slots.lock()[root] {
            Some(boxed) => boxed.downcast_ref::<T>().cloned().ok_or_else(|| {
                SpectrumError::collective(format!(
                    "broadcast element type mismatch: rank {} expected {}",
                    self.rank,
                    type_name::<T>()
                ))
            }),
            None => Err(SpectrumError::collective(
                "root did not supply a value to broadcast",
            )),
        };
        self.barrier();
        if self.rank == root {
            self.shared.slots.lock()[root] = None;
        }
        out
    }

    fn all_to_all<T: Clone + Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>> {
        let sent = outgoing.len();
        let staged: Vec<Option<T>> = outgoing.into_iter().map(Some).collect();
        let boxed: Box<dyn Any + Send> = Box::new(staged);
        self.shared.slots.lock()[self.rank] = Some(boxed);
        self.barrier();
        let incoming = if sent == self.shared.size {
            self.collect_incoming::<T>()
        } else {
            Err(SpectrumError::collective(format!(
                "rank {} staged {} messages for a world of {}",
                self.rank, sent, self.shared.size
            )))
        };
        // every rank is done reading before anyone frees its buffer
        self.barrier();
        self.shared.slots.lock()[self.rank] = None;

        let all_ok = self.all_agree(incoming.is_ok())?;
        let incoming = incoming?;
        if !all_ok {
            return Err(SpectrumError::collective(format!(
                "rank {}: another rank failed its all-to-all exchange",
                self.rank
            )));
        }
        Ok(incoming)
    }
}

impl ThreadComm {
    /// Takes this rank's message out of every staged send buffer.
    fn collect_incoming<T: 'static>(&self) -> Result<Vec<T>> {
        let mut slots = self.shared.slots.lock();
        let incoming = slots
            .iter_mut()
            .enumerate()
            .map(|(src, slot)| {
                slot.as_mut()
                    .and_then(|boxed| boxed.downcast_mut::<Vec<Option<T>>>())
                    .and_then(|staged| staged.get_mut(self.rank))
                    .and_then(Option::take)
                    .ok_or_else(|| {
                        SpectrumError::collective(format!(
                            "rank {} sent no {} to rank {}",
                            src,
                            type_name::<T>(),
                            self.rank
                        ))
                    })
            })
            .collect();
        incoming
    }
}

fn unpack<T: 'static>(taken: Vec<Slot>) -> Result<Vec<T>> {
    taken
        .into_iter()
        .enumerate()
        .map(|(rank, slot)| {
            let boxed = slot.ok_or_else(|| {
                SpectrumError::collective(format!("rank {} left no contribution", rank))
            })?;
            boxed.downcast::<T>().map(|v| *v).map_err(|_| {
                SpectrumError::collective(format!(
                    "rank {} contributed a different element type than {}",
                    rank,
                    type_name::<T>()
                ))
            })
        })
        .collect()
}
