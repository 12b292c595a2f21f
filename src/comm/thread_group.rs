// src/comm/thread_group.rs
//! In-process stand-in for a distributed group: `n` communicators, one per
//! thread, that all-reduce through a shared accumulator guarded by a barrier.

use std::sync::{Arc, Barrier, Mutex, PoisonError};

use super::{Communicator, ExecutionContext};

struct Shared {
    barrier: Barrier,
    accumulator: Mutex<Vec<f64>>,
}

/// One member of a thread group. Move each member into its own thread.
#[derive(Clone)]
pub struct ThreadGroupComm {
    ctx: ExecutionContext,
    shared: Arc<Shared>,
}

impl ThreadGroupComm {
    /// Build `world_size` members sharing one reduction state.
    ///
    /// # Panics
    /// If `world_size == 0`.
    pub fn group(world_size: usize) -> Vec<Self> {
        assert!(world_size > 0, "ThreadGroupComm::group requires world_size > 0");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(world_size),
            accumulator: Mutex::new(Vec::new()),
        });
        (0..world_size)
            .map(|rank| Self {
                ctx: ExecutionContext::new(rank, world_size),
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadGroupComm {
    #[inline]
    fn context(&self) -> ExecutionContext {
        self.ctx
    }

    fn reduce_sum(&self, buffer: &mut [f64]) {
        // (1) deposit
        {
            let mut acc = self
                .shared
                .accumulator
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if acc.is_empty() {
                acc.extend_from_slice(buffer);
            } else {
                assert_eq!(
                    acc.len(),
                    buffer.len(),
                    "reduce_sum: members passed buffers of different length"
                );
                for (a, b) in acc.iter_mut().zip(buffer.iter()) {
                    *a += *b;
                }
            }
        }
        self.shared.barrier.wait();

        // (2) read back
        {
            let acc = self
                .shared
                .accumulator
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            buffer.copy_from_slice(&acc);
        }

        // (3) one member clears; nobody deposits again until the clear is visible
        if self.shared.barrier.wait().is_leader() {
            self.shared
                .accumulator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        self.shared.barrier.wait();
    }
}
