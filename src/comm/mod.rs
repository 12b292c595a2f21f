// src/comm/mod.rs
/*!
Process-level **execution context** and the single **all-reduce seam**.

Every estimator combines its per-process partial sums through
[`Communicator::reduce_sum`] and nothing else; no estimator ever sends
point-to-point messages. This keeps the numerics testable against
[`SerialComm`] and lets [`ThreadGroupComm`] emulate several processes with
threads.

# Contract
- `reduce_sum` is **collective and blocking**: every member of the group must
  call it the same number of times with buffers of the same length.
- On return, every member's buffer holds the element-wise sum over members.
*/

pub mod thread_group;

pub use thread_group::ThreadGroupComm;

use serde::{Deserialize, Serialize};

/// Rank and size of the process group an estimator call runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub rank: usize,
    pub world_size: usize,
}

impl ExecutionContext {
    /// Panics if `rank >= world_size`.
    #[inline]
    pub fn new(rank: usize, world_size: usize) -> Self {
        assert!(
            rank < world_size,
            "ExecutionContext requires rank < world_size; got rank={rank}, world_size={world_size}"
        );
        Self { rank, world_size }
    }

    /// Rank 0 of a single-member group.
    #[inline]
    pub fn serial() -> Self {
        Self { rank: 0, world_size: 1 }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    #[inline]
    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::serial()
    }
}

/// Collective sum over all members of a process group.
pub trait Communicator: Send + Sync {
    fn context(&self) -> ExecutionContext;

    /// In-place element-wise sum over every member of the group.
    fn reduce_sum(&self, buffer: &mut [f64]);

    /// Convenience for a single scalar.
    #[inline]
    fn reduce_sum_scalar(&self, value: f64) -> f64 {
        let mut buf = [value];
        self.reduce_sum(&mut buf);
        buf[0]
    }
}

/// A group of one. Reductions are the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    #[inline]
    fn context(&self) -> ExecutionContext {
        ExecutionContext::serial()
    }

    #[inline]
    fn reduce_sum(&self, _buffer: &mut [f64]) {}
}
