//! Intra-node distribution of CPU time slices among ready pods.

use crate::pod::PodId;

/// A pod placed on one CPU queue for one tick with its share of that CPU.
#[derive(Clone, Debug, PartialEq)]
pub struct RunEntity {
    pub pod: PodId,
    /// Time-slice fraction in [0, 1].
    pub slot: f64,
}

/// One queue of run entities per CPU core.
pub type CpuState = Vec<Vec<RunEntity>>;

/// What the core scheduler needs to know about a ready pod.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadyPod {
    pub id: PodId,
    pub cpu_limit: f64,
    pub requested_cpu: f64,
}

impl ReadyPod {
    pub fn new(id: impl Into<PodId>, cpu_limit: f64, requested_cpu: f64) -> Self {
        Self { id: id.into(), cpu_limit, requested_cpu }
    }
}

pub trait CoreScheduler: Send + Sync {
    /// Builds the cpu state of the next tick. `prior` has exactly one queue per core and holds
    /// what ran during the previous tick. Must be a pure function of its inputs.
    fn schedule(&self, ready: &[ReadyPod], prior: &[Vec<RunEntity>]) -> CpuState;
}
