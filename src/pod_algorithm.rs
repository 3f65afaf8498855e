//! Behaviour contract of a pod.

use std::sync::Arc;
use crate::default_pod_algorithms::service_pod::ServicePod;
use crate::errors::AdmissionError;
use crate::pod::{PodPhase, PodSpec};

/// Resources a pod wants for the next tick.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ResourceRequest {
    /// Cores wanted. Only the whole part is honoured by the core scheduler.
    pub cpu: f64,
    /// Bytes of memory wanted.
    pub mem: u64,
}

/// What a pod did with the slots it was given.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PodUsage {
    /// Share of the given slot time actually used, in [0, 1].
    pub load: f64,
    /// Bytes used, never above the memory the pod was given.
    pub mem_usage: u64,
}

impl PodUsage {
    pub fn new(load: f64, mem_usage: u64) -> Self {
        Self { load, mem_usage }
    }
}

/// A pod algorithm owns all behavioural state of a pod. New kinds of workload are added by
/// implementing this trait and registering a factory; nodes and core schedulers only talk
/// to this interface.
pub trait PodAlgorithm: Send {
    fn resource_request(&self) -> ResourceRequest;

    /// Runs one tick. `slots` holds one time-slice fraction per core the pod was scheduled
    /// on (possibly empty), `available_mem` the bytes the pod may use.
    fn tick(&mut self, slots: &[f64], available_mem: u64) -> PodUsage;

    /// Asks the pod to stop. It should reach a terminal phase on a following tick.
    fn terminate(&mut self);

    /// Terminal phase reached by the algorithm, `None` while it keeps running.
    fn outcome(&self) -> Option<PodPhase>;

    fn as_service(&mut self) -> Option<&mut dyn ServicePod> {
        None
    }
}

pub type PodAlgorithmFactory =
    Arc<dyn Fn(&PodSpec) -> Result<Box<dyn PodAlgorithm>, AdmissionError> + Send + Sync>;

/// Parses the initial state of a pod, treating a missing state as the default one.
pub fn parse_state<T>(spec: &PodSpec) -> Result<T, AdmissionError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if spec.state.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(spec.state.clone()).map_err(|err| AdmissionError::InvalidState {
        id: spec.id.clone(),
        message: err.to_string(),
    })
}
