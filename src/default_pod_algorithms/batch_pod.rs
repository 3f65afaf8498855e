//! Batch pod: a fixed amount of work, always busy, static memory footprint.

use serde::{Deserialize, Serialize};
use crate::errors::AdmissionError;
use crate::pod::{PodPhase, PodSpec};
use crate::pod_algorithm::{parse_state, PodAlgorithm, PodUsage, ResourceRequest};

pub const BATCH_POD: &str = "BatchPod";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPodState {
    /// Bytes used while running.
    #[serde(default)]
    pub mem_usage: u64,
    /// Work left, in fully-used core ticks.
    #[serde(default)]
    pub total_tick: f64,
}

#[derive(Clone, Debug)]
pub struct BatchPodAlgorithm {
    cpu_limit: f64,
    mem_usage: u64,
    total_tick: f64,
    mark_terminate: bool,
    outcome: Option<PodPhase>,
}

impl BatchPodAlgorithm {
    pub fn new(cpu_limit: f64, mem_usage: u64, total_tick: f64) -> Self {
        Self {
            cpu_limit,
            mem_usage,
            total_tick,
            mark_terminate: false,
            outcome: None,
        }
    }

    pub fn factory(spec: &PodSpec) -> Result<Box<dyn PodAlgorithm>, AdmissionError> {
        let state: BatchPodState = parse_state(spec)?;
        Ok(Box::new(Self::new(spec.cpu_limit, state.mem_usage, state.total_tick)))
    }

    pub fn remaining_work(&self) -> f64 {
        self.total_tick
    }
}

impl PodAlgorithm for BatchPodAlgorithm {
    fn resource_request(&self) -> ResourceRequest {
        ResourceRequest { cpu: self.cpu_limit, mem: self.mem_usage }
    }

    fn tick(&mut self, slots: &[f64], available_mem: u64) -> PodUsage {
        if self.total_tick < 0.0 || self.mark_terminate {
            self.outcome = Some(PodPhase::Succeeded);
            return PodUsage::new(0.0, 0);
        }

        let mut slot_sum: f64 = slots.iter().sum();

        // uses what it is given, but never more than declared
        let mut mem_usage = self.mem_usage;
        if mem_usage > available_mem {
            mem_usage = available_mem;
            // not enough memory slows the progress down proportionally
            slot_sum *= available_mem as f64 / self.mem_usage as f64;
        }
        self.total_tick -= slot_sum;
        PodUsage::new(1.0, mem_usage)
    }

    fn terminate(&mut self) {
        self.mark_terminate = true;
    }

    fn outcome(&self) -> Option<PodPhase> {
        self.outcome
    }
}
