//! Name lookup of pod algorithms and core schedulers.
//!
//! A registry is an explicit value handed to the simulation when it is assembled, so that
//! independent simulations (and tests running in parallel) never share registrations.

use std::collections::HashMap;
use std::sync::Arc;
use crate::core_scheduler::CoreScheduler;
use crate::default_core_schedulers::fair_scheduler::{FairScheduler, FAIR_SCHEDULER};
use crate::default_pod_algorithms::batch_pod::{BatchPodAlgorithm, BATCH_POD};
use crate::default_pod_algorithms::service_pod::{ServicePodAlgorithm, SIM_SERVICE_POD};
use crate::errors::AdmissionError;
use crate::pod::PodSpec;
use crate::pod_algorithm::{PodAlgorithm, PodAlgorithmFactory};

#[derive(Clone)]
pub struct Registry {
    algorithms: HashMap<String, PodAlgorithmFactory>,
    core_schedulers: HashMap<String, Arc<dyn CoreScheduler>>,
}

impl Default for Registry {
    /// Registry with the default pod algorithms and the fair core scheduler.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_algorithm(BATCH_POD, Arc::new(BatchPodAlgorithm::factory));
        registry.register_algorithm(SIM_SERVICE_POD, Arc::new(ServicePodAlgorithm::factory));
        registry.register_core_scheduler(FAIR_SCHEDULER, Arc::new(FairScheduler::new()));
        registry
    }
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn empty() -> Self {
        Self {
            algorithms: HashMap::new(),
            core_schedulers: HashMap::new(),
        }
    }

    /// Registers (or replaces) the factory building pods of algorithm `name`.
    pub fn register_algorithm(&mut self, name: impl Into<String>, factory: PodAlgorithmFactory) {
        self.algorithms.insert(name.into(), factory);
    }

    pub fn register_core_scheduler(&mut self, name: impl Into<String>, scheduler: Arc<dyn CoreScheduler>) {
        self.core_schedulers.insert(name.into(), scheduler);
    }

    pub fn has_algorithm(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn build_algorithm(&self, spec: &PodSpec) -> Result<Box<dyn PodAlgorithm>, AdmissionError> {
        let factory = self.algorithms.get(&spec.algorithm)
            .ok_or_else(|| AdmissionError::UnknownAlgorithm(spec.algorithm.clone()))?;
        factory(spec)
    }

    pub fn core_scheduler(&self, name: &str) -> Result<Arc<dyn CoreScheduler>, AdmissionError> {
        self.core_schedulers.get(name)
            .cloned()
            .ok_or_else(|| AdmissionError::UnknownCoreScheduler(name.to_string()))
    }
}
