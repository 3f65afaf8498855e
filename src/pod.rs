//! Representation of the simulated pod (workload)

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::pod_algorithm::PodAlgorithm;

pub type PodId = String;

/// Pods are shared between the store and the node they run on.
pub type SharedPod = Arc<Mutex<Pod>>;

/// Pod phase
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl Display for PodPhase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "pending"),
            PodPhase::Running => write!(f, "running"),
            PodPhase::Succeeded => write!(f, "succeeded"),
            PodPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Declaration of a pod as submitted to the API server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub id: PodId,
    /// Whole part is the maximum number of parallel cores, fractional part caps the slice.
    pub cpu_limit: f64,
    /// Memory limit in bytes.
    pub mem_limit: u64,
    /// Name of the registered pod algorithm driving this pod.
    pub algorithm: String,
    /// Initial algorithm state, interpreted by the algorithm factory.
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PodSpec {
    pub fn new(id: impl Into<PodId>, cpu_limit: f64, mem_limit: u64, algorithm: impl Into<String>,
               state: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            cpu_limit,
            mem_limit,
            algorithm: algorithm.into(),
            state,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

pub struct Pod {
    pub id: PodId,
    pub cpu_limit: f64,
    pub mem_limit: u64,
    pub phase: PodPhase,
    pub node_name: Option<String>,
    /// Set when the placement collaborator could not find a node on its last attempt.
    pub unschedulable_reason: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub algorithm_name: String,
    pub algorithm: Box<dyn PodAlgorithm>,
}

impl Pod {
    pub fn new(spec: &PodSpec, algorithm: Box<dyn PodAlgorithm>) -> Self {
        Self {
            id: spec.id.clone(),
            cpu_limit: spec.cpu_limit,
            mem_limit: spec.mem_limit,
            phase: PodPhase::Pending,
            node_name: None,
            unschedulable_reason: None,
            labels: spec.labels.clone(),
            algorithm_name: spec.algorithm.clone(),
            algorithm,
        }
    }

    pub fn is_unbound_pending(&self) -> bool {
        self.phase == PodPhase::Pending && self.node_name.is_none()
    }

    pub fn snapshot(&self) -> PodSnapshot {
        PodSnapshot {
            id: self.id.clone(),
            cpu_limit: self.cpu_limit,
            mem_limit: self.mem_limit,
            phase: self.phase,
            node_name: self.node_name.clone(),
            unschedulable_reason: self.unschedulable_reason.clone(),
            labels: self.labels.clone(),
            algorithm: self.algorithm_name.clone(),
        }
    }
}

/// Plain copy of the pod state delivered to watchers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PodSnapshot {
    pub id: PodId,
    pub cpu_limit: f64,
    pub mem_limit: u64,
    pub phase: PodPhase,
    pub node_name: Option<String>,
    pub unschedulable_reason: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub algorithm: String,
}
