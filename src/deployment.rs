use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::pod::PodSpec;

/// Blueprint of the pods created by a controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub cpu_limit: f64,
    pub mem_limit: u64,
    pub algorithm: String,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PodTemplate {
    pub fn new(cpu_limit: f64, mem_limit: u64, algorithm: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
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

/// A named set of identical pods.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub pod_template: PodTemplate,
    pub replicas: usize,
}

impl Deployment {
    pub fn new(name: impl Into<String>, pod_template: PodTemplate, replicas: usize) -> Self {
        Self {
            name: name.into(),
            pod_template,
            replicas,
        }
    }

    pub fn create_new_replica(&self, id: u64) -> PodSpec {
        let mut spec = PodSpec::new(format!("{}-{}", self.name, id),
                                    self.pod_template.cpu_limit,
                                    self.pod_template.mem_limit,
                                    self.pod_template.algorithm.clone(),
                                    self.pod_template.state.clone());
        spec.labels = self.pod_template.labels.clone();
        spec
    }
}
