//! Representation of the simulated node

use std::collections::BTreeMap;
use std::sync::Arc;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::Serialize;
use crate::core_scheduler::{CoreScheduler, CpuState, ReadyPod};
use crate::errors::BindError;
use crate::metrics_aggregator::{MetricsAggregator, PeriodMetrics, TickMetrics};
use crate::pod::{PodId, PodPhase, SharedPod};

/// CPU usage from which the pods start to feel contention.
pub const CPU_PRESSURE_THRESHOLD: f64 = 0.7;

/// Nodes are shared between the store, the placement worker (bind) and the driver (tick).
/// Lock order is always node, then pod.
pub type SharedNode = Arc<Mutex<Node>>;

/// Declaration of a node joining the cluster.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSpec {
    pub name: String,
    pub cpu_cores: u32,
    /// Memory capacity in bytes.
    pub memory: u64,
    /// Registered name of the core scheduler of the node.
    pub core_scheduler: String,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, cpu_cores: u32, memory: u64, core_scheduler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpu_cores,
            memory,
            core_scheduler: core_scheduler.into(),
        }
    }
}

struct ResidentPod {
    pod: SharedPod,
    cpu_limit: f64,
    mem_limit: u64,
}

/// Pod removed from the node during a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedPod {
    pub id: PodId,
    pub phase: PodPhase,
    /// The pod was being deleted, so it has to leave the store as well.
    pub deleted: bool,
}

/// Everything a node tick produced, applied to the store by the caller.
#[derive(Clone, Debug, Default)]
pub struct NodeTick {
    pub metrics: TickMetrics,
    pub period: PeriodMetrics,
    pub finished: Vec<FinishedPod>,
    /// Pods whose algorithm reached a terminal phase during this tick.
    pub phase_changes: Vec<(PodId, PodPhase)>,
}

pub struct Node {
    pub name: String,
    pub cpu_cores: u32,
    pub memory: u64,
    /// One queue per core, as scheduled for the last tick.
    pub cpu_state: CpuState,
    /// Cpu usage of the last tick in [0, 1], drives the pressure reduction.
    pub last_cpu_usage: f64,
    pub allocatable_cpu: f64,
    pub allocatable_memory: u64,
    pods: BTreeMap<PodId, ResidentPod>,
    /// Pods being deleted with the ticks left before they are removed by force.
    deleting_pods: BTreeMap<PodId, u64>,
    scheduler: Arc<dyn CoreScheduler>,
    aggregator: MetricsAggregator,
}

impl Node {
    pub fn new(spec: &NodeSpec, scheduler: Arc<dyn CoreScheduler>, metrics_windows: [usize; 3]) -> Self {
        Self {
            name: spec.name.clone(),
            cpu_cores: spec.cpu_cores,
            memory: spec.memory,
            cpu_state: vec![Vec::new(); spec.cpu_cores as usize],
            last_cpu_usage: 0.0,
            allocatable_cpu: spec.cpu_cores as f64,
            allocatable_memory: spec.memory,
            pods: BTreeMap::new(),
            deleting_pods: BTreeMap::new(),
            scheduler,
            aggregator: MetricsAggregator::new(metrics_windows),
        }
    }

    /// Makes the pod resident. The caller has already moved it to `Running`.
    pub fn bind_pod(&mut self, pod: SharedPod) -> Result<(), BindError> {
        let (id, cpu_limit, mem_limit) = {
            let pod = pod.lock();
            (pod.id.clone(), pod.cpu_limit, pod.mem_limit)
        };
        if self.pods.contains_key(&id) {
            return Err(BindError::AlreadyBound { pod: id, node: self.name.clone() });
        }
        debug!("Binding pod {} to node {}", id, self.name);
        self.pods.insert(id, ResidentPod { pod, cpu_limit, mem_limit });
        Ok(())
    }

    /// Starts the deletion of a resident pod. With no grace period the pod is removed at once
    /// and `true` is returned, otherwise the algorithm is asked to terminate. A pod still
    /// around when the countdown reaches zero, on its `grace_ticks`-th tick, is removed by force.
    pub fn delete_pod(&mut self, id: &str, grace_ticks: u64) -> bool {
        if grace_ticks == 0 {
            return self.evict_pod(id).is_some();
        }
        let Some(resident) = self.pods.get(id) else {
            return false;
        };
        resident.pod.lock().algorithm.terminate();
        self.deleting_pods.entry(id.to_string()).or_insert(grace_ticks);
        false
    }

    /// Removes a resident pod without giving it a chance to terminate.
    pub fn evict_pod(&mut self, id: &str) -> Option<SharedPod> {
        self.deleting_pods.remove(id);
        self.pods.remove(id).map(|resident| resident.pod)
    }

    pub fn has_pod(&self, id: &str) -> bool {
        self.pods.contains_key(id)
    }

    pub fn pod_ids(&self) -> Vec<PodId> {
        self.pods.keys().cloned().collect()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    pub fn is_deleting(&self, id: &str) -> bool {
        self.deleting_pods.contains_key(id)
    }

    pub fn last_metrics(&self) -> Option<PeriodMetrics> {
        self.aggregator.get()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.name.clone(),
            cpu_cores: self.cpu_cores,
            memory: self.memory,
            allocatable_cpu: self.allocatable_cpu,
            allocatable_memory: self.allocatable_memory,
            requested_cpu: self.pods.values().map(|resident| resident.cpu_limit).sum(),
            requested_memory: self.pods.values().map(|resident| resident.mem_limit).sum(),
            last_cpu_usage: self.last_cpu_usage,
            pods: self.pod_ids(),
        }
    }

    /// Runs one simulation step on this node.
    pub fn tick(&mut self) -> NodeTick {
        let mut result = NodeTick::default();

        // partition the resident pods
        let mut ready = Vec::new();
        let mut ready_pods = Vec::new();
        let mut removed = Vec::new();
        for (id, resident) in self.pods.iter() {
            let phase = resident.pod.lock().phase;
            let deleting = self.deleting_pods.contains_key(id);
            if phase.is_terminal() {
                removed.push(FinishedPod { id: id.clone(), phase, deleted: deleting });
                continue;
            }
            if let Some(ticks_left) = self.deleting_pods.get_mut(id) {
                *ticks_left = ticks_left.saturating_sub(1);
                if *ticks_left == 0 {
                    debug!("Grace period of pod {} on node {} expired", id, self.name);
                    removed.push(FinishedPod { id: id.clone(), phase, deleted: true });
                    continue;
                }
            }
            if phase == PodPhase::Running {
                let request = resident.pod.lock().algorithm.resource_request();
                ready.push(ReadyPod::new(id.clone(), resident.cpu_limit, request.cpu));
                ready_pods.push((resident.pod.clone(), resident.mem_limit));
            }
        }
        for finished in removed {
            self.evict_pod(&finished.id);
            result.finished.push(finished);
        }

        let cpu_state = self.scheduler.schedule(&ready, &self.cpu_state);
        let index: BTreeMap<&str, usize> = ready.iter().enumerate()
            .map(|(idx, pod)| (pod.id.as_str(), idx))
            .collect();
        let mut slots = vec![Vec::new(); ready.len()];
        for entity in cpu_state.iter().flatten() {
            if let Some(&idx) = index.get(entity.pod.as_str()) {
                slots[idx].push(entity.slot);
            }
        }

        let grants = self.grant_memory(ready_pods.iter().map(|(_, mem)| *mem).collect());
        let reduction = cpu_pressure_reduction(self.last_cpu_usage);

        let mut loads = vec![0.0; ready.len()];
        let mut mem_used = 0u64;
        let mut total_load = 0.0;
        for (idx, (pod, _)) in ready_pods.iter().enumerate() {
            // only the pod-facing slots are throttled, accounting uses the scheduled ones
            let reduced: Vec<f64> = slots[idx].iter().map(|slot| slot * reduction).collect();
            let mut pod = pod.lock();
            let usage = pod.algorithm.tick(&reduced, grants[idx]);
            trace!("Pod {} ticked with {:?}: {:?}", pod.id, reduced, usage);
            loads[idx] = usage.load;
            mem_used += usage.mem_usage.min(grants[idx]);
            total_load += usage.load;
            if let Some(outcome) = pod.algorithm.outcome() {
                if pod.phase != outcome {
                    pod.phase = outcome;
                    result.phase_changes.push((pod.id.clone(), outcome));
                }
            }
        }

        let mut cpu_used = 0.0;
        for entity in cpu_state.iter().flatten() {
            if let Some(&idx) = index.get(entity.pod.as_str()) {
                cpu_used += entity.slot * loads[idx];
            }
        }

        let cpu_usage = if self.cpu_cores > 0 { cpu_used / self.cpu_cores as f64 } else { 0.0 };
        let mem_usage = if self.memory > 0 { mem_used as f64 / self.memory as f64 } else { 0.0 };
        self.last_cpu_usage = cpu_usage.clamp(0.0, 1.0);
        self.allocatable_cpu = (self.cpu_cores as f64 - cpu_used).max(0.0);
        self.allocatable_memory = self.memory.saturating_sub(mem_used);
        self.cpu_state = cpu_state;

        result.metrics = TickMetrics { cpu_usage, mem_usage, load: total_load };
        result.period = self.aggregator.aggregate(result.metrics);
        debug!("Node {} ticked: cpu {:.3}, mem {:.3}, load {:.3}", self.name, cpu_usage, mem_usage, total_load);
        result
    }

    /// Every pod may use up to its memory limit while the node has room for all of them.
    /// Otherwise the grants are scaled down proportionally.
    fn grant_memory(&self, wanted: Vec<u64>) -> Vec<u64> {
        let total: u64 = wanted.iter().sum();
        if total <= self.memory {
            return wanted;
        }
        let ratio = self.memory as f64 / total as f64;
        wanted.into_iter().map(|mem| (mem as f64 * ratio) as u64).collect()
    }
}

/// Factor applied to the slots of every pod under cpu contention.
pub fn cpu_pressure_reduction(cpu_usage: f64) -> f64 {
    if cpu_usage >= CPU_PRESSURE_THRESHOLD {
        (1.0 - (cpu_usage - CPU_PRESSURE_THRESHOLD)).max(0.0)
    } else {
        1.0
    }
}

/// Plain copy of the node state delivered to watchers and placement algorithms.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub cpu_cores: u32,
    pub memory: u64,
    pub allocatable_cpu: f64,
    pub allocatable_memory: u64,
    /// Sum of the cpu limits of the resident pods.
    pub requested_cpu: f64,
    /// Sum of the memory limits of the resident pods.
    pub requested_memory: u64,
    pub last_cpu_usage: f64,
    pub pods: Vec<PodId>,
}

impl NodeSnapshot {
    pub fn can_place_pod(&self, cpu_limit: f64, mem_limit: u64) -> bool {
        self.requested_cpu + cpu_limit <= self.cpu_cores as f64
            && self.requested_memory + mem_limit <= self.memory
    }
}
