//! Representation of the API server: the state store of the cluster.
//!
//! Holds every node and pod, validates admissions, carries out binds, deletions and evictions
//! and announces every change on the `nodes` and `pods` topics of the event bus.

use std::collections::BTreeMap;
use std::sync::Arc;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use crate::errors::{AdmissionError, BindError, BusError, SimulationError, StoreError};
use crate::event_bus::{EventBus, Watch};
use crate::events::watch::{EventKind, WatchEvent};
use crate::metrics_aggregator::{validate_windows, DEFAULT_WINDOWS};
use crate::node::{Node, NodeSnapshot, NodeSpec, NodeTick, SharedNode};
use crate::pending::PendingPlacements;
use crate::pod::{Pod, PodPhase, PodSnapshot, PodSpec, SharedPod};
use crate::registry::Registry;
use crate::store::ObjectStore;

pub const NODES_TOPIC: &str = "nodes";
pub const PODS_TOPIC: &str = "pods";

pub struct ApiServer {
    nodes: RwLock<ObjectStore<SharedNode>>,
    pods: RwLock<ObjectStore<SharedPod>>,
    bus: EventBus<WatchEvent>,
    pending: PendingPlacements,
    registry: Registry,
    metrics_windows: [usize; 3],
}

impl ApiServer {
    /// Fails when a metrics window is empty, before any node aggregator gets built with it.
    pub fn new(registry: Registry, metrics_windows: [usize; 3], subscriber_buffer: Option<usize>)
               -> Result<Self, SimulationError> {
        validate_windows(&metrics_windows)?;
        let bus = EventBus::new(subscriber_buffer);
        bus.new_topic(NODES_TOPIC)?;
        bus.new_topic(PODS_TOPIC)?;
        Ok(Self {
            nodes: RwLock::new(ObjectStore::new(|node| node.lock().name.clone())),
            pods: RwLock::new(ObjectStore::new(|pod| pod.lock().id.clone())),
            bus,
            pending: PendingPlacements::new(),
            registry,
            metrics_windows,
        })
    }

    pub fn with_registry(registry: Registry) -> Result<Self, SimulationError> {
        Self::new(registry, DEFAULT_WINDOWS, None)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingPlacements {
        &self.pending
    }

    pub fn bus(&self) -> &EventBus<WatchEvent> {
        &self.bus
    }

    // PODS //

    /// Admits a new pod. It enters the store as `Pending` and is announced to the placement
    /// collaborator.
    pub fn create_pod(&self, spec: PodSpec) -> Result<(), AdmissionError> {
        if !(spec.cpu_limit > 0.0) || !spec.cpu_limit.is_finite() {
            return Err(AdmissionError::InvalidCpuLimit { id: spec.id.clone(), value: spec.cpu_limit });
        }
        if spec.mem_limit == 0 {
            return Err(AdmissionError::InvalidMemLimit { id: spec.id.clone() });
        }
        let algorithm = self.registry.build_algorithm(&spec)?;
        let pod = Pod::new(&spec, algorithm);
        let snapshot = pod.snapshot();
        {
            let mut pods = self.pods.write();
            if pods.get_by_key(&spec.id).is_some() {
                return Err(AdmissionError::Duplicate(spec.id.clone()));
            }
            pods.add(Arc::new(Mutex::new(pod)))
                .map_err(|_| AdmissionError::Duplicate(spec.id.clone()))?;
        }
        self.pending.insert(&spec.id);
        info!("Created pod {} ({})", spec.id, spec.algorithm);
        self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Added, snapshot));
        Ok(())
    }

    /// Places a pending pod on a node and marks it `Running`.
    pub fn bind(&self, pod_id: &str, node_name: &str) -> Result<(), BindError> {
        let pod = self.pod(pod_id).ok_or_else(|| BindError::UnknownPod(pod_id.to_string()))?;
        let node = self.node(node_name).ok_or_else(|| BindError::UnknownNode(node_name.to_string()))?;

        let (pod_snapshot, node_snapshot) = {
            let mut node = node.lock();
            {
                let pod = pod.lock();
                if let Some(bound_to) = &pod.node_name {
                    return Err(BindError::AlreadyBound { pod: pod_id.to_string(), node: bound_to.clone() });
                }
                if pod.phase != PodPhase::Pending {
                    return Err(BindError::NotPending(pod_id.to_string()));
                }
            }
            node.bind_pod(pod.clone())?;
            let mut pod = pod.lock();
            pod.node_name = Some(node_name.to_string());
            pod.phase = PodPhase::Running;
            pod.unschedulable_reason = None;
            (pod.snapshot(), node.snapshot())
        };

        self.pending.resolve(pod_id);
        info!("Bound pod {} to node {}", pod_id, node_name);
        self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, pod_snapshot));
        self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Modified, node_snapshot));
        Ok(())
    }

    /// "Schedule failed" notification of the placement collaborator. The pod stays pending and
    /// is retried on the next tick.
    pub fn report_unschedulable(&self, pod_id: &str, reason: &str) -> Result<(), BindError> {
        let pod = self.pod(pod_id).ok_or_else(|| BindError::UnknownPod(pod_id.to_string()))?;
        let snapshot = {
            let mut pod = pod.lock();
            if !pod.is_unbound_pending() {
                return Err(BindError::NotPending(pod_id.to_string()));
            }
            pod.unschedulable_reason = Some(reason.to_string());
            pod.snapshot()
        };
        self.pending.resolve(pod_id);
        warn!("Pod {} is unschedulable: {}", pod_id, reason);
        self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, snapshot));
        Ok(())
    }

    /// Deletes a pod. Unbound pods and pods deleted with no grace period leave the store at once,
    /// the others are asked to terminate and leave when their node reports them.
    pub fn delete_pod(&self, pod_id: &str, grace_ticks: u64) -> Result<(), StoreError> {
        let pod = self.pod(pod_id).ok_or_else(|| StoreError::NotFound(pod_id.to_string()))?;
        let node_name = pod.lock().node_name.clone();
        let node = node_name.as_deref().and_then(|name| self.node(name));

        let immediate = match &node {
            Some(node) => {
                let mut node = node.lock();
                !node.has_pod(pod_id) || node.delete_pod(pod_id, grace_ticks)
            }
            None => true,
        };
        if !immediate {
            debug!("Pod {} is terminating, grace period {} ticks", pod_id, grace_ticks);
            return Ok(());
        }

        self.remove_pod_from_store(pod_id)?;
        if let Some(node) = node {
            let snapshot = node.lock().snapshot();
            self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Modified, snapshot));
        }
        Ok(())
    }

    /// Takes a pod off its node and sends it back to placement.
    pub fn evict_pod(&self, pod_id: &str) -> Result<(), StoreError> {
        let pod = self.pod(pod_id).ok_or_else(|| StoreError::NotFound(pod_id.to_string()))?;
        let node_name = pod.lock().node_name.clone();
        let node_snapshot = node_name.as_deref()
            .and_then(|name| self.node(name))
            .map(|node| {
                let mut node = node.lock();
                node.evict_pod(pod_id);
                node.snapshot()
            });

        let snapshot = {
            let mut pod = pod.lock();
            if pod.phase.is_terminal() {
                return Ok(());
            }
            pod.phase = PodPhase::Pending;
            pod.node_name = None;
            self.pending.insert(pod_id);
            pod.snapshot()
        };
        info!("Evicted pod {} from node {}", pod_id, node_name.unwrap_or_default());
        self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, snapshot));
        if let Some(node_snapshot) = node_snapshot {
            self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Modified, node_snapshot));
        }
        Ok(())
    }

    pub fn pod(&self, pod_id: &str) -> Option<SharedPod> {
        self.pods.read().get_by_key(pod_id)
    }

    pub fn pod_snapshot(&self, pod_id: &str) -> Option<PodSnapshot> {
        self.pod(pod_id).map(|pod| pod.lock().snapshot())
    }

    pub fn list_pods(&self) -> Vec<SharedPod> {
        self.pods.read().list()
    }

    pub fn pod_snapshots(&self) -> Vec<PodSnapshot> {
        self.list_pods().iter().map(|pod| pod.lock().snapshot()).collect()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.read().len()
    }

    /// Re-announces every pod still waiting for a node. Returns how many there are.
    pub fn retry_unplaced(&self) -> usize {
        // entering the pending set under the pod lock keeps a concurrent bind from being missed
        let unplaced: Vec<PodSnapshot> = self.list_pods().iter()
            .map(|pod| pod.lock())
            .filter(|pod| pod.is_unbound_pending())
            .map(|pod| {
                self.pending.insert(&pod.id);
                pod.snapshot()
            })
            .collect();
        for snapshot in unplaced.iter() {
            self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, snapshot.clone()));
        }
        if !unplaced.is_empty() {
            debug!("Retrying placement of {} pods", unplaced.len());
        }
        unplaced.len()
    }

    // NODES //

    pub fn add_node(&self, spec: NodeSpec) -> Result<(), AdmissionError> {
        if spec.cpu_cores == 0 || spec.memory == 0 {
            return Err(AdmissionError::InvalidNode(spec.name.clone()));
        }
        let scheduler = self.registry.core_scheduler(&spec.core_scheduler)?;
        let node = Node::new(&spec, scheduler, self.metrics_windows);
        let snapshot = node.snapshot();
        {
            let mut nodes = self.nodes.write();
            if nodes.get_by_key(&spec.name).is_some() {
                return Err(AdmissionError::DuplicateNode(spec.name.clone()));
            }
            nodes.add(Arc::new(Mutex::new(node)))
                .map_err(|_| AdmissionError::DuplicateNode(spec.name.clone()))?;
        }
        info!("Node {} joined: {} cores, {} bytes", spec.name, spec.cpu_cores, spec.memory);
        self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Added, snapshot));
        Ok(())
    }

    /// Removes an empty node from the cluster.
    pub fn remove_node(&self, name: &str) -> Result<(), StoreError> {
        let node = self.node(name).ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let snapshot = {
            let node = node.lock();
            if node.pod_count() > 0 {
                return Err(StoreError::NodeNotEmpty { name: name.to_string(), pods: node.pod_count() });
            }
            node.snapshot()
        };
        self.nodes.write().delete_by_key(name)?;
        info!("Node {} left", name);
        self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Deleted, snapshot));
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<SharedNode> {
        self.nodes.read().get_by_key(name)
    }

    pub fn list_nodes(&self) -> Vec<SharedNode> {
        self.nodes.read().list()
    }

    pub fn node_snapshot(&self, name: &str) -> Option<NodeSnapshot> {
        self.node(name).map(|node| node.lock().snapshot())
    }

    pub fn node_snapshots(&self) -> BTreeMap<String, NodeSnapshot> {
        self.list_nodes().iter()
            .map(|node| {
                let snapshot = node.lock().snapshot();
                (snapshot.name.clone(), snapshot)
            })
            .collect()
    }

    /// Carries the outcome of a node tick over to the store and its watchers.
    pub fn apply_node_tick(&self, node_name: &str, tick: &NodeTick) {
        for (pod_id, phase) in tick.phase_changes.iter() {
            debug!("Pod {} reached phase {}", pod_id, phase);
            if let Some(snapshot) = self.pod_snapshot(pod_id) {
                self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, snapshot));
            }
        }
        for finished in tick.finished.iter() {
            if finished.deleted {
                if let Err(err) = self.remove_pod_from_store(&finished.id) {
                    debug!("Pod {} already gone: {}", finished.id, err);
                }
            } else if let Some(snapshot) = self.pod_snapshot(&finished.id) {
                info!("Pod {} finished on node {} ({})", finished.id, node_name, finished.phase);
                self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Modified, snapshot));
            }
        }
        if let Some(snapshot) = self.node_snapshot(node_name) {
            self.publish(NODES_TOPIC, WatchEvent::node(EventKind::Modified, snapshot));
        }
    }

    // WATCHES //

    pub fn watch_pods(&self) -> Result<Watch<WatchEvent>, BusError> {
        self.bus.subscribe(PODS_TOPIC)
    }

    pub fn watch_nodes(&self) -> Result<Watch<WatchEvent>, BusError> {
        self.bus.subscribe(NODES_TOPIC)
    }

    /// Stops the event bus. Watch channels close, which ends the placement worker.
    pub fn shutdown(&self) {
        self.bus.shutdown();
    }

    fn remove_pod_from_store(&self, pod_id: &str) -> Result<(), StoreError> {
        let pod = self.pods.write().delete_by_key(pod_id)?;
        self.pending.resolve(pod_id);
        let snapshot = pod.lock().snapshot();
        info!("Deleted pod {}", pod_id);
        self.publish(PODS_TOPIC, WatchEvent::pod(EventKind::Deleted, snapshot));
        Ok(())
    }

    fn publish(&self, topic: &str, event: WatchEvent) {
        match self.bus.publish(topic, event) {
            Ok(()) => {}
            Err(BusError::Shutdown) => debug!("Dropped {} event, event bus is shut down", topic),
            Err(err) => error!("Can't publish {} event: {}", topic, err),
        }
    }
}
