//! Load balancer in front of a set of service pods.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;
use crate::api_server::ApiServer;
use crate::controller::Controller;
use crate::default_controllers::replication_controller::ReplicationController;
use crate::default_pod_algorithms::service_pod::{ServiceContext, SimServicePodArgs, SIM_SERVICE_POD};
use crate::deployment::{Deployment, PodTemplate};
use crate::percentile::find_percentile;
use crate::pod::{PodPhase, PodSnapshot, SharedPod};

pub const LABEL_SERVICE: &str = "service";

/// Produces the requests arriving at the service during a tick.
pub type ServiceContextFactory = Box<dyn FnMut(u64) -> Vec<ServiceContext> + Send>;

/// Latency of the served requests, in ticks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct ServiceMetrics {
    pub served: usize,
    pub average: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

#[derive(Default)]
struct LatencyRecorder {
    arrival_tick: HashMap<u64, u64>,
    latencies: Vec<u64>,
    sum: u64,
}

#[derive(Clone)]
pub struct ServiceMetricsHandle(Arc<Mutex<LatencyRecorder>>);

impl ServiceMetricsHandle {
    pub fn metrics(&self) -> ServiceMetrics {
        let recorder = self.0.lock();
        if recorder.latencies.is_empty() {
            return ServiceMetrics::default();
        }
        let mut samples = recorder.latencies.clone();
        ServiceMetrics {
            served: samples.len(),
            average: recorder.sum as f64 / samples.len() as f64,
            p50: find_percentile(&mut samples, 50.0).unwrap_or_default(),
            p90: find_percentile(&mut samples, 90.0).unwrap_or_default(),
            p99: find_percentile(&mut samples, 99.0).unwrap_or_default(),
        }
    }
}

pub struct ServiceController {
    name: String,
    replication: ReplicationController,
    factory: ServiceContextFactory,
    backlog: VecDeque<ServiceContext>,
    tick: Arc<AtomicU64>,
    recorder: Arc<Mutex<LatencyRecorder>>,
}

impl ServiceController {
    /// `cpu_limit` and `mem_limit` apply to every service pod, `base_mem` is the memory the
    /// service needs when idle.
    pub fn new(name: impl Into<String>, replicas: usize, cpu_limit: f64, mem_limit: u64, base_mem: u64,
               grace_ticks: u64, factory: ServiceContextFactory) -> Self {
        let name = name.into();
        let state = serde_json::to_value(SimServicePodArgs { base_mem }).unwrap_or_default();
        let template = PodTemplate::new(cpu_limit, mem_limit, SIM_SERVICE_POD, state)
            .with_label(LABEL_SERVICE, name.clone());
        let deployment = Deployment::new(format!("service-{}", name), template, replicas);
        Self {
            name,
            replication: ReplicationController::new(deployment, grace_ticks),
            factory,
            backlog: VecDeque::new(),
            tick: Arc::new(AtomicU64::new(0)),
            recorder: Arc::new(Mutex::new(LatencyRecorder::default())),
        }
    }

    pub fn set_replicas(&mut self, replicas: usize) {
        self.replication.set_replicas(replicas);
    }

    pub fn terminate(&mut self) {
        self.replication.terminate();
    }

    /// Requests received and not handed to any pod yet.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn metrics(&self) -> ServiceMetrics {
        self.metrics_handle().metrics()
    }

    /// Handle reading the latency metrics after the controller was handed to the simulation.
    pub fn metrics_handle(&self) -> ServiceMetricsHandle {
        ServiceMetricsHandle(self.recorder.clone())
    }

    fn ready_pods(&self, api: &ApiServer) -> Vec<(PodSnapshot, SharedPod)> {
        // pods being scaled down are no longer owned and get no new requests
        self.replication.owned_pods().iter()
            .filter_map(|id| api.pod(id))
            .filter_map(|pod| {
                let snapshot = pod.lock().snapshot();
                let serves = snapshot.labels.get(LABEL_SERVICE) == Some(&self.name)
                    && snapshot.phase == PodPhase::Running
                    && snapshot.node_name.is_some();
                serves.then_some((snapshot, pod))
            })
            .collect()
    }

    fn accept_requests(&mut self, tick: u64) {
        let requests = (self.factory)(tick);
        if requests.is_empty() {
            return;
        }
        let mut recorder = self.recorder.lock();
        for mut request in requests {
            recorder.arrival_tick.insert(request.request_id, tick);
            request.on_done = Some(self.on_done());
            self.backlog.push_back(request);
        }
    }

    fn on_done(&self) -> Arc<dyn Fn(u64) + Send + Sync> {
        let tick = self.tick.clone();
        let recorder = self.recorder.clone();
        let name = self.name.clone();
        Arc::new(move |request_id| {
            let now = tick.load(Ordering::SeqCst);
            let mut recorder = recorder.lock();
            match recorder.arrival_tick.remove(&request_id) {
                Some(arrival) => {
                    let latency = now.saturating_sub(arrival);
                    recorder.latencies.push(latency);
                    recorder.sum += latency;
                }
                None => warn!("Service {}: no request {}", name, request_id),
            }
        })
    }

    /// Spreads the backlog so that every pod ends up with about the same queue length.
    fn dispatch(&mut self, pods: &[(PodSnapshot, SharedPod)]) {
        if pods.is_empty() || self.backlog.is_empty() {
            return;
        }
        let queued: usize = pods.iter()
            .map(|(_, pod)| pod.lock().algorithm.as_service().map_or(0, |service| service.queue_len()))
            .sum();
        let target = (queued + self.backlog.len()) / pods.len();

        for (snapshot, pod) in pods {
            let mut pod = pod.lock();
            let Some(service) = pod.algorithm.as_service() else {
                continue;
            };
            while service.queue_len() < target {
                let Some(request) = self.backlog.pop_front() else {
                    return;
                };
                if let Err(err) = service.deliver_request(request.clone()) {
                    warn!("Service {}: pod {} can not handle requests: {}", self.name, snapshot.id, err);
                    self.backlog.push_front(request);
                    break;
                }
            }
        }
    }

    /// Puts the unserved requests of pods that left the service back in front of the backlog.
    fn take_back(&mut self, pods: Vec<SharedPod>) {
        for pod in pods {
            let mut pod = pod.lock();
            if let Some(service) = pod.algorithm.as_service() {
                for request in service.return_unhandled_requests().into_iter().rev() {
                    self.backlog.push_front(request);
                }
            }
        }
    }
}

impl Controller for ServiceController {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, api: &ApiServer) {
        let released = self.replication.reconcile(api);
        self.take_back(released);

        let tick = self.tick.load(Ordering::SeqCst);
        self.accept_requests(tick);
        let pods = self.ready_pods(api);
        self.dispatch(&pods);
        debug!("Service {}: {} pods, {} requests waiting", self.name, pods.len(), self.backlog.len());

        self.tick.fetch_add(1, Ordering::SeqCst);
    }
}
