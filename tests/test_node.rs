use std::sync::Arc;
use parking_lot::Mutex;
use serde_json::json;
use cluster_sim::default_core_schedulers::fair_scheduler::{FairScheduler, FAIR_SCHEDULER};
use cluster_sim::default_pod_algorithms::batch_pod::{BatchPodAlgorithm, BATCH_POD};
use cluster_sim::errors::BindError;
use cluster_sim::metrics_aggregator::DEFAULT_WINDOWS;
use cluster_sim::node::{cpu_pressure_reduction, FinishedPod, Node, NodeSpec};
use cluster_sim::pod::{Pod, PodPhase, PodSpec, SharedPod};
use cluster_sim::pod_algorithm::{PodAlgorithm, PodUsage, ResourceRequest};

fn float_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.0001
}

fn new_node(cpu_cores: u32, memory: u64) -> Node {
    Node::new(&NodeSpec::new("node", cpu_cores, memory, FAIR_SCHEDULER), Arc::new(FairScheduler::new()), DEFAULT_WINDOWS)
}

fn running_pod(spec: &PodSpec, algorithm: Box<dyn PodAlgorithm>) -> SharedPod {
    let mut pod = Pod::new(spec, algorithm);
    pod.phase = PodPhase::Running;
    pod.node_name = Some("node".to_string());
    Arc::new(Mutex::new(pod))
}

fn batch_pod(id: &str, cpu_limit: f64, mem_limit: u64, mem_usage: u64, total_tick: f64) -> SharedPod {
    let spec = PodSpec::new(id, cpu_limit, mem_limit, BATCH_POD,
                            json!({"mem_usage": mem_usage, "total_tick": total_tick}));
    running_pod(&spec, Box::new(BatchPodAlgorithm::new(cpu_limit, mem_usage, total_tick)))
}

#[derive(Default)]
struct Recorded {
    slots: Vec<Vec<f64>>,
    available_mem: Vec<u64>,
    terminate_calls: usize,
}

/// Fully busy pod that never finishes by itself and records what it is given.
struct RecordingPod {
    request: ResourceRequest,
    recorded: Arc<Mutex<Recorded>>,
}

impl PodAlgorithm for RecordingPod {
    fn resource_request(&self) -> ResourceRequest {
        self.request
    }

    fn tick(&mut self, slots: &[f64], available_mem: u64) -> PodUsage {
        let mut recorded = self.recorded.lock();
        recorded.slots.push(slots.to_vec());
        recorded.available_mem.push(available_mem);
        PodUsage::new(1.0, available_mem)
    }

    fn terminate(&mut self) {
        self.recorded.lock().terminate_calls += 1;
    }

    fn outcome(&self) -> Option<PodPhase> {
        None
    }
}

fn recording_pod(id: &str, cpu: f64, mem_limit: u64) -> (SharedPod, Arc<Mutex<Recorded>>) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let algorithm = RecordingPod { request: ResourceRequest { cpu, mem: mem_limit }, recorded: recorded.clone() };
    let spec = PodSpec::new(id, cpu, mem_limit, "Recording", json!(null));
    (running_pod(&spec, Box::new(algorithm)), recorded)
}

#[test]
fn test_empty_node_tick() {
    let mut node = new_node(4, 1000);
    let tick = node.tick();
    assert_eq!(tick.metrics.cpu_usage, 0.0);
    assert_eq!(tick.metrics.mem_usage, 0.0);
    assert_eq!(tick.metrics.load, 0.0);
    assert!(tick.finished.is_empty());
    assert_eq!(node.cpu_state.len(), 4);
    assert!(node.last_metrics().is_some());
}

#[test]
fn test_node_metrics() {
    let mut node = new_node(8, 10_000);
    for idx in 0..10 {
        node.bind_pod(batch_pod(&format!("batch-{}", idx), 1.0, 500, 100, 1000.0)).unwrap();
    }
    let tick = node.tick();
    // ten single core pods share eight cores, all of them fully busy
    assert!(float_equals(tick.metrics.cpu_usage, 1.0));
    assert!(float_equals(tick.metrics.load, 10.0));
    assert!(float_equals(tick.metrics.mem_usage, 0.1));
    assert_eq!(node.cpu_state.iter().map(|queue| queue.len()).sum::<usize>(), 10);
    assert!(float_equals(node.last_cpu_usage, 1.0));
    assert!(float_equals(node.allocatable_cpu, 0.0));
    assert_eq!(node.allocatable_memory, 9000);
    assert_eq!(tick.period.cpu.last_tick, tick.metrics.cpu_usage);
}

#[test]
fn test_bind_twice() {
    let mut node = new_node(2, 1000);
    let pod = batch_pod("batch", 1.0, 100, 10, 10.0);
    node.bind_pod(pod.clone()).unwrap();
    assert_eq!(node.bind_pod(pod), Err(BindError::AlreadyBound { pod: "batch".to_string(), node: "node".to_string() }));
    assert_eq!(node.pod_count(), 1);
    assert!(node.has_pod("batch"));
}

#[test]
fn test_snapshot_sums_limits() {
    let mut node = new_node(4, 1000);
    node.bind_pod(batch_pod("a", 1.5, 300, 10, 10.0)).unwrap();
    node.bind_pod(batch_pod("b", 2.0, 200, 10, 10.0)).unwrap();
    let snapshot = node.snapshot();
    assert_eq!(snapshot.requested_cpu, 3.5);
    assert_eq!(snapshot.requested_memory, 500);
    assert_eq!(snapshot.pods, vec!["a".to_string(), "b".to_string()]);
    assert!(snapshot.can_place_pod(0.5, 500));
    assert!(!snapshot.can_place_pod(1.0, 100));
    assert!(!snapshot.can_place_pod(0.5, 501));
}

#[test]
fn test_cpu_pressure_reduction() {
    assert_eq!(cpu_pressure_reduction(0.0), 1.0);
    assert_eq!(cpu_pressure_reduction(0.69), 1.0);
    assert!(float_equals(cpu_pressure_reduction(0.7), 1.0));
    assert!(float_equals(cpu_pressure_reduction(0.9), 0.8));
    assert!(float_equals(cpu_pressure_reduction(1.0), 0.7));
    assert_eq!(cpu_pressure_reduction(2.0), 0.0);
}

#[test]
fn test_pressure_reduces_slots_but_not_accounting() {
    let mut node = new_node(1, 1000);
    let (pod, recorded) = recording_pod("pod", 1.0, 100);
    node.bind_pod(pod).unwrap();

    node.last_cpu_usage = 0.9;
    let tick = node.tick();
    assert!(float_equals(recorded.lock().slots[0][0], 0.8));
    // usage is computed from the scheduled slot
    assert!(float_equals(tick.metrics.cpu_usage, 1.0));

    // the node itself was fully busy, so the pressure keeps going
    node.tick();
    assert!(float_equals(recorded.lock().slots[1][0], 0.7));
}

#[test]
fn test_memory_grants_are_scaled_when_short() {
    let mut node = new_node(2, 900);
    let (first, first_recorded) = recording_pod("first", 1.0, 600);
    let (second, second_recorded) = recording_pod("second", 1.0, 600);
    node.bind_pod(first).unwrap();
    node.bind_pod(second).unwrap();

    let tick = node.tick();
    assert_eq!(first_recorded.lock().available_mem, vec![450]);
    assert_eq!(second_recorded.lock().available_mem, vec![450]);
    assert!(float_equals(tick.metrics.mem_usage, 1.0));

    let mut roomy = new_node(2, 2000);
    let (pod, recorded) = recording_pod("pod", 1.0, 600);
    roomy.bind_pod(pod).unwrap();
    roomy.tick();
    assert_eq!(recorded.lock().available_mem, vec![600]);
}

#[test]
fn test_pending_pods_are_not_ticked() {
    let mut node = new_node(1, 1000);
    let (pod, recorded) = recording_pod("pod", 1.0, 100);
    pod.lock().phase = PodPhase::Pending;
    node.bind_pod(pod).unwrap();
    let tick = node.tick();
    assert!(recorded.lock().slots.is_empty());
    assert_eq!(tick.metrics.load, 0.0);
}

#[test]
fn test_finished_pod_leaves_on_next_tick() {
    let mut node = new_node(1, 1000);
    node.bind_pod(batch_pod("batch", 1.0, 100, 10, 0.5)).unwrap();

    let tick = node.tick();
    assert!(tick.phase_changes.is_empty());
    // below zero now, so the next tick finishes it
    let tick = node.tick();
    assert_eq!(tick.phase_changes, vec![("batch".to_string(), PodPhase::Succeeded)]);
    assert!(node.has_pod("batch"));
    assert_eq!(tick.metrics.load, 0.0);

    let tick = node.tick();
    assert_eq!(tick.finished, vec![FinishedPod { id: "batch".to_string(), phase: PodPhase::Succeeded, deleted: false }]);
    assert!(!node.has_pod("batch"));
}

#[test]
fn test_delete_without_grace_is_immediate() {
    let mut node = new_node(1, 1000);
    node.bind_pod(batch_pod("batch", 1.0, 100, 10, 10.0)).unwrap();
    assert!(node.delete_pod("batch", 0));
    assert_eq!(node.pod_count(), 0);
    assert!(!node.delete_pod("batch", 0));
}

#[test]
fn test_delete_with_grace_lets_pod_terminate() {
    let mut node = new_node(1, 1000);
    node.bind_pod(batch_pod("batch", 1.0, 100, 10, 10.0)).unwrap();
    assert!(!node.delete_pod("batch", 5));
    assert!(node.is_deleting("batch"));

    let tick = node.tick();
    assert_eq!(tick.phase_changes, vec![("batch".to_string(), PodPhase::Succeeded)]);
    let tick = node.tick();
    assert_eq!(tick.finished, vec![FinishedPod { id: "batch".to_string(), phase: PodPhase::Succeeded, deleted: true }]);
    assert_eq!(node.pod_count(), 0);
    assert!(!node.is_deleting("batch"));
}

#[test]
fn test_grace_period_expires() {
    let mut node = new_node(1, 1000);
    let (pod, recorded) = recording_pod("stubborn", 1.0, 100);
    node.bind_pod(pod).unwrap();
    assert!(!node.delete_pod("stubborn", 2));
    assert_eq!(recorded.lock().terminate_calls, 1);

    // one more tick of grace, removed by force on the second one
    assert!(node.tick().finished.is_empty());
    let tick = node.tick();
    assert_eq!(tick.finished, vec![FinishedPod { id: "stubborn".to_string(), phase: PodPhase::Running, deleted: true }]);
    assert_eq!(recorded.lock().slots.len(), 1);
    assert_eq!(node.pod_count(), 0);
}

#[test]
fn test_single_grace_tick_removes_on_next_tick() {
    let mut node = new_node(1, 1000);
    let (pod, recorded) = recording_pod("stubborn", 1.0, 100);
    node.bind_pod(pod).unwrap();
    assert!(!node.delete_pod("stubborn", 1));

    let tick = node.tick();
    assert_eq!(tick.finished, vec![FinishedPod { id: "stubborn".to_string(), phase: PodPhase::Running, deleted: true }]);
    assert!(recorded.lock().slots.is_empty());
    assert_eq!(tick.metrics.load, 0.0);
}
