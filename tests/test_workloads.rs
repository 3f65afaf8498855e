use std::sync::Arc;
use parking_lot::Mutex;
use serde_json::json;
use cluster_sim::default_pod_algorithms::batch_pod::{BatchPodAlgorithm, BATCH_POD};
use cluster_sim::default_pod_algorithms::service_pod::{ServiceContext, ServicePod, ServicePodAlgorithm, SIM_SERVICE_POD};
use cluster_sim::errors::{AdmissionError, ServiceError};
use cluster_sim::pod::{PodPhase, PodSpec};
use cluster_sim::pod_algorithm::{PodAlgorithm, PodUsage, ResourceRequest};
use cluster_sim::registry::Registry;

const GIB: u64 = 1 << 30;

fn float_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.0001
}

fn done_recorder() -> (Arc<Mutex<Vec<u64>>>, Arc<dyn Fn(u64) + Send + Sync>) {
    let done = Arc::new(Mutex::new(Vec::new()));
    let sink = done.clone();
    (done, Arc::new(move |id| sink.lock().push(id)))
}

fn request(id: u64, slot: f64, mem: u64, on_done: &Arc<dyn Fn(u64) + Send + Sync>) -> ServiceContext {
    let mut ctx = ServiceContext::new(id, slot, mem);
    ctx.on_done = Some(on_done.clone());
    ctx
}

fn bootstrapped_service(base_mem: u64, available_mem: u64) -> ServicePodAlgorithm {
    let mut service = ServicePodAlgorithm::new(base_mem);
    let usage = service.tick(&[1.0], available_mem);
    assert_eq!(usage, PodUsage::new(0.5, base_mem.min(available_mem)));
    assert!(service.is_initialized());
    service
}

#[test]
fn test_batch_pod_without_slots_makes_no_progress() {
    let mut batch = BatchPodAlgorithm::new(1.0, 100, 10.0);
    for _ in 0..5 {
        assert_eq!(batch.tick(&[], 1000), PodUsage::new(1.0, 100));
    }
    assert_eq!(batch.remaining_work(), 10.0);
    assert_eq!(batch.outcome(), None);
}

#[test]
fn test_batch_pod_runs_to_completion() {
    let mut batch = BatchPodAlgorithm::new(2.0, 100, 4.0);
    assert_eq!(batch.resource_request(), ResourceRequest { cpu: 2.0, mem: 100 });

    batch.tick(&[1.0, 1.0], 1000);
    batch.tick(&[1.0, 1.0], 1000);
    assert_eq!(batch.remaining_work(), 0.0);
    // no work left is not done yet, the pod only finishes once it went below zero
    assert_eq!(batch.tick(&[1.0, 1.0], 1000), PodUsage::new(1.0, 100));
    assert_eq!(batch.outcome(), None);

    assert_eq!(batch.tick(&[1.0, 1.0], 1000), PodUsage::new(0.0, 0));
    assert_eq!(batch.outcome(), Some(PodPhase::Succeeded));
}

#[test]
fn test_batch_pod_slows_down_without_memory() {
    let mut batch = BatchPodAlgorithm::new(1.0, 1000, 10.0);
    let usage = batch.tick(&[1.0], 500);
    assert_eq!(usage, PodUsage::new(1.0, 500));
    assert!(float_equals(batch.remaining_work(), 9.5));
}

#[test]
fn test_batch_pod_terminates() {
    let mut batch = BatchPodAlgorithm::new(1.0, 100, 1000.0);
    batch.tick(&[1.0], 1000);
    batch.terminate();
    assert_eq!(batch.tick(&[1.0], 1000), PodUsage::new(0.0, 0));
    assert_eq!(batch.outcome(), Some(PodPhase::Succeeded));
}

#[test]
fn test_batch_pod_factory() {
    let registry = Registry::default();
    let spec = PodSpec::new("batch", 1.0, GIB, BATCH_POD, json!({"mem_usage": 1024, "total_tick": 3.0}));
    let mut algorithm = registry.build_algorithm(&spec).unwrap();
    assert_eq!(algorithm.resource_request(), ResourceRequest { cpu: 1.0, mem: 1024 });
    assert!(algorithm.as_service().is_none());

    let broken = PodSpec::new("broken", 1.0, GIB, BATCH_POD, json!({"total_tick": "many"}));
    assert!(matches!(registry.build_algorithm(&broken), Err(AdmissionError::InvalidState { .. })));

    let unknown = PodSpec::new("unknown", 1.0, GIB, "NoSuchPod", json!(null));
    assert_eq!(registry.build_algorithm(&unknown).err(), Some(AdmissionError::UnknownAlgorithm("NoSuchPod".to_string())));
}

#[test]
fn test_service_pod_rejects_requests_while_initializing() {
    let mut service = ServicePodAlgorithm::new(0);
    assert_eq!(service.get_load(), 0.0);
    assert_eq!(service.deliver_request(ServiceContext::new(0, 0.1, 1)), Err(ServiceError::Initializing));
    assert_eq!(service.queue_len(), 0);
}

#[test]
fn test_service_pod_single_cpu() {
    let mut service = bootstrapped_service(0, GIB);

    // five small requests fit the cpu together
    let (done, on_done) = done_recorder();
    for id in 0..5 {
        service.deliver_request(request(id, 0.1, 1 << 10, &on_done)).unwrap();
    }
    let usage = service.tick(&[1.0], GIB);
    assert!(float_equals(usage.load, 0.5));
    assert_eq!(usage.mem_usage, 1 << 10);
    assert_eq!(*done.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(service.tick(&[1.0], GIB).load, 0.0);

    // two of them fit, the remaining two wait holding a fifth of their memory
    let (done, on_done) = done_recorder();
    service.deliver_request(request(0, 0.4, 1 << 10, &on_done)).unwrap();
    service.deliver_request(request(1, 0.4, 1 << 12, &on_done)).unwrap();
    service.deliver_request(request(2, 0.4, 1 << 10, &on_done)).unwrap();
    service.deliver_request(request(3, 0.5, 1 << 10, &on_done)).unwrap();

    let usage = service.tick(&[1.0], GIB);
    assert!(float_equals(usage.load, 0.8));
    assert_eq!(usage.mem_usage, 4504);
    assert_eq!(service.queue_len(), 2);

    let usage = service.tick(&[1.0], GIB);
    assert!(float_equals(usage.load, 0.9));
    assert_eq!(usage.mem_usage, 1 << 10);
    assert_eq!(*done.lock(), vec![0, 1, 2, 3]);

    assert_eq!(service.tick(&[1.0], GIB).load, 0.0);
}

#[test]
fn test_service_pod_probes_past_blocked_requests() {
    let mut service = bootstrapped_service(0, GIB);
    let (done, on_done) = done_recorder();
    for _ in 0..9 {
        service.deliver_request(request(0, 0.5, 0, &on_done)).unwrap();
    }
    service.deliver_request(request(1, 0.2, 0, &on_done)).unwrap();

    let usage = service.tick(&[0.3], 1 << 10);
    assert!(float_equals(usage.load, 0.2 / 0.3));
    assert_eq!(*done.lock(), vec![1]);
    assert_eq!(service.queue_len(), 9);
}

#[test]
fn test_service_pod_stops_probing_after_ten_failures() {
    let mut service = bootstrapped_service(0, GIB);
    let (done, on_done) = done_recorder();
    for _ in 0..10 {
        service.deliver_request(request(0, 0.5, 0, &on_done)).unwrap();
    }
    service.deliver_request(request(1, 0.2, 0, &on_done)).unwrap();

    let usage = service.tick(&[0.3], 1 << 10);
    assert_eq!(usage.load, 0.0);
    assert!(done.lock().is_empty());
    assert_eq!(service.queue_len(), 11);
}

#[test]
fn test_service_pod_denial_boundary() {
    // 150 bytes free, a 500 bytes request stores 100
    let mut service = bootstrapped_service(850, 1000);
    assert_eq!(service.deliver_request(ServiceContext::new(0, 0.1, 500)), Ok(()));

    // 100 bytes free is not enough
    let mut service = bootstrapped_service(900, 1000);
    assert_eq!(service.deliver_request(ServiceContext::new(0, 0.1, 500)), Err(ServiceError::Denial));
    assert_eq!(service.queue_len(), 0);
}

#[test]
fn test_service_pod_pays_for_missing_memory() {
    let mut service = bootstrapped_service(0, 1000);
    for id in 0..4 {
        service.deliver_request(ServiceContext::new(id, 0.2, 100)).unwrap();
    }
    // 400 bytes needed against a budget of 200: every request costs 1.2 times its slot
    let usage = service.tick(&[1.0], 1000);
    assert!(float_equals(usage.load, 0.96));
    assert_eq!(service.queue_len(), 0);
    assert_eq!(usage.mem_usage, 100);
}

#[test]
fn test_service_pod_base_memory_above_budget_slows_requests() {
    // 300 bytes of base memory are already over a fifth of the available 1000
    let mut service = bootstrapped_service(300, 1000);
    let (done, on_done) = done_recorder();
    service.deliver_request(request(0, 0.9, 0, &on_done)).unwrap();
    let usage = service.tick(&[1.0], 1000);
    assert!(float_equals(usage.load, 0.99));
    assert_eq!(usage.mem_usage, 300);
    assert_eq!(*done.lock(), vec![0]);

    // fits the cpu without the penalty, not with it
    let mut service = bootstrapped_service(300, 1000);
    service.deliver_request(request(1, 0.95, 0, &on_done)).unwrap();
    let usage = service.tick(&[1.0], 1000);
    assert_eq!(usage.load, 0.0);
    assert_eq!(service.queue_len(), 1);
    assert_eq!(*done.lock(), vec![0]);
}

#[test]
fn test_service_pod_load_and_resource_request() {
    let mut service = bootstrapped_service(250, 1000);
    assert!(float_equals(service.get_load(), 0.5));
    assert_eq!(service.resource_request(), ResourceRequest { cpu: 0.0, mem: 250 });

    for id in 0..3 {
        service.deliver_request(ServiceContext::new(id, 0.5, 10)).unwrap();
    }
    assert_eq!(service.resource_request(), ResourceRequest { cpu: 2.0, mem: 280 });

    // memory fraction wins over an idle cpu
    let mut service = bootstrapped_service(800, 1000);
    service.tick(&[1.0], 1000);
    assert!(float_equals(service.get_load(), 0.8));
}

#[test]
fn test_service_pod_returns_unhandled_requests_in_order() {
    let mut service = bootstrapped_service(0, GIB);
    for id in 0..5 {
        service.deliver_request(ServiceContext::new(id, 0.1, 1)).unwrap();
    }
    let returned: Vec<u64> = service.return_unhandled_requests().iter().map(|ctx| ctx.request_id).collect();
    assert_eq!(returned, vec![0, 1, 2, 3, 4]);
    assert_eq!(service.queue_len(), 0);
    assert!(service.return_unhandled_requests().is_empty());
}

#[test]
fn test_service_pod_terminates() {
    let mut service = bootstrapped_service(0, GIB);
    service.terminate();
    assert_eq!(service.tick(&[1.0], GIB), PodUsage::new(0.0, 0));
    assert_eq!(service.outcome(), Some(PodPhase::Succeeded));
}

#[test]
fn test_service_pod_factory() {
    let registry = Registry::default();
    let spec = PodSpec::new("service", 1.0, GIB, SIM_SERVICE_POD, json!({"base_mem": 4096}));
    let mut algorithm = registry.build_algorithm(&spec).unwrap();
    assert_eq!(algorithm.resource_request(), ResourceRequest { cpu: 0.0, mem: 4096 });
    assert!(algorithm.as_service().is_some());
}

struct IdlePod;

impl PodAlgorithm for IdlePod {
    fn resource_request(&self) -> ResourceRequest {
        ResourceRequest { cpu: 1.0, mem: 1 }
    }

    fn tick(&mut self, _slots: &[f64], _available_mem: u64) -> PodUsage {
        PodUsage::new(0.0, 0)
    }

    fn terminate(&mut self) {}

    fn outcome(&self) -> Option<PodPhase> {
        None
    }
}

#[test]
fn test_registry_accepts_new_algorithms() {
    let mut registry = Registry::default();
    assert!(!registry.has_algorithm("Idle"));
    registry.register_algorithm("Idle", Arc::new(|_spec: &PodSpec| -> Result<Box<dyn PodAlgorithm>, AdmissionError> {
        Ok(Box::new(IdlePod))
    }));
    assert!(registry.has_algorithm("Idle"));

    let spec = PodSpec::new("idle", 1.0, 1, "Idle", json!(null));
    let algorithm = registry.build_algorithm(&spec).unwrap();
    assert_eq!(algorithm.resource_request(), ResourceRequest { cpu: 1.0, mem: 1 });

    // registrations are local to the registry
    assert!(!Registry::default().has_algorithm("Idle"));
}
