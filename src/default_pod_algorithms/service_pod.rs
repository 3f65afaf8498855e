//! Service pod: an interactive server working off a FIFO queue of requests.
//!
//! A request is assumed to be cheap in CPU terms and must be served within a single tick.
//! Requests waiting in the queue still hold a share (`SERVICE_CONTEXT_STORE_RATIO`) of their
//! memory. When the memory given to the pod is short, every request costs proportionally
//! more CPU time, modelling page faults.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::errors::{AdmissionError, ServiceError};
use crate::pod::{PodPhase, PodSpec};
use crate::pod_algorithm::{parse_state, PodAlgorithm, PodUsage, ResourceRequest};

pub const SIM_SERVICE_POD: &str = "SimServicePod";

/// Share of a request's memory held while it waits in the queue.
pub const SERVICE_CONTEXT_STORE_RATIO: f64 = 0.2;

/// Consecutive requests that may fail to find CPU time before the scan of the queue stops.
/// Bounds the tick cost and keeps the service order close to FIFO.
pub const MAX_PROBE: usize = 10;

/// Load and memory fraction reported on the initialization tick.
const BOOTSTRAP_LOAD: f64 = 0.5;

pub type RequestCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// One request delivered to a service pod.
#[derive(Clone)]
pub struct ServiceContext {
    pub request_id: u64,
    /// Invoked with `request_id` once the request is served.
    pub on_done: Option<RequestCallback>,
    /// CPU slot time needed to serve the request.
    pub slot_required: f64,
    /// Bytes needed while the request is being served.
    pub mem_required: u64,
}

impl ServiceContext {
    pub fn new(request_id: u64, slot_required: f64, mem_required: u64) -> Self {
        Self { request_id, on_done: None, slot_required, mem_required }
    }

    fn stored_mem(&self) -> u64 {
        (SERVICE_CONTEXT_STORE_RATIO * self.mem_required as f64) as u64
    }
}

/// Extra operations of pods serving requests, used by load-balancing controllers.
pub trait ServicePod {
    /// Current pressure in [0, 1]: the larger of the last load and memory fraction.
    fn get_load(&self) -> f64;

    fn deliver_request(&mut self, ctx: ServiceContext) -> Result<(), ServiceError>;

    /// Hands back every request not yet served, in arrival order.
    fn return_unhandled_requests(&mut self) -> Vec<ServiceContext>;

    fn queue_len(&self) -> usize;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimServicePodArgs {
    /// Bytes needed to run the service at all.
    #[serde(default)]
    pub base_mem: u64,
}

#[derive(Default)]
pub struct ServicePodAlgorithm {
    initialized: bool,
    base_mem: u64,
    last_used_mem: u64,
    last_available_mem: u64,
    last_load: f64,
    last_mem_usage: f64,
    queue: VecDeque<ServiceContext>,
    mark_terminate: bool,
    outcome: Option<PodPhase>,
}

impl ServicePodAlgorithm {
    pub fn new(base_mem: u64) -> Self {
        Self { base_mem, ..Default::default() }
    }

    pub fn factory(spec: &PodSpec) -> Result<Box<dyn PodAlgorithm>, AdmissionError> {
        let args: SimServicePodArgs = parse_state(spec)?;
        Ok(Box::new(Self::new(args.base_mem)))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn bootstrap(&mut self, available_mem: u64) -> PodUsage {
        self.last_used_mem = self.base_mem;
        self.last_available_mem = available_mem;
        self.last_load = BOOTSTRAP_LOAD;
        self.last_mem_usage = fraction(self.base_mem, available_mem);
        self.initialized = true;
        PodUsage::new(BOOTSTRAP_LOAD, self.base_mem.min(available_mem))
    }
}

impl ServicePod for ServicePodAlgorithm {
    fn get_load(&self) -> f64 {
        if !self.initialized {
            return 0.0;
        }
        self.last_load.max(self.last_mem_usage)
    }

    fn deliver_request(&mut self, ctx: ServiceContext) -> Result<(), ServiceError> {
        if !self.initialized {
            return Err(ServiceError::Initializing);
        }
        let free = self.last_available_mem.saturating_sub(self.last_used_mem);
        if free <= ctx.stored_mem() {
            return Err(ServiceError::Denial);
        }
        self.queue.push_back(ctx);
        Ok(())
    }

    fn return_unhandled_requests(&mut self) -> Vec<ServiceContext> {
        self.queue.drain(..).collect()
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl PodAlgorithm for ServicePodAlgorithm {
    fn resource_request(&self) -> ResourceRequest {
        let cpu: f64 = self.queue.iter().map(|ctx| ctx.slot_required).sum();
        let mem: u64 = self.queue.iter().map(|ctx| ctx.mem_required).sum();
        // a core is needed as soon as there is any work queued
        ResourceRequest { cpu: cpu.ceil(), mem: mem + self.base_mem }
    }

    fn tick(&mut self, slots: &[f64], available_mem: u64) -> PodUsage {
        if self.mark_terminate {
            self.outcome = Some(PodPhase::Succeeded);
            return PodUsage::new(0.0, 0);
        }
        if !self.initialized {
            return self.bootstrap(available_mem);
        }

        let mem_required = self.base_mem + self.queue.iter().map(|ctx| ctx.mem_required).sum::<u64>();
        let slot_multiplier = memory_shortage_penalty(available_mem, mem_required);

        let mut free_cpus: BinaryHeap<FreeCpu> = slots.iter().enumerate()
            .map(|(cpu_idx, &slot)| FreeCpu { cpu_idx, start_time: 0.0, time_remain: slot })
            .collect();
        // largest single request served on each cpu
        let mut max_mem_used = vec![0u64; slots.len()];
        let mut used_cpu = vec![false; slots.len()];

        let mut probe_failed = 0;
        let mut idx = 0;
        while probe_failed < MAX_PROBE && idx < self.queue.len() {
            let slot_required = slot_multiplier * self.queue[idx].slot_required;
            let Some(mut cpu) = take_earliest_capable(&mut free_cpus, slot_required) else {
                probe_failed += 1;
                idx += 1;
                continue;
            };
            probe_failed = 0;

            cpu.time_remain -= slot_required;
            cpu.start_time += slot_required;
            used_cpu[cpu.cpu_idx] = true;

            let Some(ctx) = self.queue.remove(idx) else {
                break;
            };
            max_mem_used[cpu.cpu_idx] = max_mem_used[cpu.cpu_idx].max(ctx.mem_required);
            free_cpus.push(cpu);
            if let Some(on_done) = &ctx.on_done {
                on_done(ctx.request_id);
            }
        }

        let mut total_available = 0.0;
        let mut total_unused = 0.0;
        for cpu in free_cpus.iter().filter(|cpu| used_cpu[cpu.cpu_idx]) {
            total_available += slots[cpu.cpu_idx];
            total_unused += cpu.time_remain;
        }
        let load = if total_available > 0.0 {
            (total_available - total_unused) / total_available
        } else {
            0.0
        };

        let mut mem_usage: u64 = max_mem_used.iter().sum();
        mem_usage += self.queue.iter().map(ServiceContext::stored_mem).sum::<u64>();
        mem_usage += self.base_mem;
        // whatever does not fit is considered swapped out
        let mem_usage = mem_usage.min(available_mem);

        self.last_mem_usage = fraction(mem_usage, available_mem);
        self.last_load = load;
        self.last_available_mem = available_mem;
        self.last_used_mem = mem_usage;

        PodUsage::new(load, mem_usage)
    }

    fn terminate(&mut self) {
        self.mark_terminate = true;
    }

    fn outcome(&self) -> Option<PodPhase> {
        self.outcome
    }

    fn as_service(&mut self) -> Option<&mut dyn ServicePod> {
        Some(self)
    }
}

/// Multiplier applied to the CPU cost of requests when memory is short. The pod is expected
/// to fit in the store ratio of its available memory, every byte above that budget makes
/// requests slower.
pub fn memory_shortage_penalty(mem_available: u64, mem_needed: u64) -> f64 {
    let budget = (SERVICE_CONTEXT_STORE_RATIO * mem_available as f64) as u64;
    if mem_needed <= budget {
        return 1.0;
    }
    if mem_available == 0 {
        return f64::INFINITY;
    }
    1.0 + (mem_needed - budget) as f64 / mem_available as f64
}

fn fraction(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64
}

/// Pops the earliest available cpu that still has `slot_required` time left. Cpus skipped on
/// the way are put back.
fn take_earliest_capable(free_cpus: &mut BinaryHeap<FreeCpu>, slot_required: f64) -> Option<FreeCpu> {
    let mut cannot_use = Vec::new();
    let mut capable = None;
    while let Some(cpu) = free_cpus.pop() {
        if cpu.time_remain >= slot_required {
            capable = Some(cpu);
            break;
        }
        cannot_use.push(cpu);
    }
    free_cpus.extend(cannot_use);
    capable
}

#[derive(Clone, Debug)]
struct FreeCpu {
    cpu_idx: usize,
    start_time: f64,
    time_remain: f64,
}

// BinaryHeap is a max-heap: the cpu with the earliest start time (then the lowest index)
// must compare as the greatest.
impl Ord for FreeCpu {
    fn cmp(&self, other: &Self) -> Ordering {
        other.start_time.total_cmp(&self.start_time)
            .then_with(|| other.cpu_idx.cmp(&self.cpu_idx))
    }
}

impl PartialOrd for FreeCpu {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FreeCpu {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FreeCpu {}
