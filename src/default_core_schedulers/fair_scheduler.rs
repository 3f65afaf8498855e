use crate::core_scheduler::{CoreScheduler, CpuState, ReadyPod, RunEntity};

pub const FAIR_SCHEDULER: &str = "fairScheduler";

/// Completely fair scheduler: pods are spread round-robin over the cores and every core is
/// split equally among the pods queued on it. Priorities are ignored, as is the fractional
/// part of the requested cpu.
#[derive(Default)]
pub struct FairScheduler;

impl FairScheduler {
    pub fn new() -> Self {
        Default::default()
    }
}

impl CoreScheduler for FairScheduler {
    fn schedule(&self, ready: &[ReadyPod], prior: &[Vec<RunEntity>]) -> CpuState {
        let total_cpu = prior.len();
        let mut state: CpuState = vec![Vec::new(); total_cpu];
        if ready.is_empty() || total_cpu == 0 {
            return state;
        }

        let mut cpu_idx = 0;
        for pod in ready {
            let cores = pod.requested_cpu.min(pod.cpu_limit).min(total_cpu as f64).max(0.0) as usize;
            for _ in 0..cores {
                state[cpu_idx].push(RunEntity { pod: pod.id.clone(), slot: 0.0 });
                cpu_idx = (cpu_idx + 1) % total_cpu;
            }
        }

        for queue in state.iter_mut().filter(|queue| !queue.is_empty()) {
            let slot = 1.0 / queue.len() as f64;
            for entity in queue.iter_mut() {
                entity.slot = slot;
            }
        }
        state
    }
}
