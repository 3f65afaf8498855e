use cluster_sim::core_scheduler::{CoreScheduler, ReadyPod, RunEntity};
use cluster_sim::default_core_schedulers::fair_scheduler::FairScheduler;

fn ready_pods(count: usize, cpu_limit: f64, requested_cpu: f64) -> Vec<ReadyPod> {
    (0..count).map(|idx| ReadyPod::new(format!("pod-{}", idx), cpu_limit, requested_cpu)).collect()
}

fn empty_state(cores: usize) -> Vec<Vec<RunEntity>> {
    vec![Vec::new(); cores]
}

fn float_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.0001
}

#[test]
fn test_fair_scheduler_one_core_per_pod() {
    let state = FairScheduler::new().schedule(&ready_pods(10, 1.0, 1.0), &empty_state(10));
    assert_eq!(state.len(), 10);
    for (idx, queue) in state.iter().enumerate() {
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].pod, format!("pod-{}", idx));
        assert_eq!(queue[0].slot, 1.0);
    }
}

#[test]
fn test_fair_scheduler_single_core() {
    let state = FairScheduler::new().schedule(&ready_pods(10, 1.0, 1.0), &empty_state(1));
    assert_eq!(state.len(), 1);
    assert_eq!(state[0].len(), 10);
    assert!(state[0].iter().all(|entity| float_equals(entity.slot, 0.1)));
}

#[test]
fn test_fair_scheduler_without_cores() {
    let state = FairScheduler::new().schedule(&ready_pods(10, 1.0, 1.0), &empty_state(0));
    assert!(state.is_empty());
}

#[test]
fn test_fair_scheduler_uneven_split() {
    let state = FairScheduler::new().schedule(&ready_pods(10, 1.0, 1.0), &empty_state(4));
    let lengths: Vec<usize> = state.iter().map(|queue| queue.len()).collect();
    assert_eq!(lengths, vec![3, 3, 2, 2]);
    for queue in state.iter() {
        let slot = 1.0 / queue.len() as f64;
        assert!(queue.iter().all(|entity| float_equals(entity.slot, slot)));
    }
}

#[test]
fn test_fair_scheduler_caps_cores() {
    let ready = vec![
        // limit caps the request
        ReadyPod::new("limited", 2.5, 3.0),
        // fractional part of the request is ignored
        ReadyPod::new("fractional", 4.0, 1.7),
        // less than a core gets no core at all
        ReadyPod::new("idle", 1.0, 0.5),
        // node size caps the request
        ReadyPod::new("greedy", 16.0, 16.0),
    ];
    let state = FairScheduler::new().schedule(&ready, &empty_state(8));
    let cores_of = |id: &str| state.iter().flatten().filter(|entity| entity.pod == id).count();
    assert_eq!(cores_of("limited"), 2);
    assert_eq!(cores_of("fractional"), 1);
    assert_eq!(cores_of("idle"), 0);
    assert_eq!(cores_of("greedy"), 8);
}

#[test]
fn test_fair_scheduler_slots_fill_used_cores() {
    let scheduler = FairScheduler::new();
    for cores in 1..=8 {
        for pods in 0..=12 {
            for requested in [1.0, 2.0, 3.0] {
                let ready = ready_pods(pods, requested, requested);
                let state = scheduler.schedule(&ready, &empty_state(cores));
                assert_eq!(state.len(), cores);

                let expected: usize = ready.iter()
                    .map(|pod| (pod.requested_cpu.min(pod.cpu_limit) as usize).min(cores))
                    .sum();
                assert_eq!(state.iter().map(|queue| queue.len()).sum::<usize>(), expected);

                for queue in state.iter().filter(|queue| !queue.is_empty()) {
                    let total: f64 = queue.iter().map(|entity| entity.slot).sum();
                    assert!(float_equals(total, 1.0));
                }
            }
        }
    }
}

#[test]
fn test_fair_scheduler_ignores_prior_state() {
    let scheduler = FairScheduler::new();
    let ready = ready_pods(3, 2.0, 2.0);
    let first = scheduler.schedule(&ready, &empty_state(4));
    let second = scheduler.schedule(&ready, &first);
    assert_eq!(first, second);
}
