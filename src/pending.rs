//! Pods waiting for a placement decision.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use crate::pod::PodId;

/// Set of pods announced to the placement collaborator and not yet bound or reported
/// unschedulable. The driver waits on it, with a deadline, before ticking the nodes.
#[derive(Default)]
pub struct PendingPlacements {
    pods: Mutex<BTreeSet<PodId>>,
    resolved: Condvar,
}

impl PendingPlacements {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns `false` if the pod was already pending.
    pub fn insert(&self, id: &str) -> bool {
        self.pods.lock().insert(id.to_string())
    }

    /// Marks the placement of the pod as done, whatever its result.
    pub fn resolve(&self, id: &str) -> bool {
        let removed = self.pods.lock().remove(id);
        if removed {
            self.resolved.notify_all();
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pods.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.pods.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.lock().is_empty()
    }

    /// Waits until no placement is outstanding or `timeout` elapses. Returns the pods still
    /// pending, they stay in the set and are carried over to the next attempt.
    pub fn wait_timeout(&self, timeout: Duration) -> Vec<PodId> {
        let deadline = Instant::now() + timeout;
        let mut pods = self.pods.lock();
        while !pods.is_empty() {
            if self.resolved.wait_until(&mut pods, deadline).timed_out() {
                break;
            }
        }
        pods.iter().cloned().collect()
    }
}
