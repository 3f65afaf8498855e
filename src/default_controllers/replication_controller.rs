use std::collections::BTreeSet;
use log::{debug, info, warn};
use crate::api_server::ApiServer;
use crate::controller::Controller;
use crate::deployment::Deployment;
use crate::pod::{PodId, SharedPod};

pub const LABEL_REPLICATION_CONTROLLER: &str = "replication-controller";

/// Keeps a fixed number of live pods of a deployment, replacing the ones that terminate or
/// disappear.
pub struct ReplicationController {
    name: String,
    deployment: Deployment,
    grace_ticks: u64,
    owned: BTreeSet<PodId>,
    next_replica: u64,
    terminated: bool,
}

impl ReplicationController {
    pub fn new(deployment: Deployment, grace_ticks: u64) -> Self {
        let name = format!("replication-controller-{}", deployment.name);
        let mut deployment = deployment;
        deployment.pod_template.labels.insert(LABEL_REPLICATION_CONTROLLER.to_string(), name.clone());
        Self {
            name,
            deployment,
            grace_ticks,
            owned: BTreeSet::new(),
            next_replica: 0,
            terminated: false,
        }
    }

    pub fn replicas(&self) -> usize {
        self.deployment.replicas
    }

    pub fn set_replicas(&mut self, replicas: usize) {
        self.deployment.replicas = replicas;
    }

    /// Deletes every owned pod on the next tick and stops creating new ones.
    pub fn terminate(&mut self) {
        self.terminated = true;
        self.deployment.replicas = 0;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn owned_pods(&self) -> Vec<PodId> {
        self.owned.iter().cloned().collect()
    }

    /// Brings the number of live owned pods to the wanted count. Returns the pods that left
    /// the deployment, finished or deleted to scale down, so that their owner may take back
    /// their work.
    pub fn reconcile(&mut self, api: &ApiServer) -> Vec<SharedPod> {
        // forget pods that are gone, clean up the finished ones
        let mut finished = Vec::new();
        self.owned.retain(|id| match api.pod_snapshot(id) {
            Some(pod) if pod.phase.is_terminal() => {
                finished.push(id.clone());
                false
            }
            Some(_) => true,
            None => false,
        });
        let mut released = Vec::new();
        for id in finished {
            debug!("{}: replacing finished pod {}", self.name, id);
            if let Some(pod) = api.pod(&id) {
                released.push(pod);
            }
            if let Err(err) = api.delete_pod(&id, 0) {
                debug!("{}: pod {} already gone: {}", self.name, id, err);
            }
        }

        let mut deleted = Vec::new();
        while self.owned.len() > self.deployment.replicas {
            let Some(id) = self.owned.pop_last() else {
                break;
            };
            if let Some(pod) = api.pod(&id) {
                deleted.push(pod);
            }
            if let Err(err) = api.delete_pod(&id, self.grace_ticks) {
                warn!("{}: can't delete pod {}: {}", self.name, id, err);
            }
        }

        while self.owned.len() < self.deployment.replicas {
            self.next_replica += 1;
            let spec = self.deployment.create_new_replica(self.next_replica);
            let id = spec.id.clone();
            match api.create_pod(spec) {
                Ok(()) => {
                    self.owned.insert(id);
                }
                Err(err) => {
                    warn!("{}: can't create pod {}: {}", self.name, id, err);
                    break;
                }
            }
        }

        if !deleted.is_empty() {
            info!("{}: scaled down by {} pods", self.name, deleted.len());
        }
        released.extend(deleted);
        released
    }
}

impl Controller for ReplicationController {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, api: &ApiServer) {
        self.reconcile(api);
    }
}
