//! Reference placement collaborator running on its own thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use log::{debug, error, warn};
use crate::api_server::{ApiServer, PODS_TOPIC};
use crate::errors::BusError;
use crate::events::watch::EventKind;
use crate::placement_algorithm::{select_node, PlacementAlgorithm};
use crate::pod::{PodPhase, PodSnapshot};

/// Watches the `pods` topic and binds every pod waiting for placement to the node chosen by
/// the placement algorithm, or reports it unschedulable. Exits when the event bus shuts down.
pub struct PlacementWorker {
    handle: Option<JoinHandle<()>>,
}

impl PlacementWorker {
    pub fn spawn(api: Arc<ApiServer>, algorithm: Box<dyn PlacementAlgorithm>) -> Result<Self, BusError> {
        // subscribe before returning so that no pod created afterwards is missed. The worker
        // publishes on the topic it reads, so its own channel must never fill up.
        let watch = api.bus().subscribe_with_buffer(PODS_TOPIC, None)?;
        let handle = std::thread::Builder::new()
            .name("placement".to_string())
            .spawn(move || {
                for event in watch.iter() {
                    if event.kind == EventKind::Deleted {
                        continue;
                    }
                    let Some(pod) = event.as_pod() else {
                        continue;
                    };
                    if pod.phase == PodPhase::Pending && pod.node_name.is_none() && api.pending().contains(&pod.id) {
                        place_pod(&api, algorithm.as_ref(), pod);
                    }
                }
                debug!("Placement worker stopped");
            })
            .map_err(|err| {
                error!("Can't start placement worker: {}", err);
                BusError::Shutdown
            })?;
        Ok(Self { handle: Some(handle) })
    }

    /// Waits for the worker to exit. Only returns after the event bus was shut down.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Placement worker panicked");
            }
        }
    }
}

fn place_pod(api: &ApiServer, algorithm: &dyn PlacementAlgorithm, pod: &PodSnapshot) {
    let start_of_algorithm_work = Instant::now();
    let nodes = api.node_snapshots();
    let filtered_nodes = algorithm.filter(pod, &nodes);
    let chosen = if filtered_nodes.is_empty() {
        None
    } else {
        let scores = algorithm.score(pod, &nodes, &filtered_nodes);
        select_node(&filtered_nodes, &scores)
    };
    debug!("Placement of pod {} took {:?}", pod.id, start_of_algorithm_work.elapsed());

    let Some(node_name) = chosen else {
        if let Err(err) = api.report_unschedulable(&pod.id, "no node has enough resources") {
            debug!("Pod {} is no longer waiting: {}", pod.id, err);
        }
        return;
    };
    if let Err(err) = api.bind(&pod.id, &node_name) {
        warn!("Can't bind pod {} to node {}: {}", pod.id, node_name, err);
        // never leave the driver waiting on a placement that will not happen
        if api.report_unschedulable(&pod.id, &err.to_string()).is_err() {
            api.pending().resolve(&pod.id);
        }
    }
}
