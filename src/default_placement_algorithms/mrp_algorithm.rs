use std::collections::BTreeMap;
use crate::node::NodeSnapshot;
use crate::placement_algorithm::PlacementAlgorithm;
use crate::pod::PodSnapshot;

/// Most requested priority: packs pods onto the fullest nodes that still fit them.
#[derive(Default)]
pub struct MrpAlgorithm;

impl MrpAlgorithm {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementAlgorithm for MrpAlgorithm {
    fn filter(&self, pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>) -> Vec<String> {
        nodes.iter()
            .filter(|(_, node)| node.can_place_pod(pod.cpu_limit, pod.mem_limit))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn score(&self, pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>,
             filtered_nodes: &[String]) -> Vec<f64> {
        let mut scores = Vec::with_capacity(filtered_nodes.len());
        for name in filtered_nodes {
            let Some(node) = nodes.get(name) else {
                scores.push(f64::MIN);
                continue;
            };
            let cpu_utilization = (node.requested_cpu + pod.cpu_limit) / node.cpu_cores as f64;
            let memory_utilization = (node.requested_memory + pod.mem_limit) as f64 / node.memory as f64;
            scores.push(10.0 * (cpu_utilization + memory_utilization) / 2.0);
        }
        scores
    }
}
