use std::collections::BTreeMap;
use crate::node::NodeSnapshot;
use crate::placement_algorithm::PlacementAlgorithm;
use crate::pod::PodSnapshot;

/// Least requested priority: spreads pods over the emptiest nodes.
#[derive(Default)]
pub struct LrpAlgorithm;

impl LrpAlgorithm {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementAlgorithm for LrpAlgorithm {
    fn filter(&self, pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>) -> Vec<String> {
        nodes.iter()
            .filter(|(_, node)| node.can_place_pod(pod.cpu_limit, pod.mem_limit))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn score(&self, _pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>,
             filtered_nodes: &[String]) -> Vec<f64> {
        let mut scores = Vec::with_capacity(filtered_nodes.len());
        for name in filtered_nodes {
            let Some(node) = nodes.get(name) else {
                scores.push(f64::MIN);
                continue;
            };
            let free_cpu = 1.0 - node.requested_cpu / node.cpu_cores as f64;
            let free_memory = 1.0 - node.requested_memory as f64 / node.memory as f64;
            scores.push(10.0 * (free_cpu + free_memory) / 2.0);
        }
        scores
    }
}
