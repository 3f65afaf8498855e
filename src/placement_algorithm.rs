use std::collections::BTreeMap;
use crate::node::NodeSnapshot;
use crate::pod::PodSnapshot;

pub trait PlacementAlgorithm: Send {
    /// Filter nodes by need pod, returns names of the nodes the pod fits on.
    fn filter(&self, pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>) -> Vec<String>;

    /// Score nodes by need pod, returns scores for nodes from filtered_nodes.
    fn score(&self, pod: &PodSnapshot, nodes: &BTreeMap<String, NodeSnapshot>,
             filtered_nodes: &[String]) -> Vec<f64>;
}

/// Name of the node with the highest score, the first one on ties.
pub fn select_node(filtered_nodes: &[String], scores: &[f64]) -> Option<String> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores.iter().enumerate().take(filtered_nodes.len()) {
        if best.map_or(true, |(_, best_score)| *score > best_score) {
            best = Some((idx, *score));
        }
    }
    best.map(|(idx, _)| filtered_nodes[idx].clone())
}
