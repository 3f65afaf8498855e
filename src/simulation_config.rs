//! Simulation configuration.

use serde::{Deserialize, Serialize};
use crate::default_core_schedulers::fair_scheduler::FAIR_SCHEDULER;
use crate::errors::ConfigError;
use crate::metrics_aggregator::{validate_windows, DEFAULT_WINDOWS};
use crate::pod::PodSpec;

/// Holds configuration of a single node or a set of identical nodes.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Number of CPU cores.
    pub cpu: u32,
    /// Memory capacity in bytes.
    pub memory: u64,
    /// Number of such nodes.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Registered name of the core scheduler.
    #[serde(default = "default_core_scheduler")]
    pub core_scheduler: String,
}

impl NodeConfig {
    pub fn new(cpu: u32, memory: u64, count: u32) -> Self {
        Self {
            cpu,
            memory,
            count,
            core_scheduler: default_core_scheduler(),
        }
    }
}

/// Holds configuration of a single pod or a set of identical pods.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Pods are named `<name>-<index>`.
    pub name: String,
    pub cpu_limit: f64,
    /// Memory limit in bytes.
    pub mem_limit: u64,
    /// Registered name of the pod algorithm.
    pub algorithm: String,
    /// Initial state handed to the algorithm.
    #[serde(default)]
    pub state: serde_json::Value,
    /// Number of such pods.
    #[serde(default = "default_count")]
    pub count: u32,
}

impl WorkloadConfig {
    pub fn pod_specs(&self) -> Vec<PodSpec> {
        (0..self.count)
            .map(|idx| PodSpec::new(format!("{}-{}", self.name, idx), self.cpu_limit, self.mem_limit,
                                    self.algorithm.clone(), self.state.clone()))
            .collect()
    }
}

fn default_count() -> u32 {
    1
}

fn default_core_scheduler() -> String {
    FAIR_SCHEDULER.to_string()
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub tick_duration: Option<f64>,
    pub total_ticks: Option<u64>,
    pub placement_timeout_ms: Option<u64>,
    pub default_grace_ticks: Option<u64>,
    pub metrics_windows: Option<[usize; 3]>,
    pub subscriber_buffer: Option<usize>,
    pub nodes: Option<Vec<NodeConfig>>,
    pub workloads: Option<Vec<WorkloadConfig>>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated seconds per tick.
    pub tick_duration: f64,
    /// Ticks to run before the simulation stops by itself.
    pub total_ticks: u64,
    /// Wall time the driver waits for outstanding placements each tick.
    pub placement_timeout_ms: u64,
    /// Grace period of deletions issued by the default controllers.
    pub default_grace_ticks: u64,
    /// Short, medium and long window of the metrics aggregators, in ticks.
    pub metrics_windows: [usize; 3],
    /// Capacity of event bus subscriber channels, unbounded if absent.
    pub subscriber_buffer: Option<usize>,
    /// Configurations of nodes.
    pub nodes: Vec<NodeConfig>,
    /// Configurations of pods submitted at start.
    pub workloads: Vec<WorkloadConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_duration: 1.0,
            total_ticks: 1000,
            placement_timeout_ms: 1000,
            default_grace_ticks: 30,
            metrics_windows: DEFAULT_WINDOWS,
            subscriber_buffer: None,
            nodes: Vec::default(),
            workloads: Vec::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new(total_ticks: u64, placement_timeout_ms: u64) -> Self {
        Self {
            total_ticks,
            placement_timeout_ms,
            ..Default::default()
        }
    }

    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawSimulationConfig = serde_yaml::from_str(content)?;
        let default = Self::default();
        let config = Self {
            tick_duration: raw.tick_duration.unwrap_or(default.tick_duration),
            total_ticks: raw.total_ticks.unwrap_or(default.total_ticks),
            placement_timeout_ms: raw.placement_timeout_ms.unwrap_or(default.placement_timeout_ms),
            default_grace_ticks: raw.default_grace_ticks.unwrap_or(default.default_grace_ticks),
            metrics_windows: raw.metrics_windows.unwrap_or(default.metrics_windows),
            subscriber_buffer: raw.subscriber_buffer,
            nodes: raw.nodes.unwrap_or_default(),
            workloads: raw.workloads.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_duration > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tick_duration",
                message: format!("must be positive, got {}", self.tick_duration),
            });
        }
        validate_windows(&self.metrics_windows)?;
        if self.subscriber_buffer == Some(0) {
            return Err(ConfigError::Invalid {
                field: "subscriber_buffer",
                message: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}
